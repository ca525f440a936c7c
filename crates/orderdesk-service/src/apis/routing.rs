//! Global routing mode.

use super::ApiError;
use crate::server::AppState;
use axum::extract::State;
use axum::response::Json;
use orderdesk_types::RoutingMode;
use serde::{Deserialize, Serialize};

/// Request and response body of the routing mode endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct RoutingModeBody {
	pub mode: RoutingMode,
}

/// Handles GET /api/routing-mode.
pub async fn get_mode(State(state): State<AppState>) -> Result<Json<RoutingModeBody>, ApiError> {
	let mode = state.desk.routing().get().await?;
	Ok(Json(RoutingModeBody { mode }))
}

/// Handles PUT /api/routing-mode.
pub async fn set_mode(
	State(state): State<AppState>,
	Json(body): Json<RoutingModeBody>,
) -> Result<Json<RoutingModeBody>, ApiError> {
	state.desk.routing().set(body.mode).await?;
	Ok(Json(body))
}

/// Handles POST /api/routing-mode/toggle.
pub async fn toggle_mode(
	State(state): State<AppState>,
) -> Result<Json<RoutingModeBody>, ApiError> {
	let mode = state.desk.routing().toggle().await?;
	Ok(Json(RoutingModeBody { mode }))
}
