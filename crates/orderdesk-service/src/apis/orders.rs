//! Pending orders and their transitions.

use super::ApiError;
use crate::server::AppState;
use axum::extract::{Path, State};
use axum::response::Json;
use orderdesk_core::TransitionReport;
use orderdesk_types::{truncate_id, Order, TransitionKind};
use serde::Serialize;

/// Response body of `GET /api/orders`.
#[derive(Debug, Serialize)]
pub struct PendingOrdersResponse {
	pub orders: Vec<Order>,
	pub count: usize,
}

/// Handles GET /api/orders.
pub async fn list_pending(State(state): State<AppState>) -> Json<PendingOrdersResponse> {
	let orders = state.view.pending_orders().await;
	Json(PendingOrdersResponse {
		count: orders.len(),
		orders,
	})
}

/// Handles POST /api/orders/{id}/confirm.
pub async fn confirm(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<Json<TransitionReport>, ApiError> {
	transition(&state, &id, TransitionKind::Confirm).await
}

/// Handles POST /api/orders/{id}/cancel.
pub async fn cancel(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<Json<TransitionReport>, ApiError> {
	transition(&state, &id, TransitionKind::Cancel).await
}

async fn transition(
	state: &AppState,
	id: &str,
	kind: TransitionKind,
) -> Result<Json<TransitionReport>, ApiError> {
	let result = match kind {
		TransitionKind::Confirm => state.view.confirm(id).await,
		TransitionKind::Cancel => state.view.cancel(id).await,
	};
	result.map(Json).map_err(|e| {
		tracing::warn!(%kind, order_id = %truncate_id(id), error = %e, "Transition request failed");
		ApiError::from(e)
	})
}
