//! Liveness of the desk and its change feed.

use crate::server::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use orderdesk_feed::FeedState;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
	pub desk_id: String,
	/// `live`, `stopped` or `disconnected`.
	pub feed: &'static str,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub reason: Option<String>,
	pub pending_orders: usize,
}

/// Handles GET /api/health.
///
/// Answers 503 when the feed is not live: the pending list may be stale.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
	let (feed, reason) = match state.view.feed_state() {
		FeedState::Live => ("live", None),
		FeedState::Stopped => ("stopped", None),
		FeedState::Disconnected(reason) => ("disconnected", Some(reason)),
	};
	let status = if feed == "live" {
		StatusCode::OK
	} else {
		StatusCode::SERVICE_UNAVAILABLE
	};

	let body = HealthResponse {
		desk_id: state.desk.config().desk.id.clone(),
		feed,
		reason,
		pending_orders: state.view.pending_orders().await.len(),
	};
	(status, Json(body))
}
