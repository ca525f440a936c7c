//! HTTP API handlers for the order desk.

pub mod archive;
pub mod health;
pub mod orders;
pub mod routing;

use axum::{
	http::StatusCode,
	response::{IntoResponse, Json, Response},
};
use orderdesk_core::{RoutingError, TransitionError, ViewError};
use serde::{Deserialize, Serialize};

/// Body returned with every error status.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
	/// Stable machine-readable code.
	pub error: String,
	/// Human-readable description.
	pub message: String,
}

/// An error response: status plus body.
#[derive(Debug)]
pub struct ApiError {
	pub status: StatusCode,
	pub code: &'static str,
	pub message: String,
}

impl ApiError {
	pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
		Self {
			status,
			code,
			message: message.into(),
		}
	}

	pub fn bad_request(message: impl Into<String>) -> Self {
		Self::new(StatusCode::BAD_REQUEST, "INVALID_REQUEST", message)
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		(
			self.status,
			Json(ErrorResponse {
				error: self.code.to_string(),
				message: self.message,
			}),
		)
			.into_response()
	}
}

impl From<TransitionError> for ApiError {
	fn from(err: TransitionError) -> Self {
		let (status, code) = match &err {
			TransitionError::NotFound(_) => (StatusCode::NOT_FOUND, "ORDER_NOT_FOUND"),
			TransitionError::InFlight(_) => (StatusCode::CONFLICT, "TRANSITION_IN_PROGRESS"),
			TransitionError::ArchiveWrite { .. } => (StatusCode::BAD_GATEWAY, "ARCHIVE_WRITE_FAILED"),
			TransitionError::PendingDelete { .. } => {
				(StatusCode::BAD_GATEWAY, "PENDING_DELETE_FAILED")
			},
			TransitionError::Interrupted { .. } => {
				(StatusCode::INTERNAL_SERVER_ERROR, "TRANSITION_INTERRUPTED")
			},
		};
		Self::new(status, code, err.to_string())
	}
}

impl From<ViewError> for ApiError {
	fn from(err: ViewError) -> Self {
		match err {
			ViewError::Transition(e) => e.into(),
			ViewError::Unauthenticated => {
				Self::new(StatusCode::UNAUTHORIZED, "UNAUTHENTICATED", err.to_string())
			},
			ViewError::Feed(_) | ViewError::Sync(_) | ViewError::Repository(_) => Self::new(
				StatusCode::SERVICE_UNAVAILABLE,
				"STORAGE_UNAVAILABLE",
				err.to_string(),
			),
			ViewError::Account(_) => {
				Self::new(StatusCode::SERVICE_UNAVAILABLE, "ACCOUNT_UNAVAILABLE", err.to_string())
			},
		}
	}
}

impl From<RoutingError> for ApiError {
	fn from(err: RoutingError) -> Self {
		Self::new(StatusCode::SERVICE_UNAVAILABLE, "ROUTING_MODE_UNAVAILABLE", err.to_string())
	}
}
