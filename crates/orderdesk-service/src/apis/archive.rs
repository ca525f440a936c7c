//! Archived (completed and cancelled) orders.

use super::ApiError;
use crate::server::AppState;
use axum::extract::{Query, State};
use axum::response::Json;
use chrono::{DateTime, Utc};
use orderdesk_types::{DateRange, Order};
use serde::{Deserialize, Serialize};

/// Query string of `GET /api/archive`. Both bounds are RFC 3339 timestamps.
#[derive(Debug, Default, Deserialize)]
pub struct ArchiveQuery {
	pub from: Option<String>,
	pub to: Option<String>,
}

/// Response body of `GET /api/archive`.
#[derive(Debug, Serialize)]
pub struct ArchiveResponse {
	pub orders: Vec<Order>,
	pub count: usize,
}

impl ArchiveQuery {
	/// Converts the query into a range of Unix seconds.
	pub fn to_range(&self) -> Result<DateRange, ApiError> {
		let from = self.from.as_deref().map(|s| parse_bound("from", s)).transpose()?;
		let to = self.to.as_deref().map(|s| parse_bound("to", s)).transpose()?;

		if let (Some(from), Some(to)) = (from, to) {
			if from > to {
				return Err(ApiError::bad_request("'from' must not be after 'to'"));
			}
		}
		Ok(DateRange { from, to })
	}
}

fn parse_bound(name: &str, value: &str) -> Result<u64, ApiError> {
	let parsed = DateTime::parse_from_rfc3339(value).map_err(|e| {
		ApiError::bad_request(format!("'{}' is not an RFC 3339 timestamp: {}", name, e))
	})?;
	let seconds = parsed.with_timezone(&Utc).timestamp();
	u64::try_from(seconds)
		.map_err(|_| ApiError::bad_request(format!("'{}' is before the Unix epoch", name)))
}

/// Handles GET /api/archive.
pub async fn list_archive(
	State(state): State<AppState>,
	Query(query): Query<ArchiveQuery>,
) -> Result<Json<ArchiveResponse>, ApiError> {
	let range = query.to_range()?;
	let orders = state.view.archive(range).await?;
	Ok(Json(ArchiveResponse {
		count: orders.len(),
		orders,
	}))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn query(from: Option<&str>, to: Option<&str>) -> ArchiveQuery {
		ArchiveQuery {
			from: from.map(str::to_string),
			to: to.map(str::to_string),
		}
	}

	#[test]
	fn test_empty_query_is_unbounded() {
		assert_eq!(query(None, None).to_range().unwrap(), DateRange::unbounded());
	}

	#[test]
	fn test_bounds_are_converted_to_utc_seconds() {
		let range = query(Some("1970-01-01T00:01:00Z"), Some("1970-01-01T02:00:00+01:00"))
			.to_range()
			.unwrap();
		assert_eq!(range.from, Some(60));
		assert_eq!(range.to, Some(3600));
	}

	#[test]
	fn test_rejects_bad_input() {
		assert!(query(Some("yesterday"), None).to_range().is_err());
		assert!(query(Some("2024-02-01T00:00:00Z"), Some("2024-01-01T00:00:00Z"))
			.to_range()
			.is_err());
		assert!(query(Some("1960-01-01T00:00:00Z"), None).to_range().is_err());
	}
}
