//! Initial fetch of the pending set.

use orderdesk_storage::RepositoryService;
use orderdesk_types::{truncate_id, Order};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while loading the initial pending set.
#[derive(Debug, Error)]
pub enum SyncError {
	/// The repository could not be read. The store is left empty.
	#[error("Failed to fetch pending orders: {0}")]
	Fetch(String),
}

/// Loads the pending orders of one owner.
pub struct SnapshotLoader {
	repository: Arc<RepositoryService>,
}

impl SnapshotLoader {
	pub fn new(repository: Arc<RepositoryService>) -> Self {
		Self { repository }
	}

	/// Returns the owner's pending orders, highest `order_number` first.
	///
	/// The pending and owner filters are applied again here so a backend that
	/// returns extra rows cannot widen what the operator sees.
	pub async fn load(&self, owner_id: &str) -> Result<Vec<Order>, SyncError> {
		let fetched = self
			.repository
			.fetch_pending(owner_id)
			.await
			.map_err(|e| SyncError::Fetch(e.to_string()))?;

		let total = fetched.len();
		let mut orders: Vec<Order> = fetched
			.into_iter()
			.filter(|o| o.is_pending() && o.owner_id == owner_id)
			.collect();
		orders.sort_by(|a, b| b.order_number.cmp(&a.order_number));

		if orders.len() != total {
			tracing::warn!(
				owner_id = %truncate_id(owner_id),
				dropped = total - orders.len(),
				"Repository returned orders outside the pending set"
			);
		}
		tracing::info!(owner_id = %truncate_id(owner_id), count = orders.len(), "Loaded pending orders");
		Ok(orders)
	}
}
