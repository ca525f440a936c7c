//! Global routing mode switch.

use orderdesk_storage::RepositoryService;
use orderdesk_types::RoutingMode;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while reading or writing the routing mode.
#[derive(Debug, Error)]
pub enum RoutingError {
	#[error("Failed to read routing mode: {0}")]
	Read(String),
	#[error("Failed to write routing mode: {0}")]
	Write(String),
}

/// Reads and flips the shared routing mode record.
///
/// The record is shared by every desk and written without any locking, so
/// two concurrent toggles can both read the same value and one of the writes
/// is lost.
pub struct RoutingModeToggle {
	repository: Arc<RepositoryService>,
}

impl RoutingModeToggle {
	pub fn new(repository: Arc<RepositoryService>) -> Self {
		Self { repository }
	}

	pub async fn get(&self) -> Result<RoutingMode, RoutingError> {
		self.repository
			.routing_mode()
			.await
			.map_err(|e| RoutingError::Read(e.to_string()))
	}

	pub async fn set(&self, mode: RoutingMode) -> Result<(), RoutingError> {
		self.repository
			.set_routing_mode(mode)
			.await
			.map_err(|e| RoutingError::Write(e.to_string()))?;
		tracing::info!(mode = %mode, "Routing mode set");
		Ok(())
	}

	/// Flips the mode and returns the new value.
	pub async fn toggle(&self) -> Result<RoutingMode, RoutingError> {
		let current = self.get().await?;
		let next = current.toggled();
		self.set(next).await?;
		Ok(next)
	}
}
