//! Order repository for the order desk.
//!
//! This crate defines the storage boundary the core consumes: durable pending
//! and archive collections plus a live change feed of the pending collection.
//! Backends implement [`RepositoryInterface`]; the core talks to them through
//! [`RepositoryService`], which adds validation and logging.

use async_trait::async_trait;
use orderdesk_types::{
	truncate_id, ChangeNotification, Collection, ConfigSchema, DateRange, ImplementationRegistry,
	Order, RoutingMode, SubscriptionHandle,
};
use thiserror::Error;
use tokio::sync::mpsc;

pub mod feed;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
	/// The requested order does not exist.
	#[error("Not found: {0}")]
	NotFound(String),
	/// A record with the same id already exists in the target collection.
	#[error("Conflict: {0}")]
	Conflict(String),
	/// A record could not be encoded or decoded.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// The record breaks a field rule.
	#[error("Validation error: {0}")]
	Validation(String),
	/// The backend failed to carry out the operation.
	#[error("Backend error: {0}")]
	Backend(String),
	/// The change feed could not be opened or closed.
	#[error("Subscription error: {0}")]
	Subscription(String),
	/// The backend configuration is invalid.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the interface of an order repository backend.
///
/// All operations are independent and non-transactional: a caller moving an
/// order between collections performs two writes and owns the consequences
/// of the second one failing.
#[async_trait]
pub trait RepositoryInterface: Send + Sync {
	/// Returns the configuration schema for this backend.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Returns the pending orders owned by `owner_id`, in no particular order.
	async fn fetch_pending(&self, owner_id: &str) -> Result<Vec<Order>, RepositoryError>;

	/// Returns the archived orders owned by `owner_id` created inside `range`.
	async fn fetch_archive(
		&self,
		owner_id: &str,
		range: DateRange,
	) -> Result<Vec<Order>, RepositoryError>;

	/// Adds a new order to the pending collection.
	///
	/// Used by the intake process. An empty id is replaced with a fresh one;
	/// the stored order is returned.
	async fn insert_pending(&self, order: Order) -> Result<Order, RepositoryError>;

	/// Rewrites an existing pending order. Fails with `NotFound` if absent.
	async fn update_pending(&self, order: &Order) -> Result<(), RepositoryError>;

	/// Writes a resolved order into the archive collection.
	///
	/// Fails with `Conflict` if the archive already holds that id.
	async fn insert_archive(&self, order: &Order) -> Result<(), RepositoryError>;

	/// Deletes an order from the pending collection. Deleting an absent id
	/// succeeds without emitting a change.
	async fn delete_order(&self, id: &str) -> Result<(), RepositoryError>;

	/// Opens a change subscription on `collection`.
	///
	/// Notifications are pushed into `sink` in the order the writes happened.
	/// The subscription ends when `unsubscribe` is called, when `sink` is
	/// closed, or when the backend drops it; in every case `sink`'s sender is
	/// released so the receiving side observes the closure.
	async fn subscribe_changes(
		&self,
		collection: Collection,
		sink: mpsc::Sender<ChangeNotification>,
	) -> Result<SubscriptionHandle, RepositoryError>;

	/// Closes a subscription opened by `subscribe_changes`. Unknown handles
	/// are ignored.
	async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), RepositoryError>;

	/// Reads the shared routing mode record.
	async fn routing_mode(&self) -> Result<RoutingMode, RepositoryError>;

	/// Overwrites the shared routing mode record.
	async fn set_routing_mode(&self, mode: RoutingMode) -> Result<(), RepositoryError>;
}

/// Type alias for repository factory functions.
pub type RepositoryFactory = fn(&toml::Value) -> Result<Box<dyn RepositoryInterface>, RepositoryError>;

/// Registry trait for repository implementations.
pub trait RepositoryRegistry: ImplementationRegistry<Factory = RepositoryFactory> {}

/// Get all registered repository implementations.
///
/// Returns a vector of (name, factory) tuples for all available backends.
pub fn get_all_implementations() -> Vec<(&'static str, RepositoryFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// High-level repository service used by the core.
///
/// Wraps a backend, checks records before they are written and logs every
/// write with the affected order id.
pub struct RepositoryService {
	/// The underlying backend implementation.
	backend: Box<dyn RepositoryInterface>,
}

impl RepositoryService {
	/// Creates a new RepositoryService with the specified backend.
	pub fn new(backend: Box<dyn RepositoryInterface>) -> Self {
		Self { backend }
	}

	/// Returns the pending orders owned by `owner_id`.
	pub async fn fetch_pending(&self, owner_id: &str) -> Result<Vec<Order>, RepositoryError> {
		let orders = self.backend.fetch_pending(owner_id).await?;
		tracing::debug!(owner_id = %truncate_id(owner_id), count = orders.len(), "Fetched pending orders");
		Ok(orders)
	}

	/// Returns the archived orders owned by `owner_id` within `range`.
	pub async fn fetch_archive(
		&self,
		owner_id: &str,
		range: DateRange,
	) -> Result<Vec<Order>, RepositoryError> {
		self.backend.fetch_archive(owner_id, range).await
	}

	/// Adds a pending order after checking its fields and status.
	pub async fn insert_pending(&self, order: Order) -> Result<Order, RepositoryError> {
		order
			.validate()
			.map_err(|e| RepositoryError::Validation(e.to_string()))?;
		if !order.status.is_pending() {
			return Err(RepositoryError::Validation(format!(
				"cannot add a {} order to {}",
				order.status,
				Collection::Pending.as_str()
			)));
		}

		let stored = self.backend.insert_pending(order).await?;
		tracing::info!(order_id = %truncate_id(&stored.id), order_number = stored.order_number, "Order received");
		Ok(stored)
	}

	/// Rewrites a pending order after checking its fields and status.
	pub async fn update_pending(&self, order: &Order) -> Result<(), RepositoryError> {
		order
			.validate()
			.map_err(|e| RepositoryError::Validation(e.to_string()))?;
		if !order.status.is_pending() {
			return Err(RepositoryError::Validation(format!(
				"a {} order does not belong in {}",
				order.status,
				Collection::Pending.as_str()
			)));
		}
		self.backend.update_pending(order).await
	}

	/// Writes a resolved order into the archive.
	pub async fn insert_archive(&self, order: &Order) -> Result<(), RepositoryError> {
		if !order.status.is_archived() {
			return Err(RepositoryError::Validation(format!(
				"cannot archive an order with status {}",
				order.status
			)));
		}
		self.backend.insert_archive(order).await?;
		tracing::debug!(order_id = %truncate_id(&order.id), status = %order.status, "Archived order");
		Ok(())
	}

	/// Deletes an order from the pending collection.
	pub async fn delete_order(&self, id: &str) -> Result<(), RepositoryError> {
		self.backend.delete_order(id).await?;
		tracing::debug!(order_id = %truncate_id(id), "Deleted pending order");
		Ok(())
	}

	/// Opens a change subscription on `collection`.
	pub async fn subscribe_changes(
		&self,
		collection: Collection,
		sink: mpsc::Sender<ChangeNotification>,
	) -> Result<SubscriptionHandle, RepositoryError> {
		let handle = self.backend.subscribe_changes(collection, sink).await?;
		tracing::debug!(collection = collection.as_str(), handle = %handle, "Opened change subscription");
		Ok(handle)
	}

	/// Closes a change subscription.
	pub async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), RepositoryError> {
		self.backend.unsubscribe(handle).await?;
		tracing::debug!(handle = %handle, "Closed change subscription");
		Ok(())
	}

	/// Reads the shared routing mode.
	pub async fn routing_mode(&self) -> Result<RoutingMode, RepositoryError> {
		self.backend.routing_mode().await
	}

	/// Overwrites the shared routing mode.
	pub async fn set_routing_mode(&self, mode: RoutingMode) -> Result<(), RepositoryError> {
		self.backend.set_routing_mode(mode).await
	}
}
