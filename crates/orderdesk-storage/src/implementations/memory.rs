//! In-memory repository backend.
//!
//! Keeps both collections in process memory. Useful for tests and for running
//! a desk without persistence.

use crate::feed::{ChangeBroadcaster, DEFAULT_BROADCAST_CAPACITY};
use crate::{RepositoryError, RepositoryInterface};
use async_trait::async_trait;
use orderdesk_types::{
	current_timestamp, ChangeNotification, Collection, ConfigSchema, DateRange, Field, FieldType,
	ImplementationRegistry, Order, RoutingMode, Schema, SubscriptionHandle, ValidationError,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

#[derive(Default)]
struct Collections {
	pending: HashMap<String, Order>,
	archive: HashMap<String, Order>,
	routing_mode: RoutingMode,
}

/// In-memory repository implementation.
///
/// Both collections live behind a single lock so a write and its change
/// notification are published atomically with respect to other writes.
/// Clones share the same data and change feed.
#[derive(Clone)]
pub struct MemoryRepository {
	data: Arc<RwLock<Collections>>,
	changes: Arc<ChangeBroadcaster>,
}

impl MemoryRepository {
	pub fn new() -> Self {
		Self::with_capacity(DEFAULT_BROADCAST_CAPACITY)
	}

	/// Creates a repository whose change feed buffers `capacity` notifications
	/// per subscriber.
	pub fn with_capacity(capacity: usize) -> Self {
		Self {
			data: Arc::new(RwLock::new(Collections::default())),
			changes: Arc::new(ChangeBroadcaster::new(capacity)),
		}
	}

	/// Drops every open change subscription.
	pub fn disconnect_subscribers(&self) {
		self.changes.disconnect_all();
	}
}

impl Default for MemoryRepository {
	fn default() -> Self {
		Self::new()
	}
}

pub(crate) fn to_row(order: &Order) -> Result<serde_json::Value, RepositoryError> {
	serde_json::to_value(order).map_err(|e| RepositoryError::Serialization(e.to_string()))
}

#[async_trait]
impl RepositoryInterface for MemoryRepository {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryRepositorySchema)
	}

	async fn fetch_pending(&self, owner_id: &str) -> Result<Vec<Order>, RepositoryError> {
		let data = self.data.read().await;
		Ok(data
			.pending
			.values()
			.filter(|order| order.owner_id == owner_id)
			.cloned()
			.collect())
	}

	async fn fetch_archive(
		&self,
		owner_id: &str,
		range: DateRange,
	) -> Result<Vec<Order>, RepositoryError> {
		let data = self.data.read().await;
		Ok(data
			.archive
			.values()
			.filter(|order| order.owner_id == owner_id && range.contains(order.created_at))
			.cloned()
			.collect())
	}

	async fn insert_pending(&self, mut order: Order) -> Result<Order, RepositoryError> {
		if order.id.is_empty() {
			order.id = uuid::Uuid::new_v4().to_string();
		}
		if order.created_at == 0 {
			order.created_at = current_timestamp();
		}
		let row = to_row(&order)?;

		let mut data = self.data.write().await;
		if data.pending.contains_key(&order.id) {
			return Err(RepositoryError::Conflict(format!(
				"order {} already pending",
				order.id
			)));
		}
		data.pending.insert(order.id.clone(), order.clone());
		self.changes
			.publish(ChangeNotification::insert(Collection::Pending, row));
		Ok(order)
	}

	async fn update_pending(&self, order: &Order) -> Result<(), RepositoryError> {
		let row = to_row(order)?;

		let mut data = self.data.write().await;
		let Some(existing) = data.pending.get_mut(&order.id) else {
			return Err(RepositoryError::NotFound(order.id.clone()));
		};
		*existing = order.clone();
		self.changes.publish(ChangeNotification::update(
			Collection::Pending,
			row,
			Some(serde_json::json!({ "id": order.id })),
		));
		Ok(())
	}

	async fn insert_archive(&self, order: &Order) -> Result<(), RepositoryError> {
		let row = to_row(order)?;

		let mut data = self.data.write().await;
		if data.archive.contains_key(&order.id) {
			return Err(RepositoryError::Conflict(format!(
				"order {} already archived",
				order.id
			)));
		}
		data.archive.insert(order.id.clone(), order.clone());
		self.changes
			.publish(ChangeNotification::insert(Collection::Archive, row));
		Ok(())
	}

	async fn delete_order(&self, id: &str) -> Result<(), RepositoryError> {
		let mut data = self.data.write().await;
		if data.pending.remove(id).is_some() {
			self.changes
				.publish(ChangeNotification::delete(Collection::Pending, id));
		}
		Ok(())
	}

	async fn subscribe_changes(
		&self,
		collection: Collection,
		sink: mpsc::Sender<ChangeNotification>,
	) -> Result<SubscriptionHandle, RepositoryError> {
		// Register while holding the read lock so no write slips between the
		// caller's decision to subscribe and the receiver existing.
		let _guard = self.data.read().await;
		Ok(self.changes.subscribe(collection, sink))
	}

	async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), RepositoryError> {
		self.changes.unsubscribe(handle);
		Ok(())
	}

	async fn routing_mode(&self) -> Result<RoutingMode, RepositoryError> {
		Ok(self.data.read().await.routing_mode)
	}

	async fn set_routing_mode(&self, mode: RoutingMode) -> Result<(), RepositoryError> {
		self.data.write().await.routing_mode = mode;
		Ok(())
	}
}

/// Configuration schema for MemoryRepository.
pub struct MemoryRepositorySchema;

impl ConfigSchema for MemoryRepositorySchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![Field::new(
				"feed_buffer",
				FieldType::Integer {
					min: Some(1),
					max: Some(65_536),
				},
			)],
		);
		schema.validate(config)
	}
}

/// Factory function to create a memory repository from configuration.
///
/// Configuration parameters:
/// - `feed_buffer`: notifications buffered per subscriber (default: 1024)
pub fn create_repository(
	config: &toml::Value,
) -> Result<Box<dyn RepositoryInterface>, RepositoryError> {
	MemoryRepositorySchema
		.validate(config)
		.map_err(|e| RepositoryError::Configuration(e.to_string()))?;

	let capacity = config
		.get("feed_buffer")
		.and_then(|v| v.as_integer())
		.map(|v| v as usize)
		.unwrap_or(DEFAULT_BROADCAST_CAPACITY);

	Ok(Box::new(MemoryRepository::with_capacity(capacity)))
}

/// Registry for the memory backend.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = crate::RepositoryFactory;

	fn factory() -> Self::Factory {
		create_repository
	}
}

impl crate::RepositoryRegistry for Registry {}
