//! File-based repository backend.
//!
//! Each order is one JSON file inside a directory per collection:
//!
//! ```text
//! <storage_path>/
//!   .orderdesk.lock
//!   routing_mode.json
//!   pending_orders/<id>.json
//!   archived_orders/<id>.json
//! ```
//!
//! Change notifications are delivered in-process only, so the directory is
//! locked for the lifetime of the repository and a second desk pointed at the
//! same path fails to start.

use crate::feed::{ChangeBroadcaster, DEFAULT_BROADCAST_CAPACITY};
use crate::implementations::memory::to_row;
use crate::{RepositoryError, RepositoryInterface};
use async_trait::async_trait;
use fs2::FileExt;
use orderdesk_types::{
	current_timestamp, ChangeNotification, Collection, ConfigSchema, DateRange, Field, FieldType,
	ImplementationRegistry, Order, RoutingMode, Schema, SubscriptionHandle, ValidationError,
};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::{mpsc, Mutex};

const LOCK_FILE: &str = ".orderdesk.lock";
const ROUTING_MODE_FILE: &str = "routing_mode.json";

/// File-based repository implementation.
pub struct FileRepository {
	base_path: PathBuf,
	/// Held open for its advisory lock.
	lock_file: std::fs::File,
	/// Serializes writes so notifications follow write order.
	write_lock: Mutex<()>,
	changes: ChangeBroadcaster,
}

impl FileRepository {
	/// Opens (creating if needed) a repository rooted at `base_path`.
	pub fn open(base_path: impl Into<PathBuf>, capacity: usize) -> Result<Self, RepositoryError> {
		let base_path = base_path.into();
		for collection in Collection::all() {
			std::fs::create_dir_all(base_path.join(collection.as_str()))
				.map_err(|e| RepositoryError::Backend(e.to_string()))?;
		}

		let lock_file = std::fs::OpenOptions::new()
			.create(true)
			.truncate(false)
			.write(true)
			.open(base_path.join(LOCK_FILE))
			.map_err(|e| RepositoryError::Backend(e.to_string()))?;
		lock_file.try_lock_exclusive().map_err(|_| {
			RepositoryError::Configuration(format!(
				"storage path {} is in use by another desk",
				base_path.display()
			))
		})?;

		Ok(Self {
			base_path,
			lock_file,
			write_lock: Mutex::new(()),
			changes: ChangeBroadcaster::new(capacity),
		})
	}

	/// Drops every open change subscription.
	pub fn disconnect_subscribers(&self) {
		self.changes.disconnect_all();
	}

	fn order_path(&self, collection: Collection, id: &str) -> PathBuf {
		self.base_path
			.join(collection.as_str())
			.join(format!("{}.json", file_stem(id)))
	}

	async fn read_collection(
		&self,
		collection: Collection,
	) -> Result<Vec<Order>, RepositoryError> {
		let dir = self.base_path.join(collection.as_str());
		let mut entries = match fs::read_dir(&dir).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(RepositoryError::Backend(e.to_string())),
		};

		let mut orders = Vec::new();
		while let Some(entry) = entries
			.next_entry()
			.await
			.map_err(|e| RepositoryError::Backend(e.to_string()))?
		{
			let path = entry.path();
			if path.extension() != Some(std::ffi::OsStr::new("json")) {
				continue;
			}
			match read_order(&path).await {
				Ok(order) => orders.push(order),
				Err(e) => {
					tracing::warn!(file = %path.display(), error = %e, "Skipping unreadable order file");
				},
			}
		}
		Ok(orders)
	}
}

/// Maps an order id to a file name stem, one to one.
///
/// ASCII letters, digits and `-` are kept; every other byte becomes `_xx`
/// (lower-case hex). Generated uuids pass through unchanged.
fn file_stem(id: &str) -> String {
	let mut stem = String::with_capacity(id.len());
	for byte in id.bytes() {
		if byte.is_ascii_alphanumeric() || byte == b'-' {
			stem.push(char::from(byte));
		} else {
			// Writing into a String cannot fail.
			let _ = write!(stem, "_{:02x}", byte);
		}
	}
	stem
}

impl Drop for FileRepository {
	fn drop(&mut self) {
		let _ = FileExt::unlock(&self.lock_file);
	}
}

async fn read_order(path: &Path) -> Result<Order, RepositoryError> {
	let bytes = fs::read(path)
		.await
		.map_err(|e| RepositoryError::Backend(e.to_string()))?;
	serde_json::from_slice(&bytes).map_err(|e| RepositoryError::Serialization(e.to_string()))
}

/// Writes atomically by writing to a temp file then renaming.
async fn write_json(path: &Path, value: &serde_json::Value) -> Result<(), RepositoryError> {
	let bytes = serde_json::to_vec_pretty(value)
		.map_err(|e| RepositoryError::Serialization(e.to_string()))?;
	let temp_path = path.with_extension("tmp");
	fs::write(&temp_path, bytes)
		.await
		.map_err(|e| RepositoryError::Backend(e.to_string()))?;
	fs::rename(&temp_path, path)
		.await
		.map_err(|e| RepositoryError::Backend(e.to_string()))
}

#[async_trait]
impl RepositoryInterface for FileRepository {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileRepositorySchema)
	}

	async fn fetch_pending(&self, owner_id: &str) -> Result<Vec<Order>, RepositoryError> {
		let mut orders = self.read_collection(Collection::Pending).await?;
		orders.retain(|order| order.owner_id == owner_id);
		Ok(orders)
	}

	async fn fetch_archive(
		&self,
		owner_id: &str,
		range: DateRange,
	) -> Result<Vec<Order>, RepositoryError> {
		let mut orders = self.read_collection(Collection::Archive).await?;
		orders.retain(|order| order.owner_id == owner_id && range.contains(order.created_at));
		Ok(orders)
	}

	async fn insert_pending(&self, mut order: Order) -> Result<Order, RepositoryError> {
		if order.id.is_empty() {
			order.id = uuid::Uuid::new_v4().to_string();
		}
		if order.created_at == 0 {
			order.created_at = current_timestamp();
		}
		let row = to_row(&order)?;
		let path = self.order_path(Collection::Pending, &order.id);

		let _guard = self.write_lock.lock().await;
		if fs::try_exists(&path).await.unwrap_or(false) {
			return Err(RepositoryError::Conflict(format!(
				"order {} already pending",
				order.id
			)));
		}
		write_json(&path, &row).await?;
		self.changes
			.publish(ChangeNotification::insert(Collection::Pending, row));
		Ok(order)
	}

	async fn update_pending(&self, order: &Order) -> Result<(), RepositoryError> {
		let row = to_row(order)?;
		let path = self.order_path(Collection::Pending, &order.id);

		let _guard = self.write_lock.lock().await;
		if !fs::try_exists(&path).await.unwrap_or(false) {
			return Err(RepositoryError::NotFound(order.id.clone()));
		}
		write_json(&path, &row).await?;
		self.changes.publish(ChangeNotification::update(
			Collection::Pending,
			row,
			Some(serde_json::json!({ "id": order.id })),
		));
		Ok(())
	}

	async fn insert_archive(&self, order: &Order) -> Result<(), RepositoryError> {
		let row = to_row(order)?;
		let path = self.order_path(Collection::Archive, &order.id);

		let _guard = self.write_lock.lock().await;
		if fs::try_exists(&path).await.unwrap_or(false) {
			return Err(RepositoryError::Conflict(format!(
				"order {} already archived",
				order.id
			)));
		}
		write_json(&path, &row).await?;
		self.changes
			.publish(ChangeNotification::insert(Collection::Archive, row));
		Ok(())
	}

	async fn delete_order(&self, id: &str) -> Result<(), RepositoryError> {
		let path = self.order_path(Collection::Pending, id);

		let _guard = self.write_lock.lock().await;
		match fs::remove_file(&path).await {
			Ok(()) => {
				self.changes
					.publish(ChangeNotification::delete(Collection::Pending, id));
				Ok(())
			},
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(RepositoryError::Backend(e.to_string())),
		}
	}

	async fn subscribe_changes(
		&self,
		collection: Collection,
		sink: mpsc::Sender<ChangeNotification>,
	) -> Result<SubscriptionHandle, RepositoryError> {
		let _guard = self.write_lock.lock().await;
		Ok(self.changes.subscribe(collection, sink))
	}

	async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), RepositoryError> {
		self.changes.unsubscribe(handle);
		Ok(())
	}

	async fn routing_mode(&self) -> Result<RoutingMode, RepositoryError> {
		let path = self.base_path.join(ROUTING_MODE_FILE);
		match fs::read(&path).await {
			Ok(bytes) => serde_json::from_slice(&bytes)
				.map_err(|e| RepositoryError::Serialization(e.to_string())),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RoutingMode::default()),
			Err(e) => Err(RepositoryError::Backend(e.to_string())),
		}
	}

	async fn set_routing_mode(&self, mode: RoutingMode) -> Result<(), RepositoryError> {
		let value = serde_json::to_value(mode)
			.map_err(|e| RepositoryError::Serialization(e.to_string()))?;
		let _guard = self.write_lock.lock().await;
		write_json(&self.base_path.join(ROUTING_MODE_FILE), &value).await
	}
}

/// Configuration schema for FileRepository.
pub struct FileRepositorySchema;

impl ConfigSchema for FileRepositorySchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("storage_path", FieldType::String).with_validator(|value| {
					match value.as_str() {
						Some(path) if path.trim().is_empty() => {
							Err("storage_path cannot be empty".to_string())
						},
						_ => Ok(()),
					}
				}),
				Field::new(
					"feed_buffer",
					FieldType::Integer {
						min: Some(1),
						max: Some(65_536),
					},
				),
			],
		);
		schema.validate(config)
	}
}

/// Factory function to create a file repository from configuration.
///
/// Configuration parameters:
/// - `storage_path`: base directory (default: "./data/orders")
/// - `feed_buffer`: notifications buffered per subscriber (default: 1024)
pub fn create_repository(
	config: &toml::Value,
) -> Result<Box<dyn RepositoryInterface>, RepositoryError> {
	FileRepositorySchema
		.validate(config)
		.map_err(|e| RepositoryError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/orders");
	let capacity = config
		.get("feed_buffer")
		.and_then(|v| v.as_integer())
		.map(|v| v as usize)
		.unwrap_or(DEFAULT_BROADCAST_CAPACITY);

	Ok(Box::new(FileRepository::open(storage_path, capacity)?))
}

/// Registry for the file backend.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = crate::RepositoryFactory;

	fn factory() -> Self::Factory {
		create_repository
	}
}

impl crate::RepositoryRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use orderdesk_types::{ChangeKind, DeliveryType, OrderStatus};
	use rust_decimal::Decimal;
	use tempfile::TempDir;

	fn order(id: &str, owner: &str) -> Order {
		Order {
			id: id.to_string(),
			order_number: 3,
			customer: "Rosa".to_string(),
			product: "tamal".to_string(),
			delivery_type: DeliveryType::Pickup,
			payment_method: "card".to_string(),
			address: None,
			value: Decimal::new(500, 2),
			owner_id: owner.to_string(),
			status: OrderStatus::Active,
			created_at: 100,
		}
	}

	fn open(dir: &TempDir) -> FileRepository {
		FileRepository::open(dir.path(), DEFAULT_BROADCAST_CAPACITY).unwrap()
	}

	#[tokio::test]
	async fn test_orders_survive_reopen() {
		let dir = TempDir::new().unwrap();
		{
			let repo = open(&dir);
			repo.insert_pending(order("a", "owner-1")).await.unwrap();
			repo.insert_archive(&order("b", "owner-1").archived_as(OrderStatus::Completed))
				.await
				.unwrap();
			repo.set_routing_mode(RoutingMode::Ai).await.unwrap();
		}

		let repo = open(&dir);
		let pending = repo.fetch_pending("owner-1").await.unwrap();
		assert_eq!(pending, vec![order("a", "owner-1")]);
		let archive = repo
			.fetch_archive("owner-1", DateRange::unbounded())
			.await
			.unwrap();
		assert_eq!(archive[0].status, OrderStatus::Completed);
		assert_eq!(repo.routing_mode().await.unwrap(), RoutingMode::Ai);
	}

	#[tokio::test]
	async fn test_second_open_is_rejected() {
		let dir = TempDir::new().unwrap();
		let _first = open(&dir);
		assert!(matches!(
			FileRepository::open(dir.path(), 8),
			Err(RepositoryError::Configuration(_))
		));
	}

	#[tokio::test]
	async fn test_delete_and_notifications() {
		let dir = TempDir::new().unwrap();
		let repo = open(&dir);
		let (tx, mut rx) = mpsc::channel(8);
		repo.subscribe_changes(Collection::Pending, tx).await.unwrap();

		repo.insert_pending(order("a", "owner-1")).await.unwrap();
		repo.delete_order("a").await.unwrap();
		repo.delete_order("a").await.unwrap();

		assert_eq!(rx.recv().await.unwrap().kind, ChangeKind::Insert);
		let delete = rx.recv().await.unwrap();
		assert_eq!(delete.kind, ChangeKind::Delete);
		assert_eq!(delete.old.unwrap()["id"], "a");
		assert!(repo.fetch_pending("owner-1").await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_corrupt_file_is_skipped() {
		let dir = TempDir::new().unwrap();
		let repo = open(&dir);
		repo.insert_pending(order("a", "owner-1")).await.unwrap();
		std::fs::write(dir.path().join("pending_orders").join("bad.json"), b"{not json").unwrap();

		let pending = repo.fetch_pending("owner-1").await.unwrap();
		assert_eq!(pending.len(), 1);
	}

	#[test]
	fn test_file_stem_keeps_ids_apart() {
		assert_eq!(file_stem("3f2b-9c"), "3f2b-9c");
		assert_eq!(file_stem("a_b"), "a_5fb");
		assert_eq!(file_stem("a/b"), "a_2fb");
		assert_eq!(file_stem(".."), "_2e_2e");
		assert_ne!(file_stem("a:b"), file_stem("a_b"));
	}

	#[tokio::test]
	async fn test_similar_ids_do_not_share_a_file() {
		let dir = TempDir::new().unwrap();
		let repo = open(&dir);
		repo.insert_pending(order("a_b", "owner-1")).await.unwrap();
		repo.insert_pending(order("a/b", "owner-1")).await.unwrap();
		repo.insert_pending(order("a\\b", "owner-1")).await.unwrap();

		repo.delete_order("a/b").await.unwrap();

		let mut ids: Vec<_> = repo
			.fetch_pending("owner-1")
			.await
			.unwrap()
			.into_iter()
			.map(|o| o.id)
			.collect();
		ids.sort();
		assert_eq!(ids, vec!["a\\b".to_string(), "a_b".to_string()]);
	}

	#[test]
	fn test_schema_rejects_empty_path() {
		let config: toml::Value = toml::from_str("storage_path = \"  \"").unwrap();
		assert!(FileRepositorySchema.validate(&config).is_err());
	}
}
