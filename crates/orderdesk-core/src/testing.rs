//! Test doubles shared by the core test modules.

use async_trait::async_trait;
use mockall::mock;
use orderdesk_account::{AccountError, AccountInterface};
use orderdesk_storage::implementations::memory::MemoryRepository;
use orderdesk_storage::{RepositoryError, RepositoryInterface, RepositoryService};
use orderdesk_types::{
	ChangeNotification, Collection, ConfigSchema, DateRange, DeliveryType, Order, OrderStatus,
	RoutingMode, SubscriptionHandle, UserId,
};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify, RwLock};

pub const OWNER: &str = "owner-1";

pub fn order(id: &str, order_number: u64) -> Order {
	Order {
		id: id.to_string(),
		order_number,
		customer: "Camila".to_string(),
		product: "ajiaco".to_string(),
		delivery_type: DeliveryType::Pickup,
		payment_method: "cash".to_string(),
		address: None,
		value: Decimal::new(1800, 2),
		owner_id: OWNER.to_string(),
		status: OrderStatus::Active,
		created_at: 1_700_000_000 + order_number,
	}
}

mock! {
	pub Account {}

	#[async_trait]
	impl AccountInterface for Account {
		fn config_schema(&self) -> Box<dyn ConfigSchema>;
		async fn current_user(&self) -> Result<Option<UserId>, AccountError>;
	}
}

/// Failure switches and call counters for [`FaultyRepository`].
#[derive(Default)]
pub struct Faults {
	pub fail_fetch: AtomicBool,
	pub fail_archive: AtomicBool,
	pub fail_delete: AtomicBool,
	pub archive_calls: AtomicUsize,
	pub delete_calls: AtomicUsize,
	/// Archive writes wait on a read guard; hold the write guard to stall them.
	pub archive_gate: RwLock<()>,
	/// Signalled when an archive write starts.
	pub archive_entered: Notify,
}

/// Memory repository with injectable failures.
pub struct FaultyRepository {
	inner: MemoryRepository,
	faults: Arc<Faults>,
}

impl FaultyRepository {
	pub fn new(inner: MemoryRepository, faults: Arc<Faults>) -> Self {
		Self { inner, faults }
	}
}

#[async_trait]
impl RepositoryInterface for FaultyRepository {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		self.inner.config_schema()
	}

	async fn fetch_pending(&self, owner_id: &str) -> Result<Vec<Order>, RepositoryError> {
		if self.faults.fail_fetch.load(Ordering::SeqCst) {
			return Err(RepositoryError::Backend("connection refused".into()));
		}
		self.inner.fetch_pending(owner_id).await
	}

	async fn fetch_archive(
		&self,
		owner_id: &str,
		range: DateRange,
	) -> Result<Vec<Order>, RepositoryError> {
		self.inner.fetch_archive(owner_id, range).await
	}

	async fn insert_pending(&self, order: Order) -> Result<Order, RepositoryError> {
		self.inner.insert_pending(order).await
	}

	async fn update_pending(&self, order: &Order) -> Result<(), RepositoryError> {
		self.inner.update_pending(order).await
	}

	async fn insert_archive(&self, order: &Order) -> Result<(), RepositoryError> {
		self.faults.archive_calls.fetch_add(1, Ordering::SeqCst);
		self.faults.archive_entered.notify_one();
		let _gate = self.faults.archive_gate.read().await;
		if self.faults.fail_archive.load(Ordering::SeqCst) {
			return Err(RepositoryError::Backend("archive unavailable".into()));
		}
		self.inner.insert_archive(order).await
	}

	async fn delete_order(&self, id: &str) -> Result<(), RepositoryError> {
		self.faults.delete_calls.fetch_add(1, Ordering::SeqCst);
		if self.faults.fail_delete.load(Ordering::SeqCst) {
			return Err(RepositoryError::Backend("delete timed out".into()));
		}
		self.inner.delete_order(id).await
	}

	async fn subscribe_changes(
		&self,
		collection: Collection,
		sink: mpsc::Sender<ChangeNotification>,
	) -> Result<SubscriptionHandle, RepositoryError> {
		self.inner.subscribe_changes(collection, sink).await
	}

	async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), RepositoryError> {
		self.inner.unsubscribe(handle).await
	}

	async fn routing_mode(&self) -> Result<RoutingMode, RepositoryError> {
		self.inner.routing_mode().await
	}

	async fn set_routing_mode(&self, mode: RoutingMode) -> Result<(), RepositoryError> {
		self.inner.set_routing_mode(mode).await
	}
}

/// Repository service over a faulty memory backend, plus handles to both.
pub fn faulty_repository() -> (Arc<RepositoryService>, MemoryRepository, Arc<Faults>) {
	let backend = MemoryRepository::new();
	let faults = Arc::new(Faults::default());
	let service = RepositoryService::new(Box::new(FaultyRepository::new(
		backend.clone(),
		faults.clone(),
	)));
	(Arc::new(service), backend, faults)
}
