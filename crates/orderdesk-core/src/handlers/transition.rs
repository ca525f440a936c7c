//! Confirm and cancel.
//!
//! A transition moves an order from the pending collection to the archive in
//! two independent writes: archive insert, then pending delete. The store is
//! only touched after both succeeded. A failed delete leaves the order in both
//! collections; this is reported, never retried or rolled back.

use crate::state::OrderStore;
use orderdesk_storage::RepositoryService;
use orderdesk_types::{truncate_id, Order, TransitionKind};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::instrument;

/// Steps of a transition, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionStage {
	Lookup,
	ArchiveWrite,
	PendingDelete,
	LocalRemove,
}

impl fmt::Display for TransitionStage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			TransitionStage::Lookup => "lookup",
			TransitionStage::ArchiveWrite => "archive_write",
			TransitionStage::PendingDelete => "pending_delete",
			TransitionStage::LocalRemove => "local_remove",
		};
		f.write_str(s)
	}
}

/// Errors that can occur during a transition.
#[derive(Debug, Error)]
pub enum TransitionError {
	/// The order is not in the store.
	#[error("Order not found: {0}")]
	NotFound(String),
	/// Another transition for this order has not finished.
	#[error("Transition already in progress for order {0}")]
	InFlight(String),
	/// The archive write failed. Nothing changed.
	#[error("Failed to archive order {id}: {reason}")]
	ArchiveWrite { id: String, reason: String },
	/// The archive write succeeded but the pending delete failed. Storage
	/// holds the order in both collections.
	#[error("Order {id} archived but not removed from pending: {reason}")]
	PendingDelete { id: String, reason: String },
	/// The task running the transition was cancelled before it reported back.
	/// Only happens while the runtime shuts down.
	#[error("Transition for order {id} was interrupted: {reason}")]
	Interrupted { id: String, reason: String },
}

impl TransitionError {
	/// The stage the transition stopped at, if known.
	pub fn stage(&self) -> Option<TransitionStage> {
		match self {
			TransitionError::NotFound(_) | TransitionError::InFlight(_) => {
				Some(TransitionStage::Lookup)
			},
			TransitionError::ArchiveWrite { .. } => Some(TransitionStage::ArchiveWrite),
			TransitionError::PendingDelete { .. } => Some(TransitionStage::PendingDelete),
			TransitionError::Interrupted { .. } => None,
		}
	}
}

/// Outcome of a completed transition.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionReport {
	pub order_id: String,
	pub kind: TransitionKind,
	/// The record written to the archive.
	pub archived: Order,
}

/// Runs confirm and cancel against the repository and the store.
#[derive(Clone)]
pub struct TransitionCoordinator {
	repository: Arc<RepositoryService>,
	store: Arc<RwLock<OrderStore>>,
	in_flight: Arc<Mutex<HashSet<String>>>,
}

impl TransitionCoordinator {
	pub fn new(repository: Arc<RepositoryService>, store: Arc<RwLock<OrderStore>>) -> Self {
		Self {
			repository,
			store,
			in_flight: Arc::new(Mutex::new(HashSet::new())),
		}
	}

	/// Archives the order as `completed` and removes it from the pending set.
	pub async fn confirm(&self, id: &str) -> Result<TransitionReport, TransitionError> {
		self.spawn_run(id, TransitionKind::Confirm).await
	}

	/// Archives the order as `cancelled` and removes it from the pending set.
	pub async fn cancel(&self, id: &str) -> Result<TransitionReport, TransitionError> {
		self.spawn_run(id, TransitionKind::Cancel).await
	}

	/// True while a transition for `id` is running.
	pub fn is_in_flight(&self, id: &str) -> bool {
		self.in_flight
			.lock()
			.map(|set| set.contains(id))
			.unwrap_or(false)
	}

	/// Runs the transition on its own task. Dropping the caller's future
	/// detaches it; the writes still run to completion.
	async fn spawn_run(
		&self,
		id: &str,
		kind: TransitionKind,
	) -> Result<TransitionReport, TransitionError> {
		let coordinator = self.clone();
		let task_id = id.to_string();
		let task = tokio::spawn(async move { coordinator.run(&task_id, kind).await });

		match task.await {
			Ok(result) => result,
			Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
			Err(e) => {
				tracing::error!(order_id = %truncate_id(id), error = %e, "Transition task cancelled");
				Err(TransitionError::Interrupted {
					id: id.to_string(),
					reason: e.to_string(),
				})
			},
		}
	}

	#[instrument(skip_all, fields(order_id = %truncate_id(id), kind = %kind))]
	async fn run(&self, id: &str, kind: TransitionKind) -> Result<TransitionReport, TransitionError> {
		// Claim the id before the lookup so a caller racing a finished
		// transition sees NotFound.
		let _guard = InFlightGuard::acquire(&self.in_flight, id)?;

		let order = self
			.store
			.read()
			.await
			.get(id)
			.cloned()
			.ok_or_else(|| TransitionError::NotFound(id.to_string()))?;

		let archived = order.archived_as(kind.target_status());
		if let Err(e) = self.repository.insert_archive(&archived).await {
			tracing::error!(stage = %TransitionStage::ArchiveWrite, error = %e, "Transition failed, order unchanged");
			return Err(TransitionError::ArchiveWrite {
				id: id.to_string(),
				reason: e.to_string(),
			});
		}

		if let Err(e) = self.repository.delete_order(id).await {
			tracing::error!(
				stage = %TransitionStage::PendingDelete,
				error = %e,
				"Order archived but still pending; storage holds it in both collections"
			);
			return Err(TransitionError::PendingDelete {
				id: id.to_string(),
				reason: e.to_string(),
			});
		}

		self.store.write().await.remove_local(id);
		tracing::info!(status = %archived.status, "Order resolved");

		Ok(TransitionReport {
			order_id: id.to_string(),
			kind,
			archived,
		})
	}
}

/// Marks an id as in flight until dropped.
struct InFlightGuard {
	set: Arc<Mutex<HashSet<String>>>,
	id: String,
}

impl InFlightGuard {
	fn acquire(set: &Arc<Mutex<HashSet<String>>>, id: &str) -> Result<Self, TransitionError> {
		let mut ids = set.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
		if !ids.insert(id.to_string()) {
			return Err(TransitionError::InFlight(id.to_string()));
		}
		Ok(Self {
			set: set.clone(),
			id: id.to_string(),
		})
	}
}

impl Drop for InFlightGuard {
	fn drop(&mut self) {
		let mut ids = self.set.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
		ids.remove(&self.id);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{faulty_repository, order, Faults, OWNER};
	use orderdesk_storage::implementations::memory::MemoryRepository;
	use orderdesk_storage::RepositoryInterface;
	use orderdesk_types::{DateRange, OrderStatus};
	use std::sync::atomic::Ordering;
	use std::time::Duration;

	async fn setup(
		orders: Vec<Order>,
	) -> (
		TransitionCoordinator,
		Arc<RwLock<OrderStore>>,
		MemoryRepository,
		Arc<Faults>,
	) {
		let (repository, backend, faults) = faulty_repository();
		for order in &orders {
			backend.insert_pending(order.clone()).await.unwrap();
		}
		let mut store = OrderStore::new();
		store.snapshot_replace(orders);
		let store = Arc::new(RwLock::new(store));
		let coordinator = TransitionCoordinator::new(repository, store.clone());
		(coordinator, store, backend, faults)
	}

	#[tokio::test]
	async fn test_confirm_moves_order_to_archive() {
		let (coordinator, store, backend, _) = setup(vec![order("1", 1)]).await;

		let report = coordinator.confirm("1").await.unwrap();
		assert_eq!(report.kind, TransitionKind::Confirm);
		assert_eq!(report.archived.status, OrderStatus::Completed);

		assert!(store.read().await.is_empty());
		assert!(backend.fetch_pending(OWNER).await.unwrap().is_empty());
		let archive = backend
			.fetch_archive(OWNER, DateRange::unbounded())
			.await
			.unwrap();
		assert_eq!(archive.len(), 1);
		assert_eq!(archive[0].status, OrderStatus::Completed);
	}

	#[tokio::test]
	async fn test_cancel_archives_as_cancelled() {
		let (coordinator, _, backend, _) = setup(vec![order("1", 1)]).await;
		coordinator.cancel("1").await.unwrap();

		let archive = backend
			.fetch_archive(OWNER, DateRange::unbounded())
			.await
			.unwrap();
		assert_eq!(archive[0].status, OrderStatus::Cancelled);
	}

	#[tokio::test]
	async fn test_archive_failure_changes_nothing() {
		let (coordinator, store, backend, faults) = setup(vec![order("1", 1)]).await;
		faults.fail_archive.store(true, Ordering::SeqCst);

		let err = coordinator.cancel("1").await.unwrap_err();
		assert!(matches!(err, TransitionError::ArchiveWrite { .. }));
		assert_eq!(err.stage(), Some(TransitionStage::ArchiveWrite));

		assert_eq!(faults.delete_calls.load(Ordering::SeqCst), 0);
		assert_eq!(store.read().await.orders(), &[order("1", 1)]);
		assert_eq!(backend.fetch_pending(OWNER).await.unwrap().len(), 1);
		assert!(!coordinator.is_in_flight("1"));
	}

	#[tokio::test]
	async fn test_delete_failure_leaves_order_in_both_collections() {
		let (coordinator, store, backend, faults) = setup(vec![order("1", 1)]).await;
		faults.fail_delete.store(true, Ordering::SeqCst);

		let err = coordinator.confirm("1").await.unwrap_err();
		assert!(matches!(err, TransitionError::PendingDelete { .. }));

		assert!(store.read().await.contains("1"));
		assert_eq!(backend.fetch_pending(OWNER).await.unwrap().len(), 1);
		assert_eq!(
			backend
				.fetch_archive(OWNER, DateRange::unbounded())
				.await
				.unwrap()
				.len(),
			1
		);
		assert_eq!(faults.delete_calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn test_unknown_order_is_not_found() {
		let (coordinator, _, _, faults) = setup(vec![]).await;
		assert!(matches!(
			coordinator.confirm("missing").await,
			Err(TransitionError::NotFound(_))
		));
		assert_eq!(faults.archive_calls.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn test_concurrent_transition_is_rejected() {
		let (coordinator, store, _, faults) = setup(vec![order("1", 1)]).await;

		let gate = faults.archive_gate.write().await;
		let first = tokio::spawn({
			let coordinator = coordinator.clone();
			async move { coordinator.confirm("1").await }
		});
		faults.archive_entered.notified().await;

		assert!(coordinator.is_in_flight("1"));
		assert!(matches!(
			coordinator.cancel("1").await,
			Err(TransitionError::InFlight(_))
		));

		drop(gate);
		first.await.unwrap().unwrap();
		assert!(!store.read().await.contains("1"));
		assert_eq!(faults.archive_calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn test_dropped_caller_does_not_stop_transition() {
		let (coordinator, store, backend, faults) = setup(vec![order("1", 1)]).await;

		let gate = faults.archive_gate.write().await;
		tokio::select! {
			_ = coordinator.confirm("1") => panic!("confirm finished while the archive write was held"),
			_ = faults.archive_entered.notified() => {},
		}
		// The caller's future is gone; the transition must still finish.
		drop(gate);

		let finished = async {
			while coordinator.is_in_flight("1") {
				tokio::time::sleep(Duration::from_millis(5)).await;
			}
		};
		tokio::time::timeout(Duration::from_secs(1), finished)
			.await
			.unwrap();

		assert!(!store.read().await.contains("1"));
		assert!(backend.fetch_pending(OWNER).await.unwrap().is_empty());
		assert_eq!(
			backend
				.fetch_archive(OWNER, DateRange::unbounded())
				.await
				.unwrap()
				.len(),
			1
		);
	}

	#[tokio::test]
	async fn test_in_flight_id_is_claimed_before_lookup() {
		let (coordinator, _, _, faults) = setup(vec![]).await;
		let _claimed = InFlightGuard::acquire(&coordinator.in_flight, "1").unwrap();

		assert!(matches!(
			coordinator.confirm("1").await,
			Err(TransitionError::InFlight(_))
		));
		assert_eq!(faults.archive_calls.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn test_transition_after_success_is_not_found() {
		let (coordinator, _, _, _) = setup(vec![order("1", 1)]).await;
		coordinator.confirm("1").await.unwrap();
		assert!(matches!(
			coordinator.confirm("1").await,
			Err(TransitionError::NotFound(_))
		));
	}
}
