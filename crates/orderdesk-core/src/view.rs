//! The pending-orders view of one signed-in owner.
//!
//! Opening a view starts the change feed before fetching the snapshot, so no
//! change made between the two is missed: early events are buffered by the
//! store and replayed once the snapshot lands. Closing stops the feed before
//! the store goes away.

use crate::handlers::{TransitionCoordinator, TransitionError, TransitionReport};
use crate::snapshot::{SnapshotLoader, SyncError};
use crate::state::OrderStore;
use orderdesk_account::AccountService;
use orderdesk_feed::{ChangeFeedSubscriber, FeedError, FeedState, FeedSubscription};
use orderdesk_storage::RepositoryService;
use orderdesk_types::{truncate_id, ChangeEvent, DateRange, Order, UserId};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;

/// Errors that can occur while opening or using a view.
#[derive(Debug, Error)]
pub enum ViewError {
	/// Nobody is signed in.
	#[error("Not signed in")]
	Unauthenticated,
	#[error("Account error: {0}")]
	Account(String),
	#[error(transparent)]
	Feed(#[from] FeedError),
	#[error(transparent)]
	Sync(#[from] SyncError),
	#[error(transparent)]
	Transition(#[from] TransitionError),
	#[error("Repository error: {0}")]
	Repository(String),
}

/// An open view over the owner's pending orders.
pub struct OrderView {
	owner_id: UserId,
	repository: Arc<RepositoryService>,
	store: Arc<RwLock<OrderStore>>,
	coordinator: TransitionCoordinator,
	subscription: Option<FeedSubscription>,
	apply_task: Option<JoinHandle<()>>,
	feed_state: watch::Receiver<FeedState>,
}

impl OrderView {
	/// Opens the view for the signed-in user.
	///
	/// On a failed snapshot the feed is stopped again and the error returned;
	/// no partially loaded view is handed out.
	pub async fn open(
		account: &AccountService,
		repository: Arc<RepositoryService>,
		subscriber: &ChangeFeedSubscriber,
		channel_capacity: usize,
	) -> Result<Self, ViewError> {
		let owner_id = account
			.current_user()
			.await
			.map_err(|e| ViewError::Account(e.to_string()))?
			.ok_or(ViewError::Unauthenticated)?;

		let store = Arc::new(RwLock::new(OrderStore::new()));
		let (event_tx, event_rx) = mpsc::channel(channel_capacity.max(1));
		let subscription = subscriber.start(&owner_id, event_tx).await?;
		let apply_task = tokio::spawn(apply_events(event_rx, store.clone()));

		let orders = match SnapshotLoader::new(repository.clone()).load(&owner_id).await {
			Ok(orders) => orders,
			Err(e) => {
				tracing::error!(owner_id = %truncate_id(&owner_id), error = %e, "Failed to open order view");
				if let Err(stop_err) = subscription.stop().await {
					tracing::warn!(error = %stop_err, "Failed to stop change feed");
				}
				apply_task.abort();
				return Err(e.into());
			},
		};

		let replayed = store.write().await.snapshot_replace(orders);
		if replayed > 0 {
			tracing::debug!(replayed, "Replayed changes received during snapshot");
		}

		Ok(Self {
			coordinator: TransitionCoordinator::new(repository.clone(), store.clone()),
			owner_id,
			repository,
			store,
			subscription: Some(subscription),
			apply_task: Some(apply_task),
			feed_state: subscriber.state(),
		})
	}

	pub fn owner_id(&self) -> &str {
		&self.owner_id
	}

	/// Pending orders, highest `order_number` first.
	pub async fn pending_orders(&self) -> Vec<Order> {
		self.store.read().await.sorted_for_display()
	}

	pub async fn get(&self, id: &str) -> Option<Order> {
		self.store.read().await.get(id).cloned()
	}

	pub async fn confirm(&self, id: &str) -> Result<TransitionReport, TransitionError> {
		self.coordinator.confirm(id).await
	}

	pub async fn cancel(&self, id: &str) -> Result<TransitionReport, TransitionError> {
		self.coordinator.cancel(id).await
	}

	/// Archived orders of this owner created inside `range`, newest first.
	pub async fn archive(&self, range: DateRange) -> Result<Vec<Order>, ViewError> {
		let mut orders = self
			.repository
			.fetch_archive(&self.owner_id, range)
			.await
			.map_err(|e| ViewError::Repository(e.to_string()))?;
		orders.sort_by(|a, b| {
			b.created_at
				.cmp(&a.created_at)
				.then(b.order_number.cmp(&a.order_number))
		});
		Ok(orders)
	}

	pub fn feed_state(&self) -> FeedState {
		self.feed_state.borrow().clone()
	}

	/// Stops the feed, drains the events already delivered and closes the view.
	pub async fn close(mut self) -> Result<(), ViewError> {
		if let Some(subscription) = self.subscription.take() {
			subscription.stop().await?;
		}
		// The feed held the only sender, so the apply task ends on its own.
		if let Some(task) = self.apply_task.take() {
			if let Err(e) = task.await {
				tracing::warn!(error = %e, "Apply task ended abnormally");
			}
		}
		tracing::info!(owner_id = %truncate_id(&self.owner_id), "Order view closed");
		Ok(())
	}
}

impl Drop for OrderView {
	fn drop(&mut self) {
		// The subscription's own drop releases the feed.
		if let Some(task) = self.apply_task.take() {
			task.abort();
		}
	}
}

/// Applies feed events to the store, one at a time, in delivery order.
async fn apply_events(mut events: mpsc::Receiver<ChangeEvent>, store: Arc<RwLock<OrderStore>>) {
	while let Some(event) = events.recv().await {
		let kind = event.kind();
		let order_id = truncate_id(event.order_id());
		let outcome = store.write().await.apply(event);
		tracing::debug!(%kind, %order_id, %outcome, "Applied change");
	}
}
