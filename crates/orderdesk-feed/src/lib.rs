//! Live change feed of the pending-orders collection.
//!
//! [`ChangeFeedSubscriber`] opens one backend subscription, decodes each raw
//! notification into a [`ChangeEvent`] and forwards it, in feed order, into a
//! bounded channel owned by the caller. The returned [`FeedSubscription`] is
//! the only way to end it: [`FeedSubscription::stop`] tears the subscription
//! down and waits for the forwarder, and dropping the handle aborts it.

use orderdesk_storage::RepositoryService;
use orderdesk_types::{truncate_id, ChangeEvent, ChangeNotification, Collection, SubscriptionHandle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

mod decode;

pub use decode::decode;

/// Errors that can occur while running the change feed.
#[derive(Debug, Error)]
pub enum FeedError {
	/// The backend refused or lost the subscription.
	#[error("Subscription error: {0}")]
	Subscription(String),
	/// `start` was called while a subscription is open.
	#[error("Already subscribed")]
	AlreadySubscribed,
	/// A notification could not be turned into a change event.
	#[error("Decode error: {0}")]
	Decode(String),
}

/// Observable state of the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedState {
	/// A subscription is open and forwarding events.
	Live,
	/// No subscription is open.
	Stopped,
	/// The backend ended the subscription. Nothing reconnects automatically.
	Disconnected(String),
}

/// Opens and owns the pending-orders subscription.
pub struct ChangeFeedSubscriber {
	repository: Arc<RepositoryService>,
	/// Capacity of the raw notification channel from the backend.
	buffer: usize,
	is_subscribed: Arc<AtomicBool>,
	state: Arc<watch::Sender<FeedState>>,
}

impl ChangeFeedSubscriber {
	pub fn new(repository: Arc<RepositoryService>, buffer: usize) -> Self {
		let (state, _) = watch::channel(FeedState::Stopped);
		Self {
			repository,
			buffer: buffer.max(1),
			is_subscribed: Arc::new(AtomicBool::new(false)),
			state: Arc::new(state),
		}
	}

	/// Returns a receiver tracking the feed state.
	pub fn state(&self) -> watch::Receiver<FeedState> {
		self.state.subscribe()
	}

	pub fn is_subscribed(&self) -> bool {
		self.is_subscribed.load(Ordering::SeqCst)
	}

	/// Opens the subscription and starts forwarding events into `sink`.
	///
	/// Only events for orders owned by `owner_scope` are forwarded. Deletes
	/// carry no owner and always pass.
	pub async fn start(
		&self,
		owner_scope: &str,
		sink: mpsc::Sender<ChangeEvent>,
	) -> Result<FeedSubscription, FeedError> {
		if self
			.is_subscribed
			.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
			.is_err()
		{
			return Err(FeedError::AlreadySubscribed);
		}

		let (raw_tx, raw_rx) = mpsc::channel(self.buffer);
		let handle = match self
			.repository
			.subscribe_changes(Collection::Pending, raw_tx)
			.await
		{
			Ok(handle) => handle,
			Err(e) => {
				self.is_subscribed.store(false, Ordering::SeqCst);
				return Err(FeedError::Subscription(e.to_string()));
			},
		};

		let (stop_tx, stop_rx) = mpsc::channel(1);
		self.state.send_replace(FeedState::Live);
		tracing::info!(owner_id = %truncate_id(owner_scope), handle = %handle, "Change feed live");

		let task = tokio::spawn(forward_loop(
			owner_scope.to_string(),
			raw_rx,
			sink,
			stop_rx,
			self.is_subscribed.clone(),
			self.state.clone(),
		));

		Ok(FeedSubscription {
			handle,
			repository: self.repository.clone(),
			stop_tx: Some(stop_tx),
			task: Some(task),
			is_subscribed: self.is_subscribed.clone(),
			state: self.state.clone(),
		})
	}
}

/// Decodes and forwards notifications until stopped or disconnected.
async fn forward_loop(
	owner_scope: String,
	mut raw_rx: mpsc::Receiver<ChangeNotification>,
	sink: mpsc::Sender<ChangeEvent>,
	mut stop_rx: mpsc::Receiver<()>,
	is_subscribed: Arc<AtomicBool>,
	state: Arc<watch::Sender<FeedState>>,
) {
	let final_state = loop {
		let notification = tokio::select! {
			biased;
			_ = stop_rx.recv() => break FeedState::Stopped,
			next = raw_rx.recv() => match next {
				Some(notification) => notification,
				None => {
					let reason = "change feed closed by backend".to_string();
					tracing::error!(error = %FeedError::Subscription(reason.clone()), "Change feed disconnected");
					break FeedState::Disconnected(reason);
				},
			},
		};

		let event = match decode(&notification) {
			Ok(event) => event,
			Err(e) => {
				tracing::warn!(kind = %notification.kind, error = %e, "Skipping undecodable change notification");
				continue;
			},
		};

		if let Some(owner) = event.owner_id() {
			if owner != owner_scope {
				tracing::trace!(order_id = %truncate_id(event.order_id()), "Dropping change for another owner");
				continue;
			}
		}

		tracing::debug!(kind = %event.kind(), order_id = %truncate_id(event.order_id()), "Forwarding change");
		tokio::select! {
			biased;
			_ = stop_rx.recv() => break FeedState::Stopped,
			sent = sink.send(event) => {
				if sent.is_err() {
					tracing::debug!("Change sink closed, ending feed");
					break FeedState::Stopped;
				}
			},
		}
	};

	is_subscribed.store(false, Ordering::SeqCst);
	state.send_replace(final_state);
}

/// Handle to an open change-feed subscription.
///
/// Dropping it without calling [`stop`](Self::stop) aborts the forwarder and
/// releases the backend subscription in the background.
pub struct FeedSubscription {
	handle: SubscriptionHandle,
	repository: Arc<RepositoryService>,
	stop_tx: Option<mpsc::Sender<()>>,
	task: Option<JoinHandle<()>>,
	is_subscribed: Arc<AtomicBool>,
	state: Arc<watch::Sender<FeedState>>,
}

impl FeedSubscription {
	pub fn handle(&self) -> SubscriptionHandle {
		self.handle
	}

	/// Tears the subscription down. No event is delivered after this returns.
	pub async fn stop(mut self) -> Result<(), FeedError> {
		if let Some(stop_tx) = self.stop_tx.take() {
			let _ = stop_tx.send(()).await;
		}
		if let Some(task) = self.task.take() {
			if let Err(e) = task.await {
				tracing::warn!(error = %e, "Change feed forwarder ended abnormally");
			}
		}

		self.is_subscribed.store(false, Ordering::SeqCst);
		self.state.send_replace(FeedState::Stopped);

		self.repository
			.unsubscribe(self.handle)
			.await
			.map_err(|e| FeedError::Subscription(e.to_string()))?;
		tracing::info!(handle = %self.handle, "Change feed stopped");
		Ok(())
	}
}

impl Drop for FeedSubscription {
	fn drop(&mut self) {
		let Some(task) = self.task.take() else {
			return;
		};
		task.abort();
		self.is_subscribed.store(false, Ordering::SeqCst);
		self.state.send_replace(FeedState::Stopped);

		if let Ok(runtime) = tokio::runtime::Handle::try_current() {
			let repository = self.repository.clone();
			let handle = self.handle;
			runtime.spawn(async move {
				if let Err(e) = repository.unsubscribe(handle).await {
					tracing::warn!(handle = %handle, error = %e, "Failed to release dropped subscription");
				}
			});
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use orderdesk_storage::implementations::memory::MemoryRepository;
	use orderdesk_types::{DeliveryType, Order, OrderStatus};
	use rust_decimal::Decimal;
	use std::time::Duration;

	fn order(id: &str, owner: &str) -> Order {
		Order {
			id: id.to_string(),
			order_number: 1,
			customer: "Eva".to_string(),
			product: "sushi".to_string(),
			delivery_type: DeliveryType::Pickup,
			payment_method: "card".to_string(),
			address: None,
			value: Decimal::new(1500, 2),
			owner_id: owner.to_string(),
			status: OrderStatus::Preparing,
			created_at: 1,
		}
	}

	fn setup() -> (MemoryRepository, Arc<RepositoryService>, ChangeFeedSubscriber) {
		let backend = MemoryRepository::new();
		let repository = Arc::new(RepositoryService::new(Box::new(backend.clone())));
		let subscriber = ChangeFeedSubscriber::new(repository.clone(), 16);
		(backend, repository, subscriber)
	}

	async fn next(rx: &mut mpsc::Receiver<ChangeEvent>) -> Option<ChangeEvent> {
		tokio::time::timeout(Duration::from_secs(1), rx.recv())
			.await
			.unwrap()
	}

	#[tokio::test]
	async fn test_events_arrive_in_order_and_scoped_to_owner() {
		let (_, repository, subscriber) = setup();
		let (tx, mut rx) = mpsc::channel(16);
		let subscription = subscriber.start("owner-1", tx).await.unwrap();

		repository.insert_pending(order("a", "owner-1")).await.unwrap();
		repository.insert_pending(order("x", "owner-2")).await.unwrap();
		let mut updated = order("a", "owner-1");
		updated.status = OrderStatus::Active;
		repository.update_pending(&updated).await.unwrap();
		repository.delete_order("a").await.unwrap();

		assert!(matches!(next(&mut rx).await, Some(ChangeEvent::Insert(o)) if o.id == "a"));
		assert!(
			matches!(next(&mut rx).await, Some(ChangeEvent::Update(o)) if o.status == OrderStatus::Active)
		);
		assert_eq!(
			next(&mut rx).await,
			Some(ChangeEvent::Delete { id: "a".to_string() })
		);

		subscription.stop().await.unwrap();
	}

	#[tokio::test]
	async fn test_second_start_is_rejected() {
		let (_, _, subscriber) = setup();
		let (tx, _rx) = mpsc::channel(4);
		let subscription = subscriber.start("owner-1", tx.clone()).await.unwrap();

		assert!(matches!(
			subscriber.start("owner-1", tx).await,
			Err(FeedError::AlreadySubscribed)
		));
		subscription.stop().await.unwrap();
		assert!(!subscriber.is_subscribed());
	}

	#[tokio::test]
	async fn test_no_events_after_stop() {
		let (_, repository, subscriber) = setup();
		let (tx, mut rx) = mpsc::channel(4);
		let state = subscriber.state();
		let subscription = subscriber.start("owner-1", tx).await.unwrap();
		assert_eq!(*state.borrow(), FeedState::Live);

		subscription.stop().await.unwrap();
		repository.insert_pending(order("late", "owner-1")).await.unwrap();

		// The forwarder held the only sender, so the channel is closed.
		assert_eq!(next(&mut rx).await, None);
		assert_eq!(*state.borrow(), FeedState::Stopped);
	}

	#[tokio::test]
	async fn test_backend_closure_marks_disconnected() {
		let (backend, _, subscriber) = setup();
		let (tx, mut rx) = mpsc::channel(4);
		let mut state = subscriber.state();
		let subscription = subscriber.start("owner-1", tx).await.unwrap();

		backend.disconnect_subscribers();
		assert_eq!(next(&mut rx).await, None);
		state
			.wait_for(|s| matches!(s, FeedState::Disconnected(_)))
			.await
			.unwrap();
		assert!(!subscriber.is_subscribed());

		subscription.stop().await.unwrap();
	}

	#[tokio::test]
	async fn test_drop_releases_subscription() {
		let (_, _, subscriber) = setup();
		let (tx, _rx) = mpsc::channel(4);
		let subscription = subscriber.start("owner-1", tx.clone()).await.unwrap();
		drop(subscription);

		assert!(!subscriber.is_subscribed());
		let again = subscriber.start("owner-1", tx).await.unwrap();
		again.stop().await.unwrap();
	}
}
