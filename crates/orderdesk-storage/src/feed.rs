//! In-process change notification fan-out shared by the bundled backends.
//!
//! Every write publishes one [`ChangeNotification`] to a broadcast channel.
//! Each subscription owns a forwarding task that filters the broadcast by
//! collection and pushes matching notifications into the subscriber's sink.

use orderdesk_types::{ChangeNotification, Collection, SubscriptionHandle};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// Default number of notifications buffered per subscriber before it lags.
pub const DEFAULT_BROADCAST_CAPACITY: usize = 1024;

/// Fans change notifications out to subscription sinks.
pub struct ChangeBroadcaster {
	sender: broadcast::Sender<ChangeNotification>,
	next_handle: AtomicU64,
	forwarders: Mutex<HashMap<u64, JoinHandle<()>>>,
}

impl ChangeBroadcaster {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity.max(1));
		Self {
			sender,
			next_handle: AtomicU64::new(1),
			forwarders: Mutex::new(HashMap::new()),
		}
	}

	/// Publishes a notification to every open subscription.
	///
	/// Callers publish while still holding their write lock so subscribers see
	/// notifications in write order.
	pub fn publish(&self, notification: ChangeNotification) {
		// No receivers is not an error: nobody is watching yet.
		let _ = self.sender.send(notification);
	}

	/// Opens a subscription forwarding `collection` notifications to `sink`.
	///
	/// The broadcast receiver is registered before this returns, so every
	/// write published afterwards reaches the sink.
	pub fn subscribe(
		&self,
		collection: Collection,
		sink: mpsc::Sender<ChangeNotification>,
	) -> SubscriptionHandle {
		let mut receiver = self.sender.subscribe();
		let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
		let handle = SubscriptionHandle(id);

		let forwarder = tokio::spawn(async move {
			loop {
				match receiver.recv().await {
					Ok(notification) => {
						if notification.collection != collection {
							continue;
						}
						if sink.send(notification).await.is_err() {
							tracing::debug!(handle = %handle, "Subscriber closed its sink");
							break;
						}
					},
					Err(broadcast::error::RecvError::Lagged(skipped)) => {
						// Missed notifications cannot be replayed; end the
						// subscription so the subscriber sees the disconnect.
						tracing::warn!(handle = %handle, skipped, "Subscriber lagged behind the change feed, dropping subscription");
						break;
					},
					Err(broadcast::error::RecvError::Closed) => break,
				}
			}
		});

		let mut forwarders = self.lock_forwarders();
		forwarders.retain(|_, task| !task.is_finished());
		forwarders.insert(id, forwarder);
		handle
	}

	/// Closes a subscription. The sink is dropped once the forwarder stops.
	pub fn unsubscribe(&self, handle: SubscriptionHandle) {
		let task = self.lock_forwarders().remove(&handle.0);
		if let Some(task) = task {
			task.abort();
		}
	}

	/// Drops every open subscription, as a lost backend connection would.
	pub fn disconnect_all(&self) {
		for (_, task) in self.lock_forwarders().drain() {
			task.abort();
		}
	}

	/// Number of subscriptions whose forwarder is still running.
	pub fn active_subscriptions(&self) -> usize {
		self.lock_forwarders()
			.values()
			.filter(|t| !t.is_finished())
			.count()
	}

	/// No holder leaves the map half-updated, so poisoning is ignored.
	fn lock_forwarders(&self) -> MutexGuard<'_, HashMap<u64, JoinHandle<()>>> {
		self.forwarders
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
	}
}

impl Default for ChangeBroadcaster {
	fn default() -> Self {
		Self::new(DEFAULT_BROADCAST_CAPACITY)
	}
}

impl Drop for ChangeBroadcaster {
	fn drop(&mut self) {
		self.disconnect_all();
	}
}
