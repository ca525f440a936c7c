//! Core of the order desk.
//!
//! Keeps the operator's list of pending orders in sync with the repository
//! (one snapshot, then the change feed) and moves orders into the archive on
//! confirm or cancel. [`Desk`] owns the long-lived services built from
//! configuration; [`OrderView`] is one open view over a signed-in owner's
//! orders.

use orderdesk_account::AccountService;
use orderdesk_config::Config;
use orderdesk_feed::ChangeFeedSubscriber;
use orderdesk_storage::RepositoryService;
use std::sync::Arc;

pub mod builder;
pub mod handlers;
pub mod snapshot;
pub mod state;
pub mod view;

#[cfg(test)]
mod testing;

pub use builder::{BuilderError, DeskBuilder, DeskFactories};
pub use handlers::{
	RoutingError, RoutingModeToggle, TransitionCoordinator, TransitionError, TransitionReport,
	TransitionStage,
};
pub use snapshot::{SnapshotLoader, SyncError};
pub use state::{ApplyOutcome, OrderStore};
pub use view::{OrderView, ViewError};

/// Services shared by every view opened on this desk.
pub struct Desk {
	config: Config,
	repository: Arc<RepositoryService>,
	account: Arc<AccountService>,
	subscriber: ChangeFeedSubscriber,
	routing: RoutingModeToggle,
}

impl Desk {
	pub fn new(
		config: Config,
		repository: Arc<RepositoryService>,
		account: Arc<AccountService>,
		subscriber: ChangeFeedSubscriber,
	) -> Self {
		Self {
			routing: RoutingModeToggle::new(repository.clone()),
			config,
			repository,
			account,
			subscriber,
		}
	}

	/// Opens a view for the signed-in user.
	///
	/// A desk holds at most one open view because it owns a single feed
	/// subscriber; opening a second fails with `AlreadySubscribed`.
	pub async fn open_view(&self) -> Result<OrderView, ViewError> {
		tracing::info!(desk_id = %self.config.desk.id, "Opening order view");
		OrderView::open(
			&self.account,
			self.repository.clone(),
			&self.subscriber,
			self.config.feed.channel_capacity,
		)
		.await
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn repository(&self) -> &Arc<RepositoryService> {
		&self.repository
	}

	pub fn routing(&self) -> &RoutingModeToggle {
		&self.routing
	}

	pub fn subscriber(&self) -> &ChangeFeedSubscriber {
		&self.subscriber
	}
}
