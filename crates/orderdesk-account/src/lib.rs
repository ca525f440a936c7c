//! Account module for the order desk.
//!
//! Identifies the signed-in restaurant user. The desk never manages sessions
//! itself; it only asks the configured implementation who is signed in and
//! scopes every read to that user.

use async_trait::async_trait;
use orderdesk_types::{truncate_id, ConfigSchema, ImplementationRegistry, UserId};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod local;
}

/// Errors that can occur during account operations.
#[derive(Debug, Error)]
pub enum AccountError {
	/// The identity source could not be reached.
	#[error("Account source unavailable: {0}")]
	Unavailable(String),
	/// The identity source returned something that is not a usable user id.
	#[error("Invalid identity: {0}")]
	InvalidIdentity(String),
	/// Error that occurs when interacting with the account implementation.
	#[error("Implementation error: {0}")]
	Implementation(String),
}

/// Trait defining the interface for account implementations.
#[async_trait]
pub trait AccountInterface: Send + Sync {
	/// Returns the configuration schema for this account implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Returns the signed-in user, or `None` when nobody is signed in.
	async fn current_user(&self) -> Result<Option<UserId>, AccountError>;
}

/// Type alias for account factory functions.
pub type AccountFactory = fn(&toml::Value) -> Result<Box<dyn AccountInterface>, AccountError>;

/// Registry trait for account implementations.
pub trait AccountRegistry: ImplementationRegistry<Factory = AccountFactory> {}

/// Get all registered account implementations.
pub fn get_all_implementations() -> Vec<(&'static str, AccountFactory)> {
	use implementations::local;

	vec![(local::Registry::NAME, local::Registry::factory())]
}

/// Service that answers "who is signed in" for the desk.
pub struct AccountService {
	/// The underlying account implementation.
	implementation: Box<dyn AccountInterface>,
}

impl AccountService {
	/// Creates a new AccountService with the specified implementation.
	pub fn new(implementation: Box<dyn AccountInterface>) -> Self {
		Self { implementation }
	}

	/// Returns the signed-in user, if any.
	pub async fn current_user(&self) -> Result<Option<UserId>, AccountError> {
		let user = self.implementation.current_user().await?;
		match &user {
			Some(id) => tracing::debug!(user_id = %truncate_id(id), "Resolved current user"),
			None => tracing::debug!("No user signed in"),
		}
		Ok(user)
	}
}
