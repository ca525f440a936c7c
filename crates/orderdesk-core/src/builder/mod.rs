//! Builder for assembling a desk from configuration.
//!
//! Implementations are chosen by name from factory maps, so the binary decides
//! which backends are linked in and the configuration decides which one runs.

use crate::Desk;
use orderdesk_account::{AccountError, AccountInterface, AccountService};
use orderdesk_config::Config;
use orderdesk_feed::ChangeFeedSubscriber;
use orderdesk_storage::{RepositoryError, RepositoryInterface, RepositoryService};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while building a desk.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions for every pluggable component, keyed by implementation
/// name.
pub struct DeskFactories<SF, AF> {
	pub storage_factories: HashMap<String, SF>,
	pub account_factories: HashMap<String, AF>,
}

/// Builds a [`Desk`] from a [`Config`].
pub struct DeskBuilder {
	config: Config,
}

impl DeskBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Creates the primary storage and account implementations and wires
	/// them into a desk.
	///
	/// Only the primary implementation of each kind is constructed; a file
	/// backend locks its directory on creation.
	pub fn build<SF, AF>(self, factories: DeskFactories<SF, AF>) -> Result<Desk, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn RepositoryInterface>, RepositoryError>,
		AF: Fn(&toml::Value) -> Result<Box<dyn AccountInterface>, AccountError>,
	{
		let storage_name = &self.config.storage.primary;
		let storage_config = self.config.primary_storage().ok_or_else(|| {
			BuilderError::Config(format!(
				"Primary storage '{}' has no configuration",
				storage_name
			))
		})?;
		let storage_factory = factories
			.storage_factories
			.get(storage_name)
			.ok_or_else(|| {
				BuilderError::MissingComponent(format!("storage implementation '{}'", storage_name))
			})?;
		let backend = storage_factory(storage_config).map_err(|e| {
			tracing::error!(component = "storage", implementation = %storage_name, error = %e, "Failed to create storage implementation");
			BuilderError::Config(format!(
				"Failed to create storage implementation '{}': {}",
				storage_name, e
			))
		})?;
		tracing::info!(component = "storage", implementation = %storage_name, "Loaded");
		let repository = Arc::new(RepositoryService::new(backend));

		let account_name = &self.config.account.primary;
		let account_config = self.config.primary_account().ok_or_else(|| {
			BuilderError::Config(format!(
				"Primary account '{}' has no configuration",
				account_name
			))
		})?;
		let account_factory = factories
			.account_factories
			.get(account_name)
			.ok_or_else(|| {
				BuilderError::MissingComponent(format!("account implementation '{}'", account_name))
			})?;
		let account = account_factory(account_config).map_err(|e| {
			tracing::error!(component = "account", implementation = %account_name, error = %e, "Failed to create account implementation");
			BuilderError::Config(format!(
				"Failed to create account implementation '{}': {}",
				account_name, e
			))
		})?;
		tracing::info!(component = "account", implementation = %account_name, "Loaded");
		let account = Arc::new(AccountService::new(account));

		let subscriber =
			ChangeFeedSubscriber::new(repository.clone(), self.config.feed.channel_capacity);

		Ok(Desk::new(self.config, repository, account, subscriber))
	}
}
