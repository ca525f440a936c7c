//! Main entry point for the order desk service.
//!
//! Loads configuration, builds the desk with the linked-in storage and
//! account implementations, opens the signed-in owner's order view and, when
//! enabled, serves it over HTTP until interrupted.

use clap::Parser;
use orderdesk_account::{AccountError, AccountInterface};
use orderdesk_config::Config;
use orderdesk_core::{Desk, DeskBuilder, DeskFactories};
use orderdesk_storage::{RepositoryError, RepositoryInterface};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

mod apis;
mod server;

use orderdesk_account::implementations::local::create_account as create_local_account;
use orderdesk_storage::implementations::file::create_repository as create_file_repository;
use orderdesk_storage::implementations::memory::create_repository as create_memory_repository;

type StorageFactory = fn(&toml::Value) -> Result<Box<dyn RepositoryInterface>, RepositoryError>;
type AccountFactory = fn(&toml::Value) -> Result<Box<dyn AccountInterface>, AccountError>;

/// Command-line arguments for the order desk service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	let config = Config::from_file(&args.config).await?;
	tracing::info!("Loaded configuration [{}]", config.desk.id);

	let desk = Arc::new(build_desk(config.clone())?);
	let view = Arc::new(desk.open_view().await?);
	tracing::info!(
		owner_id = %view.owner_id(),
		pending = view.pending_orders().await.len(),
		"Order view open"
	);

	match config.api.filter(|api| api.enabled) {
		Some(api_config) => {
			let state = server::AppState {
				desk: Arc::clone(&desk),
				view: Arc::clone(&view),
			};
			server::start_server(api_config, state, shutdown_signal()).await?;
			tracing::info!("API server finished");
		},
		None => {
			tracing::info!("API disabled, running until interrupted");
			shutdown_signal().await;
		},
	}

	match Arc::try_unwrap(view) {
		Ok(view) => view.close().await?,
		Err(_) => tracing::warn!("Order view still shared at shutdown; dropping it"),
	}

	tracing::info!("Stopped order desk");
	Ok(())
}

async fn shutdown_signal() {
	if let Err(e) = tokio::signal::ctrl_c().await {
		tracing::error!(error = %e, "Failed to listen for shutdown signal");
	}
}

/// Macro to create a factory HashMap with the appropriate type aliases
macro_rules! create_factory_map {
    ($interface:path, $error:path, $( $name:literal => $factory:expr ),* $(,)?) => {{
        let mut factories = std::collections::HashMap::new();
        $(
            factories.insert(
                $name.to_string(),
                $factory as fn(&toml::Value) -> Result<Box<dyn $interface>, $error>
            );
        )*
        factories
    }};
}

/// Repository backends linked into this binary.
pub(crate) fn storage_factories() -> HashMap<String, StorageFactory> {
	create_factory_map!(
		orderdesk_storage::RepositoryInterface,
		orderdesk_storage::RepositoryError,
		"file" => create_file_repository,
		"memory" => create_memory_repository,
	)
}

/// Account providers linked into this binary.
pub(crate) fn account_factories() -> HashMap<String, AccountFactory> {
	create_factory_map!(
		orderdesk_account::AccountInterface,
		orderdesk_account::AccountError,
		"local" => create_local_account,
	)
}

/// Builds the desk from the primary implementations named in `config`.
fn build_desk(config: Config) -> Result<Desk, Box<dyn std::error::Error>> {
	let factories = DeskFactories {
		storage_factories: storage_factories(),
		account_factories: account_factories(),
	};
	Ok(DeskBuilder::new(config).build(factories)?)
}
