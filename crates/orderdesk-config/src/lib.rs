//! Configuration for the order desk.
//!
//! Configuration is read from TOML. String values may reference environment
//! variables as `${NAME}` or `${NAME:-default}`, and a file may pull other
//! files in with `include = ["storage.toml"]` as long as every top-level
//! section is defined exactly once across all of them.

mod loader;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Keep the message only; the default rendering dumps the whole input.
		ConfigError::Parse(err.message().to_string())
	}
}

/// Top-level configuration of an order desk.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Identity of this desk instance.
	pub desk: DeskConfig,
	/// Repository backend selection.
	pub storage: StorageConfig,
	/// Auth collaborator selection.
	pub account: AccountConfig,
	/// Change-feed delivery settings.
	#[serde(default)]
	pub feed: FeedConfig,
	/// HTTP API server.
	pub api: Option<ApiConfig>,
}

/// Identity of a desk instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeskConfig {
	/// Name used in logs to tell desks apart.
	pub id: String,
}

/// Repository backend selection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation backs the desk.
	pub primary: String,
	/// Implementation name to its raw configuration table.
	pub implementations: HashMap<String, toml::Value>,
}

/// Auth collaborator selection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccountConfig {
	/// Which implementation provides the current user.
	pub primary: String,
	/// Implementation name to its raw configuration table.
	pub implementations: HashMap<String, toml::Value>,
}

/// Change-feed delivery settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedConfig {
	/// Capacity of the bounded channel between the subscriber and the store.
	/// A full channel applies back-pressure to the backend forwarder.
	#[serde(default = "default_channel_capacity")]
	pub channel_capacity: usize,
}

impl Default for FeedConfig {
	fn default() -> Self {
		Self {
			channel_capacity: default_channel_capacity(),
		}
	}
}

fn default_channel_capacity() -> usize {
	256
}

/// Largest accepted `feed.channel_capacity`.
pub const MAX_CHANNEL_CAPACITY: usize = 65_536;

/// Configuration for the HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	/// Whether the API server is enabled.
	#[serde(default)]
	pub enabled: bool,
	/// Host address to bind the server to.
	#[serde(default = "default_api_host")]
	pub host: String,
	/// Port to bind the server to.
	#[serde(default = "default_api_port")]
	pub port: u16,
	/// Request timeout in seconds.
	#[serde(default = "default_api_timeout")]
	pub timeout_seconds: u64,
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	3000
}

fn default_api_timeout() -> u64 {
	30
}

static ENV_VAR_PATTERN: Lazy<Result<Regex, regex::Error>> =
	Lazy::new(|| Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}"));

/// Resolves environment variables in a string.
///
/// Replaces `${VAR_NAME}` with the value of `VAR_NAME` and supports defaults
/// with `${VAR_NAME:-default}`. Input is capped at 1MB.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = ENV_VAR_PATTERN
		.as_ref()
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut replacements = Vec::new();
	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let default_value = cap.get(2).map(|m| m.as_str());

		let value = match std::env::var(var_name.as_str()) {
			Ok(v) => v,
			Err(_) => match default_value {
				Some(default) => default.to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name.as_str()
					)));
				},
			},
		};

		replacements.push((full_match.start(), full_match.end(), value));
	}

	// Apply back to front so earlier offsets stay valid.
	let mut result = input.to_string();
	for (start, end, value) in replacements.iter().rev() {
		result.replace_range(start..end, value);
	}

	Ok(result)
}

impl Config {
	/// Loads configuration from a file, following `include` directives.
	pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
		let file_name = path
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path.display())))?;

		let mut loader = loader::ConfigLoader::new(base_dir);
		loader.load_config(file_name).await
	}

	/// Returns the raw table of the primary storage implementation.
	pub fn primary_storage(&self) -> Option<&toml::Value> {
		self.storage.implementations.get(&self.storage.primary)
	}

	/// Returns the raw table of the primary account implementation.
	pub fn primary_account(&self) -> Option<&toml::Value> {
		self.account.implementations.get(&self.account.primary)
	}

	/// Checks cross-field rules that serde cannot express.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.desk.id.trim().is_empty() {
			return Err(ConfigError::Validation("Desk ID cannot be empty".into()));
		}

		if self.storage.primary.is_empty() {
			return Err(ConfigError::Validation(
				"Storage primary implementation cannot be empty".into(),
			));
		}
		if self.primary_storage().is_none() {
			return Err(ConfigError::Validation(format!(
				"Primary storage '{}' not found in implementations",
				self.storage.primary
			)));
		}

		if self.account.primary.is_empty() {
			return Err(ConfigError::Validation(
				"Account primary implementation cannot be empty".into(),
			));
		}
		if self.primary_account().is_none() {
			return Err(ConfigError::Validation(format!(
				"Primary account '{}' not found in implementations",
				self.account.primary
			)));
		}

		if self.feed.channel_capacity == 0 {
			return Err(ConfigError::Validation(
				"feed.channel_capacity must be at least 1".into(),
			));
		}
		if self.feed.channel_capacity > MAX_CHANNEL_CAPACITY {
			return Err(ConfigError::Validation(format!(
				"feed.channel_capacity cannot exceed {}",
				MAX_CHANNEL_CAPACITY
			)));
		}

		if let Some(api) = &self.api {
			if api.enabled && api.port == 0 {
				return Err(ConfigError::Validation(
					"api.port must be set when the API is enabled".into(),
				));
			}
		}

		Ok(())
	}
}

/// Parses a TOML string, resolving environment variables and validating the
/// result.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
