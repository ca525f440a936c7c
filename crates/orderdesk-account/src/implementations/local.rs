//! Account implementation backed by the desk's own configuration.
//!
//! The signed-in user is whatever `user_id` the configuration names. An absent
//! or empty `user_id` means nobody is signed in, which lets a deployment leave
//! the desk locked with `user_id = "${ORDERDESK_USER:-}"`.

use crate::{AccountError, AccountInterface};
use async_trait::async_trait;
use orderdesk_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, UserId, ValidationError,
};

/// Account implementation that reports a fixed user.
pub struct LocalAccount {
	user_id: Option<UserId>,
}

impl LocalAccount {
	pub fn new(user_id: Option<UserId>) -> Self {
		Self {
			user_id: user_id.filter(|id| !id.trim().is_empty()),
		}
	}
}

#[async_trait]
impl AccountInterface for LocalAccount {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(LocalAccountSchema)
	}

	async fn current_user(&self) -> Result<Option<UserId>, AccountError> {
		Ok(self.user_id.clone())
	}
}

/// Configuration schema for LocalAccount.
pub struct LocalAccountSchema;

impl ConfigSchema for LocalAccountSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![Field::new("user_id", FieldType::String).with_validator(|value| {
				match value.as_str() {
					Some(id) if id.chars().any(char::is_whitespace) => {
						Err("user_id cannot contain whitespace".to_string())
					},
					_ => Ok(()),
				}
			})],
		);
		schema.validate(config)
	}
}

/// Factory function to create a local account from configuration.
///
/// Configuration parameters:
/// - `user_id`: id of the signed-in user (optional, empty means signed out)
pub fn create_account(config: &toml::Value) -> Result<Box<dyn AccountInterface>, AccountError> {
	LocalAccountSchema
		.validate(config)
		.map_err(|e| AccountError::InvalidIdentity(e.to_string()))?;

	let user_id = config
		.get("user_id")
		.and_then(|v| v.as_str())
		.map(str::to_string);

	Ok(Box::new(LocalAccount::new(user_id)))
}

/// Registry for the local account implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "local";
	type Factory = crate::AccountFactory;

	fn factory() -> Self::Factory {
		create_account
	}
}

impl crate::AccountRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	fn account(config: &str) -> Box<dyn AccountInterface> {
		let value: toml::Value = toml::from_str(config).unwrap();
		create_account(&value).unwrap()
	}

	#[tokio::test]
	async fn test_configured_user() {
		let account = account("user_id = \"owner-1\"");
		assert_eq!(
			account.current_user().await.unwrap(),
			Some("owner-1".to_string())
		);
	}

	#[tokio::test]
	async fn test_missing_or_empty_user_is_signed_out() {
		assert_eq!(account("").current_user().await.unwrap(), None);
		assert_eq!(account("user_id = \"\"").current_user().await.unwrap(), None);
	}

	#[test]
	fn test_rejects_whitespace_in_user_id() {
		let value: toml::Value = toml::from_str("user_id = \"owner 1\"").unwrap();
		assert!(matches!(
			create_account(&value),
			Err(AccountError::InvalidIdentity(_))
		));
	}

	#[test]
	fn test_rejects_non_string_user_id() {
		let value: toml::Value = toml::from_str("user_id = 5").unwrap();
		assert!(create_account(&value).is_err());
	}
}
