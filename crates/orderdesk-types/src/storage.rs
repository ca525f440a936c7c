//! Storage-related types for the order desk.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Collections an order can live in.
///
/// Replaces string literals with strongly typed variants when addressing
/// storage and the change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Collection {
	/// Orders awaiting confirmation (`preparing` / `active`).
	#[serde(rename = "pending_orders")]
	Pending,
	/// Resolved orders (`completed` / `cancelled`).
	#[serde(rename = "archived_orders")]
	Archive,
}

impl Collection {
	/// Returns the string representation of the collection.
	pub fn as_str(&self) -> &'static str {
		match self {
			Collection::Pending => "pending_orders",
			Collection::Archive => "archived_orders",
		}
	}

	/// Returns an iterator over all collections.
	pub fn all() -> impl Iterator<Item = Self> {
		[Self::Pending, Self::Archive].into_iter()
	}
}

impl FromStr for Collection {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"pending_orders" => Ok(Self::Pending),
			"archived_orders" => Ok(Self::Archive),
			_ => Err(()),
		}
	}
}

impl From<Collection> for &'static str {
	fn from(collection: Collection) -> Self {
		collection.as_str()
	}
}

/// Opaque handle for a live change-feed subscription held by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u64);

impl std::fmt::Display for SubscriptionHandle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "sub-{}", self.0)
	}
}
