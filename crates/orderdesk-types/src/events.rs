//! Change-feed event types.
//!
//! Backends publish loosely typed [`ChangeNotification`]s describing row-level
//! changes to a collection. The feed subscriber decodes them into the typed
//! [`ChangeEvent`] applied by the order store.

use crate::{Collection, Order};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A typed change to the pending collection.
///
/// Events carry no sequence number; their order is the order in which the
/// feed delivered them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
	/// A new order appeared in the pending collection.
	Insert(Order),
	/// An existing pending order was rewritten.
	Update(Order),
	/// A pending order was removed.
	Delete { id: String },
}

impl ChangeEvent {
	/// Returns the id of the order this event refers to.
	pub fn order_id(&self) -> &str {
		match self {
			ChangeEvent::Insert(order) | ChangeEvent::Update(order) => &order.id,
			ChangeEvent::Delete { id } => id,
		}
	}

	/// Returns the owner of the order, when the event carries a full record.
	pub fn owner_id(&self) -> Option<&str> {
		match self {
			ChangeEvent::Insert(order) | ChangeEvent::Update(order) => Some(&order.owner_id),
			ChangeEvent::Delete { .. } => None,
		}
	}

	/// Returns the kind of change this event represents.
	pub fn kind(&self) -> ChangeKind {
		match self {
			ChangeEvent::Insert(_) => ChangeKind::Insert,
			ChangeEvent::Update(_) => ChangeKind::Update,
			ChangeEvent::Delete { .. } => ChangeKind::Delete,
		}
	}
}

/// Kind of row-level change reported by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
	Insert,
	Update,
	Delete,
}

impl fmt::Display for ChangeKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ChangeKind::Insert => f.write_str("INSERT"),
			ChangeKind::Update => f.write_str("UPDATE"),
			ChangeKind::Delete => f.write_str("DELETE"),
		}
	}
}

/// Raw notification emitted by a backend for a row-level change.
///
/// `new` holds the row after the change (inserts and updates), `old` the row
/// before it (updates and deletes). Backends may send only the key columns in
/// `old`, so decoders must not expect a full order there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeNotification {
	/// Collection the change happened in.
	pub collection: Collection,
	/// Kind of change.
	pub kind: ChangeKind,
	/// Row after the change.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub new: Option<serde_json::Value>,
	/// Row before the change.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub old: Option<serde_json::Value>,
}

impl ChangeNotification {
	/// Builds an insert notification carrying the full new row.
	pub fn insert(collection: Collection, new: serde_json::Value) -> Self {
		Self {
			collection,
			kind: ChangeKind::Insert,
			new: Some(new),
			old: None,
		}
	}

	/// Builds an update notification.
	pub fn update(
		collection: Collection,
		new: serde_json::Value,
		old: Option<serde_json::Value>,
	) -> Self {
		Self {
			collection,
			kind: ChangeKind::Update,
			new: Some(new),
			old,
		}
	}

	/// Builds a delete notification carrying only the key of the removed row.
	pub fn delete(collection: Collection, id: &str) -> Self {
		Self {
			collection,
			kind: ChangeKind::Delete,
			new: None,
			old: Some(serde_json::json!({ "id": id })),
		}
	}
}
