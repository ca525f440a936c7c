//! Decoding of raw backend notifications into typed change events.

use crate::FeedError;
use orderdesk_types::{ChangeEvent, ChangeKind, ChangeNotification, Collection, Order};

/// Decodes a pending-collection notification into a [`ChangeEvent`].
///
/// Inserts and updates must carry the full row in `new`. Deletes only need
/// the key in `old`; anything else there is ignored.
pub fn decode(notification: &ChangeNotification) -> Result<ChangeEvent, FeedError> {
	if notification.collection != Collection::Pending {
		return Err(FeedError::Decode(format!(
			"unexpected notification for {}",
			notification.collection.as_str()
		)));
	}

	match notification.kind {
		ChangeKind::Insert => decode_row(notification).map(ChangeEvent::Insert),
		ChangeKind::Update => decode_row(notification).map(ChangeEvent::Update),
		ChangeKind::Delete => {
			let id = notification
				.old
				.as_ref()
				.and_then(|old| old.get("id"))
				.and_then(id_from_value)
				.ok_or_else(|| FeedError::Decode("DELETE without old.id".into()))?;
			Ok(ChangeEvent::Delete { id })
		},
	}
}

fn decode_row(notification: &ChangeNotification) -> Result<Order, FeedError> {
	let row = notification
		.new
		.as_ref()
		.ok_or_else(|| FeedError::Decode(format!("{} without new row", notification.kind)))?;
	serde_json::from_value(row.clone())
		.map_err(|e| FeedError::Decode(format!("{} row: {}", notification.kind, e)))
}

fn id_from_value(value: &serde_json::Value) -> Option<String> {
	match value {
		serde_json::Value::String(id) if !id.is_empty() => Some(id.clone()),
		serde_json::Value::Number(n) => Some(n.to_string()),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use orderdesk_types::{DeliveryType, OrderStatus};
	use rust_decimal::Decimal;
	use serde_json::json;

	fn row() -> serde_json::Value {
		serde_json::to_value(Order {
			id: "o-1".to_string(),
			order_number: 4,
			customer: "Nico".to_string(),
			product: "pizza".to_string(),
			delivery_type: DeliveryType::Pickup,
			payment_method: "cash".to_string(),
			address: None,
			value: Decimal::new(2000, 2),
			owner_id: "owner-1".to_string(),
			status: OrderStatus::Preparing,
			created_at: 1,
		})
		.unwrap()
	}

	#[test]
	fn test_decode_insert_and_update() {
		let insert = decode(&ChangeNotification::insert(Collection::Pending, row())).unwrap();
		assert!(matches!(insert, ChangeEvent::Insert(ref o) if o.id == "o-1"));

		let update =
			decode(&ChangeNotification::update(Collection::Pending, row(), None)).unwrap();
		assert_eq!(update.kind(), ChangeKind::Update);
	}

	#[test]
	fn test_decode_delete_reads_old_id() {
		let event = decode(&ChangeNotification::delete(Collection::Pending, "o-9")).unwrap();
		assert_eq!(
			event,
			ChangeEvent::Delete {
				id: "o-9".to_string()
			}
		);

		let numeric = ChangeNotification {
			collection: Collection::Pending,
			kind: ChangeKind::Delete,
			new: None,
			old: Some(json!({ "id": 42 })),
		};
		assert_eq!(decode(&numeric).unwrap().order_id(), "42");
	}

	#[test]
	fn test_decode_rejects_malformed_notifications() {
		let missing_old = ChangeNotification {
			collection: Collection::Pending,
			kind: ChangeKind::Delete,
			new: None,
			old: None,
		};
		assert!(matches!(decode(&missing_old), Err(FeedError::Decode(_))));

		let bad_row = ChangeNotification::insert(Collection::Pending, json!({ "id": "x" }));
		assert!(matches!(decode(&bad_row), Err(FeedError::Decode(_))));

		let archive = ChangeNotification::insert(Collection::Archive, row());
		assert!(matches!(decode(&archive), Err(FeedError::Decode(_))));
	}
}
