//! Order types for the order desk.
//!
//! This module defines the restaurant order record shared by every component,
//! together with its lifecycle status and the predicates that split orders
//! into the pending and archive collections.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ValidationError;

/// Identifier of the account that owns an order.
pub type UserId = String;

/// A restaurant order as stored in either the pending or the archive collection.
///
/// The `id` is opaque and assigned by storage. Everything else is set by the
/// intake process and copied verbatim when the order is archived, apart from
/// `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
	/// Unique identifier assigned by storage.
	pub id: String,
	/// Human facing order number, used as the display and sort key.
	pub order_number: u64,
	/// Name of the customer who placed the order.
	pub customer: String,
	/// Free-form description of what was ordered.
	pub product: String,
	/// Whether the order is picked up or delivered.
	pub delivery_type: DeliveryType,
	/// How the customer pays (cash, card, transfer, ...).
	pub payment_method: String,
	/// Delivery address. Required iff `delivery_type` is `Delivery`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub address: Option<String>,
	/// Order total in the restaurant's currency.
	pub value: Decimal,
	/// Account that owns this order.
	pub owner_id: UserId,
	/// Current lifecycle status.
	pub status: OrderStatus,
	/// Unix timestamp (seconds) when the order was created.
	pub created_at: u64,
}

impl Order {
	/// Checks the field-level rules of an order.
	///
	/// An order must carry an address when it is delivered, must not carry one
	/// when it is picked up, and its value must not be negative.
	pub fn validate(&self) -> Result<(), ValidationError> {
		match (self.delivery_type, self.address.as_deref()) {
			(DeliveryType::Delivery, None) => {
				return Err(ValidationError::MissingField("address".to_string()));
			},
			(DeliveryType::Delivery, Some(address)) if address.trim().is_empty() => {
				return Err(ValidationError::InvalidValue {
					field: "address".to_string(),
					message: "delivery orders need a non-empty address".to_string(),
				});
			},
			(DeliveryType::Pickup, Some(_)) => {
				return Err(ValidationError::InvalidValue {
					field: "address".to_string(),
					message: "pickup orders must not carry an address".to_string(),
				});
			},
			_ => {},
		}

		if self.value < Decimal::ZERO {
			return Err(ValidationError::InvalidValue {
				field: "value".to_string(),
				message: format!("order value {} is negative", self.value),
			});
		}

		Ok(())
	}

	/// Returns a copy of this order carrying the given resolved status.
	///
	/// This is the record written to the archive collection by a transition.
	pub fn archived_as(&self, status: OrderStatus) -> Order {
		Order {
			status,
			..self.clone()
		}
	}

	/// Returns true if the order currently belongs to the pending collection.
	pub fn is_pending(&self) -> bool {
		self.status.is_pending()
	}
}

/// How an order reaches the customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryType {
	/// The customer collects the order at the restaurant.
	Pickup,
	/// The order is delivered to `Order::address`.
	Delivery,
}

/// Lifecycle status of an order.
///
/// `Preparing` and `Active` orders live in the pending collection;
/// `Completed` and `Cancelled` orders live in the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
	/// Accepted and being prepared by the kitchen.
	Preparing,
	/// Ready and waiting for pickup or delivery confirmation.
	Active,
	/// Confirmed by an operator.
	Completed,
	/// Cancelled by an operator.
	Cancelled,
}

impl OrderStatus {
	/// The pending predicate: `preparing` or `active`.
	pub fn is_pending(&self) -> bool {
		matches!(self, OrderStatus::Preparing | OrderStatus::Active)
	}

	/// The archive predicate: `completed` or `cancelled`.
	pub fn is_archived(&self) -> bool {
		!self.is_pending()
	}

	/// Returns the wire name of this status.
	pub fn as_str(&self) -> &'static str {
		match self {
			OrderStatus::Preparing => "preparing",
			OrderStatus::Active => "active",
			OrderStatus::Completed => "completed",
			OrderStatus::Cancelled => "cancelled",
		}
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// The two operator transitions that move an order into the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
	/// Archive the order as `completed`.
	Confirm,
	/// Archive the order as `cancelled`.
	Cancel,
}

impl TransitionKind {
	/// Status the archived copy is written with.
	pub fn target_status(&self) -> OrderStatus {
		match self {
			TransitionKind::Confirm => OrderStatus::Completed,
			TransitionKind::Cancel => OrderStatus::Cancelled,
		}
	}
}

impl fmt::Display for TransitionKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TransitionKind::Confirm => f.write_str("confirm"),
			TransitionKind::Cancel => f.write_str("cancel"),
		}
	}
}

/// Inclusive bounds on `created_at` used when querying the archive.
///
/// A missing bound is open on that side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
	/// Earliest `created_at` (Unix seconds) to include.
	pub from: Option<u64>,
	/// Latest `created_at` (Unix seconds) to include.
	pub to: Option<u64>,
}

impl DateRange {
	/// A range with no bounds.
	pub fn unbounded() -> Self {
		Self::default()
	}

	/// Returns true if the timestamp falls inside the range.
	pub fn contains(&self, timestamp: u64) -> bool {
		self.from.is_none_or(|from| timestamp >= from) && self.to.is_none_or(|to| timestamp <= to)
	}
}
