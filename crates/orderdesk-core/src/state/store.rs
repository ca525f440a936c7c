//! In-memory set of pending orders shown to operators.
//!
//! The store is fed from two sources: one snapshot at startup and the change
//! feed afterwards. Feed events that arrive before the snapshot are buffered
//! and replayed on top of it, so nothing the feed reported is lost to the
//! snapshot overwriting it.

use orderdesk_types::{ChangeEvent, Order};
use std::collections::HashSet;
use std::fmt;

/// What applying one change event did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
	/// A new order was appended.
	Inserted,
	/// An existing order was overwritten with different content.
	Replaced,
	/// An order was removed.
	Removed,
	/// The event matched the current state.
	Unchanged,
	/// The snapshot has not landed yet; the event was queued.
	Buffered,
	/// The event was dropped (late update for a retired order, or a
	/// non-pending order that was not in the store).
	Ignored,
}

impl fmt::Display for ApplyOutcome {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			ApplyOutcome::Inserted => "inserted",
			ApplyOutcome::Replaced => "replaced",
			ApplyOutcome::Removed => "removed",
			ApplyOutcome::Unchanged => "unchanged",
			ApplyOutcome::Buffered => "buffered",
			ApplyOutcome::Ignored => "ignored",
		};
		f.write_str(s)
	}
}

/// Ordered collection of pending orders keyed by id.
///
/// Insertion order is kept; [`sorted_for_display`](Self::sorted_for_display)
/// gives the operator ordering. Every `apply` is idempotent: applying the
/// same event twice leaves the store as applying it once.
#[derive(Debug)]
pub struct OrderStore {
	orders: Vec<Order>,
	/// `Some` until the snapshot lands.
	backlog: Option<Vec<ChangeEvent>>,
	/// Ids removed by a completed transition. Only an `Insert` brings one back.
	retired: HashSet<String>,
}

impl OrderStore {
	pub fn new() -> Self {
		Self {
			orders: Vec::new(),
			backlog: Some(Vec::new()),
			retired: HashSet::new(),
		}
	}

	/// True once the snapshot has been installed.
	pub fn is_loaded(&self) -> bool {
		self.backlog.is_none()
	}

	/// Number of events waiting for the snapshot.
	pub fn backlog_len(&self) -> usize {
		self.backlog.as_ref().map_or(0, Vec::len)
	}

	/// Applies one change event.
	pub fn apply(&mut self, event: ChangeEvent) -> ApplyOutcome {
		if let Some(backlog) = self.backlog.as_mut() {
			backlog.push(event);
			return ApplyOutcome::Buffered;
		}
		self.apply_loaded(event)
	}

	fn apply_loaded(&mut self, event: ChangeEvent) -> ApplyOutcome {
		match event {
			ChangeEvent::Insert(order) => {
				self.retired.remove(&order.id);
				self.upsert(order)
			},
			ChangeEvent::Update(order) => {
				if self.retired.contains(&order.id) {
					return ApplyOutcome::Ignored;
				}
				// An update for an unknown id is merged as an insert.
				self.upsert(order)
			},
			ChangeEvent::Delete { id } => {
				if self.remove(&id) {
					ApplyOutcome::Removed
				} else {
					ApplyOutcome::Unchanged
				}
			},
		}
	}

	fn upsert(&mut self, order: Order) -> ApplyOutcome {
		if !order.is_pending() {
			return if self.remove(&order.id) {
				ApplyOutcome::Removed
			} else {
				ApplyOutcome::Ignored
			};
		}

		match self.orders.iter_mut().find(|o| o.id == order.id) {
			Some(existing) if *existing == order => ApplyOutcome::Unchanged,
			Some(existing) => {
				*existing = order;
				ApplyOutcome::Replaced
			},
			None => {
				self.orders.push(order);
				ApplyOutcome::Inserted
			},
		}
	}

	fn remove(&mut self, id: &str) -> bool {
		let before = self.orders.len();
		self.orders.retain(|o| o.id != id);
		self.orders.len() != before
	}

	/// Installs the initial set and replays buffered events against it.
	///
	/// Returns the number of replayed events. Duplicate ids in `orders` keep
	/// their first occurrence.
	pub fn snapshot_replace(&mut self, orders: Vec<Order>) -> usize {
		let mut seen = HashSet::new();
		self.orders = orders
			.into_iter()
			.filter(|o| seen.insert(o.id.clone()))
			.collect();
		self.retired.retain(|id| !seen.contains(id));

		let backlog = self.backlog.take().unwrap_or_default();
		let replayed = backlog.len();
		for event in backlog {
			self.apply_loaded(event);
		}
		replayed
	}

	/// Removes an order after its transition completed and retires its id.
	pub fn remove_local(&mut self, id: &str) -> bool {
		self.retired.insert(id.to_string());
		self.remove(id)
	}

	pub fn get(&self, id: &str) -> Option<&Order> {
		self.orders.iter().find(|o| o.id == id)
	}

	pub fn contains(&self, id: &str) -> bool {
		self.get(id).is_some()
	}

	pub fn len(&self) -> usize {
		self.orders.len()
	}

	pub fn is_empty(&self) -> bool {
		self.orders.is_empty()
	}

	/// Orders in insertion order.
	pub fn orders(&self) -> &[Order] {
		&self.orders
	}

	/// Orders by `order_number`, highest first.
	pub fn sorted_for_display(&self) -> Vec<Order> {
		let mut orders = self.orders.clone();
		orders.sort_by(|a, b| b.order_number.cmp(&a.order_number));
		orders
	}
}

impl Default for OrderStore {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::order;
	use orderdesk_types::OrderStatus;

	fn loaded(orders: Vec<Order>) -> OrderStore {
		let mut store = OrderStore::new();
		store.snapshot_replace(orders);
		store
	}

	fn ids(store: &OrderStore) -> Vec<&str> {
		store.orders().iter().map(|o| o.id.as_str()).collect()
	}

	#[test]
	fn test_apply_is_idempotent() {
		let events = vec![
			ChangeEvent::Insert(order("a", 1)),
			ChangeEvent::Update(order("b", 2)),
			ChangeEvent::Delete { id: "a".into() },
		];
		for event in events {
			let mut once = loaded(vec![order("a", 1)]);
			once.apply(event.clone());
			let mut twice = loaded(vec![order("a", 1)]);
			twice.apply(event.clone());
			twice.apply(event);
			assert_eq!(once.orders(), twice.orders());
		}
	}

	#[test]
	fn test_merge_keeps_snapshot_entries() {
		let mut store = loaded(vec![order("a", 1), order("b", 2)]);
		let mut updated = order("a", 1);
		updated.product = "bandeja paisa".to_string();

		assert_eq!(
			store.apply(ChangeEvent::Update(updated.clone())),
			ApplyOutcome::Replaced
		);
		assert_eq!(store.orders(), &[updated.clone(), order("b", 2)]);

		assert_eq!(
			store.apply(ChangeEvent::Delete { id: "b".into() }),
			ApplyOutcome::Removed
		);
		assert_eq!(store.orders(), &[updated]);
	}

	#[test]
	fn test_events_before_snapshot_are_replayed() {
		let mut store = OrderStore::new();
		assert_eq!(
			store.apply(ChangeEvent::Insert(order("c", 3))),
			ApplyOutcome::Buffered
		);
		assert!(store.is_empty());
		assert_eq!(store.backlog_len(), 1);

		let replayed = store.snapshot_replace(vec![order("a", 1), order("b", 2)]);
		assert_eq!(replayed, 1);
		assert!(store.is_loaded());
		assert_eq!(ids(&store), vec!["a", "b", "c"]);
	}

	#[test]
	fn test_buffered_delete_removes_snapshot_entry() {
		let mut store = OrderStore::new();
		store.apply(ChangeEvent::Delete { id: "a".into() });
		store.snapshot_replace(vec![order("a", 1), order("b", 2)]);
		assert_eq!(ids(&store), vec!["b"]);
	}

	#[test]
	fn test_update_for_unknown_id_inserts() {
		let mut store = loaded(vec![]);
		assert_eq!(
			store.apply(ChangeEvent::Update(order("z", 9))),
			ApplyOutcome::Inserted
		);
		assert!(store.contains("z"));
	}

	#[test]
	fn test_retired_id_needs_fresh_insert() {
		let mut store = loaded(vec![order("a", 1)]);
		assert!(store.remove_local("a"));

		assert_eq!(
			store.apply(ChangeEvent::Update(order("a", 1))),
			ApplyOutcome::Ignored
		);
		assert!(!store.contains("a"));

		assert_eq!(
			store.apply(ChangeEvent::Insert(order("a", 1))),
			ApplyOutcome::Inserted
		);
		assert!(store.contains("a"));
	}

	#[test]
	fn test_double_delete_is_noop() {
		let mut store = loaded(vec![order("7", 7), order("8", 8)]);
		assert_eq!(
			store.apply(ChangeEvent::Delete { id: "7".into() }),
			ApplyOutcome::Removed
		);
		assert_eq!(
			store.apply(ChangeEvent::Delete { id: "7".into() }),
			ApplyOutcome::Unchanged
		);
		assert_eq!(ids(&store), vec!["8"]);
	}

	#[test]
	fn test_archived_status_leaves_pending_set() {
		let mut store = loaded(vec![order("a", 1)]);
		let mut done = order("a", 1);
		done.status = OrderStatus::Completed;
		assert_eq!(store.apply(ChangeEvent::Update(done)), ApplyOutcome::Removed);

		let mut cancelled = order("b", 2);
		cancelled.status = OrderStatus::Cancelled;
		assert_eq!(
			store.apply(ChangeEvent::Insert(cancelled)),
			ApplyOutcome::Ignored
		);
		assert!(store.is_empty());
	}

	#[test]
	fn test_sorted_for_display() {
		let store = loaded(vec![order("a", 5), order("b", 12), order("c", 1)]);
		let numbers: Vec<_> = store
			.sorted_for_display()
			.iter()
			.map(|o| o.order_number)
			.collect();
		assert_eq!(numbers, vec![12, 5, 1]);
	}

	#[test]
	fn test_snapshot_deduplicates_ids() {
		let store = loaded(vec![order("a", 1), order("a", 2)]);
		assert_eq!(store.len(), 1);
		assert_eq!(store.get("a").map(|o| o.order_number), Some(1));
	}
}
