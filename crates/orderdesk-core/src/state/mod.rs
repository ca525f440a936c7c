//! State held by an open order view.

pub mod store;

pub use store::{ApplyOutcome, OrderStore};
