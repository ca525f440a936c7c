//! Common types for the order desk.
//!
//! Defines the order record, change-feed events, collection names, the routing
//! mode flag and the configuration validation framework shared by all crates.

/// Change-feed event types.
pub mod events;
/// Order record, statuses and archive date ranges.
pub mod order;
/// Registry trait for pluggable implementations.
pub mod registry;
/// Routing mode flag.
pub mod routing;
/// Collection names and subscription handles.
pub mod storage;
/// Formatting and time helpers.
pub mod utils;
/// Record and configuration validation.
pub mod validation;

pub use events::*;
pub use order::*;
pub use registry::*;
pub use routing::*;
pub use storage::*;
pub use utils::{current_timestamp, truncate_id};
pub use validation::*;
