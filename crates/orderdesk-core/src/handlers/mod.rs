//! Operator actions on an open desk.

pub mod routing;
pub mod transition;

pub use routing::{RoutingError, RoutingModeToggle};
pub use transition::{TransitionCoordinator, TransitionError, TransitionReport, TransitionStage};
