//! Routing mode flag shared by every desk.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Global two-valued flag controlling how an external dispatcher routes
/// incoming orders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoutingMode {
	/// Orders are routed by the assistant.
	#[serde(rename = "AI")]
	Ai,
	/// Orders are routed by fixed rules.
	#[default]
	#[serde(rename = "BASIC")]
	Basic,
}

impl RoutingMode {
	/// Returns the other mode.
	pub fn toggled(&self) -> Self {
		match self {
			RoutingMode::Ai => RoutingMode::Basic,
			RoutingMode::Basic => RoutingMode::Ai,
		}
	}

	/// Returns the wire name of the mode.
	pub fn as_str(&self) -> &'static str {
		match self {
			RoutingMode::Ai => "AI",
			RoutingMode::Basic => "BASIC",
		}
	}
}

impl fmt::Display for RoutingMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for RoutingMode {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_uppercase().as_str() {
			"AI" => Ok(RoutingMode::Ai),
			"BASIC" => Ok(RoutingMode::Basic),
			other => Err(format!("unknown routing mode '{}'", other)),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_toggle_round_trips() {
		assert_eq!(RoutingMode::Ai.toggled(), RoutingMode::Basic);
		assert_eq!(RoutingMode::Basic.toggled().toggled(), RoutingMode::Basic);
	}

	#[test]
	fn test_parse_is_case_insensitive() {
		assert_eq!("ai".parse::<RoutingMode>().unwrap(), RoutingMode::Ai);
		assert_eq!("BASIC".parse::<RoutingMode>().unwrap(), RoutingMode::Basic);
		assert!("manual".parse::<RoutingMode>().is_err());
	}
}
