//! Execution mode of an engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Paper (`TEST`) or real-money (`LIVE`) execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionMode {
    #[default]
    Test,
    Live,
}

impl ExecutionMode {
    pub fn is_live(&self) -> bool {
        matches!(self, ExecutionMode::Live)
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Test => write!(f, "TEST"),
            ExecutionMode::Live => write!(f, "LIVE"),
        }
    }
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "TEST" | "PAPER" => Ok(ExecutionMode::Test),
            "LIVE" => Ok(ExecutionMode::Live),
            _ => Err(format!("Invalid execution mode: {}", s)),
        }
    }
}
