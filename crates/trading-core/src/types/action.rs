//! Decision output of a strategy for one bar.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What the orchestrator should do after evaluating a bar.
///
/// `Close` is executed exactly like `Sell`; it marks exits taken for
/// structural reasons so the audit trail can tell them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
    Close,
    Hold,
    Noop,
}

impl Action {
    /// Whether executing the action requires an order.
    pub fn is_actionable(&self) -> bool {
        !matches!(self, Action::Hold | Action::Noop)
    }

    /// Whether the action exits an open position.
    pub fn is_exit(&self) -> bool {
        matches!(self, Action::Sell | Action::Close)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Buy => "BUY",
            Action::Sell => "SELL",
            Action::Close => "CLOSE",
            Action::Hold => "HOLD",
            Action::Noop => "NOOP",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of one rule the decision core looked at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleCheck {
    /// Rule key as used in the condition files (e.g. `golden_cross`)
    pub rule: String,
    /// Whether the rule was enabled
    pub enabled: bool,
    /// `None` when the rule was skipped (disabled or missing input)
    pub passed: Option<bool>,
    /// Optional human readable detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl RuleCheck {
    pub fn passed(rule: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            enabled: true,
            passed: Some(true),
            detail: None,
        }
    }

    pub fn failed(rule: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            enabled: true,
            passed: Some(false),
            detail: None,
        }
    }

    pub fn skipped(rule: impl Into<String>, enabled: bool) -> Self {
        Self {
            rule: rule.into(),
            enabled,
            passed: None,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// A decision together with the trail that led to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Action to execute
    pub action: Action,
    /// Short machine readable reason code (e.g. `STOP_LOSS`)
    pub reason: Option<String>,
    /// Human readable detail
    pub detail: Option<String>,
    /// Every rule looked at, in evaluation order
    pub checks: Vec<RuleCheck>,
    /// Extra values worth auditing (gap details, filter metadata)
    pub metadata: serde_json::Value,
}

impl Decision {
    /// Create a decision with no reason attached.
    pub fn new(action: Action) -> Self {
        Self {
            action,
            reason: None,
            detail: None,
            checks: Vec::new(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn hold() -> Self {
        Self::new(Action::Hold)
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_checks(mut self, checks: Vec<RuleCheck>) -> Self {
        self.checks = checks;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Reason code, or the action name when none was given.
    pub fn reason_or_action(&self) -> String {
        self.reason.clone().unwrap_or_else(|| self.action.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_classification() {
        assert!(Action::Buy.is_actionable());
        assert!(Action::Close.is_actionable());
        assert!(!Action::Hold.is_actionable());
        assert!(!Action::Noop.is_actionable());

        assert!(Action::Sell.is_exit());
        assert!(Action::Close.is_exit());
        assert!(!Action::Buy.is_exit());
    }

    #[test]
    fn test_decision_builder() {
        let d = Decision::new(Action::Sell)
            .with_reason("TAKE_PROFIT")
            .with_checks(vec![RuleCheck::passed("take_profit")]);
        assert_eq!(d.reason_or_action(), "TAKE_PROFIT");
        assert_eq!(d.checks.len(), 1);
        assert_eq!(Decision::hold().reason_or_action(), "HOLD");
    }

    #[test]
    fn test_action_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Action::Noop).unwrap(), "\"NOOP\"");
    }
}
