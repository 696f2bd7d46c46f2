//! Kubernetes-standard status conditions
//!
//! Condition types, reasons and the set/find helpers used by the
//! ManagedCluster status. Setting a condition keeps `lastTransitionTime`
//! unless the status value actually changes.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// Condition status values
pub const CONDITION_TRUE: &str = "True";
pub const CONDITION_FALSE: &str = "False";
pub const CONDITION_UNKNOWN: &str = "Unknown";

// ManagedCluster condition types
pub const TEMPLATE_READY_CONDITION: &str = "TemplateReady";
pub const HELM_CHART_READY_CONDITION: &str = "HelmChartReady";
pub const HELM_RELEASE_READY_CONDITION: &str = "HelmReleaseReady";
pub const READY_CONDITION: &str = "Ready";

// Reasons
pub const SUCCEEDED_REASON: &str = "Succeeded";
pub const FAILED_REASON: &str = "Failed";
pub const PROGRESSING_REASON: &str = "Progressing";

/// A typed, timestamped status condition
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type (e.g. "Ready")
    #[serde(rename = "type")]
    pub type_: String,

    /// One of True, False, Unknown
    pub status: String,

    /// Machine-readable reason in CamelCase
    #[serde(default)]
    pub reason: String,

    /// Human-readable message
    #[serde(default)]
    pub message: String,

    /// Last time the status value changed
    pub last_transition_time: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Condition {
    pub fn new(type_: &str, status: &str, reason: &str, message: impl Into<String>) -> Self {
        Self {
            type_: type_.to_string(),
            status: status.to_string(),
            reason: reason.to_string(),
            message: message.into(),
            last_transition_time: Utc::now(),
            observed_generation: None,
        }
    }

    pub fn is_true(&self) -> bool {
        self.status == CONDITION_TRUE
    }
}

/// Insert or update a condition by type.
///
/// The transition time is only bumped when the status value changes.
pub fn set_condition(conditions: &mut Vec<Condition>, new: Condition) {
    match conditions.iter_mut().find(|c| c.type_ == new.type_) {
        Some(existing) => {
            if existing.status != new.status {
                existing.status = new.status;
                existing.last_transition_time = new.last_transition_time;
            }
            existing.reason = new.reason;
            existing.message = new.message;
            existing.observed_generation = new.observed_generation;
        }
        None => conditions.push(new),
    }
}

pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn set_condition_appends_new_type() {
        let mut conditions = Vec::new();
        set_condition(
            &mut conditions,
            Condition::new(READY_CONDITION, CONDITION_TRUE, SUCCEEDED_REASON, "ok"),
        );
        assert_eq!(conditions.len(), 1);
        assert!(find_condition(&conditions, READY_CONDITION).is_some_and(Condition::is_true));
    }

    #[test]
    fn set_condition_keeps_transition_time_when_status_unchanged() {
        let mut original = Condition::new(READY_CONDITION, CONDITION_FALSE, FAILED_REASON, "a");
        original.last_transition_time = Utc::now() - Duration::hours(1);
        let before = original.last_transition_time;
        let mut conditions = vec![original];

        set_condition(
            &mut conditions,
            Condition::new(READY_CONDITION, CONDITION_FALSE, FAILED_REASON, "b"),
        );
        assert_eq!(conditions[0].last_transition_time, before);
        assert_eq!(conditions[0].message, "b");

        set_condition(
            &mut conditions,
            Condition::new(READY_CONDITION, CONDITION_TRUE, SUCCEEDED_REASON, "c"),
        );
        assert!(conditions[0].last_transition_time > before);
        assert_eq!(conditions.len(), 1);
    }
}
