//! One history entry.

use std::collections::BTreeSet;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use fleetscale_core::{Decision, InstanceId, Observation};

/// Timestamp format dashboards parse (`14.03.2025_10:21:07`).
pub const TIMESTAMP_FORMAT: &str = "%d.%m.%Y_%H:%M:%S";

/// A recorded check, as stored under `check_<n>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckEntry {
    /// Taken from the document key, not stored in the entry body.
    #[serde(skip)]
    pub check_number: u64,
    pub timestamp: String,
    #[serde(flatten)]
    pub observation: Observation,
    #[serde(rename = "action")]
    pub decision: Decision,
    /// Whether the orchestrator accepted the requested count. `true` when
    /// nothing had to be applied.
    #[serde(default = "applied_default")]
    pub applied: bool,
    pub active: Vec<InstanceId>,
    pub started: Vec<InstanceId>,
    pub shutdown: Vec<InstanceId>,
}

fn applied_default() -> bool {
    true
}

impl CheckEntry {
    pub fn active_set(&self) -> BTreeSet<InstanceId> {
        self.active.iter().cloned().collect()
    }
}

/// What the control loop hands the ledger; the ledger fills in the check
/// number and the membership diff.
#[derive(Debug, Clone)]
pub struct NewCheck {
    pub recorded_at: DateTime<Local>,
    pub observation: Observation,
    pub decision: Decision,
    pub applied: bool,
    pub active: BTreeSet<InstanceId>,
}

impl NewCheck {
    pub fn new(
        observation: Observation,
        decision: Decision,
        applied: bool,
        active: BTreeSet<InstanceId>,
    ) -> Self {
        Self {
            recorded_at: Local::now(),
            observation,
            decision,
            applied,
            active,
        }
    }

    pub fn at(mut self, recorded_at: DateTime<Local>) -> Self {
        self.recorded_at = recorded_at;
        self
    }

    /// Resolve against the previous check's active set.
    ///
    /// The first check has no baseline: everything active counts as started
    /// and the decision is forced to `NoAction`.
    pub(crate) fn into_entry(
        self,
        check_number: u64,
        previous_active: Option<&BTreeSet<InstanceId>>,
    ) -> CheckEntry {
        let (decision, started, shutdown) = if check_number == 1 {
            (Decision::NoAction, self.active.clone(), BTreeSet::new())
        } else {
            let empty = BTreeSet::new();
            let previous = previous_active.unwrap_or(&empty);
            (
                self.decision,
                self.active.difference(previous).cloned().collect(),
                previous.difference(&self.active).cloned().collect(),
            )
        };

        CheckEntry {
            check_number,
            timestamp: self.recorded_at.format(TIMESTAMP_FORMAT).to_string(),
            observation: self.observation,
            decision,
            applied: self.applied,
            active: self.active.into_iter().collect(),
            started: started.into_iter().collect(),
            shutdown: shutdown.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn observation() -> Observation {
        Observation {
            instance_count: 2,
            pressure: 2.0,
            avg_response_time: Some(1.2),
            threshold: 0.6,
            queue_length_dominant: 0.3,
            utilization: 0.4,
            workload: 0.5,
        }
    }

    fn set(names: &[&str]) -> BTreeSet<InstanceId> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn first_check_has_no_baseline() {
        let entry = NewCheck::new(
            observation(),
            Decision::SetInstanceCount(5),
            true,
            set(&["a", "b"]),
        )
        .into_entry(1, Some(&set(&["z"])));

        assert_eq!(entry.decision, Decision::NoAction);
        assert_eq!(entry.started, vec!["a", "b"]);
        assert!(entry.shutdown.is_empty());
    }

    #[test]
    fn later_checks_diff_against_previous() {
        let entry = NewCheck::new(
            observation(),
            Decision::SetInstanceCount(3),
            true,
            set(&["b", "c", "d"]),
        )
        .into_entry(4, Some(&set(&["a", "b"])));

        assert_eq!(entry.decision, Decision::SetInstanceCount(3));
        assert_eq!(entry.started, vec!["c", "d"]);
        assert_eq!(entry.shutdown, vec!["a"]);
    }

    #[test]
    fn missing_previous_entry_means_everything_started() {
        let entry = NewCheck::new(observation(), Decision::NoAction, true, set(&["a"]))
            .into_entry(7, None);
        assert_eq!(entry.started, vec!["a"]);
        assert!(entry.shutdown.is_empty());
    }

    #[test]
    fn serializes_with_dashboard_field_names() {
        let when = Local.with_ymd_and_hms(2025, 3, 14, 10, 21, 7).unwrap();
        let entry = NewCheck::new(
            observation(),
            Decision::SetInstanceCount(4),
            false,
            set(&["a"]),
        )
        .at(when)
        .into_entry(2, Some(&set(&["a"])));

        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["timestamp"], "14.03.2025_10:21:07");
        assert_eq!(value["action"], "Set instance count to 4");
        assert_eq!(value["averageResponseTime"], 1.2);
        assert_eq!(value["applied"], false);
        assert_eq!(value["active"], serde_json::json!(["a"]));
        assert!(value.get("check_number").is_none());
    }

    #[test]
    fn no_signal_serializes_as_null_average() {
        let mut obs = observation();
        obs.avg_response_time = None;
        let entry = NewCheck::new(obs, Decision::NoAction, true, BTreeSet::new()).into_entry(3, None);
        let value = serde_json::to_value(&entry).unwrap();
        assert!(value["averageResponseTime"].is_null());
    }
}
