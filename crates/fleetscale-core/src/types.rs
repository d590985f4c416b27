//! Domain types for the fleetscale control loop.
//!
//! A check reads a batch of [`SampleRecord`]s, condenses them into one
//! [`Observation`], and resolves a [`Decision`]. Observations and decisions
//! are serialized into the history document, so their JSON field names are
//! part of the dashboard contract.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name of one running worker instance (a pod name in Kubernetes).
pub type InstanceId = String;

// ── Samples ────────────────────────────────────────────────────────

/// One completed unit of work, as reported by a worker.
///
/// The instance id comes from the sample's filename, never from the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRecord {
    pub instance_id: InstanceId,
    /// Seconds spent computing the request.
    pub service_time: f64,
    /// Seconds from request submission to completion (queueing included).
    pub response_time: f64,
}

impl SampleRecord {
    pub fn new(instance_id: impl Into<InstanceId>, service_time: f64, response_time: f64) -> Self {
        Self {
            instance_id: instance_id.into(),
            service_time,
            response_time,
        }
    }

    /// Time spent waiting before service started.
    ///
    /// Negative when a worker reports `response_time < service_time`; such
    /// samples are kept as-is.
    pub fn waiting_time(&self) -> f64 {
        self.response_time - self.service_time
    }
}

// ── Observation ────────────────────────────────────────────────────

/// Fleet-level load signal derived from one check's sample batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    /// Instances the orchestrator reported as part of the fleet.
    pub instance_count: u32,
    /// `avg_response_time / threshold`, 0 without samples.
    pub pressure: f64,
    /// Mean response time over every sample; `None` when there were none.
    #[serde(rename = "averageResponseTime", alias = "avgResponseTime")]
    pub avg_response_time: Option<f64>,
    pub threshold: f64,
    /// Worst per-instance `(response - service) / service` ratio.
    pub queue_length_dominant: f64,
    pub utilization: f64,
    /// Aggregate arrival rate in requests per second.
    pub workload: f64,
}

impl Observation {
    /// Whether any samples backed this observation.
    pub fn has_signal(&self) -> bool {
        self.avg_response_time.is_some()
    }
}

// ── Decision ───────────────────────────────────────────────────────

/// Outcome of the decision policy for one check.
///
/// Serialized as the human-readable `action` string dashboards display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Decision {
    /// Leave the fleet as it is.
    NoAction,
    /// Ask the orchestrator for exactly this many instances.
    SetInstanceCount(u32),
    /// The decision service could not be reached or abstained. Treated as
    /// `NoAction` for actuation but recorded distinctly.
    UnknownDeferred,
}

impl Decision {
    /// Instance count to request from the orchestrator, if any.
    pub fn target(&self) -> Option<u32> {
        match self {
            Decision::SetInstanceCount(n) => Some(*n),
            Decision::NoAction | Decision::UnknownDeferred => None,
        }
    }
}

const NO_ACTION: &str = "No Action";
const UNKNOWN_DEFERRED: &str = "Unknown (deferred)";
const SET_PREFIX: &str = "Set instance count to ";

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::NoAction => f.write_str(NO_ACTION),
            Decision::SetInstanceCount(n) => write!(f, "{SET_PREFIX}{n}"),
            Decision::UnknownDeferred => f.write_str(UNKNOWN_DEFERRED),
        }
    }
}

/// A history `action` string that does not describe a [`Decision`].
#[derive(Debug, Error)]
#[error("unrecognized action: {0:?}")]
pub struct DecisionParseError(pub String);

impl FromStr for Decision {
    type Err = DecisionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            NO_ACTION => Ok(Decision::NoAction),
            UNKNOWN_DEFERRED => Ok(Decision::UnknownDeferred),
            other => other
                .strip_prefix(SET_PREFIX)
                .and_then(|n| n.trim().parse::<u32>().ok())
                .map(Decision::SetInstanceCount)
                .ok_or_else(|| DecisionParseError(other.to_string())),
        }
    }
}

impl From<Decision> for String {
    fn from(decision: Decision) -> Self {
        decision.to_string()
    }
}

impl TryFrom<String> for Decision {
    type Error = DecisionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
