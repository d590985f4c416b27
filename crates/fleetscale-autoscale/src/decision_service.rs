//! Client for the external decision service.
//!
//! ```text
//! POST <endpoint>
//! {"observation": {"instanceCount": 2, "pressure": 1.7, ...}}
//!
//! 200 {"action": 4}     → Action(4)
//! 200 {"action": 0}     → Abstain
//! 200 {}                → Abstain
//! ```
//!
//! The observation is sent with the same field names the history document
//! uses, so the mean response time travels as `averageResponseTime`:
//!
//! ```text
//! {"instanceCount", "pressure", "averageResponseTime", "threshold",
//!  "queueLengthDominant", "utilization", "workload"}
//! ```
//!
//! `averageResponseTime` is `null` when the check had no samples. Any non-2xx
//! status or a body that is not JSON is an error.

use std::time::Duration;

use http::Method;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use fleetscale_core::http::{self as transport, HttpError};
use fleetscale_core::Observation;

#[derive(Debug, Error)]
pub enum DecisionError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("decision service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed decision response: {0}")]
    Malformed(String),
}

/// What the decision service asked for, parsed once from its reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionResponse {
    Action(u32),
    Abstain,
}

impl DecisionResponse {
    /// A positive integer `action` is a target; any other value, or no
    /// `action` at all, abstains.
    pub fn from_value(value: &Value) -> Self {
        value
            .get("action")
            .and_then(Value::as_u64)
            .filter(|&n| n > 0)
            .and_then(|n| u32::try_from(n).ok())
            .map_or(DecisionResponse::Abstain, DecisionResponse::Action)
    }
}

#[derive(Serialize)]
struct DecisionRequest<'a> {
    observation: &'a Observation,
}

#[derive(Debug, Clone)]
pub struct DecisionClient {
    endpoint: String,
    timeout: Duration,
}

impl DecisionClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Ask for a target instance count. Bounded by the client timeout.
    pub async fn query(&self, observation: &Observation) -> Result<DecisionResponse, DecisionError> {
        let body = serde_json::to_vec(&DecisionRequest { observation })
            .map_err(|e| DecisionError::Malformed(e.to_string()))?;

        let resp = transport::send(Method::POST, &self.endpoint, &[], Some(body), self.timeout).await?;
        if !resp.is_success() {
            return Err(DecisionError::Status {
                status: resp.status.as_u16(),
                body: resp.text(),
            });
        }

        let value: Value = resp
            .json()
            .map_err(|e| DecisionError::Malformed(e.to_string()))?;
        let response = DecisionResponse::from_value(&value);
        debug!(endpoint = %self.endpoint, ?response, "decision service replied");
        Ok(response)
    }
}
