//! Decision policy — observation in, [`Decision`] out.
//!
//! Never fails: a decision service that cannot be reached, times out, or
//! abstains resolves to [`Decision::UnknownDeferred`].

use tracing::{debug, info, warn};

use fleetscale_core::config::LocalPolicyConfig;
use fleetscale_core::{ConfigError, Decision, FleetscaleConfig, Observation, PolicyStrategy};

use crate::decision_service::{DecisionClient, DecisionResponse};

#[derive(Debug, Clone)]
pub enum DecisionPolicy {
    /// Fixed response-time buckets.
    Local(LocalPolicyConfig),
    /// Ask the external decision service.
    Delegated(DecisionClient),
}

impl DecisionPolicy {
    pub fn from_config(config: &FleetscaleConfig) -> Result<Self, ConfigError> {
        match config.policy.strategy {
            PolicyStrategy::Local => Ok(DecisionPolicy::Local(config.policy.local.clone())),
            PolicyStrategy::Delegated => {
                let endpoint = config
                    .policy
                    .delegated
                    .endpoint
                    .clone()
                    .filter(|e| !e.is_empty())
                    .ok_or_else(|| {
                        ConfigError::Invalid(
                            "policy.delegated.endpoint is required for the delegated strategy"
                                .to_string(),
                        )
                    })?;
                Ok(DecisionPolicy::Delegated(DecisionClient::new(
                    endpoint,
                    config.decision_timeout()?,
                )))
            }
        }
    }

    pub fn strategy(&self) -> PolicyStrategy {
        match self {
            DecisionPolicy::Local(_) => PolicyStrategy::Local,
            DecisionPolicy::Delegated(_) => PolicyStrategy::Delegated,
        }
    }

    /// Decide for check `check_number`.
    ///
    /// The first check and a check without samples never reach the
    /// configured strategy.
    pub async fn decide(&self, check_number: u64, observation: &Observation) -> Decision {
        if check_number <= 1 {
            debug!("first check, no baseline");
            return Decision::NoAction;
        }
        if !observation.has_signal() {
            let decision = reduce_by_one(observation.instance_count);
            debug!(current = observation.instance_count, %decision, "no samples");
            return decision;
        }

        match self {
            DecisionPolicy::Local(buckets) => threshold_decision(buckets, observation),
            DecisionPolicy::Delegated(client) => match client.query(observation).await {
                Ok(DecisionResponse::Action(n)) => Decision::SetInstanceCount(n),
                Ok(DecisionResponse::Abstain) => {
                    info!(endpoint = %client.endpoint(), "decision service abstained");
                    Decision::UnknownDeferred
                }
                Err(e) => {
                    warn!(
                        endpoint = %client.endpoint(),
                        error = %e,
                        "decision service unavailable, keeping current instance count"
                    );
                    Decision::UnknownDeferred
                }
            },
        }
    }
}

/// No signal: shrink by one, never below one.
pub fn reduce_by_one(current: u32) -> Decision {
    let target = current.saturating_sub(1).max(1);
    if target == current {
        Decision::NoAction
    } else {
        Decision::SetInstanceCount(target)
    }
}

/// Pick the bucket the average response time falls into.
pub fn threshold_decision(buckets: &LocalPolicyConfig, observation: &Observation) -> Decision {
    let avg = observation.avg_response_time.unwrap_or(0.0);
    let target = if avg > buckets.scale_up_above {
        buckets.scale_up_to
    } else if avg < buckets.scale_down_below {
        buckets.scale_down_to
    } else {
        buckets.baseline
    };
    Decision::SetInstanceCount(target)
}
