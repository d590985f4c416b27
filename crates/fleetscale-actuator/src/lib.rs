//! fleetscale-actuator — the control loop's view of the orchestrator.
//!
//! [`Orchestrator`] has two operations: list the instances matching the
//! fleet's selector, and set the desired instance count. Apply is a single
//! idempotent request; convergence is never awaited and nothing is retried
//! here (the cron trigger owns retries).
//!
//! Implementations:
//! - [`KubernetesOrchestrator`]: the Kubernetes REST API over plain HTTP,
//!   normally through a `kubectl proxy` sidecar.
//! - [`InMemoryOrchestrator`]: a simulated fleet for tests and dry runs.

pub mod error;
pub mod kubernetes;
pub mod memory;

use std::collections::BTreeSet;
use std::future::Future;

use fleetscale_core::InstanceId;

pub use error::{ActuatorError, ActuatorResult};
pub use kubernetes::KubernetesOrchestrator;
pub use memory::InMemoryOrchestrator;

/// Fleet discovery and actuation.
pub trait Orchestrator: Send + Sync {
    /// Names of the instances currently matching the fleet selector.
    fn current_instances(
        &self,
    ) -> impl Future<Output = ActuatorResult<BTreeSet<InstanceId>>> + Send;

    /// Request exactly `count` instances. `count` must be positive.
    fn apply_instance_count(&self, count: u32) -> impl Future<Output = ActuatorResult<()>> + Send;
}
