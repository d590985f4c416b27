//! In-memory orchestrator — a simulated fleet.
//!
//! Applying a count resizes the fleet immediately: new instances are named
//! `<prefix>-<n>` with a monotonically increasing `n`, and scale-down
//! removes the highest-sorting names first. Every apply is recorded so
//! tests can assert on what the control loop asked for.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use fleetscale_core::InstanceId;

use crate::error::{ActuatorError, ActuatorResult};
use crate::Orchestrator;

#[derive(Debug, Default)]
struct FleetState {
    instances: BTreeSet<InstanceId>,
    applied: Vec<u32>,
    next_ordinal: u64,
    fail_queries: bool,
    fail_applies: bool,
}

/// Cheaply cloneable handle; clones share the same fleet.
#[derive(Debug, Clone)]
pub struct InMemoryOrchestrator {
    prefix: String,
    state: Arc<Mutex<FleetState>>,
}

impl InMemoryOrchestrator {
    /// Start with `initial` instances named `<prefix>-0 .. <prefix>-<initial-1>`.
    pub fn new(prefix: impl Into<String>, initial: u32) -> Self {
        let orchestrator = Self {
            prefix: prefix.into(),
            state: Arc::new(Mutex::new(FleetState::default())),
        };
        {
            let mut state = orchestrator.lock();
            for _ in 0..initial {
                let name = orchestrator.next_name(&mut state);
                state.instances.insert(name);
            }
        }
        orchestrator
    }

    /// Start with an explicit set of instance names.
    pub fn with_instances<I, S>(prefix: impl Into<String>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<InstanceId>,
    {
        let orchestrator = Self::new(prefix, 0);
        orchestrator.lock().instances = names.into_iter().map(Into::into).collect();
        orchestrator
    }

    /// Make subsequent `current_instances` calls fail.
    pub fn fail_queries(&self, fail: bool) {
        self.lock().fail_queries = fail;
    }

    /// Make subsequent `apply_instance_count` calls fail.
    pub fn fail_applies(&self, fail: bool) {
        self.lock().fail_applies = fail;
    }

    /// Every count passed to a successful or failed apply, in order.
    pub fn applied(&self) -> Vec<u32> {
        self.lock().applied.clone()
    }

    pub fn instances(&self) -> BTreeSet<InstanceId> {
        self.lock().instances.clone()
    }

    fn lock(&self) -> MutexGuard<'_, FleetState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn next_name(&self, state: &mut FleetState) -> InstanceId {
        let name = format!("{}-{}", self.prefix, state.next_ordinal);
        state.next_ordinal += 1;
        name
    }
}

impl Orchestrator for InMemoryOrchestrator {
    async fn current_instances(&self) -> ActuatorResult<BTreeSet<InstanceId>> {
        let state = self.lock();
        if state.fail_queries {
            return Err(ActuatorError::Unavailable("simulated query failure".into()));
        }
        Ok(state.instances.clone())
    }

    async fn apply_instance_count(&self, count: u32) -> ActuatorResult<()> {
        if count == 0 {
            return Err(ActuatorError::InvalidCount(count));
        }
        let mut state = self.lock();
        state.applied.push(count);
        if state.fail_applies {
            return Err(ActuatorError::Unavailable("simulated apply failure".into()));
        }

        let target = count as usize;
        while state.instances.len() > target {
            state.instances.pop_last();
        }
        while state.instances.len() < target {
            let name = self.next_name(&mut state);
            state.instances.insert(name);
        }
        debug!(count, "simulated fleet resized");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_with_initial_instances() {
        let fleet = InMemoryOrchestrator::new("w", 3);
        let names = fleet.current_instances().await.unwrap();
        assert_eq!(names.into_iter().collect::<Vec<_>>(), vec!["w-0", "w-1", "w-2"]);
    }

    #[tokio::test]
    async fn apply_resizes_and_records() {
        let fleet = InMemoryOrchestrator::new("w", 2);
        fleet.apply_instance_count(4).await.unwrap();
        assert_eq!(fleet.instances().len(), 4);
        assert!(fleet.instances().contains("w-3"));

        fleet.apply_instance_count(1).await.unwrap();
        assert_eq!(fleet.instances().len(), 1);
        assert_eq!(fleet.applied(), vec![4, 1]);
    }

    #[tokio::test]
    async fn new_instances_get_fresh_names() {
        let fleet = InMemoryOrchestrator::new("w", 2);
        fleet.apply_instance_count(1).await.unwrap();
        fleet.apply_instance_count(2).await.unwrap();
        // w-1 was removed; the replacement is w-2, not a reused name.
        assert_eq!(
            fleet.instances().into_iter().collect::<Vec<_>>(),
            vec!["w-0", "w-2"]
        );
    }

    #[tokio::test]
    async fn injected_failures() {
        let fleet = InMemoryOrchestrator::with_instances("w", ["a", "b"]);
        fleet.fail_queries(true);
        assert!(fleet.current_instances().await.is_err());

        fleet.fail_applies(true);
        assert!(fleet.apply_instance_count(3).await.is_err());
        assert_eq!(fleet.applied(), vec![3]);
        assert_eq!(fleet.instances().len(), 2);
    }
}
