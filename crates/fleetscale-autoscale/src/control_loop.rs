//! ControlLoop — sequences one check end to end.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use fleetscale_actuator::Orchestrator;
use fleetscale_core::{FleetscaleConfig, InstanceId, Observation};
use fleetscale_ledger::{CheckEntry, HistoryLedger, NewCheck};
use fleetscale_metrics::{FleetMetrics, MetricsAggregator, render_prometheus, write_textfile};
use fleetscale_samples::{ArchiveReport, Archiver, SampleBatch, SampleStore};

use crate::error::{ControlError, ControlResult};
use crate::policy::DecisionPolicy;

/// Outcome of one completed check.
#[derive(Debug, Clone)]
pub struct CheckReport {
    pub entry: CheckEntry,
    pub metrics: FleetMetrics,
    pub archive: ArchiveReport,
}

/// Current fleet state without any side effects.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub observation: Observation,
    pub metrics: FleetMetrics,
    pub instances: BTreeSet<InstanceId>,
    pub rejected_files: usize,
}

pub struct ControlLoop<O: Orchestrator> {
    deployment: String,
    threshold: f64,
    store: SampleStore,
    aggregator: MetricsAggregator,
    policy: DecisionPolicy,
    orchestrator: O,
    archiver: Archiver,
    ledger: HistoryLedger,
    metrics_textfile: Option<PathBuf>,
}

impl<O: Orchestrator> ControlLoop<O> {
    pub fn new(config: &FleetscaleConfig, orchestrator: O) -> ControlResult<Self> {
        config.validate()?;
        Ok(Self {
            deployment: config.fleet.deployment.clone(),
            threshold: config.policy.threshold,
            store: SampleStore::from_config(&config.samples),
            aggregator: MetricsAggregator::new(config.interval()),
            policy: DecisionPolicy::from_config(config)?,
            orchestrator,
            archiver: Archiver::from_config(&config.samples),
            ledger: HistoryLedger::new(config.samples.history_path()),
            metrics_textfile: config.telemetry.metrics_textfile.clone(),
        })
    }

    pub fn policy(&self) -> &DecisionPolicy {
        &self.policy
    }

    pub fn ledger(&self) -> &HistoryLedger {
        &self.ledger
    }

    pub fn orchestrator(&self) -> &O {
        &self.orchestrator
    }

    /// Read samples and the fleet and compute the observation, touching
    /// nothing.
    pub async fn observe(&self) -> ControlResult<Snapshot> {
        let batch = self.store.list_samples()?;
        let metrics = self.aggregate(&batch);
        let instances = self.current_instances().await?;
        let observation = metrics.observation(instance_count(&instances), self.threshold);
        Ok(Snapshot {
            observation,
            metrics,
            instances,
            rejected_files: batch.rejected.len(),
        })
    }

    /// Run one check.
    ///
    /// An orchestrator query failure aborts before anything is archived or
    /// recorded. Once a decision is made it is always recorded: an apply
    /// failure is recorded with `applied = false` and returned as
    /// [`ControlError::Apply`], ahead of any archive failure.
    pub async fn run_once(&self) -> ControlResult<CheckReport> {
        let mut history = self.ledger.load();
        let check_number = history.next_check_number();

        let batch = self.store.list_samples()?;
        let metrics = self.aggregate(&batch);

        let active = self.current_instances().await?;
        let observation = metrics.observation(instance_count(&active), self.threshold);

        let decision = self.policy.decide(check_number, &observation).await;
        info!(
            check = check_number,
            strategy = ?self.policy.strategy(),
            instances = observation.instance_count,
            pressure = observation.pressure,
            %decision,
            "decision made"
        );

        let mut apply_error = None;
        if let Some(target) = decision.target() {
            match self.orchestrator.apply_instance_count(target).await {
                Ok(()) => info!(check = check_number, target, "instance count applied"),
                Err(e) => {
                    error!(check = check_number, target, error = %e, "failed to apply instance count");
                    apply_error = Some((target, e));
                }
            }
        }

        // The decision is recorded even when archiving fails.
        let archive_result = self.archiver.archive(&batch.files());

        let check = NewCheck::new(observation, decision, apply_error.is_none(), active);
        let entry = self.ledger.append(&mut history, check)?;
        self.write_metrics(&entry);

        if let Some((target, source)) = apply_error {
            if let Err(e) = &archive_result {
                error!(check = entry.check_number, error = %e, "failed to archive samples");
            }
            return Err(ControlError::Apply {
                check: entry.check_number,
                target,
                source,
            });
        }

        let archive = archive_result?;
        Ok(CheckReport {
            entry,
            metrics,
            archive,
        })
    }

    /// Run checks every `interval` until `shutdown` changes. The first check
    /// runs immediately; a failed check is logged and the loop continues.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), deployment = %self.deployment, "control loop started");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        error!(error = %e, "check failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("control loop shutting down");
                    break;
                }
            }
        }
    }

    fn aggregate(&self, batch: &SampleBatch) -> FleetMetrics {
        let metrics = self.aggregator.aggregate(batch.records());
        for stats in &metrics.instances {
            debug!(
                instance = %stats.instance_id,
                samples = stats.samples,
                arrival_rate = stats.arrival_rate,
                mean_service_time = stats.mean_service_time,
                queue_ratio = ?stats.queue_ratio,
                "instance load"
            );
        }
        metrics
    }

    async fn current_instances(&self) -> ControlResult<BTreeSet<InstanceId>> {
        self.orchestrator.current_instances().await.map_err(|e| {
            error!(error = %e, "failed to list fleet instances");
            ControlError::Query(e)
        })
    }

    fn write_metrics(&self, entry: &CheckEntry) {
        let Some(path) = &self.metrics_textfile else {
            return;
        };
        let text = render_prometheus(
            &self.deployment,
            entry.check_number,
            &entry.observation,
            &entry.decision,
        );
        if let Err(e) = write_textfile(path, &text) {
            warn!(path = ?path, error = %e, "failed to write metrics textfile");
        }
    }
}

fn instance_count(instances: &BTreeSet<InstanceId>) -> u32 {
    u32::try_from(instances.len()).unwrap_or(u32::MAX)
}
