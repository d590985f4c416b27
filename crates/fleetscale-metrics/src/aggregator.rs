//! Metrics aggregator — turns one check's sample batch into fleet metrics.
//!
//! Pure computation over an in-memory batch; nothing here touches the
//! filesystem or the orchestrator.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use fleetscale_core::{InstanceId, Observation, SampleRecord};

/// Per-instance intermediate statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceStats {
    pub instance_id: InstanceId,
    pub samples: usize,
    /// Requests per second over the check interval.
    pub arrival_rate: f64,
    pub mean_service_time: f64,
    /// `None` when every sample had a zero service time.
    pub queue_ratio: Option<f64>,
}

/// Fleet-level metrics for one batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FleetMetrics {
    pub sample_count: usize,
    /// `None` for an empty batch: no signal, not a zero reading.
    pub avg_response_time: Option<f64>,
    pub queue_length_dominant: f64,
    pub utilization: f64,
    pub workload: f64,
    pub instances: Vec<InstanceStats>,
}

impl FleetMetrics {
    pub fn has_signal(&self) -> bool {
        self.avg_response_time.is_some()
    }

    /// Combine with the orchestrator's instance count into an [`Observation`].
    pub fn observation(&self, instance_count: u32, threshold: f64) -> Observation {
        let pressure = match self.avg_response_time {
            Some(avg) if threshold > 0.0 => avg / threshold,
            _ => 0.0,
        };
        Observation {
            instance_count,
            pressure,
            avg_response_time: self.avg_response_time,
            threshold,
            queue_length_dominant: self.queue_length_dominant,
            utilization: self.utilization,
            workload: self.workload,
        }
    }
}

/// Running sums for one instance.
#[derive(Default)]
struct InstanceAccumulator {
    samples: usize,
    service_sum: f64,
    ratio_sum: f64,
    ratio_samples: usize,
}

/// Aggregates sample batches over a fixed check interval.
#[derive(Debug, Clone, Copy)]
pub struct MetricsAggregator {
    interval: Duration,
}

impl MetricsAggregator {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn aggregate<'a, I>(&self, samples: I) -> FleetMetrics
    where
        I: IntoIterator<Item = &'a SampleRecord>,
    {
        let interval_secs = self.interval.as_secs_f64();
        let mut per_instance: BTreeMap<&str, InstanceAccumulator> = BTreeMap::new();
        let mut response_sum = 0.0;
        let mut sample_count = 0usize;

        for sample in samples {
            sample_count += 1;
            response_sum += sample.response_time;

            let acc = per_instance.entry(sample.instance_id.as_str()).or_default();
            acc.samples += 1;
            acc.service_sum += sample.service_time;
            // Zero service time leaves the ratio undefined; the sample still
            // counts towards arrivals and service time.
            if sample.service_time > 0.0 {
                acc.ratio_sum += sample.waiting_time() / sample.service_time;
                acc.ratio_samples += 1;
            }
        }

        let instances: Vec<InstanceStats> = per_instance
            .into_iter()
            .map(|(id, acc)| InstanceStats {
                instance_id: id.to_string(),
                samples: acc.samples,
                arrival_rate: if interval_secs > 0.0 {
                    acc.samples as f64 / interval_secs
                } else {
                    0.0
                },
                mean_service_time: acc.service_sum / acc.samples as f64,
                queue_ratio: (acc.ratio_samples > 0)
                    .then(|| acc.ratio_sum / acc.ratio_samples as f64),
            })
            .collect();

        let queue_length_dominant = instances
            .iter()
            .filter_map(|i| i.queue_ratio)
            .reduce(f64::max)
            .unwrap_or(0.0);
        let workload: f64 = instances.iter().map(|i| i.arrival_rate).sum();
        let utilization = if instances.is_empty() {
            0.0
        } else {
            let busy: f64 = instances
                .iter()
                .map(|i| i.arrival_rate * i.mean_service_time)
                .sum();
            busy / instances.len() as f64
        };
        let avg_response_time = (sample_count > 0).then(|| response_sum / sample_count as f64);

        debug!(
            samples = sample_count,
            instances = instances.len(),
            avg_response_time = ?avg_response_time,
            queue_length_dominant,
            utilization,
            workload,
            "samples aggregated"
        );

        FleetMetrics {
            sample_count,
            avg_response_time,
            queue_length_dominant,
            utilization,
            workload,
            instances,
        }
    }
}
