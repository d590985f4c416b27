//! fleetscale-metrics — fleet load estimation from worker samples.
//!
//! # Estimators
//!
//! ```text
//! per instance i (samples grouped by file-name instance id):
//!   queue_ratio_i   = mean((response - service) / service)   service > 0 only
//!   arrival_rate_i  = samples_i / interval_secs
//!   mean_service_i  = mean(service)
//!
//! fleet:
//!   avg_response_time     = mean(response) over all samples
//!   queue_length_dominant = max_i queue_ratio_i
//!   utilization           = sum_i(arrival_rate_i * mean_service_i) / instances
//!   workload              = sum_i arrival_rate_i
//! ```
//!
//! Prometheus exposition
//!   └── render_prometheus() → text for a node-exporter textfile collector

pub mod aggregator;
pub mod prometheus;

pub use aggregator::{FleetMetrics, InstanceStats, MetricsAggregator};
pub use prometheus::{render_prometheus, write_textfile};
