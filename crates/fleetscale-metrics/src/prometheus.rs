//! Prometheus text exposition format.
//!
//! Renders the latest check's observation for a node-exporter textfile
//! collector. The file is replaced atomically so a scrape never sees a
//! half-written exposition.

use std::io;
use std::path::Path;

use fleetscale_core::{Decision, Observation};

/// Render one check into Prometheus text format.
///
/// Produces GAUGE metrics with a `deployment` label. The average response
/// time and target instance gauges are omitted when the check had no
/// samples or no scaling target.
pub fn render_prometheus(
    deployment: &str,
    check_number: u64,
    observation: &Observation,
    decision: &Decision,
) -> String {
    let deployment = escape_label_value(deployment);
    let mut out = String::new();
    let mut gauge = |name: &str, help: &str, value: String| {
        out.push_str(&format!("# HELP {name} {help}\n"));
        out.push_str(&format!("# TYPE {name} gauge\n"));
        out.push_str(&format!("{name}{{deployment=\"{deployment}\"}} {value}\n"));
    };

    gauge(
        "fleetscale_check_number",
        "Number of the most recent check.",
        check_number.to_string(),
    );
    gauge(
        "fleetscale_instances",
        "Instances reported by the orchestrator.",
        observation.instance_count.to_string(),
    );
    gauge(
        "fleetscale_pressure",
        "Average response time divided by the threshold.",
        format!("{:.4}", observation.pressure),
    );
    if let Some(avg) = observation.avg_response_time {
        gauge(
            "fleetscale_average_response_time_seconds",
            "Mean response time over the check's samples.",
            format!("{avg:.6}"),
        );
    }
    gauge(
        "fleetscale_queue_length_dominant",
        "Worst per-instance waiting/service ratio.",
        format!("{:.4}", observation.queue_length_dominant),
    );
    gauge(
        "fleetscale_utilization",
        "Arrival-rate-weighted service time per instance.",
        format!("{:.4}", observation.utilization),
    );
    gauge(
        "fleetscale_workload_rps",
        "Aggregate arrival rate in requests per second.",
        format!("{:.4}", observation.workload),
    );
    if let Some(target) = decision.target() {
        gauge(
            "fleetscale_target_instances",
            "Instance count requested by the most recent check.",
            target.to_string(),
        );
    }

    out
}

/// Escape a label value for the text exposition format.
fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Write `content` to `path` via a temporary sibling and a rename.
pub fn write_textfile(path: &Path, content: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("prom.tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_observation(avg: Option<f64>) -> Observation {
        Observation {
            instance_count: 4,
            pressure: 1.25,
            avg_response_time: avg,
            threshold: 0.6,
            queue_length_dominant: 0.15,
            utilization: 0.058,
            workload: 0.05,
        }
    }

    #[test]
    fn render_with_signal_and_target() {
        let output = render_prometheus(
            "default/matrix-multiply",
            7,
            &test_observation(Some(0.75)),
            &Decision::SetInstanceCount(5),
        );

        assert!(output.contains("fleetscale_check_number{deployment=\"default/matrix-multiply\"} 7"));
        assert!(output.contains("fleetscale_instances{deployment=\"default/matrix-multiply\"} 4"));
        assert!(output.contains("fleetscale_pressure{deployment=\"default/matrix-multiply\"} 1.2500"));
        assert!(output.contains(
            "fleetscale_average_response_time_seconds{deployment=\"default/matrix-multiply\"} 0.750000"
        ));
        assert!(output.contains("fleetscale_target_instances{deployment=\"default/matrix-multiply\"} 5"));
    }

    #[test]
    fn render_without_signal_omits_average() {
        let output = render_prometheus("ns/app", 1, &test_observation(None), &Decision::NoAction);
        assert!(!output.contains("fleetscale_average_response_time_seconds"));
        assert!(!output.contains("fleetscale_target_instances"));
        assert!(output.contains("# TYPE fleetscale_workload_rps gauge"));
    }

    #[test]
    fn render_format_is_prometheus_compatible() {
        let output = render_prometheus(
            "test",
            2,
            &test_observation(Some(0.1)),
            &Decision::UnknownDeferred,
        );
        for line in output.lines() {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            assert!(
                line.contains('{') && line.contains('}'),
                "line should have labels: {line}"
            );
        }
    }

    #[test]
    fn deployment_label_is_escaped() {
        let output = render_prometheus("a\"b\\c\nd", 3, &test_observation(None), &Decision::NoAction);
        assert!(output.contains(r#"fleetscale_check_number{deployment="a\"b\\c\nd"} 3"#));
        assert_eq!(output.lines().count(), 18);
    }

    #[test]
    fn textfile_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collector").join("fleetscale.prom");
        write_textfile(&path, "a 1\n").unwrap();
        write_textfile(&path, "a 2\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a 2\n");
        assert!(!path.with_extension("prom.tmp").exists());
    }
}
