//! End-to-end checks against a temporary results directory, the in-memory
//! orchestrator, and a stub decision service.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};

use fleetscale_actuator::InMemoryOrchestrator;
use fleetscale_autoscale::{ControlError, ControlLoop};
use fleetscale_core::{Decision, FleetscaleConfig, PolicyStrategy};

fn config(dir: &Path) -> FleetscaleConfig {
    let mut config = FleetscaleConfig::default();
    config.samples.results_dir = dir.to_path_buf();
    config
}

fn delegated(dir: &Path, endpoint: &str) -> FleetscaleConfig {
    let mut config = config(dir);
    config.policy.strategy = PolicyStrategy::Delegated;
    config.policy.delegated.endpoint = Some(endpoint.to_string());
    config.policy.delegated.timeout = "300ms".to_string();
    config
}

fn write_sample(dir: &Path, name: &str, service: f64, response: f64) {
    fs::write(
        dir.join(name),
        json!({ "serviceTime": service, "responseTime": response }).to_string(),
    )
    .unwrap();
}

fn pending_samples(dir: &Path) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            name.ends_with(".json") && name != "podStatus.json"
        })
        .count()
}

fn history(dir: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(dir.join("podStatus.json")).unwrap()).unwrap()
}

struct DecisionStub {
    url: String,
    hits: Arc<AtomicUsize>,
    last_request: Arc<Mutex<Option<Value>>>,
}

async fn decision_stub(reply: Value, delay: Duration) -> DecisionStub {
    let hits = Arc::new(AtomicUsize::new(0));
    let last_request = Arc::new(Mutex::new(None));

    let handler = {
        let hits = hits.clone();
        let last_request = last_request.clone();
        move |Json(body): Json<Value>| {
            let hits = hits.clone();
            let last_request = last_request.clone();
            let reply = reply.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                *last_request.lock().unwrap() = Some(body);
                tokio::time::sleep(delay).await;
                Json(reply)
            }
        }
    };
    let router = Router::new().route("/decide", post(handler));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    DecisionStub {
        url: format!("http://{addr}/decide"),
        hits,
        last_request,
    }
}

/// A decision service that answers every request with `status` and a raw
/// body.
async fn raw_decision_stub(status: StatusCode, body: &'static str) -> String {
    let router = Router::new().route("/decide", post(move || async move { (status, body) }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}/decide")
}

/// An address nothing listens on.
async fn closed_endpoint() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/decide")
}

#[tokio::test]
async fn checks_are_numbered_without_gaps() {
    let dir = tempfile::tempdir().unwrap();
    let fleet = InMemoryOrchestrator::new("mm", 2);
    let control = ControlLoop::new(&config(dir.path()), fleet.clone()).unwrap();

    // Check 1: slow samples, but no baseline yet.
    write_sample(dir.path(), "mm-0_001.json", 0.3, 0.5);
    let first = control.run_once().await.unwrap();
    assert_eq!(first.entry.check_number, 1);
    assert_eq!(first.entry.decision, Decision::NoAction);
    assert_eq!(first.entry.started, vec!["mm-0", "mm-1"]);
    assert!(first.entry.shutdown.is_empty());
    assert!(fleet.applied().is_empty());
    assert_eq!(first.archive.moved, 1);
    assert_eq!(pending_samples(dir.path()), 0);

    // Check 2: above the scale-up bucket.
    write_sample(dir.path(), "mm-0_002.json", 0.3, 0.5);
    write_sample(dir.path(), "mm-1_002.json", 0.2, 0.4);
    let second = control.run_once().await.unwrap();
    assert_eq!(second.entry.check_number, 2);
    assert_eq!(second.entry.decision, Decision::SetInstanceCount(5));
    assert!(second.entry.applied);
    assert_eq!(fleet.applied(), vec![5]);
    // Active is the fleet as seen before the decision.
    assert_eq!(second.entry.active, vec!["mm-0", "mm-1"]);
    assert!(second.entry.started.is_empty());

    // Check 3: no samples, shrink by one.
    let third = control.run_once().await.unwrap();
    assert_eq!(third.entry.check_number, 3);
    assert_eq!(third.entry.decision, Decision::SetInstanceCount(4));
    assert_eq!(third.entry.started, vec!["mm-2", "mm-3", "mm-4"]);
    assert!(third.entry.shutdown.is_empty());
    assert_eq!(third.metrics.sample_count, 0);

    let doc = history(dir.path());
    let keys: Vec<&String> = doc.as_object().unwrap().keys().collect();
    assert_eq!(keys, vec!["check_1", "check_2", "check_3"]);
    assert!(doc["check_3"]["averageResponseTime"].is_null());
    assert_eq!(doc["check_2"]["action"], "Set instance count to 5");
}

#[tokio::test]
async fn observe_reports_single_instance_estimators() {
    let dir = tempfile::tempdir().unwrap();
    write_sample(dir.path(), "w1_001.json", 1.0, 1.2);
    write_sample(dir.path(), "w1_002.json", 0.5, 0.6);
    write_sample(dir.path(), "w1_003.json", 2.0, 2.1);

    let fleet = InMemoryOrchestrator::with_instances("w", ["w1"]);
    let control = ControlLoop::new(&config(dir.path()), fleet.clone()).unwrap();
    let snapshot = control.observe().await.unwrap();

    let avg = snapshot.observation.avg_response_time.unwrap();
    assert!((avg - 1.3).abs() < 1e-9);
    assert!((snapshot.observation.queue_length_dominant - 0.15).abs() < 1e-9);
    assert_eq!(snapshot.metrics.instances.len(), 1);
    assert!((snapshot.metrics.instances[0].arrival_rate - 0.05).abs() < 1e-9);
    assert_eq!(snapshot.observation.instance_count, 1);

    // Nothing moved, nothing recorded.
    assert_eq!(pending_samples(dir.path()), 3);
    assert!(!dir.path().join("podStatus.json").exists());
    assert!(fleet.applied().is_empty());
}

#[tokio::test]
async fn no_samples_shrinks_by_one_even_when_delegated() {
    let dir = tempfile::tempdir().unwrap();
    let stub = decision_stub(json!({ "action": 9 }), Duration::ZERO).await;
    let fleet = InMemoryOrchestrator::new("mm", 3);
    let control = ControlLoop::new(&delegated(dir.path(), &stub.url), fleet.clone()).unwrap();

    control.run_once().await.unwrap();
    let report = control.run_once().await.unwrap();

    assert_eq!(report.entry.decision, Decision::SetInstanceCount(2));
    assert_eq!(fleet.applied(), vec![2]);
    assert_eq!(stub.hits.load(Ordering::SeqCst), 0);
    assert!(history(dir.path())["check_2"]["averageResponseTime"].is_null());
}

#[tokio::test]
async fn delegated_action_is_applied() {
    let dir = tempfile::tempdir().unwrap();
    let stub = decision_stub(json!({ "action": 4 }), Duration::ZERO).await;
    let fleet = InMemoryOrchestrator::new("mm", 2);
    let control = ControlLoop::new(&delegated(dir.path(), &stub.url), fleet.clone()).unwrap();

    write_sample(dir.path(), "mm-0_001.json", 0.5, 0.9);
    control.run_once().await.unwrap();
    // The first check never consults the service.
    assert_eq!(stub.hits.load(Ordering::SeqCst), 0);

    write_sample(dir.path(), "mm-0_002.json", 0.5, 0.9);
    let report = control.run_once().await.unwrap();

    assert_eq!(stub.hits.load(Ordering::SeqCst), 1);
    assert_eq!(report.entry.decision, Decision::SetInstanceCount(4));
    assert_eq!(fleet.applied(), vec![4]);
    assert_eq!(history(dir.path())["check_2"]["action"], "Set instance count to 4");

    let request = stub.last_request.lock().unwrap().clone().unwrap();
    assert_eq!(request["observation"]["instanceCount"], 2);
    assert!((request["observation"]["pressure"].as_f64().unwrap() - 1.5).abs() < 1e-9);
}

#[tokio::test]
async fn unreachable_decision_service_defers() {
    let dir = tempfile::tempdir().unwrap();
    let endpoint = closed_endpoint().await;
    let fleet = InMemoryOrchestrator::new("mm", 2);
    let control = ControlLoop::new(&delegated(dir.path(), &endpoint), fleet.clone()).unwrap();

    control.run_once().await.unwrap();
    write_sample(dir.path(), "mm-0_002.json", 0.5, 0.9);
    let report = control.run_once().await.unwrap();

    assert_eq!(report.entry.decision, Decision::UnknownDeferred);
    assert!(fleet.applied().is_empty());
    assert_eq!(fleet.instances().len(), 2);
    assert_eq!(history(dir.path())["check_2"]["action"], "Unknown (deferred)");
    // Samples are still consumed.
    assert_eq!(pending_samples(dir.path()), 0);
}

#[tokio::test]
async fn slow_decision_service_defers() {
    let dir = tempfile::tempdir().unwrap();
    let stub = decision_stub(json!({ "action": 4 }), Duration::from_secs(3)).await;
    let fleet = InMemoryOrchestrator::new("mm", 2);
    let control = ControlLoop::new(&delegated(dir.path(), &stub.url), fleet.clone()).unwrap();

    control.run_once().await.unwrap();
    write_sample(dir.path(), "mm-0_002.json", 0.5, 0.9);
    let report = control.run_once().await.unwrap();

    assert_eq!(report.entry.decision, Decision::UnknownDeferred);
    assert!(fleet.applied().is_empty());
}

#[tokio::test]
async fn missing_action_defers() {
    let dir = tempfile::tempdir().unwrap();
    let stub = decision_stub(json!({ "reason": "warming up" }), Duration::ZERO).await;
    let fleet = InMemoryOrchestrator::new("mm", 2);
    let control = ControlLoop::new(&delegated(dir.path(), &stub.url), fleet.clone()).unwrap();

    control.run_once().await.unwrap();
    write_sample(dir.path(), "mm-0_002.json", 0.5, 0.9);
    let report = control.run_once().await.unwrap();

    assert_eq!(stub.hits.load(Ordering::SeqCst), 1);
    assert_eq!(report.entry.decision, Decision::UnknownDeferred);
    assert!(fleet.applied().is_empty());
}

#[tokio::test]
async fn error_status_defers() {
    let dir = tempfile::tempdir().unwrap();
    let endpoint = raw_decision_stub(StatusCode::INTERNAL_SERVER_ERROR, "boom").await;
    let fleet = InMemoryOrchestrator::new("mm", 2);
    let control = ControlLoop::new(&delegated(dir.path(), &endpoint), fleet.clone()).unwrap();

    control.run_once().await.unwrap();
    write_sample(dir.path(), "mm-0_002.json", 0.5, 0.9);
    let report = control.run_once().await.unwrap();

    assert_eq!(report.entry.decision, Decision::UnknownDeferred);
    assert!(fleet.applied().is_empty());
    assert_eq!(history(dir.path())["check_2"]["action"], "Unknown (deferred)");
}

#[tokio::test]
async fn non_json_reply_defers() {
    let dir = tempfile::tempdir().unwrap();
    let endpoint = raw_decision_stub(StatusCode::OK, "not json").await;
    let fleet = InMemoryOrchestrator::new("mm", 2);
    let control = ControlLoop::new(&delegated(dir.path(), &endpoint), fleet.clone()).unwrap();

    control.run_once().await.unwrap();
    write_sample(dir.path(), "mm-0_002.json", 0.5, 0.9);
    let report = control.run_once().await.unwrap();

    assert_eq!(report.entry.decision, Decision::UnknownDeferred);
    assert!(fleet.applied().is_empty());
    assert_eq!(history(dir.path())["check_2"]["action"], "Unknown (deferred)");
}

#[tokio::test]
async fn failed_apply_is_still_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let fleet = InMemoryOrchestrator::new("mm", 2);
    let control = ControlLoop::new(&config(dir.path()), fleet.clone()).unwrap();
    control.run_once().await.unwrap();

    fleet.fail_applies(true);
    write_sample(dir.path(), "mm-0_002.json", 0.3, 0.5);
    let err = control.run_once().await.unwrap_err();

    assert!(matches!(err, ControlError::Apply { check: 2, target: 5, .. }));
    assert_eq!(fleet.applied(), vec![5]);
    assert_eq!(pending_samples(dir.path()), 0);

    let doc = history(dir.path());
    assert_eq!(doc["check_2"]["action"], "Set instance count to 5");
    assert_eq!(doc["check_2"]["applied"], false);
}

#[tokio::test]
async fn failed_apply_and_archive_are_still_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let elsewhere = tempfile::tempdir().unwrap();
    // A regular file where the archive directory should be.
    let blocker = elsewhere.path().join("blocker.txt");
    fs::write(&blocker, "").unwrap();

    let mut config = config(dir.path());
    config.samples.archive_dir = Some(blocker);
    let fleet = InMemoryOrchestrator::new("mm", 2);
    let control = ControlLoop::new(&config, fleet.clone()).unwrap();
    control.run_once().await.unwrap();

    fleet.fail_applies(true);
    write_sample(dir.path(), "mm-0_002.json", 0.3, 0.5);
    let err = control.run_once().await.unwrap_err();

    // The apply failure wins over the archive failure.
    assert!(matches!(err, ControlError::Apply { check: 2, target: 5, .. }));
    assert_eq!(fleet.applied(), vec![5]);
    assert_eq!(pending_samples(dir.path()), 1);

    let doc = history(dir.path());
    assert_eq!(doc["check_2"]["action"], "Set instance count to 5");
    assert_eq!(doc["check_2"]["applied"], false);
}

#[tokio::test]
async fn failed_archive_is_recorded_then_returned() {
    let dir = tempfile::tempdir().unwrap();
    let elsewhere = tempfile::tempdir().unwrap();
    let blocker = elsewhere.path().join("blocker.txt");
    fs::write(&blocker, "").unwrap();

    let mut config = config(dir.path());
    config.samples.archive_dir = Some(blocker);
    let fleet = InMemoryOrchestrator::new("mm", 2);
    let control = ControlLoop::new(&config, fleet.clone()).unwrap();

    write_sample(dir.path(), "mm-0_001.json", 0.3, 0.5);
    let err = control.run_once().await.unwrap_err();

    assert!(matches!(err, ControlError::Samples(_)));
    assert_eq!(history(dir.path())["check_1"]["action"], "No Action");
}

#[tokio::test]
async fn failed_query_leaves_samples_and_history_alone() {
    let dir = tempfile::tempdir().unwrap();
    let fleet = InMemoryOrchestrator::new("mm", 2);
    fleet.fail_queries(true);
    let control = ControlLoop::new(&config(dir.path()), fleet.clone()).unwrap();

    write_sample(dir.path(), "mm-0_001.json", 0.3, 0.5);
    let err = control.run_once().await.unwrap_err();

    assert!(matches!(err, ControlError::Query(_)));
    assert_eq!(pending_samples(dir.path()), 1);
    assert!(!dir.path().join("podStatus.json").exists());

    // Next invocation picks up where this one left off.
    fleet.fail_queries(false);
    let report = control.run_once().await.unwrap();
    assert_eq!(report.entry.check_number, 1);
    assert_eq!(report.metrics.sample_count, 1);
}

#[tokio::test]
async fn corrupt_samples_and_history_do_not_stop_a_check() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("podStatus.json"), "not json").unwrap();
    fs::write(dir.path().join("mm-0_bad.json"), "{").unwrap();
    write_sample(dir.path(), "mm-0_good.json", 0.3, 0.5);

    let fleet = InMemoryOrchestrator::new("mm", 1);
    let control = ControlLoop::new(&config(dir.path()), fleet).unwrap();
    let report = control.run_once().await.unwrap();

    assert_eq!(report.entry.check_number, 1);
    assert_eq!(report.metrics.sample_count, 1);
    // Both files are consumed so the bad one is not retried forever.
    assert_eq!(report.archive.moved, 2);
    assert_eq!(pending_samples(dir.path()), 0);
}

#[tokio::test]
async fn metrics_textfile_is_written() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    let textfile = dir.path().join("textfile").join("fleetscale.prom");
    config.telemetry.metrics_textfile = Some(textfile.clone());

    let control = ControlLoop::new(&config, InMemoryOrchestrator::new("mm", 2)).unwrap();
    control.run_once().await.unwrap();

    let text = fs::read_to_string(&textfile).unwrap();
    assert!(text.contains("fleetscale_check_number{deployment=\"matrix-multiply\"} 1"));
    assert!(text.contains("fleetscale_instances{deployment=\"matrix-multiply\"} 2"));
}

#[tokio::test]
async fn run_stops_on_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let control = ControlLoop::new(&config(dir.path()), InMemoryOrchestrator::new("mm", 1)).unwrap();
    let (tx, rx) = tokio::sync::watch::channel(false);

    let stopper = async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        tx.send(true).unwrap();
    };
    tokio::time::timeout(Duration::from_secs(5), async {
        tokio::join!(control.run(Duration::from_secs(60), rx), stopper);
    })
    .await
    .expect("control loop did not stop");

    // The first check runs immediately.
    assert!(dir.path().join("podStatus.json").exists());
}
