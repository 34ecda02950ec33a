//! System Adapter Integration Tests
//!
//! Drives a full benchmark run through the adapter's bus handlers with an
//! in-process recording bus, the bundled ingester and the bundled endpoint.

use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use versioned_adapter::bus::mqtt::{route, Topics};
use versioned_adapter::bus::protocol::{encode_task_message, BULK_LOAD_DATA_GEN_FINISHED};
use versioned_adapter::bus::{BusHandler, Command, DataFragment, MessageBus, RecordingBus};
use versioned_adapter::config::{AdapterConfig, EndpointConfig, LoaderConfig};
use versioned_adapter::core::{CyclePhase, Task, TaskResult};
use versioned_adapter::SystemAdapter;

const WAIT: Duration = Duration::from_secs(60);
const QUERY_V0: &str =
    "#version-materialized0\nSELECT * WHERE { GRAPH <http://graph.version.0> { ?s ?p ?o } }";

fn resources() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("resources")
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
}

fn config(tmp: &Path) -> AdapterConfig {
    let port = free_port();
    let endpoint_file = tmp.join("endpoint.json");
    std::fs::write(&endpoint_file, format!(r#"{{"port": {}}}"#, port)).unwrap();

    AdapterConfig {
        staging_dir: tmp.join("staging"),
        store_dir: tmp.join("store"),
        loader: LoaderConfig {
            command: vec![env!("CARGO_BIN_EXE_version-ingester").to_string()],
            ..LoaderConfig::default()
        },
        endpoint: EndpointConfig {
            command: vec![env!("CARGO_BIN_EXE_sparql-endpoint").to_string()],
            config_file: Some(endpoint_file),
            port,
            max_attempts: 150,
            backoff_millis: 100,
            ..EndpointConfig::default()
        },
        ..AdapterConfig::default()
    }
}

fn adapter(tmp: &Path) -> (Arc<SystemAdapter>, Arc<RecordingBus>) {
    let bus = Arc::new(RecordingBus::new());
    let adapter =
        SystemAdapter::new(config(tmp), Arc::clone(&bus) as Arc<dyn MessageBus>).unwrap();
    adapter.init().unwrap();
    (Arc::new(adapter), bus)
}

fn send_fragment(adapter: &SystemAdapter, name: &str, content: &[u8]) {
    let fragment = DataFragment { file_name: name.to_string(), content: content.to_vec() };
    adapter.receive_generated_data(&fragment.encode());
}

/// Send every file of a fixture version and return how many were sent.
fn send_version(adapter: &SystemAdapter, version_dir: &Path) -> i32 {
    let mut sent = 0;
    for entry in std::fs::read_dir(version_dir).unwrap() {
        let path = entry.unwrap().path();
        let name = path.file_name().unwrap().to_str().unwrap().to_string();
        send_fragment(adapter, &name, &std::fs::read(&path).unwrap());
        sent += 1;
    }
    sent
}

fn generation_finished(adapter: &Arc<SystemAdapter>, count: i32, is_last_phase: bool) -> thread::JoinHandle<()> {
    let adapter = Arc::clone(adapter);
    let payload = Command::GenerationFinished { count, is_last_phase }.payload();
    thread::spawn(move || adapter.receive_command(BULK_LOAD_DATA_GEN_FINISHED, &payload))
}

/// Deliver a task the way the bus does: encoded, then routed by topic.
fn send_task(adapter: &SystemAdapter, task_id: &str, task_type: &str, payload: &str) {
    let topics = Topics::with_prefix("benchmark");
    let message = encode_task_message(&Task::new(task_id, task_type, payload));
    route(&topics, &topics.task, &message, adapter).unwrap();
}

fn result_for(bus: &RecordingBus, task_id: &str) -> Option<TaskResult> {
    bus.results().into_iter().find(|r| r.task_id == task_id)
}

#[test]
fn test_full_benchmark_run() {
    let tmp = tempfile::tempdir().unwrap();
    let (adapter, bus) = adapter(tmp.path());

    // Queries before any version is loaded are rejected and not reported.
    send_task(&adapter, "early", "3", QUERY_V0);
    assert!(result_for(&bus, "early").is_none());

    // Version 0: announcement first, fragments afterwards.
    let v0_files = std::fs::read_dir(resources().join("v0")).unwrap().count() as i32;
    let waiter = generation_finished(&adapter, v0_files, false);
    thread::sleep(Duration::from_millis(50));
    assert!(bus.commands().is_empty());
    send_version(&adapter, &resources().join("v0"));
    assert!(bus.wait_for_commands(1, WAIT));
    waiter.join().unwrap();
    assert_eq!(adapter.snapshot().phase, CyclePhase::ReadyForQuery);
    assert_eq!(adapter.snapshot().version, 1);

    // Version 1: fragments first, announcement afterwards.
    let sent = send_version(&adapter, &resources().join("v1"));
    generation_finished(&adapter, sent, true).join().unwrap();
    assert_eq!(bus.commands(), vec![Command::LoadingFinished, Command::LoadingFinished]);
    assert!(std::fs::read_dir(tmp.path().join("staging")).unwrap().next().is_none());

    send_task(&adapter, "space", "2", "");
    let space = result_for(&bus, "space").expect("storage space result");
    assert_eq!(space.field(0), Some("2"));
    assert!(space.field(1).unwrap().parse::<u64>().unwrap() > 0);

    send_task(&adapter, "q0", "3", QUERY_V0);
    let query = result_for(&bus, "q0").expect("query result");
    assert_eq!(query.field(0), Some("3"));
    assert_eq!(query.field(1), Some("0"));
    assert_eq!(query.field(2), Some("6"));
    let body: serde_json::Value = serde_json::from_slice(&query.segments[3]).unwrap();
    assert_eq!(body["results"]["bindings"].as_array().unwrap().len(), 6);

    // After the last loading phase no further ingestion is accepted.
    send_task(&adapter, "late-ingest", "1", "2");
    assert!(result_for(&bus, "late-ingest").is_none());

    adapter.close().unwrap();
    assert!(!adapter.endpoint().is_running());
}

#[test]
fn test_ingest_task_reports_count_and_time() {
    let tmp = tempfile::tempdir().unwrap();
    let (adapter, bus) = adapter(tmp.path());

    let payload = format!("0:{}", resources().join("v0").display());
    send_task(&adapter, "ingest-0", "1", &payload);
    let result = result_for(&bus, "ingest-0").expect("ingest result");
    assert_eq!(result.field(0), Some("1"));
    assert_eq!(result.field(1), Some("6"));
    assert!(result.field(2).unwrap().parse::<u64>().is_ok());
}

#[test]
fn test_unknown_task_type_is_dropped() {
    let tmp = tempfile::tempdir().unwrap();
    let (adapter, bus) = adapter(tmp.path());
    send_task(&adapter, "odd", "7", "");
    assert!(bus.results().is_empty());
}

#[test]
fn test_fragment_names_cannot_escape_staging() {
    let tmp = tempfile::tempdir().unwrap();
    let (adapter, bus) = adapter(tmp.path());

    send_fragment(&adapter, "../../escape.nt", b"<http://ex.org/a> <http://ex.org/b> <http://ex.org/c> .");
    send_fragment(&adapter, "..", b"ignored");
    send_fragment(&adapter, "empty.nt", b"");

    assert!(!tmp.path().join("escape.nt").exists());
    let staged: Vec<_> = std::fs::read_dir(tmp.path().join("staging"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(staged, vec!["escape.nt".to_string()]);

    // Dropped fragments still count, so announcing three releases the cycle.
    generation_finished(&adapter, 3, false).join().unwrap();
    assert_eq!(bus.commands(), vec![Command::LoadingFinished]);
}
