//! End-to-end tests of the process pipeline.
//!
//! Real child processes are used throughout; `/bin/sh` scripts stand in for
//! the PostgreSQL client tools.

#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use pgxfer_engine::{
    ConnectionProfile, EnvMode, FailureStage, MemorySink, PipelineOrchestrator, PipelineState,
    StreamSource, ToolInvocation, TransferError,
};
use rstest::rstest;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Generous upper bound for anything that should finish promptly.
const DEADLINE: Duration = Duration::from_secs(20);

fn sh(script: impl Into<String>) -> ToolInvocation {
    ToolInvocation::new("/bin/sh")
        .arg("-c")
        .arg(script)
        .env_mode(EnvMode::Inherit)
}

fn orchestrator(
    producer: ToolInvocation,
    consumer: ToolInvocation,
) -> (PipelineOrchestrator, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    (PipelineOrchestrator::new(producer, consumer, sink.clone()), sink)
}

fn quote(path: &Path) -> String {
    format!("'{}'", path.display())
}

#[rstest]
#[case::scenario_a(0, 0, true, FailureStage::None, None)]
#[case::scenario_b(1, 0, false, FailureStage::Producer, Some(1))]
#[case::scenario_c(0, 2, false, FailureStage::Consumer, Some(2))]
#[case::both_fail(3, 4, false, FailureStage::Consumer, Some(4))]
#[tokio::test]
async fn exit_codes_are_attributed(
    #[case] producer_exit: i32,
    #[case] consumer_exit: i32,
    #[case] success: bool,
    #[case] stage: FailureStage,
    #[case] primary: Option<i32>,
) {
    let (mut orchestrator, _sink) = orchestrator(
        sh(format!("echo 'dump diagnostics' >&2; exit {producer_exit}")),
        sh(format!("cat >/dev/null; echo 'restore diagnostics'; exit {consumer_exit}")),
    );

    let result = tokio::time::timeout(DEADLINE, orchestrator.run(&CancellationToken::new()))
        .await
        .expect("pipeline should finish")
        .expect("pipeline should run");

    assert_eq!(result.success, success);
    assert_eq!(result.failure_stage, stage);
    assert_eq!(result.primary_exit_code(), primary);
    assert_eq!(result.producer_exit_code, Some(producer_exit));
    assert_eq!(result.consumer_exit_code, Some(consumer_exit));
    assert_eq!(
        orchestrator.state(),
        PipelineState::Completed { success }
    );

    match stage {
        FailureStage::Consumer => assert_eq!(result.diagnostic_excerpt, "restore diagnostics"),
        FailureStage::Producer => assert_eq!(result.diagnostic_excerpt, "dump diagnostics"),
        _ => assert!(result.diagnostic_excerpt.is_empty()),
    }
}

#[tokio::test]
async fn payload_is_streamed_byte_for_byte() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("source.bin");
    let dest = dir.path().join("dest.bin");

    // 6 MiB of bytes covering every value, in a non-repeating order.
    let mut state: u32 = 0x2545_f491;
    let payload: Vec<u8> = (0..6 * 1024 * 1024)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 24) as u8
        })
        .collect();
    std::fs::write(&source, &payload).unwrap();

    let (mut orchestrator, sink) = orchestrator(
        sh(format!("cat {}", quote(&source))),
        sh(format!("cat > {}", quote(&dest))),
    );

    let result = tokio::time::timeout(DEADLINE, orchestrator.run(&CancellationToken::new()))
        .await
        .expect("pipeline should finish")
        .unwrap();

    assert!(result.success);
    assert!(sink.is_empty(), "payload must not reach the diagnostic sink");
    let received = std::fs::read(&dest).unwrap();
    assert_eq!(received.len(), payload.len());
    assert!(received == payload, "payload was altered in transit");
}

#[tokio::test]
async fn early_consumer_exit_stops_the_producer() {
    // The producer would write forever if it never saw the pipe close.
    let (mut orchestrator, _sink) = orchestrator(
        sh("exec yes payload-line"),
        sh("exec head -c 4096 >/dev/null"),
    );

    let result = tokio::time::timeout(DEADLINE, orchestrator.run(&CancellationToken::new()))
        .await
        .expect("producer must not hang after the consumer exits")
        .unwrap();

    assert_eq!(result.consumer_exit_code, Some(0));
    assert_ne!(result.producer_exit_code, Some(0));
    assert_eq!(result.failure_stage, FailureStage::Producer);
}

#[tokio::test]
async fn every_diagnostic_line_reaches_the_sink() {
    let (mut orchestrator, sink) = orchestrator(
        sh("printf 'dump 1\\ndump 2\\ndump tail' >&2"),
        sh("cat >/dev/null; printf 'out 1\\n'; printf 'err 1\\n' >&2; printf 'out tail'"),
    );

    let result = tokio::time::timeout(DEADLINE, orchestrator.run(&CancellationToken::new()))
        .await
        .unwrap()
        .unwrap();

    assert!(result.success);
    assert_eq!(
        sink.lines_from(StreamSource::Producer),
        vec!["dump 1", "dump 2", "dump tail"]
    );
    assert_eq!(
        sink.lines_from(StreamSource::Consumer),
        vec!["out 1", "err 1", "out tail"]
    );
}

#[tokio::test]
async fn noisy_diagnostics_do_not_stall_children() {
    // Far more stderr output than a pipe buffer holds, on both sides.
    let noisy = "i=0; while [ $i -lt 20000 ]; do echo \"diagnostic line $i\" >&2; i=$((i+1)); done";
    let (mut orchestrator, sink) = orchestrator(
        sh(format!("{noisy}; echo payload")),
        sh(format!("cat >/dev/null; {noisy}")),
    );

    let result = tokio::time::timeout(DEADLINE, orchestrator.run(&CancellationToken::new()))
        .await
        .expect("children stalled on a full diagnostic pipe")
        .unwrap();

    assert!(result.success);
    assert_eq!(sink.lines_from(StreamSource::Producer).len(), 20000);
    assert_eq!(sink.lines_from(StreamSource::Consumer).len(), 20000);
}

#[tokio::test]
async fn isolated_children_see_only_connection_variables() {
    let profile = ConnectionProfile {
        host: "src.example".to_string(),
        port: 5433,
        username: "reader".to_string(),
        password: "pw".to_string(),
        name: "app".to_string(),
    };
    let producer = ToolInvocation::new("/bin/sh")
        .args([
            "-c",
            "echo \"$PGHOST|$PGPORT|$PGUSER|$PGPASSWORD|$PGDATABASE|${HOME:-unset}\" >&2",
        ])
        .connect_to(&profile);
    let consumer = ToolInvocation::new("/bin/sh")
        .args(["-c", "while read -r _; do :; done"])
        .connect_to(&ConnectionProfile::dest_default());

    let (mut orchestrator, sink) = orchestrator(producer, consumer);
    let result = orchestrator.run(&CancellationToken::new()).await.unwrap();

    assert!(result.success);
    assert_eq!(
        sink.lines_from(StreamSource::Producer),
        vec!["src.example|5433|reader|pw|app|unset"]
    );
}

#[tokio::test]
async fn cancellation_kills_both_children() {
    let (mut orchestrator, _sink) = orchestrator(sh("exec sleep 60"), sh("exec sleep 60"));
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let outcome = tokio::time::timeout(DEADLINE, orchestrator.run(&cancel))
        .await
        .expect("cancellation must not wait for the children");

    assert!(matches!(outcome, Err(TransferError::Cancelled)));
    assert_eq!(
        orchestrator.state(),
        PipelineState::Completed { success: false }
    );
}

#[tokio::test]
async fn missing_producer_binary_is_a_spawn_error() {
    let (mut orchestrator, _sink) = orchestrator(
        ToolInvocation::new(PathBuf::from("/nonexistent/pg_dump")),
        sh("cat >/dev/null"),
    );

    let outcome = orchestrator.run(&CancellationToken::new()).await;
    match outcome {
        Err(TransferError::Spawn { program, .. }) => assert_eq!(program, "/nonexistent/pg_dump"),
        other => panic!("expected spawn error, got {:?}", other),
    }
}

#[tokio::test]
async fn missing_consumer_binary_stops_the_producer() {
    let (mut orchestrator, _sink) = orchestrator(
        sh("exec sleep 60"),
        ToolInvocation::new(PathBuf::from("/nonexistent/pg_restore")),
    );

    let outcome = tokio::time::timeout(DEADLINE, orchestrator.run(&CancellationToken::new()))
        .await
        .expect("producer must be stopped when the consumer cannot start");

    assert!(matches!(outcome, Err(TransferError::Spawn { .. })));
}
