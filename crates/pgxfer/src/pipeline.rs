//! The producer → consumer process pipeline.
//!
//! The producer's stdout is connected to the consumer's stdin through a single
//! OS pipe. Payload bytes never pass through this process: once both children
//! are spawned the orchestrator holds no handle to either end of that pipe.
//! Only the diagnostic streams are read here, each by its own drain task.

use std::fmt;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use process_utils::MergedOutput;
use serde::Serialize;
use tokio::process::Child;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{DEFAULT_EXCERPT_LINES, TransferConfig};
use crate::drain::{DrainReport, spawn_drain};
use crate::error::{Result, SetupFailure, TransferError};
use crate::invocation::{self, ToolInvocation};
use crate::sink::{LogSink, StreamSource};

/// Exit code every process must report for the pipeline to succeed.
pub const SUCCESS_EXIT_CODE: i32 = 0;

/// Which part of a transfer caused it to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    None,
    Setup,
    Producer,
    Consumer,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Setup => "setup",
            Self::Producer => "producer",
            Self::Consumer => "consumer",
        };
        f.write_str(name)
    }
}

/// Lifecycle of one orchestrator run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Spawning,
    Running,
    Draining,
    Completed { success: bool },
}

/// Decide which stage a pair of exit codes blames.
///
/// The consumer is checked first: a failed load is attributed to the consumer
/// even if the producer failed too. The producer is only blamed when the
/// consumer succeeded.
pub fn attribute_failure(producer_exit_code: i32, consumer_exit_code: i32) -> FailureStage {
    if consumer_exit_code != SUCCESS_EXIT_CODE {
        FailureStage::Consumer
    } else if producer_exit_code != SUCCESS_EXIT_CODE {
        FailureStage::Producer
    } else {
        FailureStage::None
    }
}

/// Structured outcome of a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineResult {
    /// `None` when the producer never ran.
    pub producer_exit_code: Option<i32>,
    /// `None` when the consumer never ran.
    pub consumer_exit_code: Option<i32>,
    pub success: bool,
    pub failure_stage: FailureStage,
    /// Trailing diagnostic lines of the stage that failed.
    pub diagnostic_excerpt: String,
    /// Set when a prerequisite command failed and the pipeline never started.
    #[serde(skip)]
    pub setup_failure: Option<SetupFailure>,
}

impl PipelineResult {
    /// Build the result of a completed pipeline from both exit codes and the
    /// reports of their diagnostic drains.
    pub fn from_exit_codes(
        producer_exit_code: i32,
        consumer_exit_code: i32,
        producer_diagnostics: &DrainReport,
        consumer_diagnostics: &DrainReport,
    ) -> Self {
        let failure_stage = attribute_failure(producer_exit_code, consumer_exit_code);
        let diagnostic_excerpt = match failure_stage {
            FailureStage::Consumer => consumer_diagnostics.excerpt(),
            FailureStage::Producer => producer_diagnostics.excerpt(),
            _ => String::new(),
        };

        Self {
            producer_exit_code: Some(producer_exit_code),
            consumer_exit_code: Some(consumer_exit_code),
            success: failure_stage == FailureStage::None,
            failure_stage,
            diagnostic_excerpt,
            setup_failure: None,
        }
    }

    /// Result for a transfer whose prerequisites failed.
    pub fn setup_failed(failure: SetupFailure, excerpt_lines: usize) -> Self {
        let lines: Vec<&str> = failure.output.lines().collect();
        let start = lines.len().saturating_sub(excerpt_lines);
        let diagnostic_excerpt = lines[start..].join("\n");

        Self {
            producer_exit_code: None,
            consumer_exit_code: None,
            success: false,
            failure_stage: FailureStage::Setup,
            diagnostic_excerpt,
            setup_failure: Some(failure),
        }
    }

    /// The exit code that explains the failure, if any.
    pub fn primary_exit_code(&self) -> Option<i32> {
        match self.failure_stage {
            FailureStage::None => None,
            FailureStage::Setup => self.setup_failure.as_ref().map(|f| f.exit_code),
            FailureStage::Producer => self.producer_exit_code,
            FailureStage::Consumer => self.consumer_exit_code,
        }
    }

    /// Convert a failed result into the matching error.
    pub fn into_result(self) -> Result<Self> {
        match self.failure_stage {
            FailureStage::None => Ok(self),
            FailureStage::Setup => Err(match self.setup_failure {
                Some(failure) => TransferError::Setup(failure),
                None => TransferError::stream_io("setup failure recorded without details"),
            }),
            FailureStage::Producer => Err(TransferError::Producer {
                exit_code: self.producer_exit_code.unwrap_or(process_utils::UNKNOWN_EXIT_CODE),
                diagnostics: self.diagnostic_excerpt,
            }),
            FailureStage::Consumer => Err(TransferError::Consumer {
                exit_code: self.consumer_exit_code.unwrap_or(process_utils::UNKNOWN_EXIT_CODE),
                producer_exit_code: self
                    .producer_exit_code
                    .unwrap_or(process_utils::UNKNOWN_EXIT_CODE),
                diagnostics: self.diagnostic_excerpt,
            }),
        }
    }
}

/// Spawns a producer and a consumer connected by a pipe and waits for both.
pub struct PipelineOrchestrator {
    producer: ToolInvocation,
    consumer: ToolInvocation,
    sink: Arc<dyn LogSink>,
    excerpt_lines: usize,
    state: PipelineState,
}

impl PipelineOrchestrator {
    pub fn new(producer: ToolInvocation, consumer: ToolInvocation, sink: Arc<dyn LogSink>) -> Self {
        Self {
            producer,
            consumer,
            sink,
            excerpt_lines: DEFAULT_EXCERPT_LINES,
            state: PipelineState::Idle,
        }
    }

    /// `pg_dump` piped into `pg_restore` as described by `config`.
    pub fn from_config(config: &TransferConfig, sink: Arc<dyn LogSink>) -> Self {
        Self::new(invocation::pg_dump(config), invocation::pg_restore(config), sink)
            .with_excerpt_lines(config.excerpt_lines)
    }

    pub fn with_excerpt_lines(mut self, lines: usize) -> Self {
        self.excerpt_lines = lines;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn transition(&mut self, next: PipelineState) {
        debug!(from = ?self.state, to = ?next, "Pipeline state change");
        self.state = next;
    }

    /// Run the pipeline to completion.
    ///
    /// Failures of either child are reported through the returned
    /// [`PipelineResult`], never by terminating the sibling early. If `cancel`
    /// fires, both children are killed and [`TransferError::Cancelled`] is
    /// returned once their output has been drained.
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<PipelineResult> {
        self.transition(PipelineState::Spawning);
        let (mut producer, mut consumer, producer_stderr, consumer_output) =
            match self.spawn_children().await {
                Ok(spawned) => spawned,
                Err(e) => {
                    self.transition(PipelineState::Completed { success: false });
                    return Err(e);
                }
            };

        // Drains must be reading before anything waits on the children.
        self.transition(PipelineState::Running);
        let producer_drain = spawn_drain(
            producer_stderr,
            StreamSource::Producer,
            self.sink.clone(),
            self.excerpt_lines,
        );
        let consumer_drain = spawn_drain(
            consumer_output,
            StreamSource::Consumer,
            self.sink.clone(),
            self.excerpt_lines,
        );

        self.transition(PipelineState::Draining);
        let waited = tokio::select! {
            _ = cancel.cancelled() => None,
            statuses = async { tokio::join!(producer.wait(), consumer.wait()) } => Some(statuses),
        };

        let Some((producer_status, consumer_status)) = waited else {
            warn!("Transfer cancelled, terminating producer and consumer");
            let _ = tokio::join!(producer.kill(), consumer.kill());
            let _ = tokio::join!(producer_drain, consumer_drain);
            self.transition(PipelineState::Completed { success: false });
            return Err(TransferError::Cancelled);
        };

        let (producer_report, consumer_report) = tokio::join!(producer_drain, consumer_drain);
        let result = match settle_run(
            producer_status,
            consumer_status,
            producer_report,
            consumer_report,
        ) {
            Ok(result) => result,
            Err(e) => {
                self.transition(PipelineState::Completed { success: false });
                return Err(e);
            }
        };

        self.log_outcome(&result);
        self.transition(PipelineState::Completed {
            success: result.success,
        });
        Ok(result)
    }

    /// Spawn both children and return them with their diagnostic streams.
    ///
    /// On return the orchestrator owns no handle to the payload pipe.
    async fn spawn_children(
        &self,
    ) -> Result<(Child, Child, tokio::process::ChildStderr, tokio::fs::File)> {
        // Create every pipe up front so a failure here leaves nothing running.
        let (payload_reader, payload_writer) = io::pipe()?;
        let MergedOutput {
            reader: consumer_output,
            stdout: consumer_stdout,
            stderr: consumer_stderr,
        } = process_utils::merged_output_pipe()?;

        info!("Starting producer: {}", self.producer);
        let mut producer_cmd = self.producer.command();
        producer_cmd
            .kill_on_drop(true)
            .stdin(Stdio::null())
            .stdout(payload_writer)
            .stderr(Stdio::piped());
        let spawned = producer_cmd.spawn();
        // The command holds our copy of the payload write end. It must be
        // closed now, otherwise an early consumer exit never reaches the
        // producer as a broken pipe and the producer can block forever.
        drop(producer_cmd);
        let mut producer = spawned.map_err(|e| TransferError::spawn(&self.producer.program, e))?;

        info!("Starting consumer: {}", self.consumer);
        let mut consumer_cmd = self.consumer.command();
        consumer_cmd
            .kill_on_drop(true)
            .stdin(payload_reader)
            .stdout(consumer_stdout)
            .stderr(consumer_stderr);
        let spawned = consumer_cmd.spawn();
        drop(consumer_cmd);
        let mut consumer = match spawned {
            Ok(child) => child,
            Err(e) => {
                error!("Failed to start consumer, stopping producer");
                let _ = producer.kill().await;
                return Err(TransferError::spawn(&self.consumer.program, e));
            }
        };

        let Some(producer_stderr) = producer.stderr.take() else {
            let _ = tokio::join!(producer.kill(), consumer.kill());
            return Err(TransferError::stream_io("producer stderr handle is missing"));
        };

        Ok((producer, consumer, producer_stderr, consumer_output))
    }

    fn log_outcome(&self, result: &PipelineResult) {
        let producer_exit_code = result.producer_exit_code.unwrap_or_default();
        let consumer_exit_code = result.consumer_exit_code.unwrap_or_default();
        match result.failure_stage {
            FailureStage::None => info!("Producer and consumer both exited successfully"),
            FailureStage::Consumer => error!(
                exit_code = consumer_exit_code,
                producer_exit_code,
                "Consumer exited with non-zero status"
            ),
            FailureStage::Producer => {
                error!(exit_code = producer_exit_code, "Producer exited with non-zero status")
            }
            FailureStage::Setup => {}
        }
    }
}

/// Combine both exit statuses and both drain outcomes into a result.
///
/// Any error here is an I/O failure of the orchestrator itself, not of the
/// children, and takes precedence over their exit codes.
fn settle_run(
    producer_status: io::Result<ExitStatus>,
    consumer_status: io::Result<ExitStatus>,
    producer_report: std::result::Result<io::Result<DrainReport>, JoinError>,
    consumer_report: std::result::Result<io::Result<DrainReport>, JoinError>,
) -> Result<PipelineResult> {
    let producer_exit_code = process_utils::exit_code(producer_status?);
    let consumer_exit_code = process_utils::exit_code(consumer_status?);
    let producer_report = settle_drain(producer_report, StreamSource::Producer)?;
    let consumer_report = settle_drain(consumer_report, StreamSource::Consumer)?;

    Ok(PipelineResult::from_exit_codes(
        producer_exit_code,
        consumer_exit_code,
        &producer_report,
        &consumer_report,
    ))
}

fn settle_drain(
    joined: std::result::Result<io::Result<DrainReport>, JoinError>,
    source: StreamSource,
) -> Result<DrainReport> {
    match joined {
        Ok(Ok(report)) => Ok(report),
        Ok(Err(e)) => Err(TransferError::stream_io(format!(
            "reading {source} diagnostics: {e}"
        ))),
        Err(e) => Err(TransferError::stream_io(format!(
            "{source} drain task did not complete: {e}"
        ))),
    }
}
