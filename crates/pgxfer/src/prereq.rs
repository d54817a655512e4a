//! Destination reinitialisation commands run before the pipeline starts.

use std::process::Stdio;
use std::sync::Arc;

use process_utils::MergedOutput;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::TransferConfig;
use crate::drain::drain;
use crate::error::{Result, SetupFailure, TransferError};
use crate::invocation::{self, ToolInvocation};
use crate::profile::ConnectionProfile;
use crate::sink::{LogSink, StreamSource};

/// Runs `dropdb` / `createdb` one at a time, each to completion unless
/// cancelled.
pub struct PrerequisiteRunner<'a> {
    config: &'a TransferConfig,
    sink: Arc<dyn LogSink>,
}

impl<'a> PrerequisiteRunner<'a> {
    pub fn new(config: &'a TransferConfig, sink: Arc<dyn LogSink>) -> Self {
        Self { config, sink }
    }

    /// Drop database `name` if it exists. Succeeds when it does not.
    pub async fn drop_if_exists(
        &self,
        profile: &ConnectionProfile,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.run(invocation::dropdb(self.config, profile, name), cancel)
            .await
    }

    /// Create database `name` from `template0`.
    pub async fn create_from_template(
        &self,
        profile: &ConnectionProfile,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.run(invocation::createdb(self.config, profile, name), cancel)
            .await
    }

    /// Drop and then recreate `name`.
    ///
    /// A failed drop skips the create. So does cancellation: nothing new is
    /// started once `cancel` has fired.
    pub async fn reinitialize(
        &self,
        profile: &ConnectionProfile,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        info!(database = %name, host = %profile.host, "Reinitialising destination database");
        self.drop_if_exists(profile, name, cancel).await?;
        self.create_from_template(profile, name, cancel).await
    }

    async fn run(&self, tool: ToolInvocation, cancel: &CancellationToken) -> Result<()> {
        let command_line = tool.command_line();
        if cancel.is_cancelled() {
            warn!("Not running {}: transfer cancelled", command_line);
            return Err(TransferError::Cancelled);
        }
        info!("Running {}", command_line);

        let MergedOutput {
            reader,
            stdout,
            stderr,
        } = process_utils::merged_output_pipe()?;

        let mut cmd = tool.command();
        cmd.stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(true);
        let spawned = cmd.spawn();
        // Release our copies of the output pipe so the reader sees EOF.
        drop(cmd);
        let mut child = spawned.map_err(|e| TransferError::spawn(&tool.program, e))?;

        // Keep the full output; it becomes part of the failure.
        let finished = tokio::select! {
            _ = cancel.cancelled() => None,
            done = async {
                tokio::join!(
                    child.wait(),
                    drain(reader, StreamSource::Prerequisite, self.sink.as_ref(), usize::MAX)
                )
            } => Some(done),
        };

        // Descendants of the tool may still hold the output pipe, so the
        // drain is abandoned rather than awaited.
        let Some((status, report)) = finished else {
            warn!("Transfer cancelled, terminating {}", command_line);
            let _ = child.kill().await;
            return Err(TransferError::Cancelled);
        };
        let status = status?;
        let report = report.map_err(|e| {
            TransferError::stream_io(format!("reading output of {command_line}: {e}"))
        })?;

        if status.success() {
            return Ok(());
        }

        let exit_code = process_utils::exit_code(status);
        error!(exit_code, "{} exited with non-zero status", command_line);
        Err(SetupFailure {
            command: command_line,
            exit_code,
            output: report.excerpt(),
        }
        .into())
    }
}
