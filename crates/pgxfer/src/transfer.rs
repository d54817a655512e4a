//! One complete transfer: optional destination reset, then the pipeline.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::TransferConfig;
use crate::error::{Result, TransferError};
use crate::pipeline::{PipelineOrchestrator, PipelineResult};
use crate::prereq::PrerequisiteRunner;
use crate::sink::{LogSink, TracingSink};

pub struct Transfer {
    config: TransferConfig,
    sink: Arc<dyn LogSink>,
}

impl Transfer {
    pub fn new(config: TransferConfig, sink: Arc<dyn LogSink>) -> Self {
        Self { config, sink }
    }

    /// A transfer whose diagnostics go to `tracing`.
    pub fn with_tracing(config: TransferConfig) -> Self {
        Self::new(config, Arc::new(TracingSink))
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Run the transfer once.
    ///
    /// Failures of the prerequisites, the producer or the consumer are
    /// reported through the returned [`PipelineResult`]. `Err` is reserved for
    /// tools that could not be started, internal I/O failures and
    /// cancellation.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<PipelineResult> {
        let config = &self.config;
        info!(
            source = %format!("{}:{}/{}", config.source.host, config.source.port, config.source.name),
            dest = %format!("{}:{}/{}", config.dest.host, config.dest.port, config.dest.name),
            "Starting transfer"
        );

        if config.init_dest {
            let runner = PrerequisiteRunner::new(config, self.sink.clone());
            match runner
                .reinitialize(&config.dest, &config.dest.name, cancel)
                .await
            {
                Ok(()) => {}
                Err(TransferError::Setup(failure)) => {
                    error!("Destination setup failed, pipeline not started: {}", failure);
                    return Ok(PipelineResult::setup_failed(failure, config.excerpt_lines));
                }
                Err(e) => return Err(e),
            }
        }

        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        PipelineOrchestrator::from_config(config, self.sink.clone())
            .run(cancel)
            .await
    }
}
