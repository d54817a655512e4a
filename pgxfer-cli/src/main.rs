mod cli;
mod config;
mod error;
mod logging;

use std::process::ExitCode;

use clap::Parser;
use pgxfer_engine::{FailureStage, PipelineResult, Transfer};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{cli::Args, config::Settings, logging::init_logging};

#[tokio::main]
async fn main() -> ExitCode {
    // Must run before parsing so `.env` values feed clap's `env` fallbacks.
    dotenvy::dotenv().ok();
    let args = Args::parse();

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            // The subscriber may not be installed yet.
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<ExitCode> {
    let settings = Settings::load(args)?;
    let _guard = init_logging(&settings.log)?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping transfer");
            trigger.cancel();
        }
    });

    let transfer = Transfer::with_tracing(settings.transfer);
    match transfer.run(&cancel).await {
        Ok(result) => Ok(ExitCode::from(report(&result))),
        Err(e) => {
            error!("Transfer did not complete: {}", e);
            Ok(ExitCode::from(clamp_exit_code(e.exit_code())))
        }
    }
}

/// Log the outcome and return the process exit code for it.
fn report(result: &PipelineResult) -> u8 {
    if result.success {
        info!("Transfer completed successfully");
        return 0;
    }

    match result.failure_stage {
        FailureStage::Consumer => error!(
            exit_code = result.consumer_exit_code,
            producer_exit_code = result.producer_exit_code,
            "pg_restore failed"
        ),
        FailureStage::Producer => error!(exit_code = result.producer_exit_code, "pg_dump failed"),
        FailureStage::Setup => error!("Destination setup failed"),
        FailureStage::None => {}
    }
    if !result.diagnostic_excerpt.is_empty() {
        error!("Last diagnostic output:\n{}", result.diagnostic_excerpt);
    }

    match result.failure_stage {
        FailureStage::Setup => 1,
        _ => clamp_exit_code(result.primary_exit_code().unwrap_or(1)),
    }
}

/// Map a failure's exit code into the range a process can report.
/// Anything that would read as success or does not fit becomes 1.
fn clamp_exit_code(code: i32) -> u8 {
    match u8::try_from(code) {
        Ok(0) | Err(_) => 1,
        Ok(code) => code,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_clamped() {
        assert_eq!(clamp_exit_code(2), 2);
        assert_eq!(clamp_exit_code(130), 130);
        assert_eq!(clamp_exit_code(0), 1);
        assert_eq!(clamp_exit_code(-1), 1);
        assert_eq!(clamp_exit_code(300), 1);
    }

    #[test]
    fn consumer_failure_exits_with_consumer_code() {
        let result = PipelineResult {
            producer_exit_code: Some(0),
            consumer_exit_code: Some(2),
            success: false,
            failure_stage: FailureStage::Consumer,
            diagnostic_excerpt: "pg_restore: error: relation exists".to_string(),
            setup_failure: None,
        };
        assert_eq!(report(&result), 2);
    }
}
