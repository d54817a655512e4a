//! # pgxfer engine
//!
//! Moves a PostgreSQL database between servers by piping `pg_dump` straight
//! into `pg_restore`. Nothing is staged on disk and the dump bytes never pass
//! through this process.
//!
//! A run optionally reinitialises the destination with `dropdb`/`createdb`,
//! then spawns both tools, forwards their diagnostic output line by line to a
//! [`LogSink`], and reports a [`PipelineResult`] whose failure stage follows a
//! fixed rule: a failing consumer is blamed before a failing producer.
//!
//! ```no_run
//! use pgxfer_engine::{Transfer, TransferConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> pgxfer_engine::Result<()> {
//! let transfer = Transfer::with_tracing(TransferConfig::default());
//! let result = transfer.run(&CancellationToken::new()).await?;
//! result.into_result()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod drain;
mod error;
pub mod invocation;
pub mod pipeline;
pub mod prereq;
pub mod profile;
pub mod sink;
mod transfer;

pub use config::{RestoreOptions, ToolPaths, TransferConfig};
pub use drain::{DrainReport, drain, spawn_drain};
pub use error::{Result, SetupFailure, TransferError};
pub use invocation::ToolInvocation;
pub use pipeline::{
    FailureStage, PipelineOrchestrator, PipelineResult, PipelineState, attribute_failure,
};
pub use prereq::PrerequisiteRunner;
pub use process_utils::EnvMode;
pub use profile::{ConnectionProfile, Side};
pub use sink::{LogSink, MemorySink, StreamSource, TracingSink};
pub use transfer::Transfer;
