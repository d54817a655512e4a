//! Error types for a transfer run.

use std::path::Path;

use thiserror::Error;

/// Result type used throughout the engine.
pub type Result<T> = std::result::Result<T, TransferError>;

/// A prerequisite command (`dropdb` / `createdb`) exited unsuccessfully.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("prerequisite `{command}` exited with code {exit_code}")]
pub struct SetupFailure {
    /// Rendered command line that failed.
    pub command: String,
    pub exit_code: i32,
    /// Combined stdout and stderr of the command.
    pub output: String,
}

/// Errors produced by a transfer.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Setup failed: {0}")]
    Setup(#[from] SetupFailure),

    #[error("Producer failed with exit code {exit_code}")]
    Producer { exit_code: i32, diagnostics: String },

    #[error("Consumer failed with exit code {exit_code} (producer exit code: {producer_exit_code})")]
    Consumer {
        exit_code: i32,
        /// Supplementary context only; the consumer's code is the primary one.
        producer_exit_code: i32,
        diagnostics: String,
    },

    /// An internal invariant was violated, e.g. an expected stream handle is
    /// missing. This indicates a defect rather than an operational failure.
    #[error("Stream I/O failure: {0}")]
    StreamIo(String),

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Transfer was cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransferError {
    pub fn spawn(program: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Spawn {
            program: program.as_ref().display().to_string(),
            source,
        }
    }

    pub fn stream_io(msg: impl Into<String>) -> Self {
        Self::StreamIo(msg.into())
    }

    /// Exit code a command-line caller should terminate with.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Producer { exit_code, .. } | Self::Consumer { exit_code, .. } => *exit_code,
            Self::Cancelled => 130,
            _ => 1,
        }
    }
}
