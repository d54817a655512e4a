//! Destinations for diagnostic lines read from child processes.

use std::fmt;

use parking_lot::Mutex;
use tracing::{info, warn};

/// The stream a diagnostic line was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamSource {
    /// The producer's stderr.
    Producer,
    /// The consumer's merged stdout and stderr.
    Consumer,
    /// Combined output of a prerequisite command.
    Prerequisite,
}

impl StreamSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Producer => "producer",
            Self::Consumer => "consumer",
            Self::Prerequisite => "prerequisite",
        }
    }
}

impl fmt::Display for StreamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An append-only receiver of diagnostic lines.
///
/// Drains for different streams call into the same sink concurrently, so
/// implementations must be safe to share across tasks.
pub trait LogSink: Send + Sync {
    fn line(&self, source: StreamSource, line: &str);
}

/// Forwards every line to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn line(&self, source: StreamSource, line: &str) {
        if line.contains("error") || line.contains("Error") || line.contains("FATAL") {
            warn!(stream = %source, "{}", line);
        } else {
            info!(stream = %source, "{}", line);
        }
    }
}

/// Collects lines in memory, in arrival order.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<(StreamSource, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every line received so far.
    pub fn lines(&self) -> Vec<(StreamSource, String)> {
        self.lines.lock().clone()
    }

    /// Lines received from one source, in order.
    pub fn lines_from(&self, source: StreamSource) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .filter(|(s, _)| *s == source)
            .map(|(_, line)| line.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }
}

impl LogSink for MemorySink {
    fn line(&self, source: StreamSource, line: &str) {
        self.lines.lock().push((source, line.to_string()));
    }
}
