//! Line-by-line forwarding of a child's diagnostic stream.
//!
//! A drain keeps reading until end-of-input no matter what it reads, so the
//! child on the other end of the pipe can never stall on a full buffer.

use std::borrow::Cow;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::sink::{LogSink, StreamSource};

/// Longest line a drain buffers. Longer runs without a newline are forwarded
/// in pieces of this size.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// What a drain saw before its stream ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Number of lines forwarded to the sink.
    pub lines: usize,
    /// The last lines forwarded, oldest first.
    pub tail: Vec<String>,
}

impl DrainReport {
    /// The retained tail joined back into text.
    pub fn excerpt(&self) -> String {
        self.tail.join("\n")
    }
}

/// Read `stream` to end-of-input, forwarding each line to `sink`.
///
/// Lines are forwarded as soon as they are complete, with the trailing `\n`
/// (and a preceding `\r`) stripped. A final line without a terminator is still
/// forwarded, and a line longer than [`MAX_LINE_BYTES`] is split. Bytes that
/// are not valid UTF-8 are replaced rather than treated as an error. At most `tail_lines` of the most recent lines are retained in
/// the returned report.
pub async fn drain<R>(
    stream: R,
    source: StreamSource,
    sink: &dyn LogSink,
    tail_lines: usize,
) -> io::Result<DrainReport>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::with_capacity(256);
    let mut tail = VecDeque::with_capacity(tail_lines.min(64));
    let mut lines = 0usize;

    loop {
        buf.clear();
        if read_line_capped(&mut reader, &mut buf, MAX_LINE_BYTES).await? == 0 {
            break;
        }

        let line = decode_line(&buf);
        sink.line(source, &line);
        lines += 1;

        if tail_lines > 0 {
            if tail.len() == tail_lines {
                tail.pop_front();
            }
            tail.push_back(line.into_owned());
        }
    }

    debug!(stream = %source, lines, "Stream reached end of input");

    Ok(DrainReport {
        lines,
        tail: tail.into(),
    })
}

/// Run [`drain`] as an independent task.
pub fn spawn_drain<R>(
    stream: R,
    source: StreamSource,
    sink: Arc<dyn LogSink>,
    tail_lines: usize,
) -> JoinHandle<io::Result<DrainReport>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move { drain(stream, source, sink.as_ref(), tail_lines).await })
}

/// Like `read_until(b'\n')`, but stops once `max` bytes of content have been
/// read. The terminating newline does not count towards `max`.
async fn read_line_capped<R>(reader: &mut R, buf: &mut Vec<u8>, max: usize) -> io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut read = 0;
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(read);
        }

        let room = max - buf.len();
        match available.iter().position(|&b| b == b'\n') {
            Some(newline) if newline <= room => {
                buf.extend_from_slice(&available[..=newline]);
                reader.consume(newline + 1);
                return Ok(read + newline + 1);
            }
            _ if room == 0 => return Ok(read),
            _ => {
                let used = available.len().min(room);
                buf.extend_from_slice(&available[..used]);
                reader.consume(used);
                read += used;
            }
        }
    }
}

fn decode_line(raw: &[u8]) -> Cow<'_, str> {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw)
}
