//! Small process-related helpers shared across the workspace.
//!
//! Everything here is about *how* a tool gets launched: which environment it
//! sees, how its output handles are wired, and how its exit status is reported.
//! What the tools actually do is the caller's business.

use std::ffi::OsStr;
use std::io;
use std::process::{ExitStatus, Stdio};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Exit code reported when a status carries neither a code nor a signal.
pub const UNKNOWN_EXIT_CODE: i32 = -1;

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
pub trait NoWindowExt {
    fn no_window(&mut self);
}

impl NoWindowExt for tokio::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// How a spawned tool sees the parent's environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvMode {
    /// The child sees only the variables it was explicitly given.
    #[default]
    Isolated,
    /// The explicit variables are layered over the parent's environment.
    Inherit,
}

/// Create a `tokio::process::Command` whose environment is built from `vars`.
///
/// With [`EnvMode::Isolated`] the inherited environment is cleared first, so
/// the child sees exactly `vars` and nothing else.
pub fn tokio_command_with_env<P, I, K, V>(
    program: P,
    vars: I,
    mode: EnvMode,
) -> tokio::process::Command
where
    P: AsRef<OsStr>,
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<OsStr>,
    V: AsRef<OsStr>,
{
    let mut cmd = tokio::process::Command::new(program);
    cmd.no_window();
    if mode == EnvMode::Isolated {
        cmd.env_clear();
    }
    cmd.envs(vars);
    cmd
}

/// A pipe whose write end is handed to a child as both stdout and stderr.
///
/// The returned reader yields the interleaved output of both streams in the
/// order the child wrote it. The two [`Stdio`] values own the only parent-side
/// copies of the write end: once the `Command` they were given to is dropped,
/// the reader sees end-of-file as soon as the child (and its descendants)
/// close their handles.
pub struct MergedOutput {
    pub reader: tokio::fs::File,
    pub stdout: Stdio,
    pub stderr: Stdio,
}

/// Create a [`MergedOutput`] pipe.
pub fn merged_output_pipe() -> io::Result<MergedOutput> {
    let (reader, writer) = io::pipe()?;
    let stderr = writer.try_clone()?;

    Ok(MergedOutput {
        reader: async_pipe_reader(reader),
        stdout: Stdio::from(writer),
        stderr: Stdio::from(stderr),
    })
}

/// Wrap the read end of an anonymous pipe so it can be consumed from async code.
///
/// Reads are serviced on tokio's blocking pool, which keeps this independent
/// of the platform's non-blocking pipe support.
pub fn async_pipe_reader(reader: io::PipeReader) -> tokio::fs::File {
    #[cfg(unix)]
    let file = std::fs::File::from(std::os::fd::OwnedFd::from(reader));
    #[cfg(windows)]
    let file = std::fs::File::from(std::os::windows::io::OwnedHandle::from(reader));

    tokio::fs::File::from_std(file)
}

/// Normalise an exit status into a shell-style exit code.
///
/// A process killed by a signal reports `128 + signal` on Unix, matching what
/// a POSIX shell would put in `$?`.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    UNKNOWN_EXIT_CODE
}

/// Render a program and its arguments as a single line for log output.
///
/// Arguments containing whitespace or quotes are single-quoted. The result is
/// meant for humans reading logs, not for re-parsing by a shell.
pub fn render_command_line<P, I, S>(program: P, args: I) -> String
where
    P: AsRef<OsStr>,
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut line = program.as_ref().to_string_lossy().into_owned();
    for arg in args {
        let arg = arg.as_ref().to_string_lossy();
        line.push(' ');
        if arg.is_empty() || arg.chars().any(|c| c.is_whitespace() || c == '\'' || c == '"') {
            line.push('\'');
            line.push_str(&arg.replace('\'', r"'\''"));
            line.push('\'');
        } else {
            line.push_str(&arg);
        }
    }
    line
}
