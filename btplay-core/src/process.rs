//! External process invocation.
//!
//! Every external program btplay touches (the FUSE mount helper, the unmount
//! helper, media players, the metadata downloader) goes through a
//! [`CommandRunner`]. Arguments are handed to the OS as separate argv
//! elements, so file names with spaces or shell metacharacters arrive intact
//! without any quoting layer.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;

/// Program and arguments for a single invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl CommandSpec {
    /// Creates a spec for `program` with no arguments.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments in order.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Name of the program without its directory, for log lines.
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }

    /// Whether any argument equals `path`.
    pub fn has_arg_path(&self, path: &Path) -> bool {
        self.args.iter().any(|arg| Path::new(arg) == path)
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {:?}", arg)?;
        }
        Ok(())
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was terminated by a signal
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Output of a process that exited with status 0 and printed nothing.
    pub fn succeeded() -> Self {
        Self {
            status: Some(0),
            ..Default::default()
        }
    }

    /// Output of a process that exited with `status` and wrote `stderr`.
    pub fn failed(status: i32, stderr: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// True iff the process exited with status 0.
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Human readable exit status.
    pub fn status_text(&self) -> String {
        match self.status {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Errors raised before a process produced an exit status.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Runs external commands to completion.
///
/// Implementations must block the caller until the process exits; btplay
/// never has two external processes in flight.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs the command and captures its exit status, stdout and stderr.
    ///
    /// # Errors
    /// - `ProcessError::Spawn` - Program missing or not executable
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput, ProcessError>;
}

/// [`CommandRunner`] backed by real OS processes.
#[derive(Debug, Default, Clone)]
pub struct SystemCommandRunner;

impl SystemCommandRunner {
    /// Creates a runner that spawns real processes.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput, ProcessError> {
        tracing::debug!("Executing command: {}", command);

        let output = tokio::process::Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| ProcessError::Spawn {
                program: command.program.display().to_string(),
                source,
            })?;

        let captured = CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if captured.success() {
            tracing::debug!("{} finished successfully", command.program_name());
        } else {
            tracing::warn!(
                "{} failed with {}: {}",
                command.program_name(),
                captured.status_text(),
                captured.stderr.trim()
            );
        }

        Ok(captured)
    }
}
