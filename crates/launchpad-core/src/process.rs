//! External command execution
//!
//! Thin wrapper over `tokio::process` shared by every CLI adapter. Children
//! are killed when the future is dropped, so a timeout never leaks a process.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Command could not run to completion
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// Program could not be started
    #[error("failed to spawn `{program}`: {reason}")]
    Spawn { program: String, reason: String },

    /// Program outlived its time budget and was killed
    #[error("`{step}` timed out after {}s", .after.as_secs())]
    Timeout { step: String, after: Duration },
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit status; `None` when killed by a signal
    pub status_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    #[inline]
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status_code == Some(0)
    }

    /// Stdout followed by stderr, as a container log would interleave them
    #[must_use]
    pub fn combined(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr),
        }
    }
}

/// Command to run
#[derive(Debug, Clone, Default)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Short label for logs and errors, e.g. `docker build`
    #[must_use]
    pub fn label(&self) -> String {
        match self.args.first() {
            Some(sub) => format!("{} {}", self.program, sub),
            None => self.program.clone(),
        }
    }
}

/// Run a command to completion and capture its output.
///
/// A non-zero exit is not an error here; callers decide.
///
/// # Errors
/// `CommandError::Spawn` if the program cannot start,
/// `CommandError::Timeout` if it outlives `spec.timeout`
pub async fn run_command(spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = &spec.cwd {
        command.current_dir(cwd);
    }

    tracing::debug!(command = %spec.label(), cwd = ?spec.cwd, "running external command");

    let child = command.output();
    let output = match spec.timeout {
        Some(limit) => tokio::time::timeout(limit, child)
            .await
            .map_err(|_| CommandError::Timeout {
                step: spec.label(),
                after: limit,
            })?,
        None => child.await,
    }
    .map_err(|e| CommandError::Spawn {
        program: spec.program.clone(),
        reason: e.to_string(),
    })?;

    Ok(CommandOutput {
        status_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}
