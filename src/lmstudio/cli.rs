//! Server process control through the `lms` command-line tool.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;

use crate::config::CliConfig;

/// Failure of a server start or stop command.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// The command could not be launched.
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The command did not finish in time.
    #[error("command timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// The command exited unsuccessfully.
    #[error("command exited with {code}: {stderr}")]
    Failed { code: String, stderr: String },
}

/// Starts and stops the LM Studio server.
#[async_trait]
pub trait ServerControl: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the server could not be started.
    async fn start(&self) -> Result<(), ControlError>;

    /// # Errors
    ///
    /// Returns an error if the server could not be stopped.
    async fn stop(&self) -> Result<(), ControlError>;
}

/// [`ServerControl`] backed by `lms server start|stop`.
#[derive(Debug, Clone)]
pub struct LmsCli {
    program: PathBuf,
    timeout: Duration,
    settle: Duration,
}

impl LmsCli {
    /// Resolve the `lms` binary and build a controller.
    #[must_use]
    pub fn new(config: &CliConfig) -> Self {
        let program = config.binary.clone().unwrap_or_else(locate_lms);
        tracing::debug!(program = %program.display(), "using lms binary");
        Self::with_program(
            program,
            Duration::from_secs(config.timeout_secs),
            Duration::from_millis(config.start_settle_ms),
        )
    }

    /// Controller for an explicit program path.
    #[must_use]
    pub fn with_program(program: impl Into<PathBuf>, timeout: Duration, settle: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
            settle,
        }
    }

    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    async fn server(&self, verb: &str) -> Result<(), ControlError> {
        let program = self.program.display().to_string();
        let child = Command::new(&self.program)
            .args(["server", verb])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ControlError::Spawn {
                program: program.clone(),
                source,
            })?;

        let output = timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ControlError::Timeout {
                timeout_secs: self.timeout.as_secs(),
            })?
            .map_err(|source| ControlError::Spawn { program, source })?;

        if output.status.success() {
            tracing::info!(verb, "lms server command succeeded");
            Ok(())
        } else {
            let code = output
                .status
                .code()
                .map_or_else(|| "signal".to_owned(), |c| format!("status {c}"));
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
            Err(ControlError::Failed { code, stderr })
        }
    }
}

#[async_trait]
impl ServerControl for LmsCli {
    async fn start(&self) -> Result<(), ControlError> {
        self.server("start").await?;
        // The API takes a moment to accept requests after the CLI returns.
        tokio::time::sleep(self.settle).await;
        Ok(())
    }

    async fn stop(&self) -> Result<(), ControlError> {
        self.server("stop").await
    }
}

/// `lms` on `PATH`, else the LM Studio install location, else the bare name.
fn locate_lms() -> PathBuf {
    if let Ok(path) = which::which("lms") {
        return path;
    }
    let exe = if cfg!(windows) { "lms.exe" } else { "lms" };
    if let Some(home) = dirs::home_dir() {
        let bundled = home.join(".lmstudio").join("bin").join(exe);
        if bundled.is_file() {
            return bundled;
        }
    }
    PathBuf::from("lms")
}
