//! OS clipboard access through the platform's clipboard commands.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Failure writing the clipboard.
#[derive(Debug, thiserror::Error)]
pub enum ClipboardError {
    #[error("no clipboard command available")]
    Unavailable,

    #[error("clipboard command failed: {0}")]
    Command(String),

    #[error("clipboard command timed out")]
    Timeout,

    #[error("clipboard I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Text clipboard.
#[async_trait]
pub trait Clipboard: Send + Sync {
    /// Current clipboard text, trimmed. Empty when the clipboard is empty,
    /// holds no text, or cannot be read.
    async fn read_text(&self) -> String;

    /// Replace the clipboard contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform command fails.
    async fn write_text(&self, text: &str) -> Result<(), ClipboardError>;
}

/// Clipboard backed by the platform's command-line tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellClipboard;

/// A program and its arguments.
type Invocation = (&'static str, &'static [&'static str]);

/// PowerShell scripts. The console streams default to the OEM code page, so
/// both are switched to UTF-8 before touching the clipboard.
macro_rules! utf8_powershell {
    ($script:literal) => {
        concat!(
            "[Console]::InputEncoding=[Console]::OutputEncoding=[Text.Encoding]::UTF8; ",
            $script
        )
    };
}

#[cfg_attr(not(windows), allow(dead_code))]
const POWERSHELL_READ: &str = utf8_powershell!("Get-Clipboard -Raw");
#[cfg_attr(not(windows), allow(dead_code))]
const POWERSHELL_WRITE: &str = utf8_powershell!("Set-Clipboard -Value ([Console]::In.ReadToEnd())");

#[cfg(windows)]
const READ_COMMANDS: &[Invocation] =
    &[("powershell", &["-NoProfile", "-Command", POWERSHELL_READ])];
#[cfg(windows)]
const WRITE_COMMANDS: &[Invocation] =
    &[("powershell", &["-NoProfile", "-Command", POWERSHELL_WRITE])];

#[cfg(target_os = "macos")]
const READ_COMMANDS: &[Invocation] = &[("pbpaste", &[])];
#[cfg(target_os = "macos")]
const WRITE_COMMANDS: &[Invocation] = &[("pbcopy", &[])];

#[cfg(not(any(windows, target_os = "macos")))]
const READ_COMMANDS: &[Invocation] = &[
    ("wl-paste", &["--no-newline"]),
    ("xclip", &["-selection", "clipboard", "-o"]),
    ("xsel", &["--clipboard", "--output"]),
];
#[cfg(not(any(windows, target_os = "macos")))]
const WRITE_COMMANDS: &[Invocation] = &[
    ("wl-copy", &[]),
    ("xclip", &["-selection", "clipboard"]),
    ("xsel", &["--clipboard", "--input"]),
];

/// First command whose program is installed.
fn available(commands: &'static [Invocation]) -> Option<Invocation> {
    commands
        .iter()
        .copied()
        .find(|(program, _)| which::which(program).is_ok())
}

#[async_trait]
impl Clipboard for ShellClipboard {
    async fn read_text(&self) -> String {
        let Some((program, args)) = available(READ_COMMANDS) else {
            tracing::warn!("no clipboard read command available");
            return String::new();
        };

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();
        match timeout(COMMAND_TIMEOUT, output).await {
            Ok(Ok(output)) if output.status.success() => {
                String::from_utf8_lossy(&output.stdout).trim().to_owned()
            }
            Ok(Ok(output)) => {
                tracing::debug!(program, status = %output.status, "clipboard read failed");
                String::new()
            }
            Ok(Err(e)) => {
                tracing::warn!(program, "clipboard read failed: {e}");
                String::new()
            }
            Err(_) => {
                tracing::warn!(program, "clipboard read timed out");
                String::new()
            }
        }
    }

    async fn write_text(&self, text: &str) -> Result<(), ClipboardError> {
        let (program, args) = available(WRITE_COMMANDS).ok_or(ClipboardError::Unavailable)?;
        let normalized = normalize_line_endings(text, cfg!(windows));

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let bytes = normalized.len();
        let write_and_wait = async move {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(normalized.as_bytes()).await?;
                stdin.shutdown().await?;
            }
            child.wait_with_output().await
        };
        let output = timeout(COMMAND_TIMEOUT, write_and_wait)
            .await
            .map_err(|_| ClipboardError::Timeout)??;

        if output.status.success() {
            tracing::debug!(program, bytes, "clipboard updated");
            Ok(())
        } else {
            Err(ClipboardError::Command(format!(
                "{program} exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

/// Rewrite every line ending as CRLF (`crlf = true`) or LF.
#[must_use]
pub fn normalize_line_endings(text: &str, crlf: bool) -> String {
    let unix = text.replace("\r\n", "\n");
    if crlf { unix.replace('\n', "\r\n") } else { unix }
}
