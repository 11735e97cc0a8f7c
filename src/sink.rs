//! Final transcript delivery.
//!
//! The daemon hands every final transcript to a `TextSink`. Stdout is the
//! default; a configured command receives the text on stdin, which is how
//! transcripts reach typing tools like `wtype` or `ydotool type`.

use crate::error::{Result, VoxdError};
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};

/// Destination for final transcripts.
///
/// Object-safe, Send + Sync so the daemon can share one sink across
/// the event consumer and command handlers.
pub trait TextSink: Send + Sync {
    fn deliver(&self, text: &str) -> Result<()>;
}

/// Writes each transcript as a line on stdout.
#[derive(Debug, Clone, Default)]
pub struct StdoutSink;

impl StdoutSink {
    pub fn new() -> Self {
        Self
    }
}

impl TextSink for StdoutSink {
    fn deliver(&self, text: &str) -> Result<()> {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{text}")?;
        stdout.flush()?;
        Ok(())
    }
}

/// Pipes each transcript to a shell command's stdin.
pub struct CommandSink {
    command: String,
}

impl CommandSink {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl TextSink for CommandSink {
    fn deliver(&self, text: &str) -> Result<()> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| VoxdError::Other(format!("failed to spawn `{}`: {e}", self.command)))?;

        if let Some(stdin) = child.stdin.take() {
            let mut stdin = stdin;
            stdin.write_all(text.as_bytes())?;
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VoxdError::Other(format!(
                "output command `{}` exited with {:?}: {}",
                self.command,
                output.status.code(),
                stderr.trim()
            )));
        }
        Ok(())
    }
}

/// Collects transcripts in memory. Test double.
#[derive(Debug, Clone, Default)]
pub struct CollectorSink {
    delivered: Arc<Mutex<Vec<String>>>,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered(&self) -> Vec<String> {
        self.delivered.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

impl TextSink for CollectorSink {
    fn deliver(&self, text: &str) -> Result<()> {
        if let Ok(mut delivered) = self.delivered.lock() {
            delivered.push(text.to_string());
        }
        Ok(())
    }
}
