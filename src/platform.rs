//! Host platform detection and external command plumbing.
//!
//! Speech, playback and device control all shell out to platform tools. The
//! command lines are built as plain [`CommandSpec`] values so they can be
//! inspected in tests without spawning anything.

use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Operating system family, for choosing platform tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
    Other,
}

impl Platform {
    /// The platform this binary was built for.
    pub fn current() -> Self {
        if cfg!(target_os = "linux") {
            Platform::Linux
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else {
            Platform::Other
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Linux => write!(f, "linux"),
            Platform::MacOs => write!(f, "macos"),
            Platform::Windows => write!(f, "windows"),
            Platform::Other => write!(f, "other"),
        }
    }
}

/// A fully specified external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<Vec<u8>>, // Bytes streamed to the child's stdin
}

/// Captured result of a finished command.
#[derive(Debug)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl CommandSpec {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { program: program.to_string(), args: args.into_iter().map(Into::into).collect(), stdin: None }
    }

    pub fn with_stdin(mut self, input: Vec<u8>) -> Self {
        self.stdin = Some(input);
        self
    }

    /// Printable command line for logs and error messages.
    pub fn display(&self) -> String {
        if self.args.is_empty() { self.program.clone() } else { format!("{} {}", self.program, self.args.join(" ")) }
    }

    /// Run the command to completion, streaming stdin and capturing stdout/stderr.
    ///
    /// # Errors
    /// Returns an I/O error if the process cannot be spawned or waited on.
    /// A non-zero exit is reported through `CommandOutput::success`.
    pub async fn run(&self) -> std::io::Result<CommandOutput> {
        debug!("Running: {}", self.program);

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(if self.stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let writer = match (self.stdin.clone(), child.stdin.take()) {
            (Some(input), Some(mut pipe)) => {
                let program = self.program.clone();
                Some(tokio::spawn(async move {
                    // Exit status carries the error if the child stops reading
                    if let Err(e) = pipe.write_all(&input).await {
                        debug!("{} closed stdin early: {}", program, e);
                    }
                }))
            }
            _ => None,
        };

        let output = child.wait_with_output().await?;
        if let Some(writer) = writer {
            let _ = writer.await;
        }
        Ok(CommandOutput {
            success: output.status.success(),
            stdout: output.stdout,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_joins_arguments() {
        let spec = CommandSpec::new("pactl", ["set-default-sink", "vsink"]);
        assert_eq!(spec.display(), "pactl set-default-sink vsink");
        assert_eq!(CommandSpec::new("say", Vec::<String>::new()).display(), "say");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_streams_stdin_and_captures_stdout() {
        let output = CommandSpec::new("cat", Vec::<String>::new()).with_stdin(b"hello".to_vec()).run().await.unwrap();
        assert!(output.success);
        assert_eq!(output.stdout, b"hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_reports_failure() {
        let output = CommandSpec::new("sh", ["-c", "echo oops >&2; exit 3"]).run().await.unwrap();
        assert!(!output.success);
        assert_eq!(output.stderr, "oops");
    }
}
