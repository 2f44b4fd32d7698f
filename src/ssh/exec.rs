//! Command execution over an established session
//!
//! Two modes. With an escalated interactive shell, each command is chased
//! by a unique sentinel echo so its output can be carved out of the shared
//! stream. Without one, each command gets a fresh exec channel. Either
//! way, one command failing never stops the rest of the batch; the phase
//! is reported as degraded instead.

use std::time::Duration;

use regex::Regex;
use russh::client::Msg;
use russh::{Channel, ChannelMsg};
use tokio::time::timeout;
use tracing::debug;

use super::escalation::read_until;
use super::session::SshSession;
use crate::config::COMMAND_TIMEOUT_SECS;
use crate::error::{BatchError, Result};
use crate::events::EventSink;

/// Output from a one-shot command execution
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<u32>,
}

impl CommandOutput {
    /// Check if the command succeeded (exit code 0 or no exit code available)
    pub fn success(&self) -> bool {
        self.exit_code.is_none_or(|code| code == 0)
    }

    /// Get combined output (stdout + stderr)
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Where commands run: the escalated shell, or fresh exec channels
pub enum CommandTarget<'a> {
    Interactive(&'a mut Channel<Msg>),
    OneShot(&'a SshSession),
}

/// Sentinel for the `seq`-th command of a session. Unique per command so a
/// command whose own output mentions an earlier sentinel cannot confuse
/// the delimiter scan.
pub fn unique_sentinel(seq: usize) -> String {
    format!("CMD_END_{}", seq)
}

/// Strip the echoed command line and sentinel tokens from raw interactive
/// capture, leaving only the command's own output.
pub fn extract_command_output(raw: &str, command: &str, sentinel: &str) -> String {
    raw.replace(&format!("{}; echo {}", command, sentinel), "")
        .replace(sentinel, "")
        .trim()
        .to_string()
}

impl SshSession {
    /// Execute one command on a fresh exec channel, concatenating stdout
    /// and stderr, bounded by `run_timeout`.
    pub async fn exec_oneshot(
        &self,
        command: &str,
        run_timeout: Duration,
    ) -> Result<CommandOutput> {
        let channel = self.open_channel().await?;

        channel
            .exec(true, command)
            .await
            .map_err(|e| BatchError::channel(format!("failed to exec command: {}", e)))?;

        match timeout(run_timeout, collect_channel_output(channel)).await {
            Ok(output) => output,
            Err(_) => Err(BatchError::channel(format!(
                "command timed out after {}s",
                run_timeout.as_secs()
            ))),
        }
    }
}

/// Collect output from an exec channel until it closes
async fn collect_channel_output(mut channel: Channel<Msg>) -> Result<CommandOutput> {
    let mut output = CommandOutput::default();

    while let Some(msg) = channel.wait().await {
        match msg {
            ChannelMsg::Data { data } => {
                output.stdout.push_str(&String::from_utf8_lossy(&data));
            }
            ChannelMsg::ExtendedData { data, ext } => {
                // ext == 1 is stderr
                if ext == 1 {
                    output.stderr.push_str(&String::from_utf8_lossy(&data));
                } else {
                    output.stdout.push_str(&String::from_utf8_lossy(&data));
                }
            }
            ChannelMsg::ExitStatus { exit_status } => {
                output.exit_code = Some(exit_status);
            }
            ChannelMsg::Close | ChannelMsg::Eof => break,
            _ => {}
        }
    }

    debug!(
        "command completed: exit_code={:?}, stdout_len={}, stderr_len={}",
        output.exit_code,
        output.stdout.len(),
        output.stderr.len()
    );

    Ok(output)
}

/// Execute one command on the interactive shell, delimited by `sentinel`
async fn exec_interactive(
    shell: &mut Channel<Msg>,
    command: &str,
    sentinel: &str,
    run_timeout: Duration,
) -> Result<String> {
    shell
        .data(format!("{}; echo {}\n", command, sentinel).as_bytes())
        .await
        .map_err(|e| BatchError::channel(format!("failed to send command: {}", e)))?;

    // The PTY echoes the command line, sentinel included, straight back.
    // Anchoring at line start skips the echo and only matches the sentinel
    // printed once the command has finished.
    let pattern = Regex::new(&format!("(?m)^{}", regex::escape(sentinel)))
        .map_err(|e| BatchError::channel(e.to_string()))?;
    let raw = read_until(shell, &pattern, run_timeout).await;

    if !pattern.is_match(&crate::ansi::strip_control(&raw)) {
        return Err(BatchError::channel(format!(
            "sentinel not seen within {}s",
            run_timeout.as_secs()
        )));
    }

    Ok(extract_command_output(&raw, command, sentinel))
}

/// Run the configured command list against the target, logging each
/// command banner and its captured output.
///
/// Per-command failures are recorded and the remaining commands still run.
/// Returns [`BatchError::PartialCommandFailure`] if any command failed.
pub async fn run_commands(
    mut target: CommandTarget<'_>,
    commands: &[String],
    sink: &EventSink,
) -> Result<()> {
    let run_timeout = Duration::from_secs(COMMAND_TIMEOUT_SECS);
    let mut failed = 0usize;

    for (seq, command) in commands.iter().enumerate() {
        sink.log(format!(">>> CMD: {}", command));

        let result = match &mut target {
            CommandTarget::Interactive(shell) => {
                exec_interactive(shell, command, &unique_sentinel(seq), run_timeout).await
            }
            CommandTarget::OneShot(session) => session
                .exec_oneshot(command, run_timeout)
                .await
                .map(|output| output.combined_output().trim().to_string()),
        };

        match result {
            Ok(output) => sink.log(output),
            Err(e) => {
                failed += 1;
                sink.log(format!("command failed: {}", e));
            }
        }
    }

    if failed > 0 {
        return Err(BatchError::PartialCommandFailure {
            failed,
            total: commands.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_command_output() {
        let raw = "ls; echo CMD_END\nfile1\nCMD_END\n";
        assert_eq!(extract_command_output(raw, "ls", "CMD_END"), "file1");
    }

    #[test]
    fn test_extract_multiline_output() {
        let raw = "ls -l; echo CMD_END_3\ntotal 2\n-rw- a\n-rw- b\nCMD_END_3\n";
        assert_eq!(
            extract_command_output(raw, "ls -l", "CMD_END_3"),
            "total 2\n-rw- a\n-rw- b"
        );
    }

    #[test]
    fn test_extract_empty_output() {
        let raw = "true; echo CMD_END_0\nCMD_END_0\n";
        assert_eq!(extract_command_output(raw, "true", "CMD_END_0"), "");
    }

    #[test]
    fn test_unique_sentinels_differ() {
        assert_ne!(unique_sentinel(0), unique_sentinel(1));
        assert!(unique_sentinel(7).starts_with("CMD_END"));
    }

    #[test]
    fn test_command_output_success() {
        let output = CommandOutput {
            stdout: "hello".to_string(),
            stderr: String::new(),
            exit_code: Some(0),
        };
        assert!(output.success());

        let output = CommandOutput {
            exit_code: Some(1),
            ..Default::default()
        };
        assert!(!output.success());

        // No exit code is treated as success
        assert!(CommandOutput::default().success());
    }

    #[test]
    fn test_command_output_combined() {
        let output = CommandOutput {
            stdout: "out".to_string(),
            stderr: "err".to_string(),
            exit_code: Some(0),
        };
        assert_eq!(output.combined_output(), "out\nerr");

        let output = CommandOutput {
            stdout: "out".to_string(),
            ..Default::default()
        };
        assert_eq!(output.combined_output(), "out");

        let output = CommandOutput {
            stderr: "err".to_string(),
            ..Default::default()
        };
        assert_eq!(output.combined_output(), "err");
    }
}
