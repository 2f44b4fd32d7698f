//! Privilege escalation through an interactive `su` shell
//!
//! The escalation is an explicit state machine driven by pattern matching
//! on the shell's output stream. Every read is a bounded poll that returns
//! whatever accumulated when the deadline passes; an absent pattern is a
//! semantic failure decided by the state machine, never a thrown fault.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use russh::client::Msg;
use russh::{Channel, ChannelMsg};

use crate::ansi::strip_control;
use crate::config::{
    SHELL_POLL_INTERVAL_MS, SHELL_PROMPT_TIMEOUT_SECS, SU_OUTCOME_TIMEOUT_SECS,
    SU_PROMPT_TIMEOUT_SECS,
};
use crate::error::{BatchError, Result};
use crate::events::EventSink;

/// Unprivileged shell prompt: `$` or `>` at the end of the buffer. Used to
/// skip login banners before issuing `su`.
static SHELL_PROMPT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[$>] ?$").unwrap());

/// Anything worth waking up for after a password was sent: the root prompt
/// marker or a localized authentication-failure keyword.
static OUTCOME_MARKERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("(#|failure|认证失败|鉴定故障|incorrect)").unwrap());

/// Localized `su` failure keywords
static FAILURE_KEYWORDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("(?i)(failure|认证失败|鉴定故障|incorrect)").unwrap());

/// States of the `su` escalation machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationState {
    Init,
    AwaitShellPrompt,
    SwitchIssued,
    AwaitPasswordPrompt,
    PasswordSent,
    AwaitOutcome,
    /// A candidate was rejected; `su` is re-issued for the next one
    RetryCandidate,
    Escalated,
    Failed,
}

/// Verdict on one cleaned outcome chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// Root prompt present, no failure keyword alongside it
    Escalated,
    /// Failure keyword seen, or nothing conclusive before the deadline
    Rejected,
}

/// Classify an ANSI-stripped outcome chunk. Success requires the `#`
/// marker present AND no failure keyword in the same chunk: `su` echoes
/// a failure message and then a fresh prompt fast enough that both can
/// land in one read.
pub(crate) fn classify_outcome(clean: &str) -> Outcome {
    if clean.contains('#') && !FAILURE_KEYWORDS.is_match(clean) {
        Outcome::Escalated
    } else {
        Outcome::Rejected
    }
}

/// Read from the channel until the cleaned buffer matches `pattern` or the
/// deadline passes, whichever comes first. On timeout the accumulated
/// buffer is returned as-is.
pub(crate) async fn read_until(
    channel: &mut Channel<Msg>,
    pattern: &Regex,
    read_timeout: Duration,
) -> String {
    let mut buffer = String::new();
    let deadline = tokio::time::Instant::now() + read_timeout;
    let poll = Duration::from_millis(SHELL_POLL_INTERVAL_MS);

    while tokio::time::Instant::now() < deadline {
        match tokio::time::timeout(poll, channel.wait()).await {
            Ok(Some(ChannelMsg::Data { data })) => {
                buffer.push_str(&String::from_utf8_lossy(&data));
                if pattern.is_match(&strip_control(&buffer)) {
                    return buffer;
                }
            }
            Ok(Some(ChannelMsg::ExtendedData { data, .. })) => {
                buffer.push_str(&String::from_utf8_lossy(&data));
                if pattern.is_match(&strip_control(&buffer)) {
                    return buffer;
                }
            }
            // Channel gone: nothing more will arrive, hand back what we have.
            Ok(Some(ChannelMsg::Close)) | Ok(None) => return buffer,
            Ok(Some(_)) => {}
            Err(_) => {}
        }
    }
    buffer
}

/// Drive an interactive shell to a root prompt via `su -`, trying
/// escalation candidates in order.
///
/// Returns the escalated shell channel on success. The password prompt not
/// appearing at all is [`BatchError::EscalationPromptNotFound`]; running
/// out of candidates is [`BatchError::EscalationExhausted`].
pub async fn escalate(
    session: &super::session::SshSession,
    candidates: &[String],
    su_prompt: &Regex,
    sink: &EventSink,
) -> Result<Channel<Msg>> {
    let mut channel: Option<Channel<Msg>> = None;
    let mut state = EscalationState::Init;
    let mut candidate_idx = 0usize;
    let mut first_prompt = true;

    loop {
        state = match state {
            EscalationState::Init => {
                channel = Some(session.open_shell().await?);
                EscalationState::AwaitShellPrompt
            }

            EscalationState::AwaitShellPrompt => {
                let shell = channel.as_mut().ok_or_else(|| BatchError::channel("shell not open"))?;
                // Banner text is discarded; only the prompt matters.
                read_until(
                    shell,
                    &SHELL_PROMPT,
                    Duration::from_secs(SHELL_PROMPT_TIMEOUT_SECS),
                )
                .await;
                EscalationState::SwitchIssued
            }

            EscalationState::SwitchIssued => {
                let shell = channel.as_mut().ok_or_else(|| BatchError::channel("shell not open"))?;
                shell
                    .data(b"su -\n".as_slice())
                    .await
                    .map_err(|e| BatchError::channel(format!("failed to send su: {}", e)))?;
                EscalationState::AwaitPasswordPrompt
            }

            EscalationState::AwaitPasswordPrompt => {
                let shell = channel.as_mut().ok_or_else(|| BatchError::channel("shell not open"))?;
                let buffer = read_until(
                    shell,
                    su_prompt,
                    Duration::from_secs(SU_PROMPT_TIMEOUT_SECS),
                )
                .await;

                if !su_prompt.is_match(&strip_control(&buffer)) && first_prompt {
                    sink.log("su password prompt not detected");
                    return Err(BatchError::EscalationPromptNotFound);
                }
                // On retries a missing prompt is tolerated; the next
                // outcome read decides.
                first_prompt = false;
                EscalationState::PasswordSent
            }

            EscalationState::PasswordSent => {
                if candidate_idx >= candidates.len() {
                    EscalationState::Failed
                } else {
                    let shell =
                        channel.as_mut().ok_or_else(|| BatchError::channel("shell not open"))?;
                    let password = &candidates[candidate_idx];
                    shell
                        .data(format!("{}\n", password).as_bytes())
                        .await
                        .map_err(|e| BatchError::channel(format!("failed to send password: {}", e)))?;
                    EscalationState::AwaitOutcome
                }
            }

            EscalationState::AwaitOutcome => {
                let shell = channel.as_mut().ok_or_else(|| BatchError::channel("shell not open"))?;
                let buffer = read_until(
                    shell,
                    &OUTCOME_MARKERS,
                    Duration::from_secs(SU_OUTCOME_TIMEOUT_SECS),
                )
                .await;

                match classify_outcome(&strip_control(&buffer)) {
                    Outcome::Escalated => EscalationState::Escalated,
                    Outcome::Rejected => {
                        sink.log(format!(
                            "root candidate {}/{} rejected",
                            candidate_idx + 1,
                            candidates.len()
                        ));
                        candidate_idx += 1;
                        EscalationState::RetryCandidate
                    }
                }
            }

            EscalationState::RetryCandidate => {
                if candidate_idx >= candidates.len() {
                    EscalationState::Failed
                } else {
                    EscalationState::SwitchIssued
                }
            }

            EscalationState::Escalated => {
                return channel.ok_or_else(|| BatchError::channel("shell not open"));
            }

            EscalationState::Failed => {
                return Err(BatchError::EscalationExhausted {
                    attempts: candidates.len(),
                });
            }
        };
    }
}
