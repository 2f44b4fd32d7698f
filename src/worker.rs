//! Per-host worker pipeline
//!
//! resolve credentials → authenticate → (maybe) escalate → run commands.
//! Every failure stays local to this host: the worker boundary converts it
//! to a terminal status plus a transcript line, and the batch moves on.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{RunConfig, COMMAND_TIMEOUT_SECS};
use crate::credentials::ResolvedCredentials;
use crate::error::{BatchError, Result};
use crate::events::{EventSink, TaskStatus};
use crate::hosts::HostTarget;
use crate::ssh::{authenticate, escalate, run_commands, CommandTarget, SshSession};

/// Run the full pipeline for one host, returning its terminal status.
///
/// Never returns `Waiting`/`Running`; unexpected errors map to the
/// conservative `FailLogin` via [`BatchError::terminal_status`].
pub async fn run_host(target: HostTarget, config: Arc<RunConfig>, sink: EventSink) -> TaskStatus {
    sink.log(format!("task started for {}", target.label()));

    match run_pipeline(&target, &config, &sink).await {
        Ok(()) => {
            sink.log("all commands completed");
            TaskStatus::Success
        }
        Err(e) => {
            sink.log(format!("task failed: {}", e));
            e.terminal_status()
        }
    }
}

async fn run_pipeline(
    target: &HostTarget,
    config: &RunConfig,
    sink: &EventSink,
) -> Result<()> {
    let user = target.login_user(&config.default_user);
    let creds = ResolvedCredentials::resolve(target, config);

    // Candidate counts only; values never reach any log.
    sink.log(format!(
        "resolved: user=[{}], login candidates=[{}], root candidates=[{}]",
        user,
        creds.login.len(),
        creds.escalation.len()
    ));

    if creds.login.is_empty() {
        return Err(BatchError::NoCredentials);
    }

    let session = authenticate(
        &target.ip,
        config.ssh_port,
        &user,
        &creds.login,
        config.timeout,
        sink,
    )
    .await?;

    let result = escalate_and_run(&session, &user, &creds, config, sink).await;
    session.disconnect().await;
    result
}

async fn escalate_and_run(
    session: &SshSession,
    user: &str,
    creds: &ResolvedCredentials,
    config: &RunConfig,
    sink: &EventSink,
) -> Result<()> {
    let mut root_shell = None;

    if user == "root" {
        sink.log("configured account is root, skipping escalation");
    } else {
        let whoami = current_user(session).await;
        sink.log(format!("logged in, current user: {}", whoami));

        if whoami.to_lowercase().contains("root") {
            sink.log("already privileged, skipping escalation");
        } else {
            if creds.escalation.is_empty() {
                sink.log("escalation required but no root passwords configured");
                return Err(BatchError::EscalationExhausted { attempts: 0 });
            }
            sink.log("attempting su escalation...");
            let shell = escalate(session, &creds.escalation, &config.su_prompt, sink).await?;
            sink.log("root shell acquired");
            root_shell = Some(shell);
        }
    }

    sink.log(format!("running {} command(s)...", config.commands.len()));
    match root_shell.as_mut() {
        Some(shell) => run_commands(CommandTarget::Interactive(shell), &config.commands, sink).await,
        None => run_commands(CommandTarget::OneShot(session), &config.commands, sink).await,
    }
}

/// `whoami` probe; any failure reads as "unknown" and triggers escalation
/// rather than aborting the task.
async fn current_user(session: &SshSession) -> String {
    match session
        .exec_oneshot("whoami", Duration::from_secs(COMMAND_TIMEOUT_SECS))
        .await
    {
        Ok(output) => {
            let name = output.stdout.trim().to_string();
            if name.is_empty() {
                "unknown".to_string()
            } else {
                name
            }
        }
        Err(_) => "unknown".to_string(),
    }
}
