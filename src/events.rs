//! Status/log events flowing from workers to the single consumer
//!
//! Workers never touch shared state: everything they produce goes through
//! one mpsc channel as immutable [`Event`] values. Per-host emission order
//! is preserved end to end; nothing is promised across hosts.

use chrono::{DateTime, Local};
use tokio::sync::mpsc::UnboundedSender;
use tracing::info;

use crate::ansi::strip_control;

/// Lifecycle status of one host task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    /// Queued, not yet dispatched
    Waiting,
    /// Worker is active on this host
    Running,
    /// All commands completed without error
    Success,
    /// Could not establish an authenticated session
    FailLogin,
    /// Logged in but could not reach a root shell
    FailRoot,
    /// Session was fine but one or more commands failed
    FailCmd,
    /// Cancelled before dispatch
    Stopped,
}

impl TaskStatus {
    /// Whether this status ends the task's lifecycle
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Waiting | TaskStatus::Running)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TaskStatus::Waiting => "waiting",
            TaskStatus::Running => "running",
            TaskStatus::Success => "success",
            TaskStatus::FailLogin => "login failed",
            TaskStatus::FailRoot => "escalation failed",
            TaskStatus::FailCmd => "command errors",
            TaskStatus::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// One transcript line from a host's worker
///
/// `text` may contain raw terminal escape sequences; the consumer decides
/// whether to render or strip them.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub host: String,
    pub timestamp: DateTime<Local>,
    pub text: String,
}

/// Message placed on the event channel by workers and the orchestrator
#[derive(Debug, Clone)]
pub enum Event {
    Status { host: String, status: TaskStatus },
    Log(LogEvent),
    /// Completed/total counters; completed never decreases
    Progress { completed: usize, total: usize },
    /// All dispatched tasks have reached a terminal status
    Done,
}

/// Per-host event emitter handed to each worker
///
/// Log lines are mirrored into `tracing` with escape sequences stripped,
/// so the process-wide log stays readable while transcripts keep their
/// original bytes.
#[derive(Debug, Clone)]
pub struct EventSink {
    host: String,
    tx: UnboundedSender<Event>,
}

impl EventSink {
    pub fn new(host: impl Into<String>, tx: UnboundedSender<Event>) -> Self {
        Self { host: host.into(), tx }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Emit a transcript line for this host
    pub fn log(&self, text: impl Into<String>) {
        let text = text.into();
        info!("[{}] {}", self.host, strip_control(&text));
        // Receiver dropped means the run is being torn down; nothing to do.
        let _ = self.tx.send(Event::Log(LogEvent {
            host: self.host.clone(),
            timestamp: Local::now(),
            text,
        }));
    }

    /// Emit a status change for this host
    pub fn status(&self, status: TaskStatus) {
        let _ = self.tx.send(Event::Status {
            host: self.host.clone(),
            status,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_terminal_statuses() {
        assert!(!TaskStatus::Waiting.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        for status in [
            TaskStatus::Success,
            TaskStatus::FailLogin,
            TaskStatus::FailRoot,
            TaskStatus::FailCmd,
            TaskStatus::Stopped,
        ] {
            assert!(status.is_terminal(), "{status} should be terminal");
        }
    }

    #[tokio::test]
    async fn test_sink_preserves_emission_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EventSink::new("10.0.0.1", tx);

        sink.status(TaskStatus::Running);
        sink.log("first");
        sink.log("second");
        sink.status(TaskStatus::Success);

        assert!(matches!(
            rx.recv().await.unwrap(),
            Event::Status { status: TaskStatus::Running, .. }
        ));
        match rx.recv().await.unwrap() {
            Event::Log(log) => assert_eq!(log.text, "first"),
            other => panic!("unexpected event {other:?}"),
        }
        match rx.recv().await.unwrap() {
            Event::Log(log) => {
                assert_eq!(log.host, "10.0.0.1");
                assert_eq!(log.text, "second");
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(
            rx.recv().await.unwrap(),
            Event::Status { status: TaskStatus::Success, .. }
        ));
    }
}
