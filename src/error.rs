//! Error types for the batch SSH runner

use thiserror::Error;

use crate::events::TaskStatus;

/// Main error type for batch operations
///
/// Every variant is local to a single host's worker: errors are converted
/// to a terminal [`TaskStatus`] at the worker boundary and never abort the
/// batch or other workers.
#[derive(Debug, Error)]
pub enum BatchError {
    /// No usable login password remained after normalization and merging
    #[error("no login passwords configured")]
    NoCredentials,

    /// SSH connection failed (network, protocol, timeout)
    #[error("SSH connection error: {0}")]
    Connection(String),

    /// Every login password candidate was tried and rejected
    #[error("authentication exhausted after {attempts} attempt(s)")]
    AuthExhausted { attempts: usize },

    /// The `su` password prompt never appeared on the interactive shell
    #[error("su password prompt not detected")]
    EscalationPromptNotFound,

    /// Every escalation password candidate was tried and rejected
    #[error("root escalation exhausted after {attempts} attempt(s)")]
    EscalationExhausted { attempts: usize },

    /// A command channel failed (open, send, or closed mid-stream)
    #[error("command channel error: {0}")]
    CommandChannel(String),

    /// One or more commands in the batch failed; the rest still ran
    #[error("{failed} of {total} command(s) failed")]
    PartialCommandFailure { failed: usize, total: usize },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using BatchError
pub type Result<T> = std::result::Result<T, BatchError>;

impl BatchError {
    /// Create a connection error from a string
    pub fn connection(msg: impl Into<String>) -> Self {
        BatchError::Connection(msg.into())
    }

    /// Create a command channel error from a string
    pub fn channel(msg: impl Into<String>) -> Self {
        BatchError::CommandChannel(msg.into())
    }

    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        BatchError::Config(msg.into())
    }

    /// Terminal status this error maps to at the worker boundary.
    ///
    /// Anything unexpected falls back to `FailLogin`, the conservative
    /// default for a host that produced no usable result.
    pub fn terminal_status(&self) -> TaskStatus {
        match self {
            BatchError::EscalationPromptNotFound | BatchError::EscalationExhausted { .. } => {
                TaskStatus::FailRoot
            }
            BatchError::PartialCommandFailure { .. } => TaskStatus::FailCmd,
            _ => TaskStatus::FailLogin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BatchError::Connection("failed to connect".to_string());
        assert_eq!(err.to_string(), "SSH connection error: failed to connect");

        let err = BatchError::AuthExhausted { attempts: 3 };
        assert_eq!(err.to_string(), "authentication exhausted after 3 attempt(s)");
    }

    #[test]
    fn test_terminal_status_mapping() {
        assert_eq!(
            BatchError::NoCredentials.terminal_status(),
            TaskStatus::FailLogin
        );
        assert_eq!(
            BatchError::AuthExhausted { attempts: 2 }.terminal_status(),
            TaskStatus::FailLogin
        );
        assert_eq!(
            BatchError::EscalationPromptNotFound.terminal_status(),
            TaskStatus::FailRoot
        );
        assert_eq!(
            BatchError::EscalationExhausted { attempts: 1 }.terminal_status(),
            TaskStatus::FailRoot
        );
        assert_eq!(
            BatchError::PartialCommandFailure { failed: 1, total: 3 }.terminal_status(),
            TaskStatus::FailCmd
        );
        assert_eq!(
            BatchError::connection("refused").terminal_status(),
            TaskStatus::FailLogin
        );
    }
}
