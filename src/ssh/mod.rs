//! SSH session layer
//!
//! Per-host sessions: candidate-password authentication, interactive `su`
//! escalation, and command execution channels. Each worker owns exactly one
//! session; nothing here is shared across hosts.

pub mod escalation;
pub mod exec;
pub mod handler;
pub mod session;

// Re-exports
pub use escalation::{escalate, EscalationState};
pub use exec::{run_commands, CommandOutput, CommandTarget};
pub use handler::ClientHandler;
pub use session::{authenticate, SshSession};
