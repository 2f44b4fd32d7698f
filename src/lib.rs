//! ssh-batch - run a command sequence across many hosts over SSH
//!
//! This crate authenticates against each host with an ordered list of
//! password candidates, optionally escalates to root through an
//! interactive `su` shell by scanning terminal output for password
//! prompts, runs a configured command list, and reports a per-host
//! terminal status plus a full transcript.
//!
//! # Features
//!
//! - Ordered, deduplicated credential merging (per-host overrides first)
//! - Exhaust-everything password loop: rejections and network errors both
//!   advance to the next candidate
//! - `su` escalation driven by an explicit state machine over the PTY
//!   stream, with localized prompt and failure patterns
//! - Sentinel-delimited command capture on the escalated shell, fresh exec
//!   channels otherwise; one failed command degrades but never aborts
//! - Bounded concurrency with cooperative cancellation and per-host event
//!   ordering
//! - ANSI SGR rendering of captured transcripts (color/bold only)
//!
//! # Example Usage (CLI)
//!
//! ```bash
//! ssh-batch --hosts hosts.json --login-password secret \
//!   --root-password rootpw -c "whoami" -c "uptime"
//! ```

pub mod ansi;
pub mod config;
pub mod credentials;
pub mod error;
pub mod events;
pub mod hosts;
pub mod orchestrator;
pub mod ssh;
pub mod worker;

// Re-exports for convenience
pub use ansi::{AnsiRenderer, Color, Span, Style};
pub use config::{Args, RunConfig};
pub use credentials::{CredentialInput, ResolvedCredentials};
pub use error::{BatchError, Result};
pub use events::{Event, EventSink, LogEvent, TaskStatus};
pub use hosts::{load_hosts, HostTarget};
pub use orchestrator::{Orchestrator, TaskState, TaskStateStore};
pub use ssh::{authenticate, escalate, run_commands, CommandOutput, SshSession};
