//! Configuration and CLI argument parsing for the batch runner

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use regex::Regex;

use crate::error::{BatchError, Result};

/// Default connection timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Timeout waiting for the initial shell prompt (banner skip)
pub const SHELL_PROMPT_TIMEOUT_SECS: u64 = 5;

/// Timeout waiting for the su password prompt
pub const SU_PROMPT_TIMEOUT_SECS: u64 = 10;

/// Timeout waiting for the su outcome (root prompt or failure keyword)
pub const SU_OUTCOME_TIMEOUT_SECS: u64 = 5;

/// Per-command execution timeout in seconds
pub const COMMAND_TIMEOUT_SECS: u64 = 30;

/// Poll interval for interactive shell reads in milliseconds
pub const SHELL_POLL_INTERVAL_MS: u64 = 500;

/// Default su password prompt pattern (matches localized "password:" forms,
/// with ASCII or fullwidth colon)
pub const DEFAULT_SU_PROMPT: &str = "(Password|密码|password|Passwort).*?[:：]";

/// Batch SSH runner CLI arguments
#[derive(Parser, Debug, Clone)]
#[command(name = "ssh-batch")]
#[command(version)]
#[command(about = "Run a command sequence on many hosts over SSH, with candidate passwords and su escalation")]
pub struct Args {
    /// Path to the hosts file (JSON array of {ip, user, pwd, root_pwd, hostname})
    #[arg(long, env = "SSH_BATCH_HOSTS")]
    pub hosts: PathBuf,

    /// Maximum number of hosts worked on in parallel
    #[arg(long, default_value = "10", env = "SSH_BATCH_MAX_THREADS")]
    pub max_threads: usize,

    /// SSH connection timeout in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS, env = "SSH_BATCH_TIMEOUT")]
    pub timeout: u64,

    /// Account used when a host record has no user of its own
    #[arg(long, default_value = "root", env = "SSH_BATCH_USER")]
    pub user: String,

    /// SSH port for all hosts
    #[arg(long, default_value = "22", env = "SSH_BATCH_PORT")]
    pub port: u16,

    /// Default login password, tried after any per-host passwords (repeatable)
    #[arg(long = "login-password")]
    pub login_passwords: Vec<String>,

    /// Default root (su) password, tried after any per-host root passwords (repeatable)
    #[arg(long = "root-password")]
    pub root_passwords: Vec<String>,

    /// Regex matched against cleaned shell output to detect the su password prompt
    #[arg(long, default_value = DEFAULT_SU_PROMPT, env = "SSH_BATCH_SU_PROMPT")]
    pub su_prompt_regex: String,

    /// Command to run on each host, in order (repeatable)
    #[arg(long = "command", short = 'c')]
    pub commands: Vec<String>,

    /// Flatten ANSI escape sequences out of transcript output
    #[arg(long, default_value = "false")]
    pub no_color: bool,
}

/// Validated, read-only run configuration shared by all workers
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Maximum parallel workers (>= 1)
    pub max_threads: usize,

    /// SSH connection timeout
    pub timeout: Duration,

    /// Default account name
    pub default_user: String,

    /// SSH port for all hosts
    pub ssh_port: u16,

    /// Default login password candidates
    pub login_passwords: Vec<String>,

    /// Default escalation password candidates
    pub root_passwords: Vec<String>,

    /// Compiled su password prompt pattern
    pub su_prompt: Regex,

    /// Commands to run on each host, in order
    pub commands: Vec<String>,
}

impl RunConfig {
    /// Create a RunConfig from CLI args, validating limits and patterns
    pub fn from_args(args: &Args) -> Result<Self> {
        if args.max_threads == 0 {
            return Err(BatchError::config("max_threads must be at least 1"));
        }

        let su_prompt = Regex::new(&args.su_prompt_regex)
            .map_err(|e| BatchError::config(format!("invalid su prompt regex: {}", e)))?;

        Ok(RunConfig {
            max_threads: args.max_threads,
            timeout: Duration::from_secs(args.timeout.max(1)),
            default_user: args.user.trim().to_string(),
            ssh_port: args.port,
            login_passwords: args.login_passwords.clone(),
            root_passwords: args.root_passwords.clone(),
            su_prompt,
            commands: args.commands.clone(),
        })
    }
}
