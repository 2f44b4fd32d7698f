//! Host target records and hosts-file loading

use std::path::Path;

use serde::Deserialize;

use crate::credentials::CredentialInput;
use crate::error::{BatchError, Result};

/// One remote host to work on, immutable for the duration of a run
#[derive(Debug, Clone, Deserialize)]
pub struct HostTarget {
    /// Network address (the task identifier for the whole run)
    pub ip: String,

    /// Account to log in as; falls back to the configured default user
    #[serde(default)]
    pub user: Option<String>,

    /// Per-host login password(s): absent, scalar, or list
    #[serde(default)]
    pub pwd: CredentialInput,

    /// Per-host escalation password(s): absent, scalar, or list
    #[serde(default)]
    pub root_pwd: CredentialInput,

    /// Optional display label
    #[serde(default)]
    pub hostname: Option<String>,
}

impl HostTarget {
    /// Account name to use, preferring the host's own over the default
    pub fn login_user(&self, default_user: &str) -> String {
        match self.user.as_deref().map(str::trim) {
            Some(user) if !user.is_empty() => user.to_string(),
            _ => default_user.trim().to_string(),
        }
    }

    /// Label used in output: the hostname when set, the address otherwise
    pub fn label(&self) -> &str {
        self.hostname.as_deref().unwrap_or(&self.ip)
    }
}

/// Load host records from a JSON file (an array of host objects)
pub fn load_hosts(path: &Path) -> Result<Vec<HostTarget>> {
    let data = std::fs::read_to_string(path)?;
    let hosts: Vec<HostTarget> = serde_json::from_str(&data)
        .map_err(|e| BatchError::config(format!("invalid hosts file {}: {}", path.display(), e)))?;
    if hosts.is_empty() {
        return Err(BatchError::config("hosts file contains no hosts"));
    }
    Ok(hosts)
}
