//! Credential normalization and merging
//!
//! Host files in the wild carry passwords as a string, a bare number, a
//! list of either, or nothing at all. Everything funnels through
//! [`CredentialInput::normalize`] so the rest of the crate only ever sees
//! an ordered `Vec<String>`.

use serde::Deserialize;
use serde_json::Value;

use crate::config::RunConfig;
use crate::hosts::HostTarget;

/// A raw credential value of arbitrary shape, as found in a host record
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(untagged)]
pub enum CredentialInput {
    /// Field missing or explicitly null
    #[default]
    Absent,
    /// A list of scalars, possibly mixed types with blanks.
    /// Tried before `Single`: a bare `Value` matches any JSON shape.
    Many(Vec<Value>),
    /// A single scalar (string, number, bool)
    Single(Value),
}

impl CredentialInput {
    /// Normalize to an ordered list of trimmed, non-empty strings.
    ///
    /// Absent/null yields an empty list; a scalar yields one element; list
    /// elements are converted to their textual form, trimmed, and dropped
    /// when empty. Element order is preserved.
    pub fn normalize(&self) -> Vec<String> {
        let values: &[Value] = match self {
            CredentialInput::Absent => &[],
            CredentialInput::Single(v) => std::slice::from_ref(v),
            CredentialInput::Many(vs) => vs.as_slice(),
        };

        values.iter().filter_map(value_to_string).collect()
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Concatenate host-specific candidates before defaults, deduplicating
/// while keeping the first occurrence of each value.
pub fn merge_candidates(host: &[String], defaults: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(host.len() + defaults.len());
    for candidate in host.iter().chain(defaults.iter()) {
        if !merged.contains(candidate) {
            merged.push(candidate.clone());
        }
    }
    merged
}

/// Ordered, deduplicated credential lists for one host, computed once per task
#[derive(Debug, Clone)]
pub struct ResolvedCredentials {
    /// Login password candidates, host overrides first
    pub login: Vec<String>,
    /// su escalation password candidates, host overrides first
    pub escalation: Vec<String>,
}

impl ResolvedCredentials {
    /// Resolve a host's credentials against the global defaults.
    ///
    /// An empty `login` list is the caller's `NoCredentials` condition; an
    /// empty `escalation` list only matters if escalation is later needed.
    pub fn resolve(target: &HostTarget, config: &RunConfig) -> Self {
        ResolvedCredentials {
            login: merge_candidates(&target.pwd.normalize(), &config.login_passwords),
            escalation: merge_candidates(&target.root_pwd.normalize(), &config.root_passwords),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input(v: Value) -> CredentialInput {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_normalize_absent() {
        assert!(CredentialInput::Absent.normalize().is_empty());
        assert!(input(json!(null)).normalize().is_empty());
    }

    #[test]
    fn test_normalize_scalar() {
        assert_eq!(input(json!("secret")).normalize(), vec!["secret"]);
        assert_eq!(input(json!(123456)).normalize(), vec!["123456"]);
        assert_eq!(input(json!("  padded  ")).normalize(), vec!["padded"]);
    }

    #[test]
    fn test_normalize_mixed_list_with_blanks() {
        let raw = input(json!(["a", null, 42, "  ", "b ", true]));
        assert_eq!(raw.normalize(), vec!["a", "42", "b", "true"]);
    }

    #[test]
    fn test_normalize_preserves_order() {
        let raw = input(json!(["z", "a", "m"]));
        assert_eq!(raw.normalize(), vec!["z", "a", "m"]);
    }

    #[test]
    fn test_merge_host_before_defaults() {
        let merged = merge_candidates(
            &["h1".into(), "h2".into()],
            &["d1".into(), "d2".into()],
        );
        assert_eq!(merged, vec!["h1", "h2", "d1", "d2"]);
    }

    #[test]
    fn test_merge_dedup_keeps_first_position() {
        let merged = merge_candidates(
            &["shared".into(), "h".into()],
            &["d".into(), "shared".into()],
        );
        assert_eq!(merged, vec!["shared", "h", "d"]);
    }

    #[test]
    fn test_merge_both_empty() {
        assert!(merge_candidates(&[], &[]).is_empty());
    }
}
