//! Session establishment with ordered password candidates
//!
//! One full connection attempt (TCP connect + password auth) per candidate,
//! in order. Authentication rejections and other error classes both advance
//! to the next candidate: the run favors availability over fast-fail, so a
//! flaky network never skips a password that might have worked.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use russh::client::{self, Handle, Msg};
use russh::{Channel, Disconnect};
use tokio::time::timeout;
use tracing::{debug, warn};

use super::handler::ClientHandler;
use crate::error::{BatchError, Result};
use crate::events::EventSink;

/// PTY width for interactive shells; wide enough that no prompt ever
/// line-wraps mid-pattern
const PTY_COLS: u32 = 300;
const PTY_ROWS: u32 = 100;

/// An established, authenticated SSH session for one host
pub struct SshSession {
    handle: Handle<ClientHandler>,
    host: String,
}

impl SshSession {
    /// Open a new session channel
    pub async fn open_channel(&self) -> Result<Channel<Msg>> {
        self.handle
            .channel_open_session()
            .await
            .map_err(|e| BatchError::channel(format!("failed to open channel: {}", e)))
    }

    /// Open an interactive PTY shell channel
    pub async fn open_shell(&self) -> Result<Channel<Msg>> {
        let channel = self.open_channel().await?;

        channel
            .request_pty(true, "xterm", PTY_COLS, PTY_ROWS, 0, 0, &[])
            .await
            .map_err(|e| BatchError::channel(format!("failed to request PTY: {}", e)))?;

        channel
            .request_shell(true)
            .await
            .map_err(|e| BatchError::channel(format!("failed to request shell: {}", e)))?;

        debug!("opened PTY shell on {}", self.host);
        Ok(channel)
    }

    /// Close the session gracefully
    pub async fn disconnect(&self) {
        let _ = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "")
            .await;
        debug!("disconnected from {}", self.host);
    }
}

impl std::fmt::Debug for SshSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshSession").field("host", &self.host).finish()
    }
}

/// Why a single candidate attempt did not produce a session
#[derive(Debug)]
pub(crate) enum AttemptError {
    /// The server rejected the password
    Rejected,
    /// Anything else: network unreachable, protocol failure, timeout
    Other(String),
}

/// Try candidates in order until one produces a value.
///
/// Returns the value and the number of attempts made (success at zero-based
/// index k means k+1 attempts). When every candidate fails, returns the
/// total attempt count. Both error classes advance to the next candidate.
pub(crate) async fn first_accepted<T, F, Fut>(
    candidates: &[String],
    mut attempt: F,
) -> std::result::Result<(T, usize), usize>
where
    F: FnMut(usize, String) -> Fut,
    Fut: Future<Output = std::result::Result<T, AttemptError>>,
{
    for (idx, candidate) in candidates.iter().enumerate() {
        match attempt(idx, candidate.clone()).await {
            Ok(value) => return Ok((value, idx + 1)),
            Err(AttemptError::Rejected) => {
                warn!("candidate {} rejected", idx + 1);
            }
            Err(AttemptError::Other(reason)) => {
                warn!("candidate {} attempt error: {}", idx + 1, reason);
            }
        }
    }
    Err(candidates.len())
}

/// Establish an authenticated session, trying login passwords in order.
///
/// Fails with [`BatchError::AuthExhausted`] once the last candidate has
/// been tried. Candidate values are never logged, only their indices.
pub async fn authenticate(
    host: &str,
    port: u16,
    user: &str,
    candidates: &[String],
    connect_timeout: Duration,
    sink: &EventSink,
) -> Result<SshSession> {
    let total = candidates.len();
    let addr = format!("{}:{}", host, port);

    let attempt = |idx: usize, password: String| {
        let addr = addr.clone();
        async move {
            sink.log(format!("connecting... (candidate {}/{})", idx + 1, total));

            let ssh_config = Arc::new(client::Config::default());
            let connect_result = timeout(
                connect_timeout,
                client::connect(ssh_config, addr.as_str(), ClientHandler::new()),
            )
            .await;

            let mut session = match connect_result {
                Ok(Ok(session)) => session,
                Ok(Err(e)) => {
                    sink.log(format!("connection attempt failed: {}", e));
                    return Err(AttemptError::Other(e.to_string()));
                }
                Err(_) => {
                    sink.log(format!(
                        "connection timeout after {}s",
                        connect_timeout.as_secs()
                    ));
                    return Err(AttemptError::Other("connection timeout".to_string()));
                }
            };

            let auth_result = session
                .authenticate_password(user, &password)
                .await
                .map_err(|e| AttemptError::Other(e.to_string()))?;

            if auth_result.success() {
                Ok(session)
            } else {
                Err(AttemptError::Rejected)
            }
        }
    };

    match first_accepted(candidates, attempt).await {
        Ok((handle, attempts)) => {
            sink.log(format!(
                "SSH session established as '{}' ({} attempt(s))",
                user, attempts
            ));
            Ok(SshSession {
                handle,
                host: host.to_string(),
            })
        }
        Err(attempts) => Err(BatchError::AuthExhausted { attempts }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_first_accepted_attempt_count_on_success() {
        // Correct candidate at zero-based index 2: exactly 3 attempts.
        let candidates: Vec<String> = ["a", "b", "good", "d"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let calls = AtomicUsize::new(0);

        let result = first_accepted(&candidates, |_, candidate| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if candidate == "good" {
                    Ok(42)
                } else {
                    Err(AttemptError::Rejected)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), (42, 3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_first_accepted_exhaustion() {
        let candidates: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let calls = AtomicUsize::new(0);

        let result: std::result::Result<((), usize), usize> =
            first_accepted(&candidates, |_, _| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AttemptError::Rejected) }
            })
            .await;

        assert_eq!(result.unwrap_err(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_first_accepted_non_auth_errors_also_advance() {
        // Exhaust-everything policy: network errors do not abort the loop.
        let candidates: Vec<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();

        let result = first_accepted(&candidates, |idx, _| async move {
            if idx == 0 {
                Err(AttemptError::Other("no route to host".to_string()))
            } else {
                Ok("session")
            }
        })
        .await;

        assert_eq!(result.unwrap(), ("session", 2));
    }

    #[tokio::test]
    async fn test_first_accepted_empty_candidates() {
        let result: std::result::Result<((), usize), usize> =
            first_accepted(&[], |_, _| async { Ok(()) }).await;
        assert_eq!(result.unwrap_err(), 0);
    }
}
