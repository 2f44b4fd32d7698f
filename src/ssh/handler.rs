//! SSH client handler implementation
//!
//! Implements the `russh::client::Handler` trait to handle SSH connection
//! events.

/// SSH client handler for russh
///
/// Accepts all server keys (trust-on-first-use). Batch runs routinely hit
/// freshly provisioned hosts whose keys are not known anywhere yet; a
/// stricter verification mode would plug in here.
#[derive(Debug, Clone)]
pub struct ClientHandler;

impl ClientHandler {
    /// Create a new SSH handler
    pub fn new() -> Self {
        Self
    }
}

impl Default for ClientHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl russh::client::Handler for ClientHandler {
    type Error = anyhow::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}
