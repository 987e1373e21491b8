//! Session transport layer.
//!
//! [`SessionTransport`] is the seam between the command-execution core and
//! whatever carries text to and from the device. [`SshTransport`] is the
//! russh-backed implementation used in production.

pub mod config;
#[cfg(test)]
pub(crate) mod mock;
mod scp;
mod ssh;

pub use config::{AuthMethod, HostKeyVerification, SshConfig};
pub use ssh::SshTransport;

use std::fmt;
use std::future::Future;
use std::path::Path;

use serde_json::Value;

use crate::error::Result;

/// Shape requested for an encoded response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// Machine-readable JSON result object.
    Json,
    /// Plain text wrapped as `{"output": "..."}`.
    Text,
}

impl Encoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Json => "json",
            Encoding::Text => "text",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A remote CLI session.
///
/// One transport carries one logical CLI session, so every call takes
/// `&mut self`: commands are strictly sequential.
///
/// # Encoded envelopes
///
/// [`send_encoded`](Self::send_encoded) returns one envelope per command,
/// index-aligned with the input. A successful envelope is
/// `{"result": <object>}`; for [`Encoding::Text`] the object is
/// `{"output": "<text>"}`. A command the device refused is
/// `{"errors": ["<device text>", ...]}`. Deciding whether an envelope is a
/// failure is left to [`Classifier`](crate::classify::Classifier).
pub trait SessionTransport: Send {
    /// Open and authenticate the session.
    fn open(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Close the session. Closing a closed transport is a no-op.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Whether the session is currently open.
    fn is_open(&self) -> bool;

    /// Send one command and return the plain text the device printed.
    fn send_timing(&mut self, command: &str) -> impl Future<Output = Result<String>> + Send;

    /// Send commands and return one encoded envelope per command.
    fn send_encoded(
        &mut self,
        commands: &[&str],
        encoding: Encoding,
    ) -> impl Future<Output = Result<Vec<Value>>> + Send;

    /// Stream a local file to `remote` on the device.
    fn transfer_file(
        &mut self,
        local: &Path,
        remote: &str,
    ) -> impl Future<Output = Result<()>> + Send;
}
