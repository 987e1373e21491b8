//! Error types for ferrinet.
//!
//! Every error raised because a device rejected something carries the
//! literal command text and the device's own output verbatim, so an
//! operator can match the message against an unfamiliar CLI.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::driver::{Acknowledgement, BootStage};

/// Main error type for ferrinet operations.
#[derive(Error, Debug)]
pub enum Error {
    /// SSH transport-level errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Channel operation errors
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// A single command failed classification
    #[error(transparent)]
    Command(#[from] CommandError),

    /// A command inside a sequence failed classification
    #[error(transparent)]
    CommandList(#[from] CommandListError),

    /// Configuration rollback failed
    #[error(transparent)]
    Rollback(#[from] RollbackError),

    /// Reboot requested with an unsupported timer
    #[error(transparent)]
    RebootTimer(#[from] RebootTimerError),

    /// Boot image could not be located or installed
    #[error(transparent)]
    BootImage(#[from] BootImageError),

    /// Post-change verification did not match
    #[error(transparent)]
    Verification(#[from] VerificationError),

    /// File copy to device storage failed
    #[error(transparent)]
    FileTransfer(#[from] FileTransferError),

    /// Driver-level errors
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// Platform/vendor errors
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Local I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Whether this error means the session went away underneath us.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            Error::Transport(TransportError::Disconnected) | Error::Channel(ChannelError::Closed)
        )
    }
}

/// Transport layer errors (SSH connection, authentication).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to connect to host
    #[error("Connection failed to {host}:{port}: {source}")]
    ConnectionFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// SSH handshake or protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Authentication failed
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// SSH key error
    #[error("SSH key error: {0}")]
    Key(String),

    /// Host key does not match the one recorded in known_hosts
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// Host not present in known_hosts and strict checking is on
    #[error("Host key for {host}:{port} is unknown")]
    HostKeyUnknown { host: String, port: u16 },

    /// known_hosts could not be read or written
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// The remote SCP sink refused the upload
    #[error("SCP to '{remote}' failed: {message}")]
    Scp { remote: String, message: String },

    /// Connection was closed unexpectedly
    #[error("Connection disconnected")]
    Disconnected,

    /// Operation timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Channel layer errors (pattern matching, PTY operations).
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Failed to open PTY channel
    #[error("Failed to open PTY channel")]
    PtyOpenFailed,

    /// Failed to request shell
    #[error("Failed to request shell")]
    ShellRequestFailed,

    /// Pattern matching timed out
    #[error("Pattern not found within {0:?}")]
    PatternTimeout(Duration),

    /// Channel closed unexpectedly
    #[error("Channel closed")]
    Closed,

    /// SSH protocol error on the channel
    #[error("Channel SSH error: {0}")]
    Ssh(russh::Error),

    /// Invalid regex pattern
    #[error("Invalid regex pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// A single command's response failed classification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Command '{command}' failed: {message}")]
pub struct CommandError {
    /// The command as it was sent.
    pub command: String,
    /// Device-reported reason, verbatim.
    pub message: String,
}

impl CommandError {
    pub fn new(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            message: message.into(),
        }
    }
}

/// A command in a sequence failed classification.
///
/// Commands before `index` were sent and accepted; commands after it were
/// never sent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "Command '{command}' (index {index} of {total}) failed: {message}",
    total = .commands.len()
)]
pub struct CommandListError {
    /// The full input sequence.
    pub commands: Vec<String>,
    /// Zero-based position of the failing command.
    pub index: usize,
    /// The failing command.
    pub command: String,
    /// Device-reported reason, verbatim.
    pub message: String,
}

impl CommandListError {
    /// Commands that were accepted before the failure.
    pub fn accepted(&self) -> &[String] {
        &self.commands[..self.index]
    }
}

/// Why a rollback was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackFailure {
    /// The named checkpoint does not exist on the device.
    CheckpointMissing,
    /// The device rejected the replace for another reason.
    Rejected,
}

impl fmt::Display for RollbackFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RollbackFailure::CheckpointMissing => f.write_str("checkpoint missing"),
            RollbackFailure::Rejected => f.write_str("rejected"),
        }
    }
}

/// Rollback target checkpoint does not exist or was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Rollback to '{checkpoint}' unsuccessful ({kind}): '{command}': {message}")]
pub struct RollbackError {
    pub checkpoint: String,
    pub kind: RollbackFailure,
    pub command: String,
    pub message: String,
}

/// Reboot requested with a delay the platform cannot honour.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Reboot timer {timer:?} not supported on {platform}; only immediate reboot is available")]
pub struct RebootTimerError {
    pub platform: String,
    pub timer: Duration,
}

/// Boot-image state machine failures before verification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BootImageError {
    /// No storage root could be parsed from the directory listing.
    #[error("Unable to determine file system from '{command}': {output}")]
    FileSystemNotFound { command: String, output: String },

    /// The requested image is not present on the storage root.
    #[error("Image '{image}' not found in {file_system} ('{command}')")]
    ImageNotFound {
        image: String,
        file_system: String,
        command: String,
    },

    /// The device rejected a command while leaving `stage`.
    #[error("Boot image change to '{image}' failed at {stage}: {source}")]
    StageFailed {
        image: String,
        stage: BootStage,
        #[source]
        source: CommandError,
    },
}

/// Post-change verification failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    /// Boot configuration does not reference the installed image.
    #[error(
        "Boot image verification failed after '{command}' ({install}): expected '{expected}', device reports '{actual}'"
    )]
    BootImageMismatch {
        command: String,
        expected: String,
        actual: String,
        install: Acknowledgement,
    },

    /// Device came back from reload without the requested image.
    #[error("{host} did not boot '{image}' after install")]
    ImageNotBooted { host: String, image: String },
}

/// File copy protocol failures.
#[derive(Error, Debug)]
pub enum FileTransferError {
    /// The local source could not be read.
    #[error("Cannot read local file {path}: {source}")]
    LocalFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The transport failed while streaming the file.
    #[error("Transfer of {local} to '{remote}' failed: {message}")]
    Transfer {
        local: PathBuf,
        remote: String,
        message: String,
    },

    /// Copy completed but the file is not present afterwards.
    #[error("Attempted file copy, but '{remote}' does not exist after transfer")]
    MissingAfterTransfer { remote: String },

    /// Copy completed but the remote digest does not match the local one.
    #[error(
        "Attempted file copy, but '{remote}' does not match local file after transfer (local {local_digest}, remote {remote_digest})"
    )]
    MismatchAfterTransfer {
        remote: String,
        local_digest: String,
        remote_digest: String,
    },
}

/// Driver layer errors.
#[derive(Error, Debug)]
pub enum DriverError {
    /// Driver not connected
    #[error("Driver not connected - call open() first")]
    NotConnected,

    /// Driver already connected
    #[error("Driver already connected")]
    AlreadyConnected,

    /// Invalid configuration in the device builder
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Structured output did not have the expected shape
    #[error("Unexpected response to '{command}': {message}")]
    UnexpectedResponse { command: String, message: String },

    /// Device did not come back after a reload
    #[error("{host} did not come back within {wait:?} after reload")]
    RebootTimeout { host: String, wait: Duration },
}

/// Platform/vendor definition errors.
#[derive(Error, Debug)]
pub enum PlatformError {
    /// Invalid platform definition
    #[error("Invalid platform definition: {message}")]
    InvalidDefinition { message: String },
}

/// Result type alias using ferrinet's Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_error_message_contains_command_and_output() {
        let err = CommandError::new("asdf poknw", "% Invalid input (at token 0: 'asdf')");
        let msg = err.to_string();
        assert!(msg.contains("asdf poknw"));
        assert!(msg.contains("% Invalid input (at token 0: 'asdf')"));
    }

    #[test]
    fn test_command_list_error_reports_position() {
        let err = CommandListError {
            commands: vec!["interface Eth1".into(), "apons".into(), "no shutdown".into()],
            index: 1,
            command: "apons".into(),
            message: "Error: apons".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("'apons'"));
        assert!(msg.contains("index 1 of 3"));
        assert_eq!(err.accepted(), &["interface Eth1".to_string()]);
    }

    #[test]
    fn test_disconnect_detection() {
        assert!(Error::from(ChannelError::Closed).is_disconnect());
        assert!(Error::from(TransportError::Disconnected).is_disconnect());
        assert!(!Error::from(CommandError::new("show x", "% bad")).is_disconnect());
    }
}
