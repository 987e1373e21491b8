//! File copy to device storage.
//!
//! The protocol runs three checks in order and stops early where it can:
//!
//! 1. compare the remote file against the local one; an identical copy
//!    ends the protocol with nothing transferred
//! 2. stream the file over the transport
//! 3. compare again, failing if the file is missing or still differs
//!
//! Errors from the identity checks are returned as they are. They are never
//! taken to mean "file absent".

use std::future::Future;
use std::path::{Path, PathBuf};

use log::{debug, info};
use sha2::{Digest, Sha512};
use tokio::io::AsyncReadExt;

use super::dispatch::CommandDispatcher;
use crate::error::{Error, FileTransferError, Result};
use crate::platform::PlatformDefinition;
use crate::transport::SessionTransport;

/// What to copy, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCopyRequest {
    /// Local file to copy.
    pub source: PathBuf,
    /// Remote file name. Defaults to the source file name.
    pub destination: String,
    /// Storage root, e.g. `flash:`. Discovered when not given.
    pub file_system: Option<String>,
}

impl FileCopyRequest {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        let source = source.into();
        let destination = source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            source,
            destination,
            file_system: None,
        }
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = destination.into();
        self
    }

    pub fn with_file_system(mut self, file_system: impl Into<String>) -> Self {
        self.file_system = Some(file_system.into());
        self
    }
}

/// How the remote copy compares with the local file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteFileState {
    Absent,
    Mismatched { remote_digest: String },
    Identical,
}

/// Checks presence and content of a file on the device.
pub trait FileIdentityChecker<T: SessionTransport>: Send + Sync {
    /// Whether `name` exists on `file_system`.
    fn remote_file_exists(
        &self,
        dispatcher: &mut CommandDispatcher<T>,
        file_system: &str,
        name: &str,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Lowercase hex SHA-512 of `name` on `file_system`.
    fn remote_digest(
        &self,
        dispatcher: &mut CommandDispatcher<T>,
        file_system: &str,
        name: &str,
    ) -> impl Future<Output = Result<String>> + Send;
}

/// Result of a successful copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileCopyOutcome {
    /// An identical file was already there; nothing was sent.
    AlreadyPresent,
    /// The file was sent and verified.
    Transferred,
}

impl FileCopyOutcome {
    pub fn transferred(&self) -> bool {
        matches!(self, FileCopyOutcome::Transferred)
    }
}

/// Lowercase hex SHA-512 of a local file.
pub async fn local_digest(path: &Path) -> Result<String> {
    let local_error = |source| FileTransferError::LocalFile {
        path: path.to_path_buf(),
        source,
    };

    let mut file = tokio::fs::File::open(path).await.map_err(local_error)?;
    let mut hasher = Sha512::new();
    let mut chunk = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut chunk).await.map_err(local_error)?;
        if n == 0 {
            break;
        }
        hasher.update(&chunk[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Compare `name` on `file_system` against `local_digest`.
pub async fn remote_state<T, C>(
    dispatcher: &mut CommandDispatcher<T>,
    checker: &C,
    file_system: &str,
    name: &str,
    local_digest: &str,
) -> Result<RemoteFileState>
where
    T: SessionTransport,
    C: FileIdentityChecker<T>,
{
    if !checker.remote_file_exists(dispatcher, file_system, name).await? {
        return Ok(RemoteFileState::Absent);
    }

    let remote_digest = checker.remote_digest(dispatcher, file_system, name).await?;
    if remote_digest.eq_ignore_ascii_case(local_digest) {
        Ok(RemoteFileState::Identical)
    } else {
        Ok(RemoteFileState::Mismatched { remote_digest })
    }
}

/// Whether an identical copy of the request's source is already on the
/// device.
pub async fn remote_exists<T, C>(
    dispatcher: &mut CommandDispatcher<T>,
    checker: &C,
    file_system: &str,
    request: &FileCopyRequest,
) -> Result<bool>
where
    T: SessionTransport,
    C: FileIdentityChecker<T>,
{
    let digest = local_digest(&request.source).await?;
    let state = remote_state(dispatcher, checker, file_system, &request.destination, &digest).await?;
    Ok(state == RemoteFileState::Identical)
}

/// Run the copy protocol against `file_system`.
pub async fn copy_file<T, C>(
    dispatcher: &mut CommandDispatcher<T>,
    checker: &C,
    platform: &PlatformDefinition,
    file_system: &str,
    request: &FileCopyRequest,
) -> Result<FileCopyOutcome>
where
    T: SessionTransport,
    C: FileIdentityChecker<T>,
{
    let name = request.destination.as_str();
    let digest = local_digest(&request.source).await?;

    match remote_state(dispatcher, checker, file_system, name, &digest).await? {
        RemoteFileState::Identical => {
            info!("{}: {}{} already present", dispatcher.host(), file_system, name);
            return Ok(FileCopyOutcome::AlreadyPresent);
        }
        state => debug!("{}: {}{} is {:?}", dispatcher.host(), file_system, name, state),
    }

    let remote = platform.transfer_path(file_system, name);
    info!(
        "{}: copying {} to {}",
        dispatcher.host(),
        request.source.display(),
        remote
    );
    dispatcher
        .transport_mut()
        .transfer_file(&request.source, &remote)
        .await
        .map_err(|e| match e {
            Error::Transport(e) => FileTransferError::Transfer {
                local: request.source.clone(),
                remote: remote.clone(),
                message: e.to_string(),
            }
            .into(),
            other => other,
        })?;

    match remote_state(dispatcher, checker, file_system, name, &digest).await? {
        RemoteFileState::Identical => Ok(FileCopyOutcome::Transferred),
        RemoteFileState::Absent => Err(FileTransferError::MissingAfterTransfer { remote }.into()),
        RemoteFileState::Mismatched { remote_digest } => {
            Err(FileTransferError::MismatchAfterTransfer {
                remote,
                local_digest: digest,
                remote_digest,
            }
            .into())
        }
    }
}
