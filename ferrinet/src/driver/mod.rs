//! Device command execution and state management.
//!
//! [`Device`] is the vendor-neutral capability interface. Every operation
//! funnels through a [`CommandDispatcher`], which classifies each response
//! before anything is returned. The multi-step operations live in their own
//! modules: [`boot`] (boot-image change), [`checkpoint`] (checkpoint and
//! rollback), [`file_copy`] (file transfer protocol) and [`facts`].

pub mod boot;
mod builder;
pub mod checkpoint;
mod dispatch;
pub mod facts;
pub mod file_copy;
mod response;

pub use boot::{BootChangeReport, BootImageChange, BootImageTarget, BootOptions, BootStage};
pub use builder::DeviceBuilder;
pub use dispatch::CommandDispatcher;
pub use facts::{Facts, FactsCache, VlanLister};
pub use file_copy::{FileCopyOutcome, FileCopyRequest, FileIdentityChecker, RemoteFileState};
pub use response::{Acknowledgement, Response, ResponseBody};

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures_core::future::BoxFuture;
use log::warn;

use crate::error::Result;

/// Operations every managed device supports.
pub trait Device: Send {
    /// Open the session.
    fn open(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Close the session.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;

    fn is_open(&self) -> bool;

    /// Vendor name as reported in [`Facts`].
    fn vendor(&self) -> &str;

    /// Apply one configuration command.
    fn config(&mut self, command: &str) -> impl Future<Output = Result<()>> + Send;

    /// Apply configuration commands in order, stopping at the first
    /// rejected one. Commands already applied stay applied.
    fn config_list(&mut self, commands: &[&str]) -> impl Future<Output = Result<()>> + Send;

    /// Run a read-only command and return its text.
    fn show(&mut self, command: &str) -> impl Future<Output = Result<String>> + Send;

    fn show_list(&mut self, commands: &[&str]) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Save the running configuration to the startup configuration.
    fn save(&mut self) -> impl Future<Output = Result<bool>> + Send;

    /// Reload the device. Nothing is sent unless `confirm` is set.
    fn reboot(
        &mut self,
        confirm: bool,
        timer: Option<Duration>,
    ) -> impl Future<Output = Result<()>> + Send;

    fn boot_options(&mut self) -> impl Future<Output = Result<BootOptions>> + Send;

    /// Point the next boot at `image`, discovering the storage root when
    /// `file_system` is `None`.
    fn set_boot_options(
        &mut self,
        image: &str,
        file_system: Option<&str>,
    ) -> impl Future<Output = Result<BootChangeReport>> + Send;

    /// Write the running configuration verbatim to `path`.
    fn backup_running_config(&mut self, path: &Path) -> impl Future<Output = Result<()>> + Send {
        async move {
            let config = self.running_config().await?;
            tokio::fs::write(path, config).await?;
            Ok(())
        }
    }

    fn rollback(&mut self, checkpoint: &str) -> impl Future<Output = Result<()>> + Send;

    fn checkpoint(&mut self, name: &str) -> impl Future<Output = Result<()>> + Send;

    /// Device facts, gathered on first use and cached afterwards.
    fn facts(&mut self) -> impl Future<Output = Result<Arc<Facts>>> + Send;

    /// Drop cached facts and gather them again.
    fn refresh_facts(&mut self) -> impl Future<Output = Result<Arc<Facts>>> + Send;

    fn running_config(&mut self) -> impl Future<Output = Result<String>> + Send;

    fn startup_config(&mut self) -> impl Future<Output = Result<String>> + Send;

    /// Copy a local file to device storage unless an identical copy is
    /// already there.
    fn file_copy(
        &mut self,
        request: &FileCopyRequest,
    ) -> impl Future<Output = Result<FileCopyOutcome>> + Send;

    /// Whether an identical copy of the request's source is on the device.
    fn file_copy_remote_exists(
        &mut self,
        request: &FileCopyRequest,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Install and boot `image`. Returns `false` when the device already
    /// boots it.
    fn install_os(
        &mut self,
        image: &str,
        file_system: Option<&str>,
    ) -> impl Future<Output = Result<bool>> + Send;
}

/// Open `device`, run `f`, and close it again on every exit path.
///
/// The error from `f` (or from opening) wins over an error from closing;
/// the latter is then only logged.
pub async fn with_session<D, F, R>(device: &mut D, f: F) -> Result<R>
where
    D: Device,
    F: for<'a> FnOnce(&'a mut D) -> BoxFuture<'a, Result<R>>,
{
    let result = match device.open().await {
        Ok(()) => f(device).await,
        Err(e) => Err(e),
    };
    let closed = device.close().await;

    match (result, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(close_err)) => {
            warn!("close after failed session also failed: {}", close_err);
            Err(e)
        }
    }
}
