//! Named configuration checkpoints.
//!
//! A checkpoint is a copy of the running configuration stored on the device
//! under a name. Nothing about it is modelled locally: whether it exists is
//! only known from how the device answers.

use log::{debug, info};

use super::dispatch::CommandDispatcher;
use super::response::Acknowledgement;
use crate::error::{Error, Result, RollbackError, RollbackFailure};
use crate::platform::PlatformDefinition;
use crate::transport::SessionTransport;

/// Save the running configuration as `name`.
///
/// Device failures (e.g. no space left) are returned as the
/// [`CommandError`](crate::error::CommandError) the device produced.
pub async fn checkpoint<T: SessionTransport>(
    dispatcher: &mut CommandDispatcher<T>,
    name: &str,
) -> Result<Acknowledgement> {
    let command = format!("copy running-config {name}");
    let ack = dispatcher.execute_encoded(&command).await?;
    info!("{}: checkpoint '{}' saved ({})", dispatcher.host(), name, ack);
    Ok(ack)
}

/// Replace the running configuration with checkpoint `name`.
///
/// Every rejection becomes a [`RollbackError`]; its kind tells a missing
/// checkpoint apart from any other refusal.
pub async fn rollback<T: SessionTransport>(
    dispatcher: &mut CommandDispatcher<T>,
    platform: &PlatformDefinition,
    name: &str,
) -> Result<()> {
    let command = format!("configure replace {name} force");
    match dispatcher.execute_encoded(&command).await {
        Ok(ack) => {
            info!("{}: rolled back to '{}' ({})", dispatcher.host(), name, ack);
            Ok(())
        }
        Err(Error::Command(e)) => {
            let kind = if platform.reports_missing_file(&e.message) {
                RollbackFailure::CheckpointMissing
            } else {
                RollbackFailure::Rejected
            };
            debug!("{}: rollback to '{}' failed: {}", dispatcher.host(), name, kind);
            Err(RollbackError {
                checkpoint: name.to_string(),
                kind,
                command: e.command,
                message: e.message,
            }
            .into())
        }
        Err(e) => Err(e),
    }
}
