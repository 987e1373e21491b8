//! Boot-image change as an explicit state machine.
//!
//! ```text
//! Idle ──dir──► DirectoryListed ──dir <fs>──► ImageLocated
//!                                                 │ install
//!                                                 ▼
//!                          Verified ◄──show boot── InstallIssued
//! ```
//!
//! Any failing step moves the change to `Failed(stage)`, naming the stage it
//! stopped at. [`BootImageChange::retry`] resumes from there.
//!
//! Each step sends one short command sequence through a
//! [`BootImageTarget`]. The sequence is not atomic: a failure leaves the
//! device wherever the last accepted command put it. Listing and locating
//! change nothing on the device, so a caller can simply start again.

use std::fmt;
use std::future::Future;
use std::mem;

use indexmap::IndexMap;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::response::Acknowledgement;
use crate::error::{BootImageError, DriverError, Error, Result, VerificationError};

/// Boot variables and the image each one points at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BootOptions {
    slots: IndexMap<String, String>,
}

impl BootOptions {
    /// Slot holding the system image.
    pub const SYSTEM_IMAGE: &'static str = "sys";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_slot(mut self, slot: impl Into<String>, image: impl Into<String>) -> Self {
        self.slots.insert(slot.into(), image.into());
        self
    }

    pub fn get(&self, slot: &str) -> Option<&str> {
        self.slots.get(slot).map(String::as_str)
    }

    /// Image in the [`SYSTEM_IMAGE`](Self::SYSTEM_IMAGE) slot.
    pub fn system_image(&self) -> Option<&str> {
        self.get(Self::SYSTEM_IMAGE)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.slots.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Where a boot-image change has got to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootStage {
    Idle,
    DirectoryListed { file_system: String },
    ImageLocated { file_system: String },
    InstallIssued { file_system: String, install: Acknowledgement },
    Verified { file_system: String, install: Acknowledgement },
    /// Stopped by an error while leaving the inner stage.
    Failed(Box<BootStage>),
}

impl BootStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BootStage::Verified { .. } | BootStage::Failed(_))
    }
}

impl fmt::Display for BootStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BootStage::Idle => "idle",
            BootStage::DirectoryListed { .. } => "directory listed",
            BootStage::ImageLocated { .. } => "image located",
            BootStage::InstallIssued { .. } => "install issued",
            BootStage::Verified { .. } => "verified",
            BootStage::Failed(at) => return write!(f, "failed at {at}"),
        };
        f.write_str(name)
    }
}

/// Device operations the state machine drives.
pub trait BootImageTarget: Send {
    /// Find the default storage root (e.g. `flash:`).
    fn discover_file_system(&mut self) -> impl Future<Output = Result<String>> + Send;

    /// Listing of `file_system`, and the command used to get it.
    fn list_directory(
        &mut self,
        file_system: &str,
    ) -> impl Future<Output = Result<(String, String)>> + Send;

    /// Point the next boot at `image` on `file_system`.
    fn install_image(
        &mut self,
        file_system: &str,
        image: &str,
    ) -> impl Future<Output = Result<Acknowledgement>> + Send;

    /// Current boot configuration, and the command used to read it.
    fn read_boot_options(&mut self) -> impl Future<Output = Result<(BootOptions, String)>> + Send;
}

/// Summary of a completed boot-image change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootChangeReport {
    pub image: String,
    pub file_system: String,
    /// How the install command itself was acknowledged.
    pub install: Acknowledgement,
}

/// A boot-image change in progress.
#[derive(Debug, Clone)]
pub struct BootImageChange {
    image: String,
    file_system: Option<String>,
    stage: BootStage,
}

impl BootImageChange {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            file_system: None,
            stage: BootStage::Idle,
        }
    }

    /// Use `file_system` instead of discovering it.
    pub fn with_file_system(mut self, file_system: impl Into<String>) -> Self {
        self.file_system = Some(file_system.into());
        self
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn stage(&self) -> &BootStage {
        &self.stage
    }

    /// Advance one stage.
    ///
    /// On error the change moves to [`BootStage::Failed`]. A device
    /// rejection is returned as [`BootImageError::StageFailed`] naming the
    /// stage; other errors are returned as they are.
    pub async fn step<B: BootImageTarget>(&mut self, target: &mut B) -> Result<&BootStage> {
        if self.stage.is_terminal() {
            return Ok(&self.stage);
        }

        match self.advance(target).await {
            Ok(next) => {
                debug!("boot image {}: {} -> {}", self.image, self.stage, next);
                self.stage = next;
                Ok(&self.stage)
            }
            Err(e) => {
                let at = mem::replace(&mut self.stage, BootStage::Idle);
                debug!("boot image {}: failed at {}: {}", self.image, at, e);
                self.stage = BootStage::Failed(Box::new(at.clone()));
                Err(match e {
                    Error::Command(source) => BootImageError::StageFailed {
                        image: self.image.clone(),
                        stage: at,
                        source,
                    }
                    .into(),
                    other => other,
                })
            }
        }
    }

    /// Move a failed change back to the stage it stopped at.
    pub fn retry(&mut self) {
        self.stage = match mem::replace(&mut self.stage, BootStage::Idle) {
            BootStage::Failed(at) => *at,
            stage => stage,
        };
    }

    async fn advance<B: BootImageTarget>(&self, target: &mut B) -> Result<BootStage> {
        let next = match &self.stage {
            BootStage::Idle => {
                let file_system = match &self.file_system {
                    Some(fs) => fs.clone(),
                    None => target.discover_file_system().await?,
                };
                BootStage::DirectoryListed { file_system }
            }
            BootStage::DirectoryListed { file_system } => {
                let (listing, command) = target.list_directory(file_system).await?;
                if !listing.contains(self.image.as_str()) {
                    return Err(BootImageError::ImageNotFound {
                        image: self.image.clone(),
                        file_system: file_system.clone(),
                        command,
                    }
                    .into());
                }
                BootStage::ImageLocated {
                    file_system: file_system.clone(),
                }
            }
            BootStage::ImageLocated { file_system } => {
                let install = target.install_image(file_system, &self.image).await?;
                if install == Acknowledgement::Unconfirmed {
                    warn!(
                        "install of {}{} returned no result; verifying boot configuration",
                        file_system, self.image
                    );
                }
                BootStage::InstallIssued {
                    file_system: file_system.clone(),
                    install,
                }
            }
            BootStage::InstallIssued {
                file_system,
                install,
            } => {
                let (options, command) = target.read_boot_options().await?;
                let actual = options.system_image().unwrap_or_default();
                if actual != self.image {
                    return Err(VerificationError::BootImageMismatch {
                        command,
                        expected: self.image.clone(),
                        actual: actual.to_string(),
                        install: *install,
                    }
                    .into());
                }
                BootStage::Verified {
                    file_system: file_system.clone(),
                    install: *install,
                }
            }
            BootStage::Verified { .. } | BootStage::Failed(_) => self.stage.clone(),
        };
        Ok(next)
    }

    /// Drive the change to [`BootStage::Verified`], resuming a failed
    /// change from the stage it stopped at.
    pub async fn run<B: BootImageTarget>(mut self, target: &mut B) -> Result<BootChangeReport> {
        self.retry();
        while !self.step(target).await?.is_terminal() {}

        match self.stage {
            BootStage::Verified {
                file_system,
                install,
            } => Ok(BootChangeReport {
                image: self.image,
                file_system,
                install,
            }),
            other => Err(DriverError::UnexpectedResponse {
                command: format!("boot image {}", self.image),
                message: format!("change ended {other}"),
            }
            .into()),
        }
    }
}
