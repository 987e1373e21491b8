//! # Ferrinet
//!
//! Async command execution and state management for network switches
//! driven through their CLI over SSH.
//!
//! Ferrinet sends CLI commands, decides from the device's text whether each
//! one succeeded, and drives multi-step operations (configuration, boot
//! image changes, checkpoints and rollback, file transfer) to a known end
//! state.
//!
//! ## Features
//!
//! - Async SSH sessions via russh, with enable escalation and SCP upload
//! - Pattern-based response classification per command family
//! - Fail-fast command lists that report the failing position
//! - Boot-image changes as an explicit, resumable state machine
//! - Idempotent, verified file copy (SHA-512)
//! - Cached device facts with explicit refresh
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ferrinet::{Device, DeviceBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ferrinet::Error> {
//!     let mut device = DeviceBuilder::new("192.168.1.1")
//!         .username("admin")
//!         .password("secret")
//!         .build()?;
//!
//!     device.open().await?;
//!
//!     device.config_list(&["interface Ethernet1", "description uplink"]).await?;
//!     println!("{}", device.show("show interfaces Ethernet1").await?);
//!
//!     device.close().await?;
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod classify;
pub mod driver;
pub mod error;
pub mod platform;
pub mod transport;

// Re-export main types for convenience
pub use classify::{Classifier, CommandFamily, Signature, Verdict};
pub use driver::{
    Acknowledgement, BootOptions, CommandDispatcher, Device, DeviceBuilder, Facts,
    FileCopyOutcome, FileCopyRequest, Response, with_session,
};
pub use error::{Error, Result};
pub use platform::PlatformDefinition;
pub use platform::vendors::arista::EosDevice;
pub use transport::{Encoding, SessionTransport, SshTransport};
