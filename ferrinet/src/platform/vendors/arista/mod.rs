//! Arista EOS support.

mod device;
mod file_check;
pub mod models;
mod platform;
mod vlans;

pub use device::{EosDevice, RebootWait};
pub use file_check::EosFileIdentity;
pub use platform::platform;
pub use vlans::EosVlans;
