//! Platform definitions.
//!
//! A [`PlatformDefinition`] holds everything vendor-specific that is data:
//! prompt patterns, error signatures, storage roots. Vendor behaviour that
//! needs code lives under [`vendors`].

mod definition;
pub mod vendors;

pub use definition::PlatformDefinition;
