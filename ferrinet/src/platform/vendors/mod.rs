//! Vendor-specific platform implementations.

pub mod arista;
