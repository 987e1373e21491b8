//! Channel layer for prompt matching and PTY operations.
//!
//! This module handles the interactive shell session: reading until the
//! device prompt, ANSI stripping, and output normalization.

mod buffer;
mod pty;

pub use buffer::PatternBuffer;
pub use pty::{PtyChannel, PtyConfig, normalize_output};
