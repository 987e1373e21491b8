//! Arista EOS platform definition.
//!
//! Prompt patterns are adapted from [scrapli](https://github.com/carlmontanari/scrapli).
//!
//! # Prompt Examples
//!
//! ```text
//! switch>                            # exec mode
//! switch#                            # privilege_exec mode
//! switch(config)#                    # configuration mode
//! switch(config-if-Et1)#             # config sub-mode (interface)
//! ```
//!
//! A session that lands on the `>` prompt is escalated with `enable`
//! before anything else is sent.

use regex::bytes::Regex;

use crate::classify::{Classifier, CommandFamily, Signature};
use crate::error::{PlatformError, Result};
use crate::platform::PlatformDefinition;

/// Any EOS prompt: exec, privileged exec, or configuration.
const PROMPT: &str = r"(?mi)^[\w.\-@()/: ]{1,63}[>#]\s?$";

/// Exec mode, before `enable`.
const UNPRIVILEGED_PROMPT: &str = r"(?mi)^[\w.\-@()/: ]{1,63}>\s?$";

const PASSWORD_PROMPT: &str = r"(?mi)^password:\s?$";

fn pattern(source: &str) -> Result<Regex> {
    Regex::new(source).map_err(|e| {
        PlatformError::InvalidDefinition {
            message: format!("bad pattern {source:?}: {e}"),
        }
        .into()
    })
}

/// EOS prefixes every CLI rejection with `% `.
fn classifier() -> Classifier {
    Classifier::new()
        .with_signature(Signature::line_prefix("% "))
        .with_signature(Signature::line_prefix("Error:"))
        .with_family_signature(CommandFamily::Copy, Signature::contains("No space left on device"))
        .with_family_signature(CommandFamily::Install, Signature::contains("not a valid software image"))
}

/// Create the Arista EOS platform definition.
pub fn platform() -> Result<PlatformDefinition> {
    Ok(PlatformDefinition::new("arista_eos", pattern(PROMPT)?)
        .with_vendor("arista")
        .with_escalation(pattern(UNPRIVILEGED_PROMPT)?, "enable", pattern(PASSWORD_PROMPT)?)
        .with_classifier(classifier())
        .with_missing_file_signature(Signature::contains("No such file or directory"))
        .with_missing_file_signature(Signature::contains("File not found"))
        .with_on_open_command("terminal length 0")
        .with_on_open_command("terminal width 32767")
        .with_file_system_root("flash:", "/mnt/flash")
        .with_terminal_size(32767, 24))
}
