//! Platform definition for vendor-specific configuration.

use indexmap::IndexMap;
use regex::bytes::Regex;

use crate::classify::{Classifier, Signature};

/// Everything vendor-specific that is data rather than behaviour.
#[derive(Debug, Clone)]
pub struct PlatformDefinition {
    /// Platform name (e.g., "arista_eos").
    pub name: String,

    /// Vendor reported in facts (e.g., "arista").
    pub vendor: String,

    /// Matches any prompt the session can sit at.
    pub prompt_pattern: Regex,

    /// Matches the unprivileged prompt; the transport escalates from it.
    pub unprivileged_prompt: Option<Regex>,

    /// Command that leaves the unprivileged prompt.
    pub enable_command: String,

    /// Matches a password request during escalation.
    pub password_prompt: Option<Regex>,

    /// Error signatures used to classify every response.
    pub classifier: Classifier,

    /// Device text meaning "no such file or checkpoint".
    pub missing_file_signatures: Vec<Signature>,

    /// Commands to run when the session is established.
    pub on_open_commands: Vec<String>,

    /// CLI storage names mapped to their path for file transfer
    /// (`flash:` to `/mnt/flash`).
    pub file_system_roots: IndexMap<String, String>,

    /// Terminal width for PTY.
    pub terminal_width: u32,

    /// Terminal height for PTY.
    pub terminal_height: u32,
}

impl PlatformDefinition {
    /// Create a platform definition with a catch-all prompt.
    pub fn new(name: impl Into<String>, prompt_pattern: Regex) -> Self {
        Self {
            name: name.into(),
            vendor: String::new(),
            prompt_pattern,
            unprivileged_prompt: None,
            enable_command: "enable".to_string(),
            password_prompt: None,
            classifier: Classifier::new(),
            missing_file_signatures: vec![],
            on_open_commands: vec![],
            file_system_roots: IndexMap::new(),
            terminal_width: 511,
            terminal_height: 24,
        }
    }

    pub fn with_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = vendor.into();
        self
    }

    /// Escalate with `command` whenever the session lands on `prompt`.
    pub fn with_escalation(
        mut self,
        prompt: Regex,
        command: impl Into<String>,
        password_prompt: Regex,
    ) -> Self {
        self.unprivileged_prompt = Some(prompt);
        self.enable_command = command.into();
        self.password_prompt = Some(password_prompt);
        self
    }

    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_missing_file_signature(mut self, signature: Signature) -> Self {
        self.missing_file_signatures.push(signature);
        self
    }

    /// Add an on_open command.
    pub fn with_on_open_command(mut self, command: impl Into<String>) -> Self {
        self.on_open_commands.push(command.into());
        self
    }

    pub fn with_file_system_root(
        mut self,
        file_system: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        self.file_system_roots
            .insert(file_system.into(), path.into());
        self
    }

    /// Set terminal dimensions.
    pub fn with_terminal_size(mut self, width: u32, height: u32) -> Self {
        self.terminal_width = width;
        self.terminal_height = height;
        self
    }

    /// Whether `text` says a file or checkpoint does not exist.
    pub fn reports_missing_file(&self, text: &str) -> bool {
        self.missing_file_signatures
            .iter()
            .any(|sig| sig.matches(text))
    }

    /// Transfer path for `name` on `file_system`.
    ///
    /// Unknown storage names are passed through as `<fs><name>`.
    pub fn transfer_path(&self, file_system: &str, name: &str) -> String {
        match self.file_system_roots.get(file_system) {
            Some(root) => format!("{}/{}", root.trim_end_matches('/'), name),
            None => format!("{file_system}{name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn platform() -> PlatformDefinition {
        PlatformDefinition::new("test", Regex::new(r"[>#]\s?$").unwrap())
            .with_file_system_root("flash:", "/mnt/flash/")
            .with_missing_file_signature(Signature::contains("No such file"))
    }

    #[test]
    fn test_transfer_path_maps_known_root() {
        assert_eq!(
            platform().transfer_path("flash:", "EOS.swi"),
            "/mnt/flash/EOS.swi"
        );
    }

    #[test]
    fn test_transfer_path_passes_unknown_root() {
        assert_eq!(platform().transfer_path("usb1:", "EOS.swi"), "usb1:EOS.swi");
    }

    #[test]
    fn test_reports_missing_file() {
        let p = platform();
        assert!(p.reports_missing_file("% Error: No such file or directory"));
        assert!(!p.reports_missing_file("% Invalid input"));
    }
}
