//! Response classification.
//!
//! This is the one place that decides whether a command succeeded. Devices
//! answer in free text, so the decision is a set of [`Signature`]s matched
//! against the response. Signatures anchor on the start of a line rather
//! than matching anywhere, so output such as `input errors 0` or
//! `5% idle` is not mistaken for a failure.
//!
//! Signatures are grouped per [`CommandFamily`]: every command is checked
//! against the common set plus the set registered for its family.

use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;

use crate::error::CommandError;
use crate::transport::Encoding;

/// Coarse grouping of commands by their leading keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandFamily {
    /// Anything not matched below; configuration statements.
    Config,
    /// Read-only commands (`show`, `dir`, `verify`).
    Show,
    /// `copy ...`
    Copy,
    /// `install ...`
    Install,
    /// `reload ...`
    Reload,
    /// `configure replace ...`
    Replace,
}

impl CommandFamily {
    pub fn of(command: &str) -> Self {
        let command = command.trim_start();
        let keyword = |prefix: &str| {
            command
                .get(..prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
        };

        if keyword("show") || keyword("dir") || keyword("verify") {
            CommandFamily::Show
        } else if keyword("configure replace") {
            CommandFamily::Replace
        } else if keyword("copy") {
            CommandFamily::Copy
        } else if keyword("install") {
            CommandFamily::Install
        } else if keyword("reload") {
            CommandFamily::Reload
        } else {
            CommandFamily::Config
        }
    }
}

/// A recognised error marker.
#[derive(Debug, Clone)]
pub enum Signature {
    /// A line that, after leading whitespace, starts with this text.
    LinePrefix(String),
    /// This text anywhere in the response. Use sparingly.
    Contains(String),
    /// A regex searched over the whole response.
    Pattern(Regex),
}

impl Signature {
    pub fn line_prefix(marker: impl Into<String>) -> Self {
        Signature::LinePrefix(marker.into())
    }

    pub fn contains(marker: impl Into<String>) -> Self {
        Signature::Contains(marker.into())
    }

    pub fn pattern(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Signature::Pattern(Regex::new(pattern)?))
    }

    pub fn matches(&self, text: &str) -> bool {
        match self {
            Signature::LinePrefix(marker) => text
                .lines()
                .any(|line| line.trim_start().starts_with(marker.as_str())),
            Signature::Contains(marker) => text.contains(marker.as_str()),
            Signature::Pattern(re) => re.is_match(text),
        }
    }
}

/// Outcome of classifying one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// No error marker and content where content was expected.
    Accepted,
    /// Structured result with no content: the device neither confirmed nor
    /// refused.
    Empty,
    /// An error marker matched; carries the device text verbatim.
    Rejected(String),
}

impl Verdict {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Verdict::Rejected(_))
    }
}

/// Signature sets keyed by command family.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    common: Vec<Signature>,
    families: IndexMap<CommandFamily, Vec<Signature>>,
}

impl Classifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a signature checked for every command.
    pub fn with_signature(mut self, signature: Signature) -> Self {
        self.common.push(signature);
        self
    }

    /// Add a signature checked only for commands of `family`.
    pub fn with_family_signature(mut self, family: CommandFamily, signature: Signature) -> Self {
        self.families.entry(family).or_default().push(signature);
        self
    }

    /// All signatures that apply to `family`.
    pub fn signatures(&self, family: CommandFamily) -> impl Iterator<Item = &Signature> {
        self.common
            .iter()
            .chain(self.families.get(&family).into_iter().flatten())
    }

    /// Classify a plain-text response.
    pub fn classify_text(&self, command: &str, text: &str) -> Verdict {
        let family = CommandFamily::of(command);
        if self.signatures(family).any(|sig| sig.matches(text)) {
            Verdict::Rejected(text.trim().to_string())
        } else {
            Verdict::Accepted
        }
    }

    /// Classify one encoded envelope (see
    /// [`SessionTransport::send_encoded`](crate::transport::SessionTransport::send_encoded)).
    pub fn classify_encoded(&self, command: &str, envelope: &Value, encoding: Encoding) -> Verdict {
        if let Some(errors) = envelope.get("errors") {
            return Verdict::Rejected(flatten_messages(errors));
        }
        if let Some(error) = envelope.get("error") {
            let message = error.get("message").unwrap_or(error);
            return Verdict::Rejected(flatten_messages(message));
        }

        let Some(result) = envelope.get("result") else {
            return Verdict::Rejected(format!("malformed response: {envelope}"));
        };

        match (encoding, result) {
            (_, Value::Null) => Verdict::Empty,
            (Encoding::Text, Value::Object(map)) => match map.get("output") {
                Some(Value::String(output)) => self.classify_text(command, output),
                None if map.is_empty() => Verdict::Empty,
                _ => Verdict::Rejected(format!("malformed text response: {result}")),
            },
            (Encoding::Json, Value::Object(map)) if map.is_empty() => Verdict::Empty,
            (Encoding::Json, Value::Object(map)) => match map.get("messages") {
                Some(messages) => self.classify_text(command, &flatten_messages(messages)),
                None => Verdict::Accepted,
            },
            (_, other) => Verdict::Rejected(format!("malformed response: {other}")),
        }
    }

    /// Classify a plain-text response, turning a rejection into an error.
    pub fn check_text(&self, command: &str, text: &str) -> Result<(), CommandError> {
        match self.classify_text(command, text) {
            Verdict::Rejected(message) => Err(CommandError::new(command, message)),
            _ => Ok(()),
        }
    }
}

/// Join a string or array of strings into one newline-separated message.
fn flatten_messages(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn classifier() -> Classifier {
        Classifier::new()
            .with_signature(Signature::line_prefix("% "))
            .with_signature(Signature::line_prefix("Error:"))
            .with_family_signature(
                CommandFamily::Copy,
                Signature::contains("No space left on device"),
            )
    }

    #[test]
    fn test_command_family() {
        assert_eq!(CommandFamily::of("show version"), CommandFamily::Show);
        assert_eq!(CommandFamily::of("  SHOW clock"), CommandFamily::Show);
        assert_eq!(CommandFamily::of("dir flash:"), CommandFamily::Show);
        assert_eq!(
            CommandFamily::of("configure replace cp1 force"),
            CommandFamily::Replace
        );
        assert_eq!(
            CommandFamily::of("copy running-config startup-config"),
            CommandFamily::Copy
        );
        assert_eq!(
            CommandFamily::of("install source flash:EOS.swi"),
            CommandFamily::Install
        );
        assert_eq!(CommandFamily::of("reload now"), CommandFamily::Reload);
        assert_eq!(CommandFamily::of("interface Eth1"), CommandFamily::Config);
        assert_eq!(CommandFamily::of(""), CommandFamily::Config);
    }

    #[test]
    fn test_error_marker_rejects() {
        let c = classifier();
        assert_eq!(
            c.classify_text("apons", "Error: apons"),
            Verdict::Rejected("Error: apons".to_string())
        );
        assert!(
            c.classify_text("shwo clock", "% Invalid input (at token 0: 'shwo')")
                .is_rejected()
        );
    }

    #[test]
    fn test_marker_on_later_line_rejects() {
        let c = classifier();
        let text = "Copy in progress\n  % Error copying: permission denied";
        assert!(c.classify_text("copy x y", text).is_rejected());
    }

    #[test]
    fn test_error_word_as_data_is_accepted() {
        let c = classifier();
        let counters = "Port      InErrors  OutErrors\nEt1              0          0\n\
                        Last error: none\nCPU 5% idle\nlink-error-disabled: 0";
        assert_eq!(
            c.classify_text("show interfaces counters errors", counters),
            Verdict::Accepted
        );
        assert_eq!(
            c.classify_text("show logging", "Jan 1 Error: something logged mid-line"),
            Verdict::Accepted
        );
    }

    #[test]
    fn test_family_signature_scoped() {
        let c = classifier();
        let text = "write failed: No space left on device";
        assert!(c.classify_text("copy running-config cp1", text).is_rejected());
        assert_eq!(c.classify_text("show log", text), Verdict::Accepted);
    }

    #[test]
    fn test_encoded_errors() {
        let c = classifier();
        let envelope = json!({"errors": ["Invalid input (at token 1: 'bad')"]});
        assert_eq!(
            c.classify_encoded("show bad", &envelope, Encoding::Json),
            Verdict::Rejected("Invalid input (at token 1: 'bad')".to_string())
        );

        let envelope = json!({"error": {"code": 1002, "message": "CLI command 1 of 1 'show bad' failed"}});
        assert_eq!(
            c.classify_encoded("show bad", &envelope, Encoding::Json),
            Verdict::Rejected("CLI command 1 of 1 'show bad' failed".to_string())
        );
    }

    #[test]
    fn test_encoded_empty_and_malformed() {
        let c = classifier();
        assert_eq!(
            c.classify_encoded("install source flash:x", &json!({"result": {}}), Encoding::Json),
            Verdict::Empty
        );
        assert!(
            c.classify_encoded("show version", &json!({"output": "x"}), Encoding::Json)
                .is_rejected()
        );
        assert!(
            c.classify_encoded("show version", &json!({"result": [1, 2]}), Encoding::Json)
                .is_rejected()
        );
    }

    #[test]
    fn test_encoded_text_output_is_classified() {
        let c = classifier();
        let ok = json!({"result": {"output": "Directory of flash:/\n  EOS.swi"}});
        assert_eq!(c.classify_encoded("dir flash:", &ok, Encoding::Text), Verdict::Accepted);

        let bad = json!({"result": {"output": "% Error listing directory"}});
        assert!(c.classify_encoded("dir usb9:", &bad, Encoding::Text).is_rejected());
    }

    #[test]
    fn test_encoded_messages_are_classified() {
        let c = classifier();
        let ok = json!({"result": {"messages": ["Copy completed successfully."]}});
        assert_eq!(c.classify_encoded("copy a b", &ok, Encoding::Json), Verdict::Accepted);

        let bad = json!({"result": {"messages": ["% Error: file not found"]}});
        assert!(c.classify_encoded("copy a b", &bad, Encoding::Json).is_rejected());
    }

    #[test]
    fn test_check_text_embeds_command() {
        let err = classifier()
            .check_text("asdf poknw", "% Invalid input")
            .unwrap_err();
        assert_eq!(err.command, "asdf poknw");
        assert_eq!(err.message, "% Invalid input");
    }
}
