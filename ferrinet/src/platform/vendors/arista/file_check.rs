//! File presence and identity checks on EOS storage.

use log::debug;

use crate::classify::Signature;
use crate::driver::{CommandDispatcher, FileIdentityChecker};
use crate::error::{DriverError, Error, Result};
use crate::platform::PlatformDefinition;
use crate::transport::SessionTransport;

/// Uses `dir` for presence and `verify /sha512` for content.
#[derive(Debug, Clone, Default)]
pub struct EosFileIdentity {
    missing_file_signatures: Vec<Signature>,
}

impl EosFileIdentity {
    pub fn for_platform(platform: &PlatformDefinition) -> Self {
        Self {
            missing_file_signatures: platform.missing_file_signatures.clone(),
        }
    }

    fn reports_missing(&self, text: &str) -> bool {
        self.missing_file_signatures.iter().any(|sig| sig.matches(text))
    }
}

impl<T: SessionTransport> FileIdentityChecker<T> for EosFileIdentity {
    async fn remote_file_exists(
        &self,
        dispatcher: &mut CommandDispatcher<T>,
        file_system: &str,
        name: &str,
    ) -> Result<bool> {
        let command = format!("dir {file_system}{name}");
        match dispatcher.query_text(&command).await {
            Ok(listing) => Ok(listing.contains(name)),
            Err(Error::Command(e)) if self.reports_missing(&e.message) => {
                debug!("{}: {}{} not present", dispatcher.host(), file_system, name);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn remote_digest(
        &self,
        dispatcher: &mut CommandDispatcher<T>,
        file_system: &str,
        name: &str,
    ) -> Result<String> {
        let command = format!("verify /sha512 {file_system}{name}");
        let output = dispatcher.query_text(&command).await?;
        parse_digest(&output).ok_or_else(|| {
            DriverError::UnexpectedResponse {
                command,
                message: format!("no digest in '{}'", output.trim()),
            }
            .into()
        })
    }
}

/// Digest from `verify /sha512 (flash:EOS.swi) = <hex>`.
fn parse_digest(output: &str) -> Option<String> {
    let (_, digest) = output.rsplit_once('=')?;
    let digest = digest.trim();
    (!digest.is_empty() && digest.chars().all(|c| c.is_ascii_hexdigit()))
        .then(|| digest.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Classifier;
    use crate::transport::mock::ScriptedTransport;

    fn checker() -> EosFileIdentity {
        EosFileIdentity {
            missing_file_signatures: vec![Signature::contains("No such file or directory")],
        }
    }

    fn dispatcher(transport: ScriptedTransport) -> CommandDispatcher<ScriptedTransport> {
        let classifier = Classifier::new().with_signature(Signature::line_prefix("% Error"));
        CommandDispatcher::new(transport, classifier, "spine1")
    }

    #[test]
    fn test_parse_digest() {
        assert_eq!(
            parse_digest("verify /sha512 (flash:EOS.swi) = 0F3A9b\n").as_deref(),
            Some("0f3a9b")
        );
        assert_eq!(parse_digest("% Error: verify failed"), None);
        assert_eq!(parse_digest("x = "), None);
    }

    #[tokio::test]
    async fn test_missing_file_is_absent() {
        let mut d = dispatcher(ScriptedTransport::new().output(
            "dir flash:EOS.swi",
            &["% Error listing directory flash:/EOS.swi (No such file or directory)"],
        ));
        assert!(!checker().remote_file_exists(&mut d, "flash:", "EOS.swi").await.unwrap());
    }

    #[tokio::test]
    async fn test_present_file() {
        let mut d = dispatcher(ScriptedTransport::new().output(
            "dir flash:EOS.swi",
            &["Directory of flash:/EOS.swi\n\n       -rwx   511774720  Jan 23 2016  EOS.swi\n"],
        ));
        assert!(checker().remote_file_exists(&mut d, "flash:", "EOS.swi").await.unwrap());
    }

    #[tokio::test]
    async fn test_other_dir_failure_propagates() {
        let mut d = dispatcher(
            ScriptedTransport::new().output("dir flash:EOS.swi", &["% Error: permission denied"]),
        );
        let err = checker()
            .remote_file_exists(&mut d, "flash:", "EOS.swi")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Command(_)));
    }

    #[tokio::test]
    async fn test_remote_digest() {
        let mut d = dispatcher(ScriptedTransport::new().output(
            "verify /sha512 flash:EOS.swi",
            &["verify /sha512 (flash:EOS.swi) = abc123"],
        ));
        assert_eq!(
            checker().remote_digest(&mut d, "flash:", "EOS.swi").await.unwrap(),
            "abc123"
        );
    }
}
