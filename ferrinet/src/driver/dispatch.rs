//! Command dispatch through the response classifier.
//!
//! Every command the core sends goes through [`CommandDispatcher`]: it is
//! sent over the owned transport and its response is classified before
//! anything is returned to the caller. Lists run strictly in order and stop
//! at the first failure. Nothing already applied is undone.

use std::time::Instant;

use log::debug;
use serde::de::DeserializeOwned;

use super::response::{Acknowledgement, Response};
use crate::classify::{Classifier, Verdict};
use crate::error::{CommandError, CommandListError, DriverError, Error, Result};
use crate::transport::{Encoding, SessionTransport};

/// Sends commands over one session and classifies every response.
pub struct CommandDispatcher<T> {
    transport: T,
    classifier: Classifier,
    host: String,
}

impl<T: SessionTransport> CommandDispatcher<T> {
    pub fn new(transport: T, classifier: Classifier, host: impl Into<String>) -> Self {
        Self {
            transport,
            classifier,
            host: host.into(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Send one timing-mode command, discarding its output.
    pub async fn execute(&mut self, command: &str) -> Result<()> {
        self.query(command).await.map(|_| ())
    }

    /// Send commands in order, stopping at the first rejected one.
    pub async fn execute_list(&mut self, commands: &[&str]) -> Result<()> {
        self.query_list(commands).await.map(|_| ())
    }

    /// Send one timing-mode command and return its response.
    pub async fn query(&mut self, command: &str) -> Result<Response> {
        debug!("{}: sending {:?}", self.host, command);
        let start = Instant::now();
        let text = self.transport.send_timing(command).await?;

        match self.classifier.classify_text(command, &text) {
            Verdict::Rejected(message) => {
                debug!("{}: {:?} rejected: {}", self.host, command, message);
                Err(CommandError::new(command, message).into())
            }
            _ => {
                let response = Response::text(command, text, start.elapsed());
                debug!("{}: {:?} completed in {:?}", self.host, command, response.elapsed);
                Ok(response)
            }
        }
    }

    /// Send commands in order and return their responses, index-aligned.
    ///
    /// A rejected command becomes a [`CommandListError`] with its position;
    /// later commands are never sent. Transport failures are returned as
    /// they are.
    pub async fn query_list(&mut self, commands: &[&str]) -> Result<Vec<Response>> {
        let mut responses = Vec::with_capacity(commands.len());
        for (index, command) in commands.iter().enumerate() {
            match self.query(command).await {
                Ok(response) => responses.push(response),
                Err(Error::Command(e)) => {
                    return Err(CommandListError {
                        commands: commands.iter().map(|c| c.to_string()).collect(),
                        index,
                        command: e.command,
                        message: e.message,
                    }
                    .into());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(responses)
    }

    /// Send one encoded command and return its classified result.
    async fn send_encoded(&mut self, command: &str, encoding: Encoding) -> Result<(Verdict, Response)> {
        debug!("{}: sending {:?} ({})", self.host, command, encoding);
        let start = Instant::now();
        let mut envelopes = self.transport.send_encoded(&[command], encoding).await?;

        if envelopes.len() != 1 {
            return Err(DriverError::UnexpectedResponse {
                command: command.to_string(),
                message: format!("expected 1 result, got {}", envelopes.len()),
            }
            .into());
        }
        let mut envelope = envelopes.remove(0);

        let verdict = self.classifier.classify_encoded(command, &envelope, encoding);
        if let Verdict::Rejected(message) = &verdict {
            debug!("{}: {:?} rejected: {}", self.host, command, message);
        }

        let result = envelope
            .get_mut("result")
            .map(serde_json::Value::take)
            .unwrap_or_default();
        Ok((verdict, Response::encoded(command, encoding, result, start.elapsed())))
    }

    /// Send one encoded command whose response must carry content.
    ///
    /// An empty result is a failure here.
    pub async fn query_encoded(&mut self, command: &str, encoding: Encoding) -> Result<Response> {
        match self.send_encoded(command, encoding).await? {
            (Verdict::Accepted, response) => Ok(response),
            (Verdict::Empty, _) => Err(CommandError::new(command, "empty result").into()),
            (Verdict::Rejected(message), _) => Err(CommandError::new(command, message).into()),
        }
    }

    /// Send one encoded state-changing command.
    ///
    /// An empty result is not a failure: it is reported as
    /// [`Acknowledgement::Unconfirmed`] so the caller can verify.
    pub async fn execute_encoded(&mut self, command: &str) -> Result<Acknowledgement> {
        match self.send_encoded(command, Encoding::Json).await? {
            (Verdict::Accepted, _) => Ok(Acknowledgement::Confirmed),
            (Verdict::Empty, _) => Ok(Acknowledgement::Unconfirmed),
            (Verdict::Rejected(message), _) => Err(CommandError::new(command, message).into()),
        }
    }

    /// Encoded text output of `command`.
    pub async fn query_text(&mut self, command: &str) -> Result<String> {
        self.query_encoded(command, Encoding::Text)
            .await?
            .into_text()
    }

    /// Encoded JSON output of `command`, deserialized.
    pub async fn query_json<D: DeserializeOwned>(&mut self, command: &str) -> Result<D> {
        self.query_encoded(command, Encoding::Json).await?.json()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::classify::Signature;
    use crate::driver::ResponseBody;
    use crate::transport::mock::{ScriptedTransport, Sent};

    fn dispatcher(transport: ScriptedTransport) -> CommandDispatcher<ScriptedTransport> {
        let classifier = Classifier::new()
            .with_signature(Signature::line_prefix("% "))
            .with_signature(Signature::line_prefix("Error:"));
        CommandDispatcher::new(transport, classifier, "spine1")
    }

    #[tokio::test]
    async fn test_execute_list_sends_all_in_order() {
        let mut d = dispatcher(ScriptedTransport::new());
        assert_ok!(d.execute_list(&["interface Eth1", "no shutdown"]).await);
        assert_eq!(
            d.transport().sent(),
            &[
                Sent::Timing("interface Eth1".into()),
                Sent::Timing("no shutdown".into())
            ]
        );
    }

    #[tokio::test]
    async fn test_execute_rejected_command() {
        let mut d = dispatcher(ScriptedTransport::new().text(
            "asdf poknw",
            &["% Invalid input (at token 0: 'asdf')"],
        ));
        match d.execute("asdf poknw").await {
            Err(Error::Command(e)) => {
                assert_eq!(e.command, "asdf poknw");
                assert_eq!(e.message, "% Invalid input (at token 0: 'asdf')");
            }
            other => panic!("expected CommandError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_execute_list_fails_fast_with_index() {
        let commands = ["interface Eth1", "description uplink", "apons", "no shutdown"];
        let mut d = dispatcher(ScriptedTransport::new().text("apons", &["Error: apons"]));

        match d.execute_list(&commands).await {
            Err(Error::CommandList(e)) => {
                assert_eq!(e.index, 2);
                assert_eq!(e.command, "apons");
                assert_eq!(e.message, "Error: apons");
                assert_eq!(e.commands.len(), 4);
            }
            other => panic!("expected CommandListError, got {other:?}"),
        }
        assert_eq!(
            d.transport().commands(),
            vec!["interface Eth1", "description uplink", "apons"]
        );
    }

    #[tokio::test]
    async fn test_first_command_failing_reports_index_zero() {
        let mut d = dispatcher(
            ScriptedTransport::new().text("show badcommand", &["Error: badcommand"]),
        );
        match d.query_list(&["show badcommand", "show clock"]).await {
            Err(Error::CommandList(e)) => {
                assert_eq!(e.index, 0);
                assert_eq!(e.command, "show badcommand");
            }
            other => panic!("expected CommandListError, got {other:?}"),
        }
        assert_eq!(d.transport().commands(), vec!["show badcommand"]);
    }

    #[tokio::test]
    async fn test_query_list_returns_aligned_outputs() {
        let mut d = dispatcher(
            ScriptedTransport::new()
                .text("show hostname", &["Hostname: eos-spine1\nFQDN:     eos-spine1.ntc.com"])
                .text("show clock", &["Fri Jan 22 23:29:21 2016\nTimezone: UTC"]),
        );
        let responses = assert_ok!(d.query_list(&["show hostname", "show clock"]).await);
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].command, "show hostname");
        assert!(matches!(&responses[0].body, ResponseBody::Text(t) if t.contains("FQDN")));
        assert!(matches!(&responses[1].body, ResponseBody::Text(t) if t.contains("Timezone")));
    }

    #[tokio::test]
    async fn test_query_rejects_like_config() {
        let mut d = dispatcher(ScriptedTransport::new().text("show microsoft", &["Error: Microsoft"]));
        assert!(matches!(
            d.query("show microsoft").await,
            Err(Error::Command(_))
        ));
    }

    #[tokio::test]
    async fn test_transport_error_in_list_is_not_wrapped() {
        let mut d = dispatcher(ScriptedTransport::new().closed());
        let err = assert_err!(d.execute_list(&["interface Eth1"]).await);
        assert!(err.is_disconnect());
    }

    #[tokio::test]
    async fn test_execute_encoded_tri_state() {
        let mut d = dispatcher(
            ScriptedTransport::new()
                .json("copy running-config cp1", json!({"messages": ["Copy completed successfully."]}))
                .rejected("reload now", Encoding::Json, "% Permission denied"),
        );
        assert_eq!(
            d.execute_encoded("copy running-config cp1").await.unwrap(),
            Acknowledgement::Confirmed
        );
        assert_eq!(
            d.execute_encoded("install source flash:x.swi").await.unwrap(),
            Acknowledgement::Unconfirmed
        );
        assert!(matches!(
            d.execute_encoded("reload now").await,
            Err(Error::Command(e)) if e.message == "% Permission denied"
        ));
    }

    #[tokio::test]
    async fn test_query_encoded_requires_content() {
        let mut d = dispatcher(ScriptedTransport::new());
        let err = d.query_encoded("show version", Encoding::Json).await.unwrap_err();
        assert!(matches!(err, Error::Command(e) if e.command == "show version"));
    }

    #[tokio::test]
    async fn test_query_text_and_json() {
        let mut d = dispatcher(
            ScriptedTransport::new()
                .output("show running-config", &["hostname spine1\n"])
                .json("show hostname", json!({"hostname": "spine1", "fqdn": "spine1.lab"})),
        );
        assert_eq!(d.query_text("show running-config").await.unwrap(), "hostname spine1\n");

        let hostname: serde_json::Value = d.query_json("show hostname").await.unwrap();
        assert_eq!(hostname["fqdn"], "spine1.lab");
    }
}
