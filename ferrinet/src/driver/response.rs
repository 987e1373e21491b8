//! Response types for dispatched commands.

use std::fmt;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{DriverError, Result};
use crate::transport::Encoding;

/// Response body in one of the two shapes a device can answer with.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// Plain text from a timing-mode command.
    Text(String),
    /// The `result` object of an encoded envelope.
    Encoded { encoding: Encoding, result: Value },
}

/// A classified, successful response.
#[derive(Debug, Clone)]
pub struct Response {
    /// The command that was executed.
    pub command: String,

    /// What the device returned.
    pub body: ResponseBody,

    /// Time taken to execute the command.
    pub elapsed: Duration,
}

impl Response {
    pub fn text(command: impl Into<String>, text: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            command: command.into(),
            body: ResponseBody::Text(text.into()),
            elapsed,
        }
    }

    pub fn encoded(
        command: impl Into<String>,
        encoding: Encoding,
        result: Value,
        elapsed: Duration,
    ) -> Self {
        Self {
            command: command.into(),
            body: ResponseBody::Encoded { encoding, result },
            elapsed,
        }
    }

    /// Text content, or an error naming the command.
    pub fn into_text(self) -> Result<String> {
        match self.body {
            ResponseBody::Text(text) => Ok(text),
            ResponseBody::Encoded { mut result, .. } => match result.get_mut("output").map(Value::take) {
                Some(Value::String(output)) => Ok(output),
                _ => Err(DriverError::UnexpectedResponse {
                    command: self.command,
                    message: "no text output in result".to_string(),
                }
                .into()),
            },
        }
    }

    /// Deserialize an encoded result.
    pub fn json<D: DeserializeOwned>(&self) -> Result<D> {
        let value = match &self.body {
            ResponseBody::Encoded { result, .. } => result.clone(),
            ResponseBody::Text(text) => {
                serde_json::from_str(text).map_err(|e| self.unexpected(e))?
            }
        };
        serde_json::from_value(value).map_err(|e| self.unexpected(e))
    }

    fn unexpected(&self, e: serde_json::Error) -> crate::error::Error {
        DriverError::UnexpectedResponse {
            command: self.command.clone(),
            message: e.to_string(),
        }
        .into()
    }
}

/// How a state-changing command was acknowledged.
///
/// A rejected command is an error, so only the two non-failing outcomes
/// appear here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acknowledgement {
    /// The device returned content confirming the change.
    Confirmed,
    /// The device returned nothing: the change may or may not have applied.
    Unconfirmed,
}

impl fmt::Display for Acknowledgement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Acknowledgement::Confirmed => f.write_str("confirmed"),
            Acknowledgement::Unconfirmed => f.write_str("unconfirmed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Hostname {
        hostname: String,
        fqdn: String,
    }

    #[test]
    fn test_text_response() {
        let response = Response::text("show clock", "Timezone: UTC", Duration::ZERO);
        assert_eq!(response.into_text().unwrap(), "Timezone: UTC");
    }

    #[test]
    fn test_text_response_parsed_as_json() {
        let response = Response::text(
            "show hostname | json",
            r#"{"hostname": "eos-spine1", "fqdn": "eos-spine1.ntc.com"}"#,
            Duration::ZERO,
        );
        let parsed: Hostname = response.json().unwrap();
        assert_eq!(parsed.fqdn, "eos-spine1.ntc.com");

        let plain = Response::text("show clock", "Timezone: UTC", Duration::ZERO);
        let err = plain.json::<Hostname>().err().unwrap();
        assert!(err.to_string().contains("show clock"));
    }

    #[test]
    fn test_encoded_text_output() {
        let response = Response::encoded(
            "show running-config",
            Encoding::Text,
            json!({"output": "hostname spine1\n"}),
            Duration::ZERO,
        );
        assert_eq!(response.into_text().unwrap(), "hostname spine1\n");
    }

    #[test]
    fn test_encoded_json_deserialize() {
        let response = Response::encoded(
            "show hostname",
            Encoding::Json,
            json!({"hostname": "eos-spine1", "fqdn": "eos-spine1.ntc.com"}),
            Duration::ZERO,
        );
        let parsed: Hostname = response.json().unwrap();
        assert_eq!(parsed.hostname, "eos-spine1");
        assert_eq!(parsed.fqdn, "eos-spine1.ntc.com");
        assert!(response.into_text().is_err());
    }

    #[test]
    fn test_json_shape_mismatch_names_command() {
        let response = Response::encoded(
            "show hostname",
            Encoding::Json,
            json!({"unexpected": true}),
            Duration::ZERO,
        );
        let err = response.json::<Hostname>().err().unwrap();
        assert!(err.to_string().contains("show hostname"));
    }
}
