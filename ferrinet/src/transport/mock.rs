//! Scripted transport for unit tests.
//!
//! Replies are scripted per command. A command scripted with several
//! replies returns them in order and then keeps returning the last one.
//! Unscripted timing commands answer with empty text; unscripted encoded
//! commands answer with an empty result.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use serde_json::{Value, json};

use super::{Encoding, SessionTransport};
use crate::error::{Result, TransportError};

/// One thing the core asked the transport to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Sent {
    Timing(String),
    Encoded(String, Encoding),
    Transfer(PathBuf, String),
}

impl Sent {
    pub(crate) fn command(&self) -> Option<&str> {
        match self {
            Sent::Timing(c) | Sent::Encoded(c, _) => Some(c),
            Sent::Transfer(..) => None,
        }
    }
}

#[derive(Debug, Default)]
struct Script<T> {
    replies: VecDeque<T>,
}

impl<T: Clone> Script<T> {
    fn next(&mut self) -> Option<T> {
        if self.replies.len() > 1 {
            self.replies.pop_front()
        } else {
            self.replies.front().cloned()
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct ScriptedTransport {
    open: bool,
    text: HashMap<String, Script<String>>,
    encoded: HashMap<(String, Encoding), Script<Value>>,
    transfer_error: Option<String>,
    open_failures: usize,
    drops_on: HashSet<String>,
    sent: Vec<Sent>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self {
            open: true,
            ..Self::default()
        }
    }

    /// Timing-mode reply(ies) for `command`.
    pub(crate) fn text(mut self, command: &str, replies: &[&str]) -> Self {
        self.text.insert(
            command.to_string(),
            Script {
                replies: replies.iter().map(|r| r.to_string()).collect(),
            },
        );
        self
    }

    /// Raw encoded envelope(s) for `command`.
    pub(crate) fn envelopes(mut self, command: &str, encoding: Encoding, replies: Vec<Value>) -> Self {
        self.encoded.insert(
            (command.to_string(), encoding),
            Script {
                replies: replies.into(),
            },
        );
        self
    }

    /// Successful JSON result for `command`.
    pub(crate) fn json(self, command: &str, result: Value) -> Self {
        self.envelopes(command, Encoding::Json, vec![json!({ "result": result })])
    }

    /// Successful text-encoded output(s) for `command`.
    pub(crate) fn output(self, command: &str, outputs: &[&str]) -> Self {
        let replies = outputs
            .iter()
            .map(|o| json!({ "result": { "output": o } }))
            .collect();
        self.envelopes(command, Encoding::Text, replies)
    }

    /// Device-side error for an encoded `command`.
    pub(crate) fn rejected(self, command: &str, encoding: Encoding, message: &str) -> Self {
        self.envelopes(command, encoding, vec![json!({ "errors": [message] })])
    }

    pub(crate) fn failing_transfer(mut self, message: &str) -> Self {
        self.transfer_error = Some(message.to_string());
        self
    }

    /// Make the next `count` calls to `open` fail.
    pub(crate) fn failing_opens(mut self, count: usize) -> Self {
        self.open_failures = count;
        self
    }

    /// Record `command`, then drop the session as if the device went away.
    pub(crate) fn dropping_on(mut self, command: &str) -> Self {
        self.drops_on.insert(command.to_string());
        self
    }

    pub(crate) fn closed(mut self) -> Self {
        self.open = false;
        self
    }

    pub(crate) fn sent(&self) -> &[Sent] {
        &self.sent
    }

    /// Every command sent, in order, in either mode.
    pub(crate) fn commands(&self) -> Vec<&str> {
        self.sent.iter().filter_map(Sent::command).collect()
    }

    pub(crate) fn transfers(&self) -> Vec<(&Path, &str)> {
        self.sent
            .iter()
            .filter_map(|s| match s {
                Sent::Transfer(local, remote) => Some((local.as_path(), remote.as_str())),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn clear_sent(&mut self) {
        self.sent.clear();
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(TransportError::Disconnected.into())
        }
    }

    fn record(&mut self, sent: Sent) -> Result<()> {
        let drops = sent.command().is_some_and(|c| self.drops_on.contains(c));
        self.sent.push(sent);
        if drops {
            self.open = false;
            return Err(TransportError::Disconnected.into());
        }
        Ok(())
    }
}

impl SessionTransport for ScriptedTransport {
    async fn open(&mut self) -> Result<()> {
        if self.open_failures > 0 {
            self.open_failures -= 1;
            return Err(TransportError::Disconnected.into());
        }
        self.open = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn send_timing(&mut self, command: &str) -> Result<String> {
        self.ensure_open()?;
        self.record(Sent::Timing(command.to_string()))?;
        Ok(self
            .text
            .get_mut(command)
            .and_then(Script::next)
            .unwrap_or_default())
    }

    async fn send_encoded(&mut self, commands: &[&str], encoding: Encoding) -> Result<Vec<Value>> {
        self.ensure_open()?;
        let mut replies = Vec::with_capacity(commands.len());
        for command in commands {
            self.record(Sent::Encoded(command.to_string(), encoding))?;
            let reply = self
                .encoded
                .get_mut(&(command.to_string(), encoding))
                .and_then(Script::next)
                .unwrap_or_else(|| json!({ "result": {} }));
            replies.push(reply);
        }
        Ok(replies)
    }

    async fn transfer_file(&mut self, local: &Path, remote: &str) -> Result<()> {
        self.ensure_open()?;
        self.sent
            .push(Sent::Transfer(local.to_path_buf(), remote.to_string()));
        match &self.transfer_error {
            Some(message) => Err(TransportError::Scp {
                remote: remote.to_string(),
                message: message.clone(),
            }
            .into()),
            None => Ok(()),
        }
    }
}
