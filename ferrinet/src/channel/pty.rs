//! Interactive PTY channel with prompt-terminated reads.

use std::time::Duration;

use log::trace;
use regex::bytes::Regex;
use russh::client::Msg;
use russh::{Channel, ChannelMsg};
use tokio::time::{Instant, timeout_at};

use super::buffer::PatternBuffer;
use crate::error::{ChannelError, Result};

/// Configuration for PTY channel behavior.
#[derive(Debug, Clone)]
pub struct PtyConfig {
    /// Default timeout for a prompt-terminated read.
    pub timeout: Duration,

    /// Search depth for pattern matching.
    pub search_depth: usize,
}

impl Default for PtyConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            search_depth: 1000,
        }
    }
}

/// Shell channel that reads until a prompt pattern appears.
pub struct PtyChannel {
    channel: Channel<Msg>,
    buffer: PatternBuffer,
    config: PtyConfig,
}

impl PtyChannel {
    pub fn new(channel: Channel<Msg>, config: PtyConfig) -> Self {
        Self {
            buffer: PatternBuffer::new(config.search_depth),
            channel,
            config,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    /// Write `input` followed by a newline.
    pub async fn write_line(&mut self, input: &str) -> Result<()> {
        let line = format!("{input}\n");
        self.channel
            .data(line.as_bytes())
            .await
            .map_err(ChannelError::Ssh)?;
        Ok(())
    }

    /// Read until `pattern` matches the tail of the output.
    ///
    /// Returns everything read, including the matched text.
    pub async fn read_until(&mut self, pattern: &Regex) -> Result<Vec<u8>> {
        let deadline = Instant::now() + self.config.timeout;

        loop {
            if self.buffer.tail_contains(pattern) {
                return Ok(self.buffer.take());
            }

            let msg = timeout_at(deadline, self.channel.wait())
                .await
                .map_err(|_| ChannelError::PatternTimeout(self.config.timeout))?;

            match msg {
                Some(ChannelMsg::Data { data }) => {
                    trace!("pty: read {} bytes", data.len());
                    self.buffer.extend(&data);
                }
                Some(ChannelMsg::ExtendedData { data, .. }) => {
                    self.buffer.extend(&data);
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                    return Err(ChannelError::Closed.into());
                }
                Some(_) => {}
            }
        }
    }

    /// Send `command` and return its normalized output.
    pub async fn send_command(&mut self, command: &str, prompt: &Regex) -> Result<String> {
        self.buffer.clear();
        self.write_line(command).await?;
        let raw = self.read_until(prompt).await?;
        Ok(normalize_output(&String::from_utf8_lossy(&raw), command))
    }

    pub async fn close(self) -> Result<()> {
        self.channel.eof().await.map_err(ChannelError::Ssh)?;
        self.channel.close().await.map_err(ChannelError::Ssh)?;
        Ok(())
    }
}

/// Strip the command echo and the trailing prompt line, and use `\n` line
/// endings throughout.
pub fn normalize_output(raw: &str, command: &str) -> String {
    let unified = raw.replace("\r\n", "\n").replace('\r', "");
    let output = unified.trim_start_matches('\n');
    let output = match output.strip_prefix(command) {
        Some(rest) => rest.trim_start_matches('\n'),
        None => output,
    };

    match output.rfind('\n') {
        Some(pos) => output[..pos].to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_echo_and_prompt() {
        let raw = "show clock\r\nFri Jan 22 23:29:21 2016\r\nTimezone: UTC\r\nspine1#";
        assert_eq!(
            normalize_output(raw, "show clock"),
            "Fri Jan 22 23:29:21 2016\nTimezone: UTC"
        );
    }

    #[test]
    fn test_normalize_command_without_output() {
        let raw = "interface Ethernet1\r\nspine1(config-if-Et1)#";
        assert_eq!(normalize_output(raw, "interface Ethernet1"), "");
    }

    #[test]
    fn test_normalize_keeps_output_when_echo_missing() {
        let raw = "% Invalid input\nspine1#";
        assert_eq!(normalize_output(raw, "shwo clock"), "% Invalid input");
    }

    #[test]
    fn test_normalize_bare_prompt() {
        assert_eq!(normalize_output("spine1#", ""), "");
    }
}
