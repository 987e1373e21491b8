//! Minimal SCP "sink" upload over an SSH exec channel.
//!
//! The remote side runs `scp -t <path>` and answers every control message
//! with a single status byte: `0` for OK, `1` (warning) or `2` (fatal)
//! followed by a message line.

use std::path::Path;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use log::debug;
use memchr::memchr;
use russh::client::{Handle, Msg};
use russh::{Channel, ChannelMsg};
use tokio::time::{Instant, timeout_at};

use super::ssh::SshHandler;
use crate::error::{ChannelError, Result, TransportError};

const CHUNK_SIZE: usize = 32 * 1024;

/// One status reply from the SCP sink.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Ack {
    Ok,
    Error(String),
}

/// Try to parse one status reply from the front of `buf`.
///
/// Returns `None` until a complete reply has been buffered.
pub(crate) fn parse_ack(buf: &mut BytesMut) -> Option<Ack> {
    match buf.first()? {
        0 => {
            buf.advance(1);
            Some(Ack::Ok)
        }
        _ => {
            let end = memchr(b'\n', buf)?;
            let line = buf.split_to(end + 1);
            let message = String::from_utf8_lossy(&line[1..end]).trim().to_string();
            Some(Ack::Error(message))
        }
    }
}

/// File header control message: mode, size and target name.
pub(crate) fn file_header(size: u64, name: &str) -> String {
    format!("C0644 {size} {name}\n")
}

/// Split a remote path into the directory given to `scp -t` and the file
/// name sent in the header.
pub(crate) fn split_remote(remote: &str) -> (&str, &str) {
    match remote.rfind('/') {
        Some(0) => ("/", &remote[1..]),
        Some(pos) => (&remote[..pos], &remote[pos + 1..]),
        None => (".", remote),
    }
}

struct ScpSink {
    channel: Channel<Msg>,
    pending: BytesMut,
    remote: String,
    timeout: Duration,
}

impl ScpSink {
    async fn expect_ack(&mut self) -> Result<()> {
        let deadline = Instant::now() + self.timeout;
        loop {
            match parse_ack(&mut self.pending) {
                Some(Ack::Ok) => return Ok(()),
                Some(Ack::Error(message)) => {
                    return Err(TransportError::Scp {
                        remote: self.remote.clone(),
                        message,
                    }
                    .into());
                }
                None => {}
            }

            let msg = timeout_at(deadline, self.channel.wait())
                .await
                .map_err(|_| TransportError::Timeout(self.timeout))?;
            match msg {
                Some(ChannelMsg::Data { data }) => self.pending.extend_from_slice(&data),
                Some(ChannelMsg::ExtendedData { data, .. }) => {
                    debug!("scp stderr: {}", String::from_utf8_lossy(&data).trim());
                }
                Some(ChannelMsg::ExitStatus { exit_status }) if exit_status != 0 => {
                    return Err(TransportError::Scp {
                        remote: self.remote.clone(),
                        message: format!("remote scp exited with status {exit_status}"),
                    }
                    .into());
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                    return Err(ChannelError::Closed.into());
                }
                Some(_) => {}
            }
        }
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        self.channel.data(data).await.map_err(ChannelError::Ssh)?;
        Ok(())
    }
}

/// Upload `local` to `remote` (a full device path such as
/// `/mnt/flash/EOS.swi`).
pub(crate) async fn upload(
    session: &Handle<SshHandler>,
    local: &Path,
    remote: &str,
    timeout: Duration,
) -> Result<()> {
    let contents = tokio::fs::read(local).await?;
    let (directory, name) = split_remote(remote);

    let channel = session
        .channel_open_session()
        .await
        .map_err(TransportError::Ssh)?;
    channel
        .exec(true, format!("scp -t {directory}"))
        .await
        .map_err(TransportError::Ssh)?;

    let mut sink = ScpSink {
        channel,
        pending: BytesMut::new(),
        remote: remote.to_string(),
        timeout,
    };

    sink.expect_ack().await?;
    sink.send(file_header(contents.len() as u64, name).as_bytes())
        .await?;
    sink.expect_ack().await?;

    for chunk in contents.chunks(CHUNK_SIZE) {
        sink.send(chunk).await?;
    }
    sink.send(&[0]).await?;
    sink.expect_ack().await?;

    debug!("scp: {} bytes written to {}", contents.len(), remote);

    sink.channel.eof().await.map_err(ChannelError::Ssh)?;
    sink.channel.close().await.map_err(ChannelError::Ssh)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ok_ack() {
        let mut buf = BytesMut::from(&[0u8, 0u8][..]);
        assert_eq!(parse_ack(&mut buf), Some(Ack::Ok));
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn test_parse_error_ack_waits_for_newline() {
        let mut buf = BytesMut::from(&b"\x01scp: /mnt/flash/x: No space"[..]);
        assert_eq!(parse_ack(&mut buf), None);

        buf.extend_from_slice(b" left on device\n");
        assert_eq!(
            parse_ack(&mut buf),
            Some(Ack::Error(
                "scp: /mnt/flash/x: No space left on device".to_string()
            ))
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_parse_empty_buffer() {
        let mut buf = BytesMut::new();
        assert_eq!(parse_ack(&mut buf), None);
    }

    #[test]
    fn test_file_header() {
        assert_eq!(file_header(1024, "EOS.swi"), "C0644 1024 EOS.swi\n");
    }

    #[test]
    fn test_split_remote() {
        assert_eq!(split_remote("/mnt/flash/EOS.swi"), ("/mnt/flash", "EOS.swi"));
        assert_eq!(split_remote("/EOS.swi"), ("/", "EOS.swi"));
        assert_eq!(split_remote("EOS.swi"), (".", "EOS.swi"));
    }
}
