//! SSH transport implementation using russh.
//!
//! Timing-mode commands run on one interactive PTY shell. Encoded commands
//! run on the same shell: read-only commands get `| json` appended and the
//! device's JSON is passed through, everything else is wrapped into an
//! envelope from its text output. File uploads use a separate SCP exec
//! channel on the same connection.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use regex::bytes::Regex;
use russh::client::{self, Handle};
use russh::keys::{PrivateKeyWithHashAlg, PublicKey, load_secret_key};
use secrecy::ExposeSecret;
use serde_json::{Value, json};

use super::config::{AuthMethod, HostKeyVerification, SshConfig};
use super::{Encoding, SessionTransport, scp};
use crate::channel::{PtyChannel, PtyConfig};
use crate::classify::CommandFamily;
use crate::error::{ChannelError, DriverError, Error, Result, TransportError};
use crate::platform::PlatformDefinition;

/// SSH-backed [`SessionTransport`].
pub struct SshTransport {
    config: SshConfig,
    platform: PlatformDefinition,
    session: Option<Handle<SshHandler>>,
    pty: Option<PtyChannel>,
}

impl SshTransport {
    /// Create an unconnected transport. Nothing is sent until
    /// [`open`](SessionTransport::open).
    pub fn new(config: SshConfig, platform: PlatformDefinition) -> Self {
        Self {
            config,
            platform,
            session: None,
            pty: None,
        }
    }

    pub fn config(&self) -> &SshConfig {
        &self.config
    }

    pub fn platform(&self) -> &PlatformDefinition {
        &self.platform
    }

    /// Connect to the SSH server and authenticate.
    async fn connect(config: &SshConfig) -> Result<Handle<SshHandler>> {
        let ssh_config = Arc::new(client::Config {
            inactivity_timeout: Some(config.timeout),
            ..Default::default()
        });

        let host_key_error: Arc<Mutex<Option<TransportError>>> = Arc::new(Mutex::new(None));

        let handler = SshHandler {
            host: config.host.clone(),
            port: config.port,
            host_key_verification: config.host_key_verification.clone(),
            known_hosts_path: config.known_hosts_path.clone(),
            host_key_error: host_key_error.clone(),
        };

        let mut session = tokio::time::timeout(
            config.timeout,
            client::connect(ssh_config, (config.host.as_str(), config.port), handler),
        )
        .await
        .map_err(|_| TransportError::Timeout(config.timeout))?
        .map_err(|e| {
            // check_server_key leaves a detailed error behind when it rejects
            let stored = host_key_error.lock().ok().and_then(|mut slot| slot.take());
            match (stored, e) {
                (Some(hk_err), _) => hk_err,
                (None, russh::Error::IO(source)) => TransportError::ConnectionFailed {
                    host: config.host.clone(),
                    port: config.port,
                    source,
                },
                (None, e) => TransportError::Ssh(e),
            }
        })?;

        Self::authenticate(&mut session, config).await?;
        Ok(session)
    }

    async fn authenticate(session: &mut Handle<SshHandler>, config: &SshConfig) -> Result<()> {
        let success = match &config.auth {
            AuthMethod::None => session
                .authenticate_none(&config.username)
                .await
                .map_err(TransportError::Ssh)?
                .success(),
            AuthMethod::Password(password) => session
                .authenticate_password(&config.username, password.expose_secret())
                .await
                .map_err(TransportError::Ssh)?
                .success(),
            AuthMethod::PrivateKey { path, passphrase } => {
                let key = load_secret_key(path, passphrase.as_ref().map(|p| p.expose_secret()))
                    .map_err(|e| TransportError::Key(e.to_string()))?;

                let hash_alg = session
                    .best_supported_rsa_hash()
                    .await
                    .map_err(TransportError::Ssh)?
                    .flatten();

                session
                    .authenticate_publickey(
                        &config.username,
                        PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
                    )
                    .await
                    .map_err(TransportError::Ssh)?
                    .success()
            }
        };

        if !success {
            return Err(TransportError::AuthenticationFailed {
                user: config.username.clone(),
            }
            .into());
        }

        Ok(())
    }

    /// Open the interactive shell and wait for the first prompt.
    async fn open_shell(&self, session: &Handle<SshHandler>) -> Result<(PtyChannel, Vec<u8>)> {
        let channel = session
            .channel_open_session()
            .await
            .map_err(|_| ChannelError::PtyOpenFailed)?;

        channel
            .request_pty(
                true,
                "xterm",
                self.config.terminal_width,
                self.config.terminal_height,
                0,
                0,
                &[],
            )
            .await
            .map_err(|_| ChannelError::PtyOpenFailed)?;

        channel
            .request_shell(true)
            .await
            .map_err(|_| ChannelError::ShellRequestFailed)?;

        let mut pty = PtyChannel::new(
            channel,
            PtyConfig {
                timeout: self.config.timeout,
                ..PtyConfig::default()
            },
        );
        let banner = pty.read_until(&self.platform.prompt_pattern).await?;
        Ok((pty, banner))
    }

    /// Leave the unprivileged prompt if the session landed on it.
    async fn escalate(&self, pty: &mut PtyChannel, landed: &[u8]) -> Result<()> {
        let Some(unprivileged) = &self.platform.unprivileged_prompt else {
            return Ok(());
        };
        if !unprivileged.is_match(last_line(landed)) {
            return Ok(());
        }

        debug!("{}: escalating with '{}'", self.config.host, self.platform.enable_command);
        pty.write_line(&self.platform.enable_command).await?;

        let output = match &self.platform.password_prompt {
            Some(password_prompt) => {
                let either = Regex::new(&format!(
                    "(?:{})|(?:{})",
                    password_prompt.as_str(),
                    self.platform.prompt_pattern.as_str()
                ))
                .map_err(ChannelError::InvalidPattern)?;

                let output = pty.read_until(&either).await?;
                if password_prompt.is_match(last_line(&output)) {
                    let secret = self
                        .config
                        .enable_secret
                        .as_ref()
                        .map(|s| s.expose_secret())
                        .unwrap_or_default();
                    pty.write_line(secret).await?;
                    pty.read_until(&self.platform.prompt_pattern).await?
                } else {
                    output
                }
            }
            None => pty.read_until(&self.platform.prompt_pattern).await?,
        };

        if unprivileged.is_match(last_line(&output)) {
            return Err(TransportError::AuthenticationFailed {
                user: format!("{} (enable)", self.config.username),
            }
            .into());
        }
        Ok(())
    }

    fn pty(&mut self) -> Result<&mut PtyChannel> {
        self.pty.as_mut().ok_or_else(|| DriverError::NotConnected.into())
    }

    /// Forget the session after the remote side went away.
    fn mark_closed(&mut self) {
        self.pty = None;
        self.session = None;
    }

    async fn send_raw(&mut self, command: &str) -> Result<String> {
        let prompt = self.platform.prompt_pattern.clone();
        let result = self.pty()?.send_command(command, &prompt).await;
        if let Err(e) = &result
            && e.is_disconnect()
        {
            debug!("{}: session closed while sending '{}'", self.config.host, command);
            self.mark_closed();
        }
        result
    }
}

impl SessionTransport for SshTransport {
    async fn open(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Err(DriverError::AlreadyConnected.into());
        }

        info!("Connecting to {}", self.config.socket_addr());
        let session = Self::connect(&self.config).await?;
        let (mut pty, landed) = self.open_shell(&session).await?;
        self.escalate(&mut pty, &landed).await?;

        for command in &self.platform.on_open_commands {
            pty.send_command(command, &self.platform.prompt_pattern)
                .await?;
        }

        self.session = Some(session);
        self.pty = Some(pty);
        info!("Connected to {}", self.config.socket_addr());
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(pty) = self.pty.take()
            && let Err(e) = pty.close().await
        {
            debug!("{}: closing shell: {}", self.config.host, e);
        }
        if let Some(session) = self.session.take() {
            session
                .disconnect(russh::Disconnect::ByApplication, "", "en")
                .await
                .map_err(TransportError::Ssh)?;
            info!("Disconnected from {}", self.config.socket_addr());
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.session.as_ref().is_some_and(|session| !session.is_closed())
    }

    async fn send_timing(&mut self, command: &str) -> Result<String> {
        self.send_raw(command).await
    }

    async fn send_encoded(&mut self, commands: &[&str], encoding: Encoding) -> Result<Vec<Value>> {
        let mut envelopes = Vec::with_capacity(commands.len());
        for command in commands {
            let structured = encoding == Encoding::Json && CommandFamily::of(command) == CommandFamily::Show;
            let output = if structured {
                self.send_raw(&format!("{command} | json")).await?
            } else {
                self.send_raw(command).await?
            };
            envelopes.push(envelope(&output, encoding, structured));
        }
        Ok(envelopes)
    }

    async fn transfer_file(&mut self, local: &Path, remote: &str) -> Result<()> {
        let session = self
            .session
            .as_ref()
            .ok_or(Error::Driver(DriverError::NotConnected))?;
        scp::upload(session, local, remote, self.config.timeout).await
    }
}

impl Drop for SshTransport {
    fn drop(&mut self) {
        if self.session.is_some() {
            warn!(
                "SshTransport for {} dropped without close(); connection torn down",
                self.config.socket_addr()
            );
        }
    }
}

/// Text after the last newline.
fn last_line(output: &[u8]) -> &[u8] {
    match memchr::memrchr(b'\n', output) {
        Some(pos) => &output[pos + 1..],
        None => output,
    }
}

/// Wrap CLI output into an encoded envelope.
///
/// `structured` output is expected to be the device's own JSON; anything
/// else it printed is reported as an error.
fn envelope(output: &str, encoding: Encoding, structured: bool) -> Value {
    match encoding {
        Encoding::Text => json!({ "result": { "output": output } }),
        Encoding::Json if structured => match serde_json::from_str::<Value>(output) {
            Ok(result) => json!({ "result": result }),
            Err(_) => json!({ "errors": [output.trim()] }),
        },
        Encoding::Json if output.trim().is_empty() => json!({ "result": {} }),
        Encoding::Json => json!({ "result": { "messages": [output.trim()] } }),
    }
}

/// SSH client handler for russh.
pub(crate) struct SshHandler {
    host: String,
    port: u16,
    host_key_verification: HostKeyVerification,
    known_hosts_path: Option<PathBuf>,
    /// Detailed host-key error for connect() to surface instead of
    /// russh::Error::UnknownKey.
    host_key_error: Arc<Mutex<Option<TransportError>>>,
}

impl SshHandler {
    /// `Ok(true)` if matched, `Ok(false)` if the host is unknown.
    fn check_known_hosts(&self, pubkey: &PublicKey) -> std::result::Result<bool, TransportError> {
        let result = if let Some(ref path) = self.known_hosts_path {
            russh::keys::check_known_hosts_path(&self.host, self.port, pubkey, path)
        } else {
            russh::keys::check_known_hosts(&self.host, self.port, pubkey)
        };

        match result {
            Ok(matched) => Ok(matched),
            Err(russh::keys::Error::KeyChanged { line }) => Err(TransportError::HostKeyChanged {
                host: self.host.clone(),
                port: self.port,
                line,
            }),
            Err(e) => Err(TransportError::KnownHosts(e.to_string())),
        }
    }

    fn learn_host_key(&self, pubkey: &PublicKey) -> std::result::Result<(), TransportError> {
        let result = if let Some(ref path) = self.known_hosts_path {
            russh::keys::known_hosts::learn_known_hosts_path(&self.host, self.port, pubkey, path)
        } else {
            russh::keys::known_hosts::learn_known_hosts(&self.host, self.port, pubkey)
        };

        result.map_err(|e| TransportError::KnownHosts(e.to_string()))
    }

    fn reject(&self, error: TransportError) -> std::result::Result<bool, russh::Error> {
        if let Ok(mut slot) = self.host_key_error.lock() {
            *slot = Some(error);
        }
        Ok(false)
    }
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        match self.host_key_verification {
            HostKeyVerification::Disabled => Ok(true),

            HostKeyVerification::AcceptNew => match self.check_known_hosts(server_public_key) {
                Ok(true) => Ok(true),
                Ok(false) => {
                    if let Err(e) = self.learn_host_key(server_public_key) {
                        warn!("Failed to save host key: {}", e);
                    }
                    Ok(true)
                }
                Err(e) => self.reject(e),
            },

            HostKeyVerification::Strict => match self.check_known_hosts(server_public_key) {
                Ok(true) => Ok(true),
                Ok(false) => self.reject(TransportError::HostKeyUnknown {
                    host: self.host.clone(),
                    port: self.port,
                }),
                Err(e) => self.reject(e),
            },
        }
    }
}
