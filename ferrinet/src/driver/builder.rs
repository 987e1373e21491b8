//! Builder for creating devices.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::{DriverError, Result};
use crate::platform::PlatformDefinition;
use crate::platform::vendors::arista::{self, EosDevice, RebootWait};
use crate::transport::{AuthMethod, HostKeyVerification, SshConfig, SshTransport};

/// Builder for constructing an SSH-backed [`EosDevice`].
///
/// # Example
///
/// ```rust,no_run
/// use ferrinet::{Device, DeviceBuilder};
///
/// # async fn example() -> Result<(), ferrinet::Error> {
/// let mut device = DeviceBuilder::new("192.168.1.1")
///     .username("admin")
///     .password("secret")
///     .build()?;
///
/// device.open().await?;
/// let facts = device.facts().await?;
/// println!("{} runs {}", facts.hostname, facts.os_version);
/// device.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct DeviceBuilder {
    host: String,
    port: u16,
    username: Option<String>,
    auth: AuthMethod,
    enable_secret: Option<SecretString>,
    custom_platform: Option<PlatformDefinition>,
    timeout: Duration,
    terminal_size: Option<(u32, u32)>,
    host_key_verification: HostKeyVerification,
    known_hosts_path: Option<PathBuf>,
    reboot_wait: RebootWait,
}

impl DeviceBuilder {
    /// Create a new device builder for the specified host.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            username: None,
            auth: AuthMethod::None,
            enable_secret: None,
            custom_platform: None,
            timeout: Duration::from_secs(30),
            terminal_size: None,
            host_key_verification: HostKeyVerification::default(),
            known_hosts_path: None,
            reboot_wait: RebootWait::default(),
        }
    }

    /// Set the SSH port (default: 22).
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set password authentication.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.auth = AuthMethod::Password(SecretString::from(password.into()));
        self
    }

    /// Set private key authentication.
    pub fn private_key(mut self, key_path: impl Into<PathBuf>) -> Self {
        self.auth = AuthMethod::PrivateKey {
            path: key_path.into(),
            passphrase: None,
        };
        self
    }

    /// Set private key authentication with passphrase.
    pub fn private_key_with_passphrase(
        mut self,
        key_path: impl Into<PathBuf>,
        passphrase: impl Into<String>,
    ) -> Self {
        self.auth = AuthMethod::PrivateKey {
            path: key_path.into(),
            passphrase: Some(SecretString::from(passphrase.into())),
        };
        self
    }

    /// Secret to answer the enable password prompt with.
    pub fn enable_secret(mut self, secret: impl Into<String>) -> Self {
        self.enable_secret = Some(SecretString::from(secret.into()));
        self
    }

    /// Use a custom platform definition instead of the stock EOS one.
    pub fn custom_platform(mut self, platform: PlatformDefinition) -> Self {
        self.custom_platform = Some(platform);
        self
    }

    /// Connection and per-command timeout (default: 30s).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the platform's terminal dimensions.
    pub fn terminal_size(mut self, width: u32, height: u32) -> Self {
        self.terminal_size = Some((width, height));
        self
    }

    pub fn host_key_verification(mut self, mode: HostKeyVerification) -> Self {
        self.host_key_verification = mode;
        self
    }

    pub fn known_hosts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts_path = Some(path.into());
        self
    }

    /// How long `install_os` waits for the device after reloading
    /// (default: 3600s).
    pub fn reboot_timeout(mut self, timeout: Duration) -> Self {
        self.reboot_wait.timeout = timeout;
        self
    }

    /// Pause between reachability checks after a reload (default: 10s).
    pub fn reboot_poll_interval(mut self, interval: Duration) -> Self {
        self.reboot_wait.interval = interval;
        self
    }

    /// Build the device.
    ///
    /// This does not connect. Call `open()` on the returned device to
    /// establish the session.
    pub fn build(self) -> Result<EosDevice<SshTransport>> {
        let username = self.username.ok_or_else(|| DriverError::InvalidConfig {
            message: "username is required".to_string(),
        })?;

        if self.reboot_wait.interval.is_zero() {
            return Err(DriverError::InvalidConfig {
                message: "reboot poll interval must be non-zero".to_string(),
            }
            .into());
        }

        let platform = match self.custom_platform {
            Some(custom) => custom,
            None => arista::platform()?,
        };
        let (terminal_width, terminal_height) = self
            .terminal_size
            .unwrap_or((platform.terminal_width, platform.terminal_height));

        let ssh_config = SshConfig {
            host: self.host.clone(),
            port: self.port,
            username,
            auth: self.auth,
            enable_secret: self.enable_secret,
            timeout: self.timeout,
            terminal_width,
            terminal_height,
            host_key_verification: self.host_key_verification,
            known_hosts_path: self.known_hosts_path,
        };

        let transport = SshTransport::new(ssh_config, platform.clone());
        Ok(EosDevice::new(transport, platform, self.host).with_reboot_wait(self.reboot_wait))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::Device;
    use crate::error::Error;

    #[test]
    fn test_build_requires_username() {
        let err = DeviceBuilder::new("192.0.2.1").build().err().unwrap();
        assert!(matches!(err, Error::Driver(DriverError::InvalidConfig { .. })));
    }

    #[test]
    fn test_build_uses_platform_terminal_size() {
        let device = DeviceBuilder::new("192.0.2.1")
            .username("admin")
            .password("secret")
            .build()
            .unwrap();
        let config = device.transport().config();
        assert_eq!((config.terminal_width, config.terminal_height), (32767, 24));
        assert_eq!(device.vendor(), "arista");
        assert!(!device.is_open());
    }

    #[test]
    fn test_build_overrides() {
        let device = DeviceBuilder::new("192.0.2.1")
            .port(2222)
            .username("admin")
            .enable_secret("enable")
            .terminal_size(200, 50)
            .host_key_verification(HostKeyVerification::Strict)
            .build()
            .unwrap();
        let config = device.transport().config();
        assert_eq!(config.port, 2222);
        assert_eq!(config.terminal_width, 200);
        assert!(config.enable_secret.is_some());
        assert_eq!(config.host_key_verification, HostKeyVerification::Strict);
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let result = DeviceBuilder::new("192.0.2.1")
            .username("admin")
            .reboot_poll_interval(Duration::ZERO)
            .build();
        assert!(result.is_err());
    }
}
