//! Arista EOS device.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use tokio::time::Instant;

use super::file_check::EosFileIdentity;
use super::models::{ShowBootConfig, ShowHostname, ShowInterfacesStatus, ShowVersion};
use super::vlans::EosVlans;
use crate::driver::facts::uptime_string;
use crate::driver::{
    Acknowledgement, BootChangeReport, BootImageChange, BootImageTarget, BootOptions,
    CommandDispatcher, Device, Facts, FactsCache, FileCopyOutcome, FileCopyRequest,
    FileIdentityChecker, Response, VlanLister, checkpoint, file_copy,
};
use crate::error::{
    BootImageError, DriverError, Result, RebootTimerError, VerificationError,
};
use crate::platform::PlatformDefinition;
use crate::transport::SessionTransport;

/// How long to wait for a device to come back after a reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebootWait {
    /// Give up after this long.
    pub timeout: Duration,
    /// Pause between attempts to reach the device.
    pub interval: Duration,
}

impl Default for RebootWait {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3600),
            interval: Duration::from_secs(10),
        }
    }
}

/// An Arista switch running EOS.
///
/// Owns its transport exclusively. Commands are strictly sequential.
pub struct EosDevice<T, V = EosVlans, C = EosFileIdentity> {
    dispatcher: CommandDispatcher<T>,
    platform: PlatformDefinition,
    vlans: V,
    files: C,
    facts: FactsCache,
    reboot_wait: RebootWait,
}

impl<T: SessionTransport> EosDevice<T> {
    pub fn new(transport: T, platform: PlatformDefinition, host: impl Into<String>) -> Self {
        let files = EosFileIdentity::for_platform(&platform);
        Self::with_collaborators(transport, platform, host, EosVlans, files)
    }
}

impl<T, V, C> EosDevice<T, V, C>
where
    T: SessionTransport,
    V: VlanLister<T>,
    C: FileIdentityChecker<T>,
{
    /// Build a device with custom VLAN and file identity collaborators.
    pub fn with_collaborators(
        transport: T,
        platform: PlatformDefinition,
        host: impl Into<String>,
        vlans: V,
        files: C,
    ) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(transport, platform.classifier.clone(), host),
            platform,
            vlans,
            files,
            facts: FactsCache::new(),
            reboot_wait: RebootWait::default(),
        }
    }

    pub fn with_reboot_wait(mut self, reboot_wait: RebootWait) -> Self {
        self.reboot_wait = reboot_wait;
        self
    }

    pub fn host(&self) -> &str {
        self.dispatcher.host()
    }

    pub fn platform(&self) -> &PlatformDefinition {
        &self.platform
    }

    pub fn transport(&self) -> &T {
        self.dispatcher.transport()
    }

    /// Dispatcher for commands not covered by [`Device`].
    pub fn dispatcher_mut(&mut self) -> &mut CommandDispatcher<T> {
        &mut self.dispatcher
    }

    /// Run a read-only command and deserialize its JSON output.
    pub async fn show_json<D: DeserializeOwned>(&mut self, command: &str) -> Result<D> {
        self.dispatcher.query_json(command).await
    }

    /// Run a read-only command in encoded text mode.
    pub async fn show_text(&mut self, command: &str) -> Result<String> {
        self.dispatcher.query_text(command).await
    }

    /// Save the running configuration to `name`.
    pub async fn save_as(&mut self, name: &str) -> Result<bool> {
        self.dispatcher
            .execute(&format!("copy running-config {name}"))
            .await?;
        // accept a confirmation prompt, if the device asks for one
        self.dispatcher.execute("").await?;
        info!("{}: running-config saved to {}", self.host(), name);
        Ok(true)
    }

    async fn leave_config_mode(&mut self, applied: Result<()>) -> Result<()> {
        let exited = self.dispatcher.execute("end").await;
        match (applied, exited) {
            (Ok(()), exited) => exited,
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(exit_err)) => {
                warn!("{}: leaving configuration mode failed: {}", self.host(), exit_err);
                Err(e)
            }
        }
    }

    async fn file_system(&mut self, given: Option<&str>) -> Result<String> {
        match given {
            Some(file_system) => Ok(file_system.to_string()),
            None => discover_file_system(&mut self.dispatcher).await,
        }
    }

    async fn gather_facts(&mut self) -> Result<Facts> {
        let version: ShowVersion = self.dispatcher.query_json("show version").await?;
        let hostname: ShowHostname = self.dispatcher.query_json("show hostname").await?;
        let status: ShowInterfacesStatus =
            self.dispatcher.query_json("show interfaces status").await?;
        let vlans = self.vlans.list_vlan_ids(&mut self.dispatcher).await?;

        let mut interfaces: Vec<String> = status.interface_statuses.into_keys().collect();
        interfaces.sort();

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        let uptime = (now - version.bootup_timestamp).max(0.0) as u64;

        Ok(Facts {
            vendor: self.platform.vendor.clone(),
            os_version: version.internal_version,
            model: version.model_name,
            serial_number: version.serial_number,
            hostname: hostname.hostname,
            fqdn: hostname.fqdn,
            interfaces,
            vlans,
            uptime,
            uptime_string: uptime_string(uptime),
        })
    }

    /// Whether `show boot` already references `image`.
    async fn image_booted(&mut self, image: &str) -> Result<bool> {
        let boot = self.dispatcher.query_text("show boot").await?;
        Ok(boot.contains(image))
    }

    /// One attempt to reach the device after a reload.
    async fn probe(&mut self) -> Result<()> {
        if !self.dispatcher.transport().is_open() {
            self.dispatcher.transport_mut().open().await?;
        }
        self.dispatcher
            .query_json::<ShowHostname>("show hostname")
            .await
            .map(|_| ())
    }

    /// Poll until the device answers again or the wait runs out.
    async fn wait_for_reboot(&mut self) -> Result<()> {
        let RebootWait { timeout, interval } = self.reboot_wait;
        let deadline = Instant::now() + timeout;

        while Instant::now() < deadline {
            tokio::time::sleep(interval).await;
            match self.probe().await {
                Ok(()) => {
                    info!("{}: back after reload", self.host());
                    return Ok(());
                }
                Err(e) => {
                    debug!("{}: not reachable yet: {}", self.host(), e);
                    if self.dispatcher.transport().is_open()
                        && let Err(e) = self.dispatcher.transport_mut().close().await
                    {
                        debug!("{}: closing failed probe session: {}", self.host(), e);
                    }
                }
            }
        }

        Err(DriverError::RebootTimeout {
            host: self.host().to_string(),
            wait: timeout,
        }
        .into())
    }
}

impl<T, V, C> Device for EosDevice<T, V, C>
where
    T: SessionTransport,
    V: VlanLister<T>,
    C: FileIdentityChecker<T>,
{
    async fn open(&mut self) -> Result<()> {
        self.dispatcher.transport_mut().open().await
    }

    async fn close(&mut self) -> Result<()> {
        self.dispatcher.transport_mut().close().await
    }

    fn is_open(&self) -> bool {
        self.dispatcher.transport().is_open()
    }

    fn vendor(&self) -> &str {
        &self.platform.vendor
    }

    async fn config(&mut self, command: &str) -> Result<()> {
        self.dispatcher.execute("configure terminal").await?;
        let applied = self.dispatcher.execute(command).await;
        self.leave_config_mode(applied).await
    }

    async fn config_list(&mut self, commands: &[&str]) -> Result<()> {
        self.dispatcher.execute("configure terminal").await?;
        let applied = self.dispatcher.execute_list(commands).await;
        self.leave_config_mode(applied).await
    }

    async fn show(&mut self, command: &str) -> Result<String> {
        self.dispatcher.query(command).await?.into_text()
    }

    async fn show_list(&mut self, commands: &[&str]) -> Result<Vec<String>> {
        self.dispatcher
            .query_list(commands)
            .await?
            .into_iter()
            .map(Response::into_text)
            .collect()
    }

    async fn save(&mut self) -> Result<bool> {
        self.save_as("startup-config").await
    }

    async fn reboot(&mut self, confirm: bool, timer: Option<Duration>) -> Result<()> {
        if let Some(timer) = timer.filter(|t| !t.is_zero()) {
            return Err(RebootTimerError {
                platform: self.platform.name.clone(),
                timer,
            }
            .into());
        }

        if !confirm {
            warn!("{}: reboot not confirmed; nothing sent", self.host());
            return Ok(());
        }
        if !self.is_open() {
            return Err(DriverError::NotConnected.into());
        }

        info!("{}: reloading", self.host());
        match self.dispatcher.execute_encoded("reload now").await {
            Ok(_) => {}
            Err(e) if e.is_disconnect() => debug!("{}: session dropped by reload", self.host()),
            Err(e) => return Err(e),
        }
        if let Err(e) = self.dispatcher.transport_mut().close().await {
            debug!("{}: closing after reload: {}", self.host(), e);
        }
        Ok(())
    }

    async fn boot_options(&mut self) -> Result<BootOptions> {
        read_boot_options(&mut self.dispatcher).await
    }

    async fn set_boot_options(
        &mut self,
        image: &str,
        file_system: Option<&str>,
    ) -> Result<BootChangeReport> {
        let mut change = BootImageChange::new(image);
        if let Some(file_system) = file_system {
            change = change.with_file_system(file_system);
        }
        let report = change
            .run(&mut EosBootTarget {
                dispatcher: &mut self.dispatcher,
            })
            .await?;
        info!(
            "{}: next boot set to {}{} (install {})",
            self.host(),
            report.file_system,
            report.image,
            report.install
        );
        Ok(report)
    }

    async fn rollback(&mut self, name: &str) -> Result<()> {
        checkpoint::rollback(&mut self.dispatcher, &self.platform, name).await
    }

    async fn checkpoint(&mut self, name: &str) -> Result<()> {
        checkpoint::checkpoint(&mut self.dispatcher, name)
            .await
            .map(|_| ())
    }

    async fn facts(&mut self) -> Result<Arc<Facts>> {
        if let Some(facts) = self.facts.get() {
            return Ok(facts);
        }
        let facts = self.gather_facts().await?;
        Ok(self.facts.store(facts))
    }

    async fn refresh_facts(&mut self) -> Result<Arc<Facts>> {
        self.facts.invalidate();
        self.facts().await
    }

    async fn running_config(&mut self) -> Result<String> {
        self.dispatcher.query_text("show running-config").await
    }

    async fn startup_config(&mut self) -> Result<String> {
        self.dispatcher.query_text("show startup-config").await
    }

    async fn file_copy(&mut self, request: &FileCopyRequest) -> Result<FileCopyOutcome> {
        let file_system = self.file_system(request.file_system.as_deref()).await?;
        file_copy::copy_file(
            &mut self.dispatcher,
            &self.files,
            &self.platform,
            &file_system,
            request,
        )
        .await
    }

    async fn file_copy_remote_exists(&mut self, request: &FileCopyRequest) -> Result<bool> {
        let file_system = self.file_system(request.file_system.as_deref()).await?;
        file_copy::remote_exists(&mut self.dispatcher, &self.files, &file_system, request).await
    }

    async fn install_os(&mut self, image: &str, file_system: Option<&str>) -> Result<bool> {
        if self.image_booted(image).await? {
            info!("{}: already booted from {}", self.host(), image);
            return Ok(false);
        }

        self.set_boot_options(image, file_system).await?;
        self.reboot(true, None).await?;
        self.wait_for_reboot().await?;

        if !self.image_booted(image).await? {
            return Err(VerificationError::ImageNotBooted {
                host: self.host().to_string(),
                image: image.to_string(),
            }
            .into());
        }
        Ok(true)
    }
}

/// Boot-image steps as EOS commands.
struct EosBootTarget<'a, T> {
    dispatcher: &'a mut CommandDispatcher<T>,
}

impl<T: SessionTransport> BootImageTarget for EosBootTarget<'_, T> {
    async fn discover_file_system(&mut self) -> Result<String> {
        discover_file_system(self.dispatcher).await
    }

    async fn list_directory(&mut self, file_system: &str) -> Result<(String, String)> {
        let command = format!("dir {file_system}");
        let listing = self.dispatcher.query_text(&command).await?;
        Ok((listing, command))
    }

    async fn install_image(&mut self, file_system: &str, image: &str) -> Result<Acknowledgement> {
        self.dispatcher
            .execute_encoded(&format!("install source {file_system}{image}"))
            .await
    }

    async fn read_boot_options(&mut self) -> Result<(BootOptions, String)> {
        let options = read_boot_options(self.dispatcher).await?;
        Ok((options, "show boot-config".to_string()))
    }
}

/// Default storage root: the first `<name>:` token in the `dir` listing.
async fn discover_file_system<T: SessionTransport>(
    dispatcher: &mut CommandDispatcher<T>,
) -> Result<String> {
    let output = dispatcher.query_text("dir").await?;
    parse_file_system(&output).ok_or_else(|| {
        BootImageError::FileSystemNotFound {
            command: "dir".to_string(),
            output: output.trim().to_string(),
        }
        .into()
    })
}

fn parse_file_system(listing: &str) -> Option<String> {
    listing.split_whitespace().find_map(|token| match token.find(':') {
        Some(end) if end > 0 => Some(token[..=end].to_string()),
        _ => None,
    })
}

async fn read_boot_options<T: SessionTransport>(
    dispatcher: &mut CommandDispatcher<T>,
) -> Result<BootOptions> {
    let boot: ShowBootConfig = dispatcher.query_json("show boot-config").await?;
    Ok(BootOptions::new().with_slot(
        BootOptions::SYSTEM_IMAGE,
        strip_file_system(&boot.software_image),
    ))
}

/// `flash:EOS.swi` and `flash:/EOS.swi` both become `EOS.swi`.
fn strip_file_system(image: &str) -> &str {
    match image.split_once(':') {
        Some((_, path)) => path.trim_start_matches('/'),
        None => image,
    }
}
