//! Shapes of the EOS JSON responses the device driver reads.

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

/// `show version`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowVersion {
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub internal_version: String,
    #[serde(default)]
    pub serial_number: String,
    /// Seconds since the epoch, fractional.
    pub bootup_timestamp: f64,
}

/// `show hostname`
#[derive(Debug, Clone, Deserialize)]
pub struct ShowHostname {
    pub hostname: String,
    #[serde(default)]
    pub fqdn: String,
}

/// `show boot-config`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowBootConfig {
    #[serde(default)]
    pub software_image: String,
}

/// `show interfaces status`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowInterfacesStatus {
    #[serde(default)]
    pub interface_statuses: IndexMap<String, Value>,
}

/// `show vlan`
#[derive(Debug, Clone, Deserialize)]
pub struct ShowVlan {
    #[serde(default)]
    pub vlans: IndexMap<String, Value>,
}
