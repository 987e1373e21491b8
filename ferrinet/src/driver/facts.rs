//! Device facts and their cache.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::dispatch::CommandDispatcher;
use crate::error::Result;
use crate::transport::SessionTransport;

/// Identity and inventory snapshot of a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facts {
    pub vendor: String,
    pub os_version: String,
    pub model: String,
    pub serial_number: String,
    pub hostname: String,
    pub fqdn: String,
    pub interfaces: Vec<String>,
    pub vlans: Vec<String>,
    /// Seconds since boot.
    pub uptime: u64,
    /// Uptime as `DD:HH:MM:SS`.
    pub uptime_string: String,
}

/// Format `seconds` as `DD:HH:MM:SS`.
pub fn uptime_string(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = seconds % 86_400 / 3_600;
    let minutes = seconds % 3_600 / 60;
    let secs = seconds % 60;
    format!("{days:02}:{hours:02}:{minutes:02}:{secs:02}")
}

/// Lists the VLAN ids configured on a device.
pub trait VlanLister<T: SessionTransport>: Send + Sync {
    fn list_vlan_ids(
        &self,
        dispatcher: &mut CommandDispatcher<T>,
    ) -> impl Future<Output = Result<Vec<String>>> + Send;
}

/// Facts gathered once and kept until explicitly invalidated.
#[derive(Debug, Default)]
pub struct FactsCache {
    facts: Option<Arc<Facts>>,
}

impl FactsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Arc<Facts>> {
        self.facts.clone()
    }

    pub fn store(&mut self, facts: Facts) -> Arc<Facts> {
        let facts = Arc::new(facts);
        self.facts = Some(Arc::clone(&facts));
        facts
    }

    pub fn invalidate(&mut self) {
        self.facts = None;
    }

    pub fn is_populated(&self) -> bool {
        self.facts.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts() -> Facts {
        Facts {
            vendor: "arista".into(),
            os_version: "4.14.7M-2384414.4147M".into(),
            model: "vEOS".into(),
            serial_number: String::new(),
            hostname: "eos-spine1".into(),
            fqdn: "eos-spine1.ntc.com".into(),
            interfaces: vec!["Ethernet1".into(), "Management1".into()],
            vlans: vec!["1".into(), "2".into(), "10".into()],
            uptime: 90_061,
            uptime_string: uptime_string(90_061),
        }
    }

    #[test]
    fn test_uptime_string() {
        assert_eq!(uptime_string(0), "00:00:00:00");
        assert_eq!(uptime_string(90_061), "01:01:01:01");
        assert_eq!(uptime_string(1_209_599), "13:23:59:59");
    }

    #[test]
    fn test_cache_store_and_invalidate() {
        let mut cache = FactsCache::new();
        assert!(cache.get().is_none());

        let stored = cache.store(facts());
        let cached = cache.get().unwrap();
        assert!(Arc::ptr_eq(&stored, &cached));

        cache.invalidate();
        assert!(!cache.is_populated());
    }

    #[test]
    fn test_facts_serialize() {
        let value = serde_json::to_value(facts()).unwrap();
        assert_eq!(value["hostname"], "eos-spine1");
        assert_eq!(value["uptime_string"], "01:01:01:01");
    }
}
