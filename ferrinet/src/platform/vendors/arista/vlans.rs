//! VLAN listing on EOS.

use super::models::ShowVlan;
use crate::driver::{CommandDispatcher, VlanLister};
use crate::error::Result;
use crate::transport::SessionTransport;

/// Lists VLAN ids from `show vlan`, sorted numerically.
#[derive(Debug, Clone, Copy, Default)]
pub struct EosVlans;

impl<T: SessionTransport> VlanLister<T> for EosVlans {
    async fn list_vlan_ids(&self, dispatcher: &mut CommandDispatcher<T>) -> Result<Vec<String>> {
        let output: ShowVlan = dispatcher.query_json("show vlan").await?;
        let mut ids: Vec<String> = output.vlans.into_keys().collect();
        ids.sort_by_cached_key(|id| (id.parse::<u32>().unwrap_or(u32::MAX), id.clone()));
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::classify::Classifier;
    use crate::transport::mock::ScriptedTransport;

    #[tokio::test]
    async fn test_vlans_sorted_numerically() {
        let transport = ScriptedTransport::new().json(
            "show vlan",
            json!({
                "sourceDetail": "",
                "vlans": {
                    "10": {"name": "VLAN0010", "status": "active"},
                    "1": {"name": "default", "status": "active"},
                    "2": {"name": "VLAN0002", "status": "active"}
                }
            }),
        );
        let mut dispatcher = CommandDispatcher::new(transport, Classifier::new(), "spine1");
        let ids = EosVlans.list_vlan_ids(&mut dispatcher).await.unwrap();
        assert_eq!(ids, vec!["1", "2", "10"]);
    }
}
