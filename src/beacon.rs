//! Beacon node client implementations.

use async_trait::async_trait;

use crate::core::{error::RelayResult, traits::BeaconNodeClient, types::SyncStatus};

/// Beacon client reporting a fixed sync status.
///
/// This is the client the relay binary runs with: its status comes from the
/// `beacon` section of the config file, so local runs and tests need no
/// reachable beacon node. Deployments that track a live node plug their own
/// [`BeaconNodeClient`] into [`RelayServiceOpts`](crate::service::RelayServiceOpts).
#[derive(Debug, Clone, Copy)]
pub struct StaticBeaconClient {
    status: SyncStatus,
}

impl StaticBeaconClient {
    pub fn new(head_slot: u64, is_syncing: bool) -> Self {
        Self {
            status: SyncStatus {
                head_slot,
                is_syncing,
            },
        }
    }
}

#[async_trait]
impl BeaconNodeClient for StaticBeaconClient {
    async fn sync_status(&self) -> RelayResult<SyncStatus> {
        Ok(self.status)
    }
}
