//! Core traits for relay components
//!
//! These are the seams between the orchestrator, the pluggable API surfaces
//! and the upstream collaborators (beacon node, datastore).

use async_trait::async_trait;

use super::{
    error::RelayResult,
    types::{BidTrace, SyncStatus, ValidatorRegistration},
};
use crate::orchestration::router::RouteTable;

/// A pluggable API surface composed into the relay's HTTP server.
///
/// Each component owns a disjoint path namespace. `start` is invoked exactly
/// once, before the listener is bound, and must report failure through its
/// return value rather than panicking.
#[async_trait]
pub trait ApiComponent: Send + Sync {
    /// Component name, used in logs
    fn name(&self) -> &'static str;

    /// Register this component's routes on the shared route table
    fn register_routes(&self, routes: &mut RouteTable) -> RelayResult<()>;

    /// Perform startup work before the server accepts requests
    async fn start(&self) -> RelayResult<()>;
}

/// Client for the consensus-layer beacon node
#[async_trait]
pub trait BeaconNodeClient: Send + Sync {
    /// Query the node's current head and sync state
    async fn sync_status(&self) -> RelayResult<SyncStatus>;
}

/// Storage for proposer registrations and received bids
pub trait ProposerDatastore: Send + Sync {
    /// Insert or replace a validator registration
    fn set_validator_registration(&self, registration: ValidatorRegistration) -> RelayResult<()>;

    /// Look up a registration by public key
    fn get_validator_registration(&self, pubkey: &str)
        -> RelayResult<Option<ValidatorRegistration>>;

    /// Number of registered validators
    fn num_registered_validators(&self) -> usize;

    /// Record a bid; only the highest value per (slot, parent, proposer) is kept
    fn save_bid(&self, bid: BidTrace) -> RelayResult<()>;

    /// Best bid recorded for the given slot, parent hash and proposer
    fn get_best_bid(
        &self,
        slot: u64,
        parent_hash: &str,
        proposer_pubkey: &str,
    ) -> RelayResult<Option<BidTrace>>;
}
