//! In-memory proposer datastore.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use log::debug;

use crate::core::{
    error::RelayResult,
    traits::ProposerDatastore,
    types::{normalize_hex_key, BidTrace, ValidatorRegistration},
};

type BidKey = (u64, String, String);

/// Number of slots behind the newest bid whose best bids are kept (about an
/// hour of mainnet slots).
pub const RETAINED_SLOTS: u64 = 300;

/// Proposer datastore backed by concurrent hash maps.
///
/// Keys are normalized hex (lowercase, no `0x`) so lookups are insensitive to
/// how clients spell public keys and hashes. Bids older than the retention
/// horizon are dropped when a newer slot arrives.
pub struct MemoryDatastore {
    registrations: DashMap<String, ValidatorRegistration>,
    bids: DashMap<BidKey, BidTrace>,
    retained_slots: u64,
    head_slot: AtomicU64,
}

impl Default for MemoryDatastore {
    fn default() -> Self {
        Self::with_retention(RETAINED_SLOTS)
    }
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retained_slots: u64) -> Self {
        Self {
            registrations: DashMap::new(),
            bids: DashMap::new(),
            retained_slots,
            head_slot: AtomicU64::new(0),
        }
    }

    /// Number of `(slot, parent hash, proposer)` entries currently held
    pub fn num_bids(&self) -> usize {
        self.bids.len()
    }

    fn is_expired(&self, slot: u64, head_slot: u64) -> bool {
        slot.saturating_add(self.retained_slots) < head_slot
    }

    fn bid_key(slot: u64, parent_hash: &str, proposer_pubkey: &str) -> BidKey {
        (
            slot,
            normalize_hex_key(parent_hash),
            normalize_hex_key(proposer_pubkey),
        )
    }
}

impl ProposerDatastore for MemoryDatastore {
    fn set_validator_registration(&self, registration: ValidatorRegistration) -> RelayResult<()> {
        let key = normalize_hex_key(&registration.pubkey);
        debug!("Storing registration for validator {key}");
        self.registrations.insert(key, registration);
        Ok(())
    }

    fn get_validator_registration(
        &self,
        pubkey: &str,
    ) -> RelayResult<Option<ValidatorRegistration>> {
        Ok(self
            .registrations
            .get(&normalize_hex_key(pubkey))
            .map(|entry| entry.value().clone()))
    }

    fn num_registered_validators(&self) -> usize {
        self.registrations.len()
    }

    fn save_bid(&self, bid: BidTrace) -> RelayResult<()> {
        let slot = bid.slot;
        let prev_head = self.head_slot.fetch_max(slot, Ordering::AcqRel);
        if self.is_expired(slot, prev_head) {
            debug!("Ignoring bid for slot {slot}, head is at {prev_head}");
            return Ok(());
        }

        let key = Self::bid_key(slot, &bid.parent_hash, &bid.proposer_pubkey);
        self.bids
            .entry(key)
            .and_modify(|best| {
                if bid.value > best.value {
                    *best = bid.clone();
                }
            })
            .or_insert_with(|| bid.clone());

        // the entry guard is released above; retain locks every shard
        if slot > prev_head {
            let before = self.bids.len();
            self.bids.retain(|(s, _, _), _| !self.is_expired(*s, slot));
            let pruned = before.saturating_sub(self.bids.len());
            if pruned > 0 {
                debug!(
                    "Pruned {pruned} bids older than slot {}",
                    slot.saturating_sub(self.retained_slots)
                );
            }
        }
        Ok(())
    }

    fn get_best_bid(
        &self,
        slot: u64,
        parent_hash: &str,
        proposer_pubkey: &str,
    ) -> RelayResult<Option<BidTrace>> {
        Ok(self
            .bids
            .get(&Self::bid_key(slot, parent_hash, proposer_pubkey))
            .map(|entry| entry.value().clone()))
    }
}
