//! Shared data types passed between components and collaborators

use serde::{Deserialize, Serialize};

/// Sync state reported by the beacon node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub head_slot: u64,
    pub is_syncing: bool,
}

/// A proposer's registration preferences, keyed by its public key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorRegistration {
    pub pubkey: String,
    pub fee_recipient: String,
    pub gas_limit: u64,
    pub timestamp: u64,
}

/// A bid accepted from a builder for a given slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidTrace {
    pub slot: u64,
    pub parent_hash: String,
    pub proposer_pubkey: String,
    pub builder_pubkey: String,
    /// Bid value in wei, kept as a decimal string on the wire
    #[serde(with = "value_as_string")]
    pub value: u128,
    pub payload_size: u64,
}

mod value_as_string {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<u128>().map_err(D::Error::custom)
    }
}

/// Normalize a hex identifier (pubkey, hash) for use as a lookup key
pub fn normalize_hex_key(key: &str) -> String {
    key.trim_start_matches("0x").to_ascii_lowercase()
}
