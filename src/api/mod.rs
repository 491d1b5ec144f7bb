//! Pluggable API surfaces served by the relay.
//!
//! The proposer API handles validator registrations and header requests, the
//! builder API accepts block submissions and feeds payload sizes into
//! [`BidStats`](bidstats::BidStats).

pub mod bidstats;
pub mod builder;
pub mod proposer;

pub use bidstats::BidStats;
pub use builder::BuilderApi;
pub use proposer::ProposerApi;

use crate::{config_error, core::error::RelayResult};

/// Decode a `0x`-prefixed 4 byte fork version.
///
/// Both API components receive the genesis fork version for signature domain
/// computation and refuse to start with a malformed one.
pub fn parse_fork_version(hex_str: &str) -> RelayResult<[u8; 4]> {
    let raw = hex_str
        .strip_prefix("0x")
        .ok_or_else(|| config_error!("fork version {} must start with 0x", hex_str))?;

    let bytes =
        hex::decode(raw).map_err(|e| config_error!("invalid fork version {}: {}", hex_str, e))?;

    <[u8; 4]>::try_from(bytes.as_slice())
        .map_err(|_| config_error!("fork version {} must be 4 bytes", hex_str))
}

/// Decode a `0x`-prefixed hex payload, returning its size in bytes
pub(crate) fn decoded_payload_len(payload: &str) -> RelayResult<u64> {
    let raw = payload.strip_prefix("0x").unwrap_or(payload);
    Ok(hex::decode(raw)?.len() as u64)
}
