use std::fs;

use log::{debug, trace};
use once_cell::sync::Lazy;
use pingora::server::configuration::Opt;
use pingora_error::{Error, ErrorType::*, OrErr, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::datastore::RETAINED_SLOTS;

static FORK_VERSION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{8}$").unwrap());

#[derive(Default, Debug, Serialize, Deserialize, Validate)]
#[validate(schema(function = "Config::validate_apis"))]
pub struct Config {
    #[validate(nested)]
    pub relay: Relay,

    #[validate(nested)]
    #[serde(default)]
    pub bid_stats: BidStats,

    #[serde(default)]
    pub beacon: Beacon,

    pub log: Option<Log>,
}

// Config file load and validation
impl Config {
    pub fn load_from_yaml<P>(path: P) -> Result<Self>
    where
        P: AsRef<std::path::Path> + std::fmt::Display,
    {
        let conf_str = fs::read_to_string(&path).or_err_with(ReadError, || {
            format!("Unable to read conf file from {path}")
        })?;
        debug!("Conf file read from {path}");
        Self::from_yaml(&conf_str)
    }

    // config file load entry point
    pub fn load_yaml_with_opt_override(opt: &Opt) -> Result<Self> {
        if let Some(path) = &opt.conf {
            Self::load_from_yaml(path)
        } else {
            Error::e_explain(ReadError, "No path specified")
        }
    }

    pub fn from_yaml(conf_str: &str) -> Result<Self> {
        trace!("Read conf file: {conf_str}");
        let conf: Config = serde_yaml::from_str(conf_str).or_err_with(ReadError, || {
            format!("Unable to parse yaml conf {conf_str}")
        })?;

        trace!("Loaded conf: {conf:?}");

        conf.validate()
            .or_err_with(FileReadError, || "Conf file valid failed")?;

        Ok(conf)
    }

    fn validate_apis(&self) -> Result<(), ValidationError> {
        if !self.relay.proposer_api && !self.relay.builder_api {
            log::warn!("Neither proposer nor builder API enabled, only status routes are served");
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct Relay {
    #[validate(length(min = 1))]
    #[serde(default = "Relay::default_listen_addr")]
    pub listen_addr: String,

    #[validate(regex(path = *FORK_VERSION_RE))]
    #[serde(default = "Relay::default_genesis_fork_version")]
    pub genesis_fork_version: String,

    #[serde(default)]
    pub proposer_api: bool,
    #[serde(default)]
    pub builder_api: bool,

    /// Requests with a larger body are answered with 413
    #[validate(range(min = 1))]
    #[serde(default = "Relay::default_max_request_body_bytes")]
    pub max_request_body_bytes: usize,

    /// Slots behind the newest bid whose best bids stay in the datastore
    #[serde(default = "Relay::default_retained_slots")]
    pub retained_slots: u64,
}

impl Relay {
    fn default_listen_addr() -> String {
        "127.0.0.1:9062".to_string()
    }

    fn default_genesis_fork_version() -> String {
        "0x00000000".to_string()
    }

    fn default_max_request_body_bytes() -> usize {
        10 * 1024 * 1024
    }

    fn default_retained_slots() -> u64 {
        RETAINED_SLOTS
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self {
            listen_addr: Self::default_listen_addr(),
            genesis_fork_version: Self::default_genesis_fork_version(),
            proposer_api: false,
            builder_api: false,
            max_request_body_bytes: Self::default_max_request_body_bytes(),
            retained_slots: Self::default_retained_slots(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct BidStats {
    /// Submissions kept in the payload size baseline
    #[serde(default = "BidStats::default_entries_for_tally")]
    pub entries_for_tally: u64,

    /// Absolute deviation above which a submission is logged as anomalous
    #[validate(range(min = 0.0))]
    #[serde(default = "BidStats::default_deviation_warn")]
    pub deviation_warn: f64,
}

impl BidStats {
    fn default_entries_for_tally() -> u64 {
        100
    }

    fn default_deviation_warn() -> f64 {
        0.5
    }
}

impl Default for BidStats {
    fn default() -> Self {
        Self {
            entries_for_tally: Self::default_entries_for_tally(),
            deviation_warn: Self::default_deviation_warn(),
        }
    }
}

/// Sync status served by [`StaticBeaconClient`](crate::beacon::StaticBeaconClient).
///
/// The relay binary has no beacon node connection of its own: these values
/// are what the proposer API checks at startup, so a local run reports
/// `head_slot` and starts unless `syncing` is set.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Beacon {
    #[serde(default)]
    pub head_slot: u64,
    #[serde(default)]
    pub syncing: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Log {
    pub path: String,
}
