//! Builder-facing API
//!
//! Builders submit blocks for a slot. Every submission's payload size is
//! compared against the recent baseline kept in [`BidStats`] before being
//! added to it, so a submission never skews its own comparison.

use std::sync::Arc;

use async_trait::async_trait;
use http::{Method, Response};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::{bidstats::BidStats, decoded_payload_len, parse_fork_version};
use crate::{
    core::{
        error::RelayResult,
        traits::{ApiComponent, ProposerDatastore},
        types::BidTrace,
    },
    orchestration::router::{Handler, RelayRequest, RouteTable},
    utils::response::ResponseBuilder,
    validation_error,
};

pub const PATH_SUBMIT_BLOCK: &str = "/relay/v1/builder/blocks";
pub const PATH_BID_STATS: &str = "/relay/v1/data/bidstats";

pub struct BuilderApi {
    datastore: Arc<dyn ProposerDatastore>,
    bid_stats: Arc<BidStats>,
    genesis_fork_version: [u8; 4],
    deviation_warn: f64,
}

impl BuilderApi {
    pub fn new(
        datastore: Arc<dyn ProposerDatastore>,
        bid_stats: Arc<BidStats>,
        genesis_fork_version_hex: &str,
        deviation_warn: f64,
    ) -> RelayResult<Self> {
        let genesis_fork_version = parse_fork_version(genesis_fork_version_hex)?;
        Ok(Self {
            datastore,
            bid_stats,
            genesis_fork_version,
            deviation_warn,
        })
    }
}

#[async_trait]
impl ApiComponent for BuilderApi {
    fn name(&self) -> &'static str {
        "builder"
    }

    fn register_routes(&self, routes: &mut RouteTable) -> RelayResult<()> {
        routes
            .route(
                PATH_SUBMIT_BLOCK,
                Method::POST,
                Arc::new(SubmitBlockHandler {
                    datastore: self.datastore.clone(),
                    bid_stats: self.bid_stats.clone(),
                    deviation_warn: self.deviation_warn,
                }),
            )?
            .route(
                PATH_BID_STATS,
                Method::GET,
                Arc::new(BidStatsHandler {
                    bid_stats: self.bid_stats.clone(),
                }),
            )?;
        Ok(())
    }

    async fn start(&self) -> RelayResult<()> {
        info!(
            "Builder API started, payload baseline over {} submissions, genesis fork version 0x{}",
            self.bid_stats.capacity(),
            hex::encode(self.genesis_fork_version)
        );
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct BlockSubmission {
    slot: u64,
    parent_hash: String,
    proposer_pubkey: String,
    builder_pubkey: String,
    value: String,
    payload: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmissionResponse {
    pub payload_size: u64,
    pub deviation: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BidStatsResponse {
    pub total: u64,
    pub count: u64,
    pub average: f64,
}

struct SubmitBlockHandler {
    datastore: Arc<dyn ProposerDatastore>,
    bid_stats: Arc<BidStats>,
    deviation_warn: f64,
}

#[async_trait]
impl Handler for SubmitBlockHandler {
    async fn handle(&self, req: &RelayRequest) -> RelayResult<Response<Vec<u8>>> {
        let submission: BlockSubmission = serde_json::from_slice(&req.body)?;
        let value: u128 = submission
            .value
            .parse()
            .map_err(|_| validation_error!("invalid bid value {}", submission.value))?;
        let payload_size = decoded_payload_len(&submission.payload)?;

        let deviation = self.bid_stats.payload_size_deviation(payload_size);
        if deviation.abs() > self.deviation_warn {
            warn!(
                "Payload size {} for slot {} from builder {} deviates {:.2} from average {:.1}",
                payload_size,
                submission.slot,
                submission.builder_pubkey,
                deviation,
                self.bid_stats.running_average()
            );
        }
        self.bid_stats.add_entry(submission.slot, payload_size);

        debug!(
            "Accepted bid for slot {} value {} payload size {}",
            submission.slot, value, payload_size
        );
        self.datastore.save_bid(BidTrace {
            slot: submission.slot,
            parent_hash: submission.parent_hash,
            proposer_pubkey: submission.proposer_pubkey,
            builder_pubkey: submission.builder_pubkey,
            value,
            payload_size,
        })?;

        Ok(ResponseBuilder::success_json(&SubmissionResponse {
            payload_size,
            deviation,
        }))
    }
}

struct BidStatsHandler {
    bid_stats: Arc<BidStats>,
}

#[async_trait]
impl Handler for BidStatsHandler {
    async fn handle(&self, _req: &RelayRequest) -> RelayResult<Response<Vec<u8>>> {
        let (total, count, average) = self.bid_stats.payload_size_stats(self.bid_stats.capacity());
        Ok(ResponseBuilder::success_json(&BidStatsResponse {
            total,
            count,
            average,
        }))
    }
}
