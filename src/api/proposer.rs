//! Proposer-facing API
//!
//! Validators register their fee recipient and gas limit preferences here and
//! ask for the best bid known for a slot.

use std::sync::Arc;

use async_trait::async_trait;
use http::{Method, Response};
use log::{info, warn};

use super::parse_fork_version;
use crate::{
    core::{
        error::{RelayError, RelayResult},
        traits::{ApiComponent, BeaconNodeClient, ProposerDatastore},
        types::ValidatorRegistration,
    },
    orchestration::router::{Handler, RelayRequest, RouteTable},
    utils::response::ResponseBuilder,
    validation_error,
};

pub const PATH_REGISTER_VALIDATOR: &str = "/eth/v1/builder/validators";
pub const PATH_GET_HEADER: &str = "/eth/v1/builder/header/{slot}/{parent_hash}/{pubkey}";

pub struct ProposerApi {
    datastore: Arc<dyn ProposerDatastore>,
    beacon_client: Arc<dyn BeaconNodeClient>,
    genesis_fork_version: [u8; 4],
}

impl ProposerApi {
    pub fn new(
        datastore: Arc<dyn ProposerDatastore>,
        beacon_client: Arc<dyn BeaconNodeClient>,
        genesis_fork_version_hex: &str,
    ) -> RelayResult<Self> {
        let genesis_fork_version = parse_fork_version(genesis_fork_version_hex)?;
        Ok(Self {
            datastore,
            beacon_client,
            genesis_fork_version,
        })
    }
}

#[async_trait]
impl ApiComponent for ProposerApi {
    fn name(&self) -> &'static str {
        "proposer"
    }

    fn register_routes(&self, routes: &mut RouteTable) -> RelayResult<()> {
        routes
            .route(
                PATH_REGISTER_VALIDATOR,
                Method::POST,
                Arc::new(RegisterValidatorsHandler {
                    datastore: self.datastore.clone(),
                }),
            )?
            .route(
                PATH_GET_HEADER,
                Method::GET,
                Arc::new(GetHeaderHandler {
                    datastore: self.datastore.clone(),
                }),
            )?;
        Ok(())
    }

    async fn start(&self) -> RelayResult<()> {
        let status = self.beacon_client.sync_status().await?;
        if status.is_syncing {
            warn!("Beacon node is syncing (head slot {})", status.head_slot);
            return Err(RelayError::Beacon("beacon node is syncing".to_string()));
        }
        info!(
            "Proposer API started at head slot {} with {} registered validators, genesis fork version 0x{}",
            status.head_slot,
            self.datastore.num_registered_validators(),
            hex::encode(self.genesis_fork_version)
        );
        Ok(())
    }
}

struct RegisterValidatorsHandler {
    datastore: Arc<dyn ProposerDatastore>,
}

#[async_trait]
impl Handler for RegisterValidatorsHandler {
    async fn handle(&self, req: &RelayRequest) -> RelayResult<Response<Vec<u8>>> {
        let registrations: Vec<ValidatorRegistration> = serde_json::from_slice(&req.body)?;

        for registration in registrations {
            if registration.pubkey.is_empty() {
                return Err(validation_error!("registration without pubkey"));
            }
            self.datastore.set_validator_registration(registration)?;
        }

        Ok(ResponseBuilder::ok_empty())
    }
}

struct GetHeaderHandler {
    datastore: Arc<dyn ProposerDatastore>,
}

#[async_trait]
impl Handler for GetHeaderHandler {
    async fn handle(&self, req: &RelayRequest) -> RelayResult<Response<Vec<u8>>> {
        let slot = req
            .param("slot")
            .ok_or_else(|| validation_error!("missing slot"))?;
        let slot: u64 = slot
            .parse()
            .map_err(|_| validation_error!("invalid slot {}", slot))?;
        let parent_hash = req
            .param("parent_hash")
            .ok_or_else(|| validation_error!("missing parent hash"))?;
        let pubkey = req
            .param("pubkey")
            .ok_or_else(|| validation_error!("missing pubkey"))?;

        if self.datastore.get_validator_registration(pubkey)?.is_none() {
            return Err(validation_error!("validator {} is not registered", pubkey));
        }

        match self.datastore.get_best_bid(slot, parent_hash, pubkey)? {
            Some(bid) => Ok(ResponseBuilder::success_json(&bid)),
            None => Ok(ResponseBuilder::no_content()),
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::StatusCode;

    use super::*;
    use crate::{beacon::StaticBeaconClient, core::types::BidTrace, datastore::MemoryDatastore};

    fn proposer_api(syncing: bool) -> (ProposerApi, Arc<MemoryDatastore>) {
        let datastore = Arc::new(MemoryDatastore::new());
        let api = ProposerApi::new(
            datastore.clone(),
            Arc::new(StaticBeaconClient::new(100, syncing)),
            "0x00000000",
        )
        .unwrap();
        (api, datastore)
    }

    #[test]
    fn test_bad_fork_version_fails_construction() {
        let res = ProposerApi::new(
            Arc::new(MemoryDatastore::new()),
            Arc::new(StaticBeaconClient::new(0, false)),
            "0xnothex",
        );
        assert!(matches!(res, Err(RelayError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_start_fails_while_syncing() {
        let (api, _) = proposer_api(true);
        assert!(matches!(api.start().await, Err(RelayError::Beacon(_))));

        let (api, _) = proposer_api(false);
        assert!(api.start().await.is_ok());
    }

    #[tokio::test]
    async fn test_register_and_get_header() {
        let (api, datastore) = proposer_api(false);
        let mut routes = RouteTable::new();
        api.register_routes(&mut routes).unwrap();
        let router = routes.build().unwrap();

        let body = r#"[{"pubkey":"0xAB","fee_recipient":"0x01","gas_limit":30000000,"timestamp":1}]"#;
        let resp = router
            .dispatch(RelayRequest::new(
                Method::POST,
                PATH_REGISTER_VALIDATOR,
                Bytes::from(body),
            ))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(datastore.num_registered_validators(), 1);

        let header_path = "/eth/v1/builder/header/5/0x11/0xab";
        let resp = router
            .dispatch(RelayRequest::new(Method::GET, header_path, Bytes::new()))
            .await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        datastore
            .save_bid(BidTrace {
                slot: 5,
                parent_hash: "0x11".to_string(),
                proposer_pubkey: "0xAB".to_string(),
                builder_pubkey: "0x02".to_string(),
                value: 42,
                payload_size: 3,
            })
            .unwrap();
        let resp = router
            .dispatch(RelayRequest::new(Method::GET, header_path, Bytes::new()))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let bid: BidTrace = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(bid.value, 42);
    }

    #[tokio::test]
    async fn test_invalid_requests() {
        let (api, _) = proposer_api(false);
        let mut routes = RouteTable::new();
        api.register_routes(&mut routes).unwrap();
        let router = routes.build().unwrap();

        let resp = router
            .dispatch(RelayRequest::new(
                Method::POST,
                PATH_REGISTER_VALIDATOR,
                Bytes::from_static(b"not json"),
            ))
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = router
            .dispatch(RelayRequest::new(
                Method::GET,
                "/eth/v1/builder/header/notaslot/0x11/0xab",
                Bytes::new(),
            ))
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_get_header_requires_registration() {
        let (api, datastore) = proposer_api(false);
        let mut routes = RouteTable::new();
        api.register_routes(&mut routes).unwrap();
        let router = routes.build().unwrap();

        datastore
            .save_bid(BidTrace {
                slot: 7,
                parent_hash: "0x22".to_string(),
                proposer_pubkey: "0xcc".to_string(),
                builder_pubkey: "0x02".to_string(),
                value: 5,
                payload_size: 1,
            })
            .unwrap();

        let header_path = "/eth/v1/builder/header/7/0x22/0xcc";
        let resp = router
            .dispatch(RelayRequest::new(Method::GET, header_path, Bytes::new()))
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        datastore
            .set_validator_registration(ValidatorRegistration {
                pubkey: "0xCC".to_string(),
                fee_recipient: "0x01".to_string(),
                gas_limit: 30_000_000,
                timestamp: 1,
            })
            .unwrap();
        let resp = router
            .dispatch(RelayRequest::new(Method::GET, header_path, Bytes::new()))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
