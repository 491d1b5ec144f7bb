//! Relay service orchestrator
//!
//! Owns the configured API components, assembles them behind one router and
//! one listener, and guards against the server being started twice.

use std::{net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use http::{Method, Response};
use log::{info, warn};
use once_cell::sync::OnceCell;
use tokio::{net::TcpListener, sync::watch};

use super::http::{serve, RelayHttpApp};
use crate::{
    api::{BidStats, BuilderApi, ProposerApi},
    config::Config,
    core::{
        error::RelayResult,
        traits::{ApiComponent, BeaconNodeClient, ProposerDatastore},
    },
    orchestration::{
        lifecycle::{LifecycleGuard, ServerState},
        router::{Handler, RelayRequest, RelayRouter, RouteTable},
    },
    utils::response::ResponseBuilder,
};

pub const PATH_ROOT: &str = "/";
pub const PATH_STATUS: &str = "/eth/v1/builder/status";

/// Options for a relay instance
#[derive(Clone)]
pub struct RelayServiceOpts {
    pub listen_addr: String,
    pub beacon_client: Arc<dyn BeaconNodeClient>,
    pub datastore: Arc<dyn ProposerDatastore>,

    /// Genesis fork version, for signature domain computation in the APIs
    pub genesis_fork_version_hex: String,

    /// Which APIs to spin up
    pub proposer_api: bool,
    pub builder_api: bool,

    pub bid_stats_entries: u64,
    pub payload_deviation_warn: f64,

    /// Largest accepted request body, in bytes
    pub max_body_bytes: usize,
}

impl RelayServiceOpts {
    pub fn from_config(
        config: &Config,
        beacon_client: Arc<dyn BeaconNodeClient>,
        datastore: Arc<dyn ProposerDatastore>,
    ) -> Self {
        Self {
            listen_addr: config.relay.listen_addr.clone(),
            beacon_client,
            datastore,
            genesis_fork_version_hex: config.relay.genesis_fork_version.clone(),
            proposer_api: config.relay.proposer_api,
            builder_api: config.relay.builder_api,
            bid_stats_entries: config.bid_stats.entries_for_tally,
            payload_deviation_warn: config.bid_stats.deviation_warn,
            max_body_bytes: config.relay.max_request_body_bytes,
        }
    }
}

/// A single relay instance
pub struct RelayService {
    opts: RelayServiceOpts,
    apis: Vec<Arc<dyn ApiComponent>>,
    bid_stats: Arc<BidStats>,
    lifecycle: LifecycleGuard,
    local_addr: OnceCell<SocketAddr>,
    shutdown: watch::Sender<bool>,
}

impl RelayService {
    /// Build a relay with the APIs enabled in `opts`.
    ///
    /// The first component that fails to construct aborts the whole build and
    /// its error is returned as is.
    pub fn new(opts: RelayServiceOpts) -> RelayResult<Self> {
        let bid_stats = Arc::new(BidStats::new(opts.bid_stats_entries));
        let mut apis: Vec<Arc<dyn ApiComponent>> = Vec::new();

        if opts.proposer_api {
            let api = ProposerApi::new(
                opts.datastore.clone(),
                opts.beacon_client.clone(),
                &opts.genesis_fork_version_hex,
            )?;
            apis.push(Arc::new(api));
        }

        if opts.builder_api {
            let api = BuilderApi::new(
                opts.datastore.clone(),
                bid_stats.clone(),
                &opts.genesis_fork_version_hex,
                opts.payload_deviation_warn,
            )?;
            apis.push(Arc::new(api));
        }

        Ok(Self::with_components(opts, apis, bid_stats))
    }

    /// Build a relay around an explicit, ordered set of components
    pub fn with_components(
        opts: RelayServiceOpts,
        apis: Vec<Arc<dyn ApiComponent>>,
        bid_stats: Arc<BidStats>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        let names: Vec<_> = apis.iter().map(|api| api.name()).collect();
        info!("Relay configured with APIs {names:?}");

        Self {
            opts,
            apis,
            bid_stats,
            lifecycle: LifecycleGuard::new(),
            local_addr: OnceCell::new(),
            shutdown,
        }
    }

    pub fn components(&self) -> &[Arc<dyn ApiComponent>] {
        &self.apis
    }

    pub fn bid_stats(&self) -> Arc<BidStats> {
        self.bid_stats.clone()
    }

    pub fn state(&self) -> ServerState {
        self.lifecycle.state()
    }

    /// Address the listener is bound to, once the server is serving
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    /// Root and status routes followed by every component's routes
    pub fn build_router(&self) -> RelayResult<RelayRouter> {
        let mut routes = RouteTable::new();
        routes
            .route(PATH_ROOT, Method::GET, Arc::new(EmptyOkHandler))?
            .route(PATH_STATUS, Method::GET, Arc::new(EmptyOkHandler))?;

        for api in &self.apis {
            api.register_routes(&mut routes)?;
        }

        routes.build()
    }

    /// Start every component in registration order, stopping at the first
    /// failure. Components that already started are left running.
    pub async fn start_components(&self) -> RelayResult<()> {
        for api in &self.apis {
            info!("Starting {} API", api.name());
            api.start().await?;
        }
        Ok(())
    }

    /// Start the components, then bind and serve until [`close`](Self::close).
    ///
    /// A second call fails with `ServerAlreadyRunning` and has no other
    /// effect. Startup failures before the components are running leave the
    /// relay in `NotStarted`.
    pub async fn start_server(&self) -> RelayResult<()> {
        self.lifecycle.try_start()?;

        let router = match self.build_router() {
            Ok(router) => router,
            Err(e) => {
                self.lifecycle.abort_start();
                return Err(e);
            }
        };

        if let Err(e) = self.start_components().await {
            warn!("Component startup failed: {e}");
            self.lifecycle.abort_start();
            return Err(e);
        }

        let listener = TcpListener::bind(&self.opts.listen_addr).await?;
        let addr = listener.local_addr()?;
        let _ = self.local_addr.set(addr);
        info!("Relay listening on {addr}");

        serve(
            Arc::new(RelayHttpApp::new(router, self.opts.max_body_bytes)),
            listener,
            self.shutdown.subscribe(),
        )
        .await
    }

    /// Gracefully close the listener; `start_server` then returns `Ok(())`
    pub fn close(&self) {
        info!("Closing relay listener");
        self.shutdown.send_replace(true);
    }
}

/// Liveness and status routes: always 200 with an empty body
struct EmptyOkHandler;

#[async_trait]
impl Handler for EmptyOkHandler {
    async fn handle(&self, _req: &RelayRequest) -> RelayResult<Response<Vec<u8>>> {
        Ok(ResponseBuilder::ok_empty())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bytes::Bytes;
    use http::StatusCode;

    use super::*;
    use crate::{
        beacon::StaticBeaconClient,
        core::error::RelayError,
        datastore::MemoryDatastore,
    };

    fn opts(proposer_api: bool, builder_api: bool, fork: &str) -> RelayServiceOpts {
        RelayServiceOpts {
            listen_addr: "127.0.0.1:0".to_string(),
            beacon_client: Arc::new(StaticBeaconClient::new(10, false)),
            datastore: Arc::new(MemoryDatastore::new()),
            genesis_fork_version_hex: fork.to_string(),
            proposer_api,
            builder_api,
            bid_stats_entries: 3,
            payload_deviation_warn: 0.5,
            max_body_bytes: 1024,
        }
    }

    /// Component recording how often it was started
    struct StubApi {
        name: &'static str,
        path: &'static str,
        fail: bool,
        starts: AtomicUsize,
    }

    impl StubApi {
        fn new(name: &'static str, path: &'static str, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                path,
                fail,
                starts: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ApiComponent for StubApi {
        fn name(&self) -> &'static str {
            self.name
        }

        fn register_routes(&self, routes: &mut RouteTable) -> RelayResult<()> {
            routes.route(self.path, Method::GET, Arc::new(EmptyOkHandler))?;
            Ok(())
        }

        async fn start(&self) -> RelayResult<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(RelayError::Beacon(format!("{} failed", self.name)));
            }
            Ok(())
        }
    }

    #[test]
    fn test_components_follow_flags() {
        assert!(RelayService::new(opts(false, false, "0x00000000"))
            .unwrap()
            .components()
            .is_empty());

        let relay = RelayService::new(opts(true, true, "0x00000000")).unwrap();
        let names: Vec<_> = relay.components().iter().map(|a| a.name()).collect();
        assert_eq!(names, vec!["proposer", "builder"]);

        let relay = RelayService::new(opts(false, true, "0x00000000")).unwrap();
        assert_eq!(relay.components().len(), 1);
        assert_eq!(relay.state(), ServerState::NotStarted);
    }

    #[test]
    fn test_construction_error_propagates() {
        let res = RelayService::new(opts(true, true, "0xbad"));
        assert!(matches!(res, Err(RelayError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_builtin_routes() {
        let relay = RelayService::new(opts(true, true, "0x00000000")).unwrap();
        let router = relay.build_router().unwrap();

        for path in [PATH_ROOT, PATH_STATUS] {
            let resp = router
                .dispatch(RelayRequest::new(Method::GET, path, Bytes::new()))
                .await;
            assert_eq!(resp.status(), StatusCode::OK);
            assert!(resp.body().is_empty());
        }

        let resp = router
            .dispatch(RelayRequest::new(Method::GET, "/unknown", Bytes::new()))
            .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_component_cannot_take_builtin_route() {
        let hijack = StubApi::new("hijack", PATH_STATUS, false);
        let relay = RelayService::with_components(
            opts(false, false, "0x00000000"),
            vec![hijack as Arc<dyn ApiComponent>],
            Arc::new(BidStats::new(3)),
        );
        assert!(matches!(
            relay.build_router(),
            Err(RelayError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_start_components_stops_at_first_failure() {
        let first = StubApi::new("first", "/first", false);
        let broken = StubApi::new("broken", "/broken", true);
        let never = StubApi::new("never", "/never", false);
        let relay = RelayService::with_components(
            opts(false, false, "0x00000000"),
            vec![
                first.clone() as Arc<dyn ApiComponent>,
                broken.clone(),
                never.clone(),
            ],
            Arc::new(BidStats::new(3)),
        );

        let err = relay.start_components().await.unwrap_err();
        assert!(matches!(err, RelayError::Beacon(ref msg) if msg == "broken failed"));
        assert_eq!(first.starts.load(Ordering::SeqCst), 1);
        assert_eq!(broken.starts.load(Ordering::SeqCst), 1);
        assert_eq!(never.starts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_component_prevents_bind() {
        let broken = StubApi::new("broken", "/broken", true);
        let relay = RelayService::with_components(
            opts(false, false, "0x00000000"),
            vec![broken as Arc<dyn ApiComponent>],
            Arc::new(BidStats::new(3)),
        );

        let err = relay.start_server().await.unwrap_err();
        assert!(matches!(err, RelayError::Beacon(ref msg) if msg == "broken failed"));
        assert!(relay.local_addr().is_none());
        assert_eq!(relay.state(), ServerState::NotStarted);
    }

    #[tokio::test]
    async fn test_syncing_beacon_fails_startup() {
        let mut o = opts(true, false, "0x00000000");
        o.beacon_client = Arc::new(StaticBeaconClient::new(10, true));
        let relay = RelayService::new(o).unwrap();

        assert!(matches!(
            relay.start_server().await,
            Err(RelayError::Beacon(_))
        ));
        assert!(relay.local_addr().is_none());
    }

    #[tokio::test]
    async fn test_bind_error_is_returned() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let mut o = opts(false, false, "0x00000000");
        o.listen_addr = taken.local_addr().unwrap().to_string();
        let relay = RelayService::new(o).unwrap();

        assert!(matches!(
            relay.start_server().await,
            Err(RelayError::Network(_))
        ));
    }

    #[tokio::test]
    async fn test_close_before_serving_returns_ok() {
        let relay = RelayService::new(opts(false, false, "0x00000000")).unwrap();
        relay.close();
        assert!(relay.start_server().await.is_ok());
        assert_eq!(relay.state(), ServerState::Running);
    }
}
