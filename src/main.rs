use std::sync::Arc;

use pingora::server::configuration::Opt;
use tokio::sync::watch;

use boost_relay::{
    beacon::StaticBeaconClient,
    config::Config,
    datastore::MemoryDatastore,
    logging::Logger,
    service::{RelayService, RelayServiceOpts},
};

#[tokio::main]
async fn main() {
    // Read command-line arguments
    let opt = Opt::parse_args();

    // Load configuration
    let config = Config::load_yaml_with_opt_override(&opt).expect("Failed to load configuration");

    // Initialize logging, to a file when one is configured
    let (log_shutdown, log_shutdown_rx) = watch::channel(false);
    let log_task = config.log.clone().map(|log_cfg| {
        let logger = Logger::new(log_cfg);
        logger.init_env_logger();
        tokio::spawn(logger.run(log_shutdown_rx))
    });
    if log_task.is_none() {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    log::info!("Starting relay v{}", env!("CARGO_PKG_VERSION"));

    let beacon_client = Arc::new(StaticBeaconClient::new(
        config.beacon.head_slot,
        config.beacon.syncing,
    ));
    let datastore = Arc::new(MemoryDatastore::with_retention(
        config.relay.retained_slots,
    ));

    let relay = Arc::new(
        RelayService::new(RelayServiceOpts::from_config(
            &config,
            beacon_client,
            datastore,
        ))
        .expect("Failed to create relay service"),
    );

    let signal_relay = relay.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Interrupt received");
            signal_relay.close();
        }
    });

    let result = relay.start_server().await;
    if let Err(e) = &result {
        log::error!("Relay server failed: {e}");
    }

    log_shutdown.send_replace(true);
    if let Some(task) = log_task {
        match task.await {
            Ok(Err(e)) => eprintln!("Failed to write log file: {e}"),
            Err(e) => eprintln!("Log task panicked: {e}"),
            Ok(Ok(())) => {}
        }
    }

    if result.is_err() {
        std::process::exit(1);
    }
}
