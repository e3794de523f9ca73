//! Gateway binary

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};

use gateway::{config::Args, db, server, sessions, sites};
use platform_core::clients::HttpSiteClient;
use platform_core::clients::HttpUserClient;
use platform_core::events::{MemoryBus, NatsBus};
use platform_core::logging::init_tracing;
use platform_core::EventBus;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    init_tracing("gateway", &args.log_level, args.log_json);

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("NATS: {}", args.nats.nats_url);
    info!("Max in-flight: {}", args.max_in_flight);

    let pool = match db::open(&args.database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Database connection failed: {}", e);
            std::process::exit(1);
        }
    };

    let bus: Arc<dyn EventBus> = match NatsBus::connect(&args.nats, "gateway").await {
        Ok(bus) => {
            info!("NATS connected successfully");
            Arc::new(bus)
        }
        Err(e) if args.dev_mode => {
            warn!("NATS connection failed (dev mode, using in-process bus): {}", e);
            Arc::new(MemoryBus::with_history_limit(0))
        }
        Err(e) => {
            error!("NATS connection failed: {}", e);
            std::process::exit(1);
        }
    };

    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .build()?;
    let users = Arc::new(HttpUserClient::new(http.clone(), &args.services.users_url));
    let site_client = Arc::new(HttpSiteClient::new(http.clone(), &args.services.sites_url));

    let registry = Arc::new(sites::SiteRegistry::new(args.cors_origin_list()));
    let state = Arc::new(server::AppState::new(
        args,
        pool,
        http,
        users,
        bus.clone(),
        registry.clone(),
    )?);

    // Background tasks live for the whole process; failing to subscribe is fatal
    if let Err(e) = sites::start_watcher(registry, site_client, bus.clone(), "gateway-sites").await {
        error!("Site registry subscription failed: {}", e);
        std::process::exit(1);
    }
    if let Err(e) = sessions::fanout::start(bus, state.sessions.clone()).await {
        error!("Session fan-out subscription failed: {}", e);
        std::process::exit(1);
    }
    let _sweeper = state
        .sessions
        .spawn_sweeper(sessions::store::SWEEP_INTERVAL);

    if let Err(e) = server::run(state).await {
        error!("Server error: {:?}", e);
        std::process::exit(1);
    }

    Ok(())
}
