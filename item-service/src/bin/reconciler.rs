//! Reconciler binary
//!
//! Runs the item event consumers and the upvote sweep. Catalogue sync is
//! enabled when `CATALOGUE_URL` is set.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};

use item_service::config::ReconcilerArgs;
use item_service::db;
use item_service::reconcile::{catalogue, rank, search_index, upvotes};
use platform_core::clients::{HttpCatalogueClient, HttpSearchIndexClient, HttpSocialClient, SocialClient};
use platform_core::events::{MemoryBus, NatsBus};
use platform_core::logging::init_tracing;
use platform_core::EventBus;

fn read_token(path: &std::path::Path) -> std::io::Result<String> {
    Ok(std::fs::read_to_string(path)?.trim().to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let args = ReconcilerArgs::parse();
    init_tracing("item_service", &args.log_level, args.log_json);

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("Upvote sweep every {}s", args.upvote_sweep_secs);
    info!("Catalogue: {}", args.catalogue_url.as_deref().unwrap_or("disabled"));

    let pool = match db::open(&args.database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Database connection failed: {}", e);
            std::process::exit(1);
        }
    };

    let bus: Arc<dyn EventBus> = match NatsBus::connect(&args.nats, "item-reconciler").await {
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
    let social: Arc<dyn SocialClient> = Arc::new(HttpSocialClient::new(http.clone(), &args.services.social_url));
    let index = Arc::new(HttpSearchIndexClient::new(http.clone(), &args.services.search_url));

    let started = async {
        search_index::start(bus.clone(), pool.clone(), index).await?;
        rank::start(bus.clone(), pool.clone(), social.clone()).await?;
        upvotes::start_consumer(bus.clone(), pool.clone()).await?;
        if let Some(url) = &args.catalogue_url {
            let token = match &args.catalogue_credentials {
                Some(path) => Some(read_token(path).map_err(|e| {
                    platform_core::CoreError::Io(format!("Reading {}: {}", path.display(), e))
                })?),
                None => None,
            };
            let client = Arc::new(HttpCatalogueClient::new(http.clone(), url, token));
            let sync = catalogue::CatalogueSync::new(pool.clone(), client, &args.shopping_collection);
            catalogue::start(bus.clone(), Arc::new(sync)).await?;
        }
        Ok::<_, platform_core::CoreError>(())
    };
    if let Err(e) = started.await {
        error!("Reconciler start-up failed: {}", e);
        std::process::exit(1);
    }

    let _sweeper = upvotes::spawn_sweeper(pool, social, args.sweep_interval());

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    Ok(())
}
