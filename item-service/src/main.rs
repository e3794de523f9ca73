//! Item service binary

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};

use item_service::schema::{categories, CategoryTable, SchemaEngine};
use item_service::services::{Avatars, Context, Services};
use item_service::{config::Args, db, http};
use platform_core::cache::{start_invalidation, CachedUserClient, InfoCache};
use platform_core::clients::categories::{fetch_until_ready, STARTUP_RETRY_DELAY};
use platform_core::clients::{HttpCategoryClient, HttpSearchIndexClient, HttpSocialClient, HttpUserClient};
use platform_core::events::{MemoryBus, NatsBus};
use platform_core::logging::init_tracing;
use platform_core::EventBus;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    init_tracing("item_service", &args.log_level, args.log_json);

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("NATS: {}", args.nats.nats_url);

    let pool = match db::open(&args.database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Database connection failed: {}", e);
            std::process::exit(1);
        }
    };

    let bus: Arc<dyn EventBus> = match NatsBus::connect(&args.nats, "item-service").await {
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

    let http_client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .build()?;

    // Items cannot be validated without the category lists
    let table = Arc::new(CategoryTable::new());
    let category_client = HttpCategoryClient::new(http_client.clone(), &args.services.categories_url);
    table.load(fetch_until_ready(&category_client, STARTUP_RETRY_DELAY).await);

    let schemas = match SchemaEngine::new(table.clone()) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            error!("Loading item schemas failed: {}", e);
            std::process::exit(1);
        }
    };

    let cache = Arc::new(InfoCache::new(args.info_cache_size));
    let users = Arc::new(CachedUserClient::new(
        Arc::new(HttpUserClient::new(http_client.clone(), &args.services.users_url)),
        cache.clone(),
    ));

    // Background tasks live for the whole process; failing to subscribe is fatal
    if let Err(e) = categories::start_updates(bus.clone(), table, "item-service-categories").await {
        error!("Category update subscription failed: {}", e);
        std::process::exit(1);
    }
    if let Err(e) = start_invalidation(bus.clone(), cache, "item-service-users").await {
        error!("Info cache invalidation subscription failed: {}", e);
        std::process::exit(1);
    }

    let ctx = Context {
        pool,
        schemas,
        bus,
        users,
        social: Arc::new(HttpSocialClient::new(http_client.clone(), &args.services.social_url)),
        search: Arc::new(HttpSearchIndexClient::new(http_client, &args.services.search_url)),
        avatars: Avatars::new(&args.avatar_url_template, args.avatar_count),
    };
    let state = Arc::new(http::AppState::new(args, Services::new(ctx)));

    if let Err(e) = http::run(state).await {
        error!("Server error: {:?}", e);
        std::process::exit(1);
    }

    Ok(())
}
