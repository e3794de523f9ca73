//! Configuration for the item service and the reconciler
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use platform_core::cache::DEFAULT_CAPACITY;
use platform_core::config::{NatsArgs, ServiceUrls};

/// Item catalogue HTTP service
#[derive(Parser, Debug, Clone)]
#[command(name = "item-service")]
#[command(about = "Items, links, collections and ownership claims")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8081")]
    pub listen: SocketAddr,

    /// SQLite database holding items
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Default avatar URL; `{n}` is replaced by a number in 1..=AVATAR_COUNT
    #[arg(long, env = "AVATAR_URL_TEMPLATE", default_value = "")]
    pub avatar_url_template: String,

    /// Number of default avatars available
    #[arg(long, env = "AVATAR_COUNT", default_value = "0")]
    pub avatar_count: u32,

    /// Entries per user/org info cache
    #[arg(long, env = "INFO_CACHE_SIZE", default_value_t = DEFAULT_CAPACITY)]
    pub info_cache_size: usize,

    /// Development mode: fall back to the in-process event bus
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit JSON log lines
    #[arg(long, env = "LOG_FORMAT_JSON", default_value = "false")]
    pub log_json: bool,

    #[command(flatten)]
    pub nats: NatsArgs,

    #[command(flatten)]
    pub services: ServiceUrls,
}

impl Args {
    pub fn validate(&self) -> Result<(), String> {
        if self.avatar_count > 0 && !self.avatar_url_template.contains("{n}") {
            return Err("AVATAR_URL_TEMPLATE must contain {n} when AVATAR_COUNT is set".into());
        }
        if self.info_cache_size == 0 {
            return Err("INFO_CACHE_SIZE must be at least 1".into());
        }
        Ok(())
    }
}

/// Background reconcilers for search, statistics and the product catalogue
#[derive(Parser, Debug, Clone)]
#[command(name = "item-reconciler")]
#[command(about = "Keeps search indexes, item statistics and the product catalogue in sync")]
pub struct ReconcilerArgs {
    /// SQLite database holding items
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Seconds between upvote count sweeps
    #[arg(long, env = "UPVOTE_SWEEP_SECS", default_value = "600")]
    pub upvote_sweep_secs: u64,

    /// Product catalogue API; catalogue sync is off when unset
    #[arg(long, env = "CATALOGUE_URL")]
    pub catalogue_url: Option<String>,

    /// File holding the catalogue API token
    #[arg(long, env = "CATALOGUE_CREDENTIALS")]
    pub catalogue_credentials: Option<PathBuf>,

    /// Collection whose members are mirrored to the catalogue
    #[arg(long, env = "SHOPPING_COLLECTION", default_value = "shopping")]
    pub shopping_collection: String,

    /// Development mode: fall back to the in-process event bus
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit JSON log lines
    #[arg(long, env = "LOG_FORMAT_JSON", default_value = "false")]
    pub log_json: bool,

    #[command(flatten)]
    pub nats: NatsArgs,

    #[command(flatten)]
    pub services: ServiceUrls,
}

impl ReconcilerArgs {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.upvote_sweep_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.upvote_sweep_secs == 0 {
            return Err("UPVOTE_SWEEP_SECS must be at least 1".into());
        }
        if self.catalogue_credentials.is_some() && self.catalogue_url.is_none() {
            return Err("CATALOGUE_CREDENTIALS is set but CATALOGUE_URL is not".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_avatar_template_needs_placeholder() {
        let args = Args::parse_from([
            "item-service",
            "--database-url",
            "items.db",
            "--avatar-count",
            "4",
            "--avatar-url-template",
            "https://cdn/avatar.png",
        ]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_reconciler_defaults() {
        let args = ReconcilerArgs::parse_from(["item-reconciler", "--database-url", "items.db"]);
        assert!(args.validate().is_ok());
        assert_eq!(args.sweep_interval(), Duration::from_secs(600));
        assert_eq!(args.shopping_collection, "shopping");
        assert!(args.catalogue_url.is_none());
    }
}
