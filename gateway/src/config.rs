//! Configuration for the gateway
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;

use platform_core::config::{split_list, NatsArgs, ServiceUrls};

/// API gateway for the VeganBuzz services
#[derive(Parser, Debug, Clone)]
#[command(name = "gateway")]
#[command(about = "API gateway: CORS, CSRF, sessions and reverse proxying")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// SQLite database holding login tokens and sessions
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Secret used to sign CSRF cookies (required in production)
    #[arg(long, env = "CSRF_SECRET")]
    pub csrf_secret: Option<String>,

    /// Extra allowed CORS origins, comma separated
    #[arg(long, env = "CORS_ORIGINS", default_value = "")]
    pub cors_origins: String,

    /// Development mode: no CSRF checks, cookies without `Secure`
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Maximum concurrent in-flight requests before answering 503
    #[arg(long, env = "MAX_IN_FLIGHT", default_value = "1000")]
    pub max_in_flight: usize,

    /// Webhook path passed straight through to the payments service
    #[arg(long, env = "STRIPE_WEBHOOK_PATH", default_value = "/webhooks/stripe")]
    pub stripe_webhook_path: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit JSON log lines
    #[arg(long, env = "LOG_FORMAT_JSON", default_value = "false")]
    pub log_json: bool,

    /// NATS configuration
    #[command(flatten)]
    pub nats: NatsArgs,

    /// Backend service URLs
    #[command(flatten)]
    pub services: ServiceUrls,
}

impl Args {
    /// Effective CSRF secret (fixed fallback only in dev mode)
    pub fn csrf_secret(&self) -> String {
        match (&self.csrf_secret, self.dev_mode) {
            (Some(secret), _) => secret.clone(),
            (None, true) => "dev-only-insecure-csrf-secret".to_string(),
            // validate() rejects this combination before start-up
            (None, false) => String::new(),
        }
    }

    /// Configured CORS origins
    pub fn cors_origin_list(&self) -> Vec<String> {
        split_list(&self.cors_origins)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode && self.csrf_secret.as_deref().map_or(true, str::is_empty) {
            return Err("CSRF_SECRET is required in production mode".to_string());
        }

        if self.max_in_flight == 0 {
            return Err("MAX_IN_FLIGHT must be at least 1".to_string());
        }

        if !self.stripe_webhook_path.starts_with('/') {
            return Err("STRIPE_WEBHOOK_PATH must start with '/'".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["gateway", "--database-url", "gw.db"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_production_requires_csrf_secret() {
        assert!(parse(&[]).validate().is_err());
        assert!(parse(&["--csrf-secret", "s"]).validate().is_ok());
        assert!(parse(&["--dev-mode"]).validate().is_ok());
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["--dev-mode", "--cors-origins", "https://a.com,https://b.com"]);
        assert_eq!(args.max_in_flight, 1000);
        assert_eq!(args.services.items_url, "http://items");
        assert_eq!(args.cors_origin_list().len(), 2);
    }
}
