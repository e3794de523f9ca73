//! Argument groups shared by every binary
//!
//! Flattened into each service's `Args` with `#[command(flatten)]`.

use clap::Args;

/// NATS connection configuration
#[derive(Args, Debug, Clone)]
pub struct NatsArgs {
    /// NATS server URL
    #[arg(long, env = "NATS_URL", default_value = "nats://127.0.0.1:4222")]
    pub nats_url: String,

    /// NATS username (optional)
    #[arg(long, env = "NATS_USER")]
    pub nats_user: Option<String>,

    /// NATS password (optional)
    #[arg(long, env = "NATS_PASSWORD")]
    pub nats_password: Option<String>,
}

/// Base URLs of the backend services
#[derive(Args, Debug, Clone)]
pub struct ServiceUrls {
    #[arg(long, env = "USERS_URL", default_value = "http://users")]
    pub users_url: String,

    #[arg(long, env = "ITEMS_URL", default_value = "http://items")]
    pub items_url: String,

    #[arg(long, env = "SEARCH_URL", default_value = "http://search")]
    pub search_url: String,

    #[arg(long, env = "SOCIAL_URL", default_value = "http://social")]
    pub social_url: String,

    #[arg(long, env = "CATEGORIES_URL", default_value = "http://categories")]
    pub categories_url: String,

    #[arg(long, env = "SITES_URL", default_value = "http://sites")]
    pub sites_url: String,

    #[arg(long, env = "PAYMENTS_URL", default_value = "http://payments")]
    pub payments_url: String,
}

impl Default for ServiceUrls {
    fn default() -> Self {
        Self {
            users_url: "http://users".into(),
            items_url: "http://items".into(),
            search_url: "http://search".into(),
            social_url: "http://social".into(),
            categories_url: "http://categories".into(),
            sites_url: "http://sites".into(),
            payments_url: "http://payments".into(),
        }
    }
}

/// Split a comma-separated list, dropping blanks
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list() {
        assert_eq!(
            split_list(" https://a.com, ,https://b.com "),
            vec!["https://a.com".to_string(), "https://b.com".to_string()]
        );
        assert!(split_list("").is_empty());
    }
}
