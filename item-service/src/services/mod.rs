//! Service layer
//!
//! Wraps the repository with authorisation, schema validation and change
//! notification. Repository calls run on the blocking pool; `item-change`
//! events are published only after the transaction committed.

pub mod claims;
pub mod collections;
pub mod items;
pub mod links;
pub mod owners;
pub mod search;

use std::sync::Arc;

use diesel::SqliteConnection;
use tracing::warn;

use platform_core::clients::{Info, SearchIndexClient, SocialClient, UserClient};
use platform_core::db::{self, DbPool};
use platform_core::events::publish_json;
use platform_core::events::topics::{self, ItemChange};
use platform_core::EventBus;

use crate::error::ItemError;
use crate::schema::SchemaEngine;

pub use claims::ClaimService;
pub use collections::CollectionService;
pub use items::ItemService;
pub use links::LinkService;
pub use search::SearchService;

/// Fills in a default avatar for users and orgs that have none
#[derive(Debug, Clone, Default)]
pub struct Avatars {
    template: String,
    count: u32,
}

impl Avatars {
    pub fn new(template: &str, count: u32) -> Self {
        Self {
            template: template.to_string(),
            count,
        }
    }

    /// Pick one of the numbered avatars; the same id always gets the same one
    pub fn default_for(&self, id: &str) -> Option<String> {
        if self.count == 0 || self.template.is_empty() {
            return None;
        }
        let hash = id
            .bytes()
            .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(b)));
        let n = hash % self.count + 1;
        Some(self.template.replace("{n}", &n.to_string()))
    }

    pub fn fill(&self, info: &mut Info) {
        if info.avatar.as_deref().map_or(true, str::is_empty) {
            info.avatar = self.default_for(&info.id);
        }
    }
}

/// Everything the services share
pub struct Context {
    pub pool: DbPool,
    pub schemas: Arc<SchemaEngine>,
    pub bus: Arc<dyn EventBus>,
    pub users: Arc<dyn UserClient>,
    pub social: Arc<dyn SocialClient>,
    pub search: Arc<dyn SearchIndexClient>,
    pub avatars: Avatars,
}

impl Context {
    /// Run a repository closure on the blocking pool
    pub async fn db<F, T>(&self, f: F) -> Result<T, ItemError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, ItemError> + Send + 'static,
        T: Send + 'static,
    {
        db::run(&self.pool, f).await
    }

    /// Announce a committed change; delivery failures are logged only
    pub async fn publish(&self, change: ItemChange) {
        if let Err(e) = publish_json(self.bus.as_ref(), topics::ITEM_CHANGE, &change).await {
            warn!(error = %e, item = %change.id, "Failed to publish item-change");
        }
    }
}

/// The item service's operations, grouped by aggregate
pub struct Services {
    pub items: ItemService,
    pub links: LinkService,
    pub collections: CollectionService,
    pub claims: ClaimService,
    pub search: SearchService,
}

impl Services {
    pub fn new(ctx: Context) -> Self {
        let ctx = Arc::new(ctx);
        Self {
            items: ItemService::new(ctx.clone()),
            links: LinkService::new(ctx.clone()),
            collections: CollectionService::new(ctx.clone()),
            claims: ClaimService::new(ctx.clone()),
            search: SearchService::new(ctx),
        }
    }

    pub async fn ping(&self) -> Result<(), ItemError> {
        self.items.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_avatar_is_stable() {
        let avatars = Avatars::new("https://cdn.example/avatar-{n}.png", 4);
        let first = avatars.default_for("usr_abc").unwrap();
        assert_eq!(avatars.default_for("usr_abc").unwrap(), first);
        assert!(first.starts_with("https://cdn.example/avatar-"));

        let n: u32 = first
            .trim_start_matches("https://cdn.example/avatar-")
            .trim_end_matches(".png")
            .parse()
            .unwrap();
        assert!((1..=4).contains(&n));
    }

    #[test]
    fn test_fill_keeps_existing_avatar() {
        let avatars = Avatars::new("a{n}", 2);
        let mut info = Info {
            id: "usr_a".into(),
            name: "Ana".into(),
            email: None,
            avatar: Some("mine.png".into()),
        };
        avatars.fill(&mut info);
        assert_eq!(info.avatar.as_deref(), Some("mine.png"));

        info.avatar = None;
        avatars.fill(&mut info);
        assert!(info.avatar.unwrap().starts_with('a'));
        assert_eq!(Avatars::default().default_for("usr_a"), None);
    }
}
