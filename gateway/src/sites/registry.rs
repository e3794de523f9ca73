//! Live registry of front-end sites
//!
//! Holds the allowed CORS origins and the origin → site-name map. A new
//! snapshot is built off-lock and swapped in under the write lock, so readers
//! see either the old maps or the new ones.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use platform_core::clients::{Site, SiteClient};
use platform_core::events::topics;
use platform_core::{CoreError, Delivery, EventBus};

/// Site name used when the origin is not a known site
pub const DEFAULT_SITE: &str = "veganlogin";

const WWW_PREFIX: &str = "https://www.";

#[derive(Debug, Default)]
struct SiteMaps {
    cors_origins: HashSet<String>,
    site_urls: HashMap<String, String>,
}

impl SiteMaps {
    fn build(sites: &[Site], configured: &[String]) -> Self {
        let mut maps = SiteMaps::default();
        for site in sites {
            let origin = site.url.trim_end_matches('/').to_string();
            maps.cors_origins.insert(origin.clone());
            maps.site_urls.insert(origin, site.name.clone());
        }
        for origin in configured {
            maps.cors_origins
                .insert(origin.trim_end_matches('/').to_string());
        }
        maps
    }
}

pub struct SiteRegistry {
    configured: Vec<String>,
    maps: RwLock<Arc<SiteMaps>>,
}

impl SiteRegistry {
    /// Registry holding only the configured origins until the first refresh
    pub fn new(configured: Vec<String>) -> Self {
        let maps = SiteMaps::build(&[], &configured);
        Self {
            configured,
            maps: RwLock::new(Arc::new(maps)),
        }
    }

    async fn snapshot(&self) -> Arc<SiteMaps> {
        self.maps.read().await.clone()
    }

    /// Swap in a new site list
    pub async fn replace(&self, sites: &[Site]) {
        let maps = Arc::new(SiteMaps::build(sites, &self.configured));
        let origins = maps.cors_origins.len();
        *self.maps.write().await = maps;
        info!(sites = sites.len(), origins, "Site registry updated");
    }

    /// Re-fetch the site list from the site service
    pub async fn refresh(&self, client: &dyn SiteClient) -> Result<(), CoreError> {
        let sites = client.sites().await?;
        self.replace(&sites).await;
        Ok(())
    }

    /// Is `origin` allowed to make credentialed requests?
    ///
    /// `https://www.example.com` is accepted when `https://example.com` is known.
    pub async fn allows(&self, origin: &str) -> bool {
        let maps = self.snapshot().await;
        if maps.cors_origins.contains(origin) {
            return true;
        }
        match origin.strip_prefix(WWW_PREFIX) {
            Some(rest) => maps.cors_origins.contains(&format!("https://{}", rest)),
            None => false,
        }
    }

    /// Site name for a request origin, falling back to [`DEFAULT_SITE`]
    pub async fn site_for(&self, origin: Option<&str>) -> String {
        let Some(origin) = origin else {
            return DEFAULT_SITE.to_string();
        };
        let maps = self.snapshot().await;
        let stripped = origin
            .strip_prefix(WWW_PREFIX)
            .map(|rest| format!("https://{}", rest));
        maps.site_urls
            .get(origin)
            .or_else(|| stripped.and_then(|o| maps.site_urls.get(&o)))
            .cloned()
            .unwrap_or_else(|| DEFAULT_SITE.to_string())
    }
}

/// Fetch the site list once, then re-fetch on every `site-update` event.
///
/// A failed initial fetch leaves only the configured origins in place; a
/// failed subscription is returned to the caller.
pub async fn start_watcher(
    registry: Arc<SiteRegistry>,
    client: Arc<dyn SiteClient>,
    bus: Arc<dyn EventBus>,
    subscriber: &str,
) -> Result<JoinHandle<()>, CoreError> {
    if let Err(e) = registry.refresh(client.as_ref()).await {
        warn!(error = %e, "Initial site fetch failed; using configured origins only");
    }

    let mut updates = bus
        .subscribe(topics::SITE_UPDATE, subscriber, Delivery::FanOut)
        .await?;

    Ok(tokio::spawn(async move {
        while updates.next_message().await.is_some() {
            if let Err(e) = registry.refresh(client.as_ref()).await {
                warn!(error = %e, "Site refresh failed");
            }
        }
        warn!("Site update stream closed");
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use platform_core::events::MemoryBus;
    use std::sync::Mutex;
    use std::time::Duration;

    fn site(name: &str, url: &str) -> Site {
        Site {
            name: name.into(),
            url: url.into(),
        }
    }

    struct FixedSites(Mutex<Vec<Site>>);

    #[async_trait]
    impl SiteClient for FixedSites {
        async fn sites(&self) -> Result<Vec<Site>, CoreError> {
            Ok(self.0.lock().unwrap().clone())
        }
    }

    #[tokio::test]
    async fn test_lookup_and_www_shim() {
        let registry = SiteRegistry::new(vec!["http://localhost:3000".into()]);
        registry
            .replace(&[site("ethicalbuzz", "https://ethicalbuzz.com")])
            .await;

        assert!(registry.allows("https://ethicalbuzz.com").await);
        assert!(registry.allows("https://www.ethicalbuzz.com").await);
        assert!(registry.allows("http://localhost:3000").await);
        assert!(!registry.allows("https://evil.com").await);

        assert_eq!(
            registry.site_for(Some("https://ethicalbuzz.com")).await,
            "ethicalbuzz"
        );
        assert_eq!(registry.site_for(Some("https://evil.com")).await, DEFAULT_SITE);
        assert_eq!(registry.site_for(None).await, DEFAULT_SITE);
    }

    #[tokio::test]
    async fn test_watcher_refreshes_on_event() {
        let client = Arc::new(FixedSites(Mutex::new(vec![site("a", "https://a.com")])));
        let bus = Arc::new(MemoryBus::new());
        let registry = Arc::new(SiteRegistry::new(vec![]));

        let _task = start_watcher(registry.clone(), client.clone(), bus.clone(), "gw-test")
            .await
            .unwrap();
        assert!(registry.allows("https://a.com").await);
        assert!(!registry.allows("https://b.com").await);

        client.0.lock().unwrap().push(site("b", "https://b.com"));
        bus.publish(topics::SITE_UPDATE, bytes::Bytes::from_static(b"{}"))
            .await
            .unwrap();

        for _ in 0..50 {
            if registry.allows("https://b.com").await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(registry.allows("https://b.com").await);
    }
}
