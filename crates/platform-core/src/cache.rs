//! Bounded caches for user/org info and org membership
//!
//! Process-local LRUs in front of the user service. Any process that cares
//! subscribes (fan-out) to `invalidate-cached-user` and evicts the id it
//! receives, so processes converge after a user or org changes.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use lru::LruCache;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clients::{ApiKeyUser, Info, OrgMembership, User, UserClient};
use crate::error::CoreError;
use crate::events::{topics, Delivery, EventBus};

/// Default number of entries per cache
pub const DEFAULT_CAPACITY: usize = 10_000;

pub struct InfoCache {
    infos: Mutex<LruCache<String, Info>>,
    orgs: Mutex<LruCache<String, Vec<OrgMembership>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl InfoCache {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            infos: Mutex::new(LruCache::new(cap)),
            orgs: Mutex::new(LruCache::new(cap)),
        }
    }

    pub fn get_info(&self, id: &str) -> Option<Info> {
        lock(&self.infos).get(id).cloned()
    }

    pub fn put_info(&self, info: Info) {
        lock(&self.infos).put(info.id.clone(), info);
    }

    pub fn get_orgs(&self, user_id: &str) -> Option<Vec<OrgMembership>> {
        lock(&self.orgs).get(user_id).cloned()
    }

    pub fn put_orgs(&self, user_id: &str, orgs: Vec<OrgMembership>) {
        lock(&self.orgs).put(user_id.to_string(), orgs);
    }

    /// Drop everything cached under `id`
    pub fn invalidate(&self, id: &str) {
        lock(&self.infos).pop(id);
        lock(&self.orgs).pop(id);
    }

    pub fn len(&self) -> usize {
        lock(&self.infos).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// User client that answers `info` and `orgs` from the cache when it can
pub struct CachedUserClient {
    inner: Arc<dyn UserClient>,
    cache: Arc<InfoCache>,
}

impl CachedUserClient {
    pub fn new(inner: Arc<dyn UserClient>, cache: Arc<InfoCache>) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &Arc<InfoCache> {
        &self.cache
    }
}

#[async_trait]
impl UserClient for CachedUserClient {
    async fn login(&self, email: &str, site: &str, language: &str) -> Result<User, CoreError> {
        self.inner.login(email, site, language).await
    }

    async fn api_key_user(&self, api_key: &str) -> Result<Option<ApiKeyUser>, CoreError> {
        self.inner.api_key_user(api_key).await
    }

    /// Hits come from the cache; all misses go out in one batched call.
    async fn info(&self, ids: &[String]) -> Result<Vec<Info>, CoreError> {
        let mut found: Vec<Option<Info>> = Vec::with_capacity(ids.len());
        let mut misses: Vec<String> = Vec::new();

        for id in ids {
            let hit = self.cache.get_info(id);
            if hit.is_none() && !misses.contains(id) {
                misses.push(id.clone());
            }
            found.push(hit);
        }

        if !misses.is_empty() {
            debug!(misses = misses.len(), "Info cache miss");
            // The batch may exceed the cache capacity, so fill from the response
            let fetched: HashMap<String, Info> = self
                .inner
                .info(&misses)
                .await?
                .into_iter()
                .map(|info| (info.id.clone(), info))
                .collect();
            for (slot, id) in found.iter_mut().zip(ids) {
                if slot.is_none() {
                    *slot = fetched.get(id).cloned();
                }
            }
            for info in fetched.into_values() {
                self.cache.put_info(info);
            }
        }

        Ok(found.into_iter().flatten().collect())
    }

    async fn orgs(&self, user_id: &str) -> Result<Vec<OrgMembership>, CoreError> {
        if let Some(orgs) = self.cache.get_orgs(user_id) {
            return Ok(orgs);
        }
        let orgs = self.inner.orgs(user_id).await?;
        self.cache.put_orgs(user_id, orgs.clone());
        Ok(orgs)
    }
}

/// Subscribe to `invalidate-cached-user` and evict ids as they arrive.
///
/// The subscription is made before returning so a failure surfaces at start-up.
pub async fn start_invalidation(
    bus: Arc<dyn EventBus>,
    cache: Arc<InfoCache>,
    subscriber: &str,
) -> Result<JoinHandle<()>, CoreError> {
    let mut subscription = bus
        .subscribe(topics::INVALIDATE_CACHED_USER, subscriber, Delivery::FanOut)
        .await?;
    info!(subscriber, "Info cache invalidation listening");

    Ok(tokio::spawn(async move {
        while let Some(message) = subscription.next_message().await {
            match message.json::<String>() {
                Ok(id) => {
                    debug!(id = %id, "Evicting cached info");
                    cache.invalidate(&id);
                }
                Err(e) => warn!(error = %e, "Bad invalidate-cached-user payload"),
            }
        }
        warn!("Info cache invalidation stream closed");
    }))
}
