//! Live category labels behind the `category:<name>` formats
//!
//! Format checkers read this table on every validation, so a
//! `category-update` event takes effect without recompiling schemas.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use platform_core::events::topics::{self, CategoryUpdate};
use platform_core::{CoreError, Delivery, EventBus};

#[derive(Debug, Default)]
pub struct CategoryTable {
    labels: DashMap<String, HashSet<String>>,
}

impl CategoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(categories: HashMap<String, Vec<String>>) -> Self {
        let table = Self::new();
        table.load(categories);
        table
    }

    /// Replace every category with `categories`
    pub fn load(&self, categories: HashMap<String, Vec<String>>) {
        self.labels.clear();
        for (name, entries) in categories {
            self.replace(&name, entries);
        }
    }

    pub fn replace(&self, name: &str, entries: Vec<String>) {
        self.labels.insert(name.to_string(), entries.into_iter().collect());
    }

    /// Whether `label` is one of the labels of `category`
    pub fn contains(&self, category: &str, label: &str) -> bool {
        self.labels
            .get(category)
            .is_some_and(|labels| labels.contains(label))
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Apply `category-update` messages to the table (every instance, fan-out)
pub async fn start_updates(
    bus: Arc<dyn EventBus>,
    table: Arc<CategoryTable>,
    subscriber: &str,
) -> Result<JoinHandle<()>, CoreError> {
    let mut subscription = bus
        .subscribe(topics::CATEGORY_UPDATE, subscriber, Delivery::FanOut)
        .await?;
    info!(subscriber, "Category updates listening");

    Ok(tokio::spawn(async move {
        while let Some(message) = subscription.next_message().await {
            match message.json::<CategoryUpdate>() {
                Ok(update) => {
                    info!(category = %update.name, entries = update.entries.len(), "Category updated");
                    table.replace(&update.name, update.entries);
                }
                Err(e) => warn!(error = %e, "Bad category-update payload"),
            }
        }
        warn!("Category update stream closed");
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use platform_core::events::{publish_json, MemoryBus};
    use std::time::Duration;

    #[test]
    fn test_contains() {
        let table = CategoryTable::from_map(HashMap::from([(
            "cuisines".to_string(),
            vec!["thai".to_string(), "italian".to_string()],
        )]));
        assert!(table.contains("cuisines", "thai"));
        assert!(!table.contains("cuisines", "french"));
        assert!(!table.contains("allergens", "thai"));
    }

    #[tokio::test]
    async fn test_update_replaces_labels() {
        let bus = Arc::new(MemoryBus::new());
        let table = Arc::new(CategoryTable::new());
        table.replace("cuisines", vec!["thai".into()]);

        let _handle = start_updates(bus.clone(), table.clone(), "test").await.unwrap();
        publish_json(
            bus.as_ref(),
            topics::CATEGORY_UPDATE,
            &CategoryUpdate {
                name: "cuisines".into(),
                entries: vec!["french".into()],
            },
        )
        .await
        .unwrap();

        for _ in 0..50 {
            if table.contains("cuisines", "french") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(table.contains("cuisines", "french"));
        assert!(!table.contains("cuisines", "thai"));
    }
}
