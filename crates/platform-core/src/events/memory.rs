//! In-process event bus
//!
//! Same delivery semantics as the NATS transport, on tokio channels. Used by
//! tests and by dev mode when NATS is unreachable. The most recent published
//! messages are kept in a bounded history that tests can inspect.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;
use tracing::trace;

use super::{Delivery, EventBus, Message, Subscription};
use crate::error::CoreError;

struct Group {
    name: String,
    delivery: Delivery,
    members: Vec<mpsc::UnboundedSender<Message>>,
    next: usize,
}

impl Group {
    fn deliver(&mut self, message: &Message) {
        self.members.retain(|tx| !tx.is_closed());
        if self.members.is_empty() {
            return;
        }
        match self.delivery {
            Delivery::FanOut => {
                for tx in &self.members {
                    let _ = tx.send(message.clone());
                }
            }
            Delivery::Competing => {
                let idx = self.next % self.members.len();
                self.next = self.next.wrapping_add(1);
                let _ = self.members[idx].send(message.clone());
            }
        }
    }
}

/// Messages kept for [`MemoryBus::published`]
pub const HISTORY_LIMIT: usize = 1024;

pub struct MemoryBus {
    topics: Mutex<HashMap<String, Vec<Group>>>,
    history: Mutex<VecDeque<Message>>,
    history_limit: usize,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::with_history_limit(HISTORY_LIMIT)
    }
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bus that remembers at most `limit` published messages, oldest dropped first
    pub fn with_history_limit(limit: usize) -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            history: Mutex::new(VecDeque::new()),
            history_limit: limit,
        }
    }

    /// Messages published so far on `topic`, oldest first
    pub fn published(&self, topic: &str) -> Vec<Message> {
        match self.history.lock() {
            Ok(history) => history.iter().filter(|m| m.topic == topic).cloned().collect(),
            Err(poisoned) => poisoned
                .into_inner()
                .iter()
                .filter(|m| m.topic == topic)
                .cloned()
                .collect(),
        }
    }

    fn lock_topics(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<Group>>> {
        match self.topics.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl EventBus for MemoryBus {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), CoreError> {
        let message = Message {
            topic: topic.to_string(),
            payload,
        };
        trace!(topic, "Publishing in-memory event");

        if let Some(groups) = self.lock_topics().get_mut(topic) {
            for group in groups.iter_mut() {
                group.deliver(&message);
            }
        }

        if self.history_limit > 0 {
            let mut history = match self.history.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if history.len() >= self.history_limit {
                history.pop_front();
            }
            history.push_back(message);
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        subscriber: &str,
        delivery: Delivery,
    ) -> Result<Subscription, CoreError> {
        let (tx, rx) = mpsc::unbounded_channel();

        {
            let mut topics = self.lock_topics();
            let groups = topics.entry(topic.to_string()).or_default();
            match groups
                .iter_mut()
                .find(|g| g.name == subscriber && g.delivery == delivery)
            {
                Some(group) => group.members.push(tx),
                None => groups.push(Group {
                    name: subscriber.to_string(),
                    delivery,
                    members: vec![tx],
                    next: 0,
                }),
            }
        }

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        })
        .boxed();

        Ok(Subscription::new(stream))
    }
}
