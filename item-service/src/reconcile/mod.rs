//! Background reconcilers
//!
//! Event consumers and periodic sweeps that keep derived state in step with
//! the item store: the external search index, item statistics and the
//! product catalogue. A failure on one message is logged and the consumer
//! moves on to the next.

pub mod catalogue;
pub mod rank;
pub mod search_index;
pub mod upvotes;

use std::future::Future;

use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::warn;

use platform_core::Subscription;

use crate::error::ItemError;

/// Feed every decodable message to `handle` until the stream closes
pub(crate) fn spawn_consumer<T, F, Fut>(mut subscription: Subscription, name: &'static str, handle: F) -> JoinHandle<()>
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(T) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), ItemError>> + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(message) = subscription.next_message().await {
            let payload = match message.json::<T>() {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(consumer = name, topic = %message.topic, error = %e, "Undecodable message");
                    continue;
                }
            };
            if let Err(e) = handle(payload).await {
                warn!(consumer = name, topic = %message.topic, error = %e, "Message handling failed");
            }
        }
        warn!(consumer = name, "Subscription closed");
    })
}
