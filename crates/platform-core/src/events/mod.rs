//! Event bus abstraction
//!
//! Topics are plain strings and payloads are UTF-8 JSON. A subscriber picks
//! one of two delivery modes:
//!
//! - [`Delivery::FanOut`]: every subscriber name receives every message
//! - [`Delivery::Competing`]: subscribers sharing a name split the stream,
//!   each message reaching exactly one of them
//!
//! Per topic and publisher, messages arrive in publish order.

pub mod memory;
pub mod nats;
pub mod topics;

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CoreError;

pub use memory::MemoryBus;
pub use nats::NatsBus;

/// How messages are shared between subscribers of the same name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    FanOut,
    Competing,
}

/// A message received from a topic
#[derive(Debug, Clone)]
pub struct Message {
    pub topic: String,
    pub payload: Bytes,
}

impl Message {
    /// Decode the JSON payload
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, CoreError> {
        Ok(serde_json::from_slice(&self.payload)?)
    }
}

/// Stream of messages for one subscription
pub struct Subscription {
    inner: BoxStream<'static, Message>,
}

impl Subscription {
    pub fn new(inner: BoxStream<'static, Message>) -> Self {
        Self { inner }
    }

    /// Wait for the next message; `None` once the transport closed the stream
    pub async fn next_message(&mut self) -> Option<Message> {
        self.inner.next().await
    }
}

impl Stream for Subscription {
    type Item = Message;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Message>> {
        self.inner.poll_next_unpin(cx)
    }
}

#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish a raw payload to a topic
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), CoreError>;

    /// Subscribe to a topic under a subscriber name
    async fn subscribe(
        &self,
        topic: &str,
        subscriber: &str,
        delivery: Delivery,
    ) -> Result<Subscription, CoreError>;
}

/// Serialize `payload` as JSON and publish it
pub async fn publish_json<T: Serialize + ?Sized>(
    bus: &dyn EventBus,
    topic: &str,
    payload: &T,
) -> Result<(), CoreError> {
    let bytes = serde_json::to_vec(payload)?;
    bus.publish(topic, Bytes::from(bytes)).await
}
