//! NATS transport for the event bus
//!
//! Fan-out maps onto a plain subscription, competing consumers onto a queue
//! group named after the subscriber.

use std::time::Duration;

use async_nats::{Client, ConnectOptions};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tracing::info;

use super::{Delivery, EventBus, Message, Subscription};
use crate::config::NatsArgs;
use crate::error::CoreError;

/// Default ping interval for keep-alive
const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(120);

/// Event bus backed by a NATS connection
#[derive(Clone)]
pub struct NatsBus {
    client: Client,
    name: String,
}

impl NatsBus {
    /// Connect to NATS
    pub async fn connect(args: &NatsArgs, name: &str) -> Result<Self, CoreError> {
        info!("Connecting to NATS at {}", args.nats_url);

        // Fail fast when NATS is down; reconnects still happen after the first success
        let mut options = ConnectOptions::new()
            .name(name)
            .ping_interval(DEFAULT_PING_INTERVAL)
            .connection_timeout(Duration::from_secs(5));

        if let (Some(user), Some(pass)) = (&args.nats_user, &args.nats_password) {
            options = options.user_and_password(user.clone(), pass.clone());
        }

        let client = options
            .connect(&args.nats_url)
            .await
            .map_err(|e| CoreError::Bus(format!("Failed to connect: {}", e)))?;

        info!("Connected to NATS at {}", args.nats_url);

        Ok(Self {
            client,
            name: name.to_string(),
        })
    }

    /// Get the client name
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl EventBus for NatsBus {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), CoreError> {
        self.client
            .publish(topic.to_string(), payload)
            .await
            .map_err(|e| CoreError::Bus(format!("Publish to {} failed: {}", topic, e)))
    }

    async fn subscribe(
        &self,
        topic: &str,
        subscriber: &str,
        delivery: Delivery,
    ) -> Result<Subscription, CoreError> {
        let raw = match delivery {
            Delivery::FanOut => self.client.subscribe(topic.to_string()).await,
            Delivery::Competing => {
                self.client
                    .queue_subscribe(topic.to_string(), subscriber.to_string())
                    .await
            }
        }
        .map_err(|e| CoreError::Bus(format!("Subscribe to {} failed: {}", topic, e)))?;

        info!(topic, subscriber, ?delivery, "Subscribed");

        let stream = raw
            .map(|msg| Message {
                topic: msg.subject.to_string(),
                payload: msg.payload,
            })
            .boxed();

        Ok(Subscription::new(stream))
    }
}

