// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Broadcast of produced values to any number of listeners.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::traits::Notifier;

const DEFAULT_CAPACITY: usize = 256;

/// A value a service produced during a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceEvent {
    pub service: String,
    pub value: Value,
    pub config: Value,
}

/// [`Notifier`] that forwards every event to a `tokio` broadcast channel.
///
/// Events sent while nobody is subscribed are dropped. Slow subscribers
/// skip events they lagged behind on.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ServiceEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServiceEvent> {
        self.sender.subscribe()
    }

    /// Receive only the events of `service`.
    pub fn subscribe_to(&self, service: impl Into<String>) -> ServiceSubscription {
        ServiceSubscription {
            service: service.into(),
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn publish(&self, event: ServiceEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("No subscribers for service event");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for EventBus {
    async fn notify(&self, service: &str, value: &Value, config: &Value) {
        self.publish(ServiceEvent {
            service: service.to_string(),
            value: value.clone(),
            config: config.clone(),
        });
    }
}

pub struct ServiceSubscription {
    service: String,
    receiver: broadcast::Receiver<ServiceEvent>,
}

impl ServiceSubscription {
    pub fn service(&self) -> &str {
        &self.service
    }

    /// The next event of this subscription's service, or `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<ServiceEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.service == self.service => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        service = %self.service,
                        skipped,
                        "Subscriber lagged behind, events skipped"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
