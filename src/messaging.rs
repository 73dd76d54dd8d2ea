//! Domain event publishing.
//!
//! Events are published after the state change they describe has been
//! stored. Publishing is best-effort: callers log failures and carry on.

use async_trait::async_trait;
use parking_lot::Mutex;
use crate::domain::events::DomainEvent;
use crate::{EcommerceError, Result};

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &DomainEvent) -> Result<()>;
}

/// Publishes JSON-encoded events on NATS, one subject per event type.
pub struct NatsPublisher {
    client: async_nats::Client,
}

impl NatsPublisher {
    pub fn new(client: async_nats::Client) -> Self { Self { client } }
}

#[async_trait]
impl EventPublisher for NatsPublisher {
    async fn publish(&self, event: &DomainEvent) -> Result<()> {
        let payload = serde_json::to_vec(event).map_err(|e| EcommerceError::Internal(e.to_string()))?;
        self.client
            .publish(event.subject().to_string(), payload.into())
            .await
            .map_err(|e| EcommerceError::Unavailable(format!("nats publish: {e}")))
    }
}

/// Drops every event.
pub struct NoopPublisher;

#[async_trait]
impl EventPublisher for NoopPublisher {
    async fn publish(&self, _event: &DomainEvent) -> Result<()> { Ok(()) }
}

/// Keeps published events in memory.
#[derive(Default)]
pub struct MemoryPublisher {
    events: Mutex<Vec<DomainEvent>>,
}

impl MemoryPublisher {
    pub fn events(&self) -> Vec<DomainEvent> { self.events.lock().clone() }
}

#[async_trait]
impl EventPublisher for MemoryPublisher {
    async fn publish(&self, event: &DomainEvent) -> Result<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// Publishes `events` in order, logging rather than returning failures.
pub async fn publish_all(publisher: &dyn EventPublisher, events: Vec<DomainEvent>) {
    for event in events {
        if let Err(e) = publisher.publish(&event).await {
            tracing::warn!(subject = event.subject(), error = %e, "failed to publish domain event");
        }
    }
}
