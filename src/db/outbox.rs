use std::sync::Arc;

use crate::error::{AdminError, Result};
use crate::event_sourcing::{Event, EventRepository};
use crate::metrics::Metrics;
use crate::utils::{retry_on_transient, RetryConfig, RetryResult};

use super::enterprise_store::EnterpriseRepository;

// ============================================================================
// Outbox - audit intent written atomically with each enterprise mutation
// ============================================================================
//
// The command handler writes the pending Event into the enterprise's own
// partition in the same batch as the mutation. The relay then:
//   1. appends the event to the Event Store (retrying transient failures)
//   2. deletes the outbox row
//
// A crash between 1 and 2 re-delivers the event on the next drain; the
// event log is at-least-once.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct OutboxEntry {
    pub entity_id: String,
    pub event: Event,
}

pub struct OutboxRelay {
    enterprises: Arc<dyn EnterpriseRepository>,
    events: Arc<dyn EventRepository>,
    retry_config: RetryConfig,
    metrics: Option<Arc<Metrics>>,
}

impl OutboxRelay {
    pub fn new(
        enterprises: Arc<dyn EnterpriseRepository>,
        events: Arc<dyn EventRepository>,
        retry_config: RetryConfig,
    ) -> Self {
        Self {
            enterprises,
            events,
            retry_config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Move one pending event into the log and clear its outbox row.
    pub async fn relay(&self, entry: &OutboxEntry) -> Result<()> {
        let events = self.events.clone();
        let metrics = self.metrics.clone();
        let event = entry.event.clone();

        let appended = retry_on_transient(self.retry_config.clone(), |attempt| {
            let events = events.clone();
            let event = event.clone();
            if let Some(ref m) = metrics {
                m.record_retry_attempt("event_append", attempt);
            }
            async move { events.append(&event).await }
        })
        .await;

        match appended {
            RetryResult::Success(()) => {
                if let Some(ref m) = self.metrics {
                    m.record_retry_outcome("event_append", true);
                    m.record_event_appended(entry.event.event_type.as_str());
                }
            }
            RetryResult::Failed(e) | RetryResult::PermanentFailure(e) => {
                if let Some(ref m) = self.metrics {
                    m.record_retry_outcome("event_append", false);
                    m.record_outbox_failure();
                }
                tracing::warn!(
                    event_id = %entry.event.id,
                    entity_id = %entry.entity_id,
                    error = %e,
                    "⚠️ Event append failed, intent stays in outbox"
                );
                return Err(e);
            }
        }

        self.enterprises
            .clear_outbox(&entry.entity_id, &entry.event.id)
            .await?;

        if let Some(ref m) = self.metrics {
            m.record_outbox_relayed();
        }

        tracing::debug!(
            event_id = %entry.event.id,
            event_type = %entry.event.event_type,
            entity_id = %entry.entity_id,
            "📤 Relayed outbox event"
        );

        Ok(())
    }

    /// Drain up to `batch_size` pending entries, oldest first.
    /// Returns how many were relayed; individual failures are logged and left
    /// pending for the next drain.
    pub async fn relay_pending(&self, batch_size: i32) -> Result<usize> {
        if batch_size < 1 {
            return Err(AdminError::invalid("outbox batch size must be at least 1"));
        }

        let pending = self.enterprises.pending_outbox(batch_size).await?;
        let mut relayed = 0;

        for entry in &pending {
            match self.relay(entry).await {
                Ok(()) => relayed += 1,
                Err(e) => {
                    tracing::error!(
                        event_id = %entry.event.id,
                        error = %e,
                        "❌ Failed to relay outbox entry"
                    );
                }
            }
        }

        if !pending.is_empty() {
            tracing::info!(
                pending = pending.len(),
                relayed = relayed,
                "Outbox drain complete"
            );
        }

        Ok(relayed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::InMemoryEnterpriseStore;
    use crate::domain::enterprise::aggregate::fixtures::enterprise;
    use crate::event_sourcing::{EntityType, EventName, InMemoryEventStore, MockEventRepository};
    use std::time::Duration;

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            multiplier: 2.0,
        }
    }

    fn insert_event(id: &str) -> Event {
        Event::new(EventName::Insert, EntityType::Enterprise, id, "u-1")
    }

    #[tokio::test]
    async fn test_relay_appends_and_clears() {
        let store = Arc::new(InMemoryEnterpriseStore::new());
        let events = Arc::new(InMemoryEventStore::new());
        let event = insert_event("acme");
        store.put(&enterprise("acme"), Some(&event)).await.unwrap();

        let relay = OutboxRelay::new(store.clone(), events.clone(), fast_retry());
        assert_eq!(relay.relay_pending(10).await.unwrap(), 1);

        assert_eq!(events.all().await, vec![event]);
        assert!(store.pending_outbox(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_append_keeps_intent_pending() {
        let store = Arc::new(InMemoryEnterpriseStore::new());
        let event = insert_event("acme");
        store.put(&enterprise("acme"), Some(&event)).await.unwrap();

        let mut failing = MockEventRepository::new();
        failing
            .expect_append()
            .times(2)
            .returning(|_| Err(AdminError::store(anyhow::anyhow!("unavailable"))));

        let relay = OutboxRelay::new(store.clone(), Arc::new(failing), fast_retry());
        assert_eq!(relay.relay_pending(10).await.unwrap(), 0);

        let pending = store.pending_outbox(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].event.id, event.id);
    }

    #[tokio::test]
    async fn test_invalid_batch_size() {
        let relay = OutboxRelay::new(
            Arc::new(InMemoryEnterpriseStore::new()),
            Arc::new(InMemoryEventStore::new()),
            fast_retry(),
        );
        assert!(matches!(
            relay.relay_pending(0).await,
            Err(AdminError::InvalidArgument(_))
        ));
    }
}
