use chrono::Utc;
use std::sync::Arc;

use crate::db::{EnterpriseRepository, OutboxEntry, OutboxRelay};
use crate::error::{AdminError, Result};
use crate::event_sourcing::{
    details_from, EntityType, Event, EventName, EventRepository, EventSummary,
};
use crate::metrics::Metrics;

use super::aggregate::{Enterprise, EnterpriseChanges, EnterpriseSummary};
use super::commands::{CreateEnterprise, UpdateEnterprise};
use super::value_objects::SortOrder;

// ============================================================================
// Enterprise Command Handler
// ============================================================================
//
// Orchestrates: Command → validation → Enterprise Store (mutation + outbox
// intent, one batch) → relay → Event Store
//
// Audit delivery never fails a committed mutation: if the eager relay
// fails, the intent stays in the outbox and the background relay picks it up.
//
// ============================================================================

pub struct EnterpriseCommandHandler {
    enterprises: Arc<dyn EnterpriseRepository>,
    events: Arc<dyn EventRepository>,
    relay: Arc<OutboxRelay>,
    metrics: Option<Arc<Metrics>>,
}

impl EnterpriseCommandHandler {
    pub fn new(
        enterprises: Arc<dyn EnterpriseRepository>,
        events: Arc<dyn EventRepository>,
        relay: Arc<OutboxRelay>,
    ) -> Self {
        Self {
            enterprises,
            events,
            relay,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn create(&self, user_id: &str, cmd: CreateEnterprise) -> Result<Enterprise> {
        let enterprise = Enterprise::create(cmd, user_id, Utc::now())?;

        let event = Event::new(EventName::Insert, EntityType::Enterprise, &enterprise.id, user_id)
            .with_details(details_from(&enterprise).map_err(AdminError::store)?);

        self.enterprises.put(&enterprise, Some(&event)).await?;
        self.record_mutation("create");

        tracing::info!(
            enterprise_id = %enterprise.id,
            user_id = %user_id,
            "🏢 Enterprise created"
        );

        self.publish(&enterprise.id, event).await;
        Ok(enterprise)
    }

    pub async fn modify(
        &self,
        user_id: &str,
        id: &str,
        cmd: UpdateEnterprise,
    ) -> Result<Enterprise> {
        self.enterprises.exists(id).await?;
        let current = self.enterprises.find_by_id(id).await?;

        let expected_version = cmd.expected_version.unwrap_or(current.version);
        let changes = EnterpriseChanges::from_command(cmd, user_id, Utc::now());

        // Cross-field rules are checked against the merged record.
        let preview = current.with_changes(&changes);
        preview.validate()?;

        let event = Event::new(EventName::Modify, EntityType::Enterprise, id, user_id)
            .with_details(details_from(&preview).map_err(AdminError::store)?);

        let updated = self
            .enterprises
            .update(id, &changes, expected_version, Some(&event))
            .await?;
        self.record_mutation("modify");

        tracing::info!(
            enterprise_id = %id,
            user_id = %user_id,
            version = updated.version,
            metadata_only = changes.is_metadata_only(),
            "✏️ Enterprise updated"
        );

        self.publish(id, event).await;
        Ok(updated)
    }

    pub async fn remove(&self, user_id: &str, id: &str) -> Result<EnterpriseSummary> {
        self.enterprises.exists(id).await?;
        let current = self.enterprises.find_by_id(id).await?;
        let summary = current.summary();

        let event = Event::new(EventName::Remove, EntityType::Enterprise, id, user_id)
            .with_details(details_from(&current).map_err(AdminError::store)?);

        if let Err(e) = self.enterprises.delete(id, Some(&event)).await {
            if e.is_not_found() {
                // another delete won; neither the row nor the outbox was written
                tracing::debug!(enterprise_id = %id, "Enterprise vanished before delete");
            }
            return Err(e);
        }

        self.record_mutation("remove");
        tracing::info!(enterprise_id = %id, user_id = %user_id, "🗑️ Enterprise removed");
        self.publish(id, event).await;

        Ok(summary)
    }

    pub async fn get(&self, id: &str) -> Result<Enterprise> {
        self.enterprises.find_by_id(id).await
    }

    pub async fn list(
        &self,
        limit: Option<i32>,
        order: SortOrder,
    ) -> Result<Vec<EnterpriseSummary>> {
        self.enterprises.list_by_contract_end_date(limit, order).await
    }

    pub async fn recent_events(&self, limit: Option<i32>) -> Result<Vec<EventSummary>> {
        self.events.list_recent(limit).await
    }

    async fn publish(&self, entity_id: &str, event: Event) {
        let entry = OutboxEntry {
            entity_id: entity_id.to_string(),
            event,
        };
        if let Err(e) = self.relay.relay(&entry).await {
            tracing::warn!(
                event_id = %entry.event.id,
                entity_id = %entity_id,
                error = %e,
                "Audit event deferred to background relay"
            );
        }
    }

    fn record_mutation(&self, operation: &str) {
        if let Some(ref m) = self.metrics {
            m.record_enterprise_mutation(operation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryEnterpriseStore;
    use crate::domain::enterprise::aggregate::fixtures::create_command;
    use crate::event_sourcing::{EventType, InMemoryEventStore, MockEventRepository};
    use crate::utils::RetryConfig;
    use std::time::Duration;

    struct Harness {
        store: Arc<InMemoryEnterpriseStore>,
        events: Arc<InMemoryEventStore>,
        handler: EnterpriseCommandHandler,
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 1,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            multiplier: 2.0,
        }
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryEnterpriseStore::new());
        let events = Arc::new(InMemoryEventStore::new());
        let relay = Arc::new(OutboxRelay::new(store.clone(), events.clone(), fast_retry()));
        let handler = EnterpriseCommandHandler::new(store.clone(), events.clone(), relay);
        Harness { store, events, handler }
    }

    #[tokio::test]
    async fn test_create_then_find_returns_caller_fields() {
        let h = harness();
        let cmd = create_command("acme");
        let created = h.handler.create("u-1", cmd.clone()).await.unwrap();
        let found = h.handler.get("acme").await.unwrap();

        assert_eq!(found, created);
        assert_eq!(found.name, cmd.name);
        assert_eq!(found.contact_email, cmd.contact_email);
        assert_eq!(found.max_licenses, cmd.max_licenses);
        assert_eq!(found.contract_end_date, cmd.contract_end_date);
        assert_eq!(found.created_date, found.updated_date);
    }

    #[tokio::test]
    async fn test_invalid_create_touches_no_store() {
        let h = harness();
        let mut cmd = create_command("ACME");
        cmd.max_licenses = 10;
        cmd.used_licenses = 12;

        let result = h.handler.create("u-1", cmd).await;
        assert!(matches!(result, Err(AdminError::InvalidArgument(_))));
        assert!(h.store.is_empty().await);
        assert!(h.events.is_empty().await);
    }

    #[tokio::test]
    async fn test_each_mutation_emits_one_matching_event() {
        let h = harness();
        h.handler.create("u-1", create_command("acme")).await.unwrap();
        h.handler
            .modify(
                "u-2",
                "acme",
                UpdateEnterprise {
                    used_licenses: Some(9),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        h.handler.remove("u-3", "acme").await.unwrap();

        let mut events = h.events.all().await;
        events.sort_by_key(|e| e.event_date);
        let pairs: Vec<_> = events.iter().map(|e| (e.event_name, e.event_type)).collect();
        assert_eq!(events.len(), 3);
        assert!(pairs.contains(&(EventName::Insert, EventType::EnterpriseCreated)));
        assert!(pairs.contains(&(EventName::Modify, EventType::EnterpriseUpdated)));
        assert!(pairs.contains(&(EventName::Remove, EventType::EnterpriseDeleted)));
        assert!(events.iter().all(|e| e.entity_id == "acme"));
        assert!(events.iter().all(|e| e.event_source.is_none()));
        assert!(h.store.pending_outbox(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_modify_is_partial() {
        let h = harness();
        let created = h.handler.create("u-1", create_command("acme")).await.unwrap();

        let updated = h
            .handler
            .modify(
                "u-2",
                "acme",
                UpdateEnterprise {
                    website: Some("https://acme.example".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.website.as_deref(), Some("https://acme.example"));
        assert_eq!(updated.name, created.name);
        assert_eq!(updated.used_licenses, created.used_licenses);
        assert_eq!(updated.created_date, created.created_date);
        assert!(updated.updated_date >= created.updated_date);
        assert_eq!(updated.updated_by, "u-2");
        assert_eq!(updated.version, created.version + 1);
    }

    #[tokio::test]
    async fn test_modify_missing_enterprise() {
        let h = harness();
        let result = h
            .handler
            .modify("u-2", "ghost", UpdateEnterprise::default())
            .await;
        assert!(matches!(result, Err(AdminError::RecordNotFound(_))));
        assert!(h.events.is_empty().await);
    }

    #[tokio::test]
    async fn test_modify_end_before_start_rejected() {
        let h = harness();
        let created = h.handler.create("u-1", create_command("ACME")).await.unwrap();

        let result = h
            .handler
            .modify(
                "u-2",
                "ACME",
                UpdateEnterprise {
                    contract_end_date: Some(
                        created.contract_start_date - chrono::Duration::days(30),
                    ),
                    ..Default::default()
                },
            )
            .await;

        assert!(matches!(result, Err(AdminError::InvalidArgument(_))));
        assert_eq!(h.handler.get("ACME").await.unwrap(), created);
        assert_eq!(h.events.len().await, 1);
    }

    #[tokio::test]
    async fn test_modify_with_stale_version_conflicts() {
        let h = harness();
        h.handler.create("u-1", create_command("acme")).await.unwrap();

        let result = h
            .handler
            .modify(
                "u-2",
                "acme",
                UpdateEnterprise {
                    status: Some(crate::domain::enterprise::EnterpriseStatus::Suspended),
                    expected_version: Some(7),
                    ..Default::default()
                },
            )
            .await;

        assert!(matches!(result, Err(AdminError::ConcurrencyConflict { .. })));
        assert_eq!(h.events.len().await, 1);
    }

    #[tokio::test]
    async fn test_remove_returns_summary() {
        let h = harness();
        h.handler.create("u-1", create_command("acme")).await.unwrap();
        let summary = h.handler.remove("u-3", "acme").await.unwrap();
        assert_eq!(summary.id, "acme");
        assert!(matches!(h.handler.get("acme").await, Err(AdminError::RecordNotFound(_))));
        assert!(matches!(
            h.handler.remove("u-3", "acme").await,
            Err(AdminError::RecordNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_append_failure_does_not_fail_mutation() {
        let store = Arc::new(InMemoryEnterpriseStore::new());
        let mut events = MockEventRepository::new();
        events
            .expect_append()
            .returning(|_| Err(AdminError::store(anyhow::anyhow!("events table offline"))));
        let events: Arc<dyn EventRepository> = Arc::new(events);
        let relay = Arc::new(OutboxRelay::new(store.clone(), events.clone(), fast_retry()));
        let handler = EnterpriseCommandHandler::new(store.clone(), events, relay);

        let created = handler.create("u-1", create_command("acme")).await.unwrap();
        assert_eq!(store.find_by_id("acme").await.unwrap(), created);

        let pending = store.pending_outbox(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].event.event_type, EventType::EnterpriseCreated);
    }

    #[tokio::test]
    async fn test_list_delegates_limit_check() {
        let h = harness();
        h.handler.create("u-1", create_command("acme")).await.unwrap();
        assert_eq!(h.handler.list(Some(1), SortOrder::Ascending).await.unwrap().len(), 1);
        assert!(matches!(
            h.handler.list(Some(0), SortOrder::Ascending).await,
            Err(AdminError::InvalidArgument(_))
        ));
        assert!(matches!(
            h.handler.recent_events(Some(101)).await,
            Err(AdminError::InvalidArgument(_))
        ));
    }

    /// Reads see the row, the conditional delete finds it gone.
    struct ConcurrentlyDeletedStore {
        inner: InMemoryEnterpriseStore,
    }

    #[async_trait::async_trait]
    impl EnterpriseRepository for ConcurrentlyDeletedStore {
        async fn put(&self, enterprise: &Enterprise, outbox: Option<&Event>) -> Result<()> {
            self.inner.put(enterprise, outbox).await
        }

        async fn update(
            &self,
            id: &str,
            changes: &EnterpriseChanges,
            expected_version: i64,
            outbox: Option<&Event>,
        ) -> Result<Enterprise> {
            self.inner.update(id, changes, expected_version, outbox).await
        }

        async fn find_by_id(&self, id: &str) -> Result<Enterprise> {
            self.inner.find_by_id(id).await
        }

        async fn exists(&self, id: &str) -> Result<bool> {
            self.inner.exists(id).await
        }

        async fn delete(&self, id: &str, _outbox: Option<&Event>) -> Result<()> {
            Err(AdminError::not_found(crate::db::keys::compose_enterprise_key(id)))
        }

        async fn list_by_contract_end_date(
            &self,
            limit: Option<i32>,
            order: SortOrder,
        ) -> Result<Vec<EnterpriseSummary>> {
            self.inner.list_by_contract_end_date(limit, order).await
        }

        async fn pending_outbox(&self, limit: i32) -> Result<Vec<OutboxEntry>> {
            self.inner.pending_outbox(limit).await
        }

        async fn clear_outbox(&self, entity_id: &str, event_id: &str) -> Result<()> {
            self.inner.clear_outbox(entity_id, event_id).await
        }
    }

    #[tokio::test]
    async fn test_remove_losing_delete_race_is_not_found() {
        let store = Arc::new(ConcurrentlyDeletedStore {
            inner: InMemoryEnterpriseStore::new(),
        });
        let events = Arc::new(InMemoryEventStore::new());
        let relay = Arc::new(OutboxRelay::new(store.clone(), events.clone(), fast_retry()));
        let handler = EnterpriseCommandHandler::new(store.clone(), events.clone(), relay);

        handler.create("u-1", create_command("acme")).await.unwrap();
        let created_events = events.len().await;

        match handler.remove("u-3", "acme").await {
            Err(AdminError::RecordNotFound(key)) => assert_eq!(key, "ENTERPRISE#acme"),
            other => panic!("expected RecordNotFound, got {:?}", other),
        }
        assert_eq!(events.len().await, created_events);
        assert!(store.pending_outbox(10).await.unwrap().is_empty());
    }
}
