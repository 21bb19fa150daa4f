use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::domain::enterprise::{Enterprise, EnterpriseChanges, EnterpriseSummary, SortOrder};
use crate::error::{AdminError, Result};
use crate::event_sourcing::Event;

use super::enterprise_store::{in_index_order, EnterpriseRepository};
use super::keys::{check_limit, compose_enterprise_key, contract_end_index_key};
use super::outbox::OutboxEntry;

/// Enterprise store kept in memory with the same conditional-write rules as
/// the Scylla store. Used by tests and local runs without a cluster.
#[derive(Default)]
pub struct InMemoryEnterpriseStore {
    state: RwLock<State>,
}

#[derive(Default)]
struct State {
    enterprises: BTreeMap<String, Enterprise>,
    /// Keyed by event sort key so iteration is oldest first.
    outbox: BTreeMap<String, OutboxEntry>,
}

impl State {
    fn stage_outbox(&mut self, entity_id: &str, outbox: Option<&Event>) {
        if let Some(event) = outbox {
            self.outbox.insert(
                event.sort_key(),
                OutboxEntry {
                    entity_id: entity_id.to_string(),
                    event: event.clone(),
                },
            );
        }
    }
}

impl InMemoryEnterpriseStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.enterprises.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.enterprises.is_empty()
    }
}

#[async_trait]
impl EnterpriseRepository for InMemoryEnterpriseStore {
    async fn put(&self, enterprise: &Enterprise, outbox: Option<&Event>) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .enterprises
            .insert(enterprise.id.clone(), enterprise.clone());
        state.stage_outbox(&enterprise.id, outbox);
        Ok(())
    }

    async fn update(
        &self,
        id: &str,
        changes: &EnterpriseChanges,
        expected_version: i64,
        outbox: Option<&Event>,
    ) -> Result<Enterprise> {
        let mut state = self.state.write().await;
        let current = state
            .enterprises
            .get(id)
            .ok_or_else(|| AdminError::not_found(compose_enterprise_key(id)))?;

        if current.version != expected_version {
            return Err(AdminError::ConcurrencyConflict {
                id: id.to_string(),
                expected: expected_version,
                actual: Some(current.version),
            });
        }

        let updated = current.with_changes(changes);
        state.enterprises.insert(id.to_string(), updated.clone());
        state.stage_outbox(id, outbox);
        Ok(updated)
    }

    async fn find_by_id(&self, id: &str) -> Result<Enterprise> {
        self.state
            .read()
            .await
            .enterprises
            .get(id)
            .cloned()
            .ok_or_else(|| AdminError::not_found(compose_enterprise_key(id)))
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        if self.state.read().await.enterprises.contains_key(id) {
            Ok(true)
        } else {
            Err(AdminError::not_found(compose_enterprise_key(id)))
        }
    }

    async fn delete(&self, id: &str, outbox: Option<&Event>) -> Result<()> {
        let mut state = self.state.write().await;
        if state.enterprises.remove(id).is_none() {
            return Err(AdminError::not_found(compose_enterprise_key(id)));
        }
        state.stage_outbox(id, outbox);
        Ok(())
    }

    async fn list_by_contract_end_date(
        &self,
        limit: Option<i32>,
        order: SortOrder,
    ) -> Result<Vec<EnterpriseSummary>> {
        let limit = check_limit(limit)?;
        let state = self.state.read().await;

        let index = state
            .enterprises
            .values()
            .map(|e| (contract_end_index_key(e.contract_end_date.as_ref()), e.id.clone(), e))
            .collect();
        Ok(in_index_order(index, order, limit.map(|n| n as usize))
            .into_iter()
            .map(Enterprise::summary)
            .collect())
    }

    async fn pending_outbox(&self, limit: i32) -> Result<Vec<OutboxEntry>> {
        let take = usize::try_from(limit).unwrap_or(0);
        Ok(self
            .state
            .read()
            .await
            .outbox
            .values()
            .take(take)
            .cloned()
            .collect())
    }

    async fn clear_outbox(&self, entity_id: &str, event_id: &str) -> Result<()> {
        self.state
            .write()
            .await
            .outbox
            .retain(|_, entry| !(entry.entity_id == entity_id && entry.event.id == event_id));
        Ok(())
    }
}
