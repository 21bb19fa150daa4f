use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::db::keys::check_limit;
use crate::error::Result;
use crate::event_sourcing::core::{Event, EventSummary};

use super::event_store::EventRepository;

/// Event log kept in memory, keyed by the same sort key as the events table.
#[derive(Default)]
pub struct InMemoryEventStore {
    events: RwLock<BTreeMap<String, Event>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }

    /// Every stored event, oldest first.
    pub async fn all(&self) -> Vec<Event> {
        self.events.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl EventRepository for InMemoryEventStore {
    async fn append(&self, event: &Event) -> Result<()> {
        self.events
            .write()
            .await
            .insert(event.sort_key(), event.clone());
        Ok(())
    }

    async fn list_recent(&self, limit: Option<i32>) -> Result<Vec<EventSummary>> {
        let events = self.list_recent_full(limit).await?;
        Ok(events.iter().map(Event::summary).collect())
    }

    async fn list_recent_full(&self, limit: Option<i32>) -> Result<Vec<Event>> {
        let limit = check_limit(limit)?;
        let events = self.events.read().await;
        let newest_first = events.values().rev().cloned();
        Ok(match limit {
            Some(n) => newest_first.take(n as usize).collect(),
            None => newest_first.collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AdminError;
    use crate::event_sourcing::core::{EntityType, EventName};
    use chrono::{TimeZone, Utc};

    fn event_at(minute: u32, entity_type: EntityType) -> Event {
        let date = Utc.with_ymd_and_hms(2024, 1, 15, 9, minute, 0).unwrap();
        Event::new(EventName::Insert, entity_type, "acme", "u-1").at(date)
    }

    #[tokio::test]
    async fn test_list_recent_newest_first() {
        let store = InMemoryEventStore::new();
        let first = event_at(0, EntityType::Enterprise);
        let second = event_at(1, EntityType::License);
        let third = event_at(2, EntityType::Enterprise);
        for e in [&second, &first, &third] {
            store.append(e).await.unwrap();
        }

        let recent = store.list_recent(Some(2)).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, third.id);
        assert_eq!(recent[1].id, second.id);

        let all = store.list_recent(None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].id, first.id);
    }

    #[tokio::test]
    async fn test_limit_out_of_range() {
        let store = InMemoryEventStore::new();
        for bad in [0, -1, 101] {
            assert!(matches!(
                store.list_recent(Some(bad)).await,
                Err(AdminError::InvalidArgument(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_same_instant_ties_broken_by_entity_then_id() {
        let store = InMemoryEventStore::new();
        let license = event_at(5, EntityType::License);
        let enterprise = event_at(5, EntityType::Enterprise);
        store.append(&enterprise).await.unwrap();
        store.append(&license).await.unwrap();

        let recent = store.list_recent(None).await.unwrap();
        assert_eq!(recent[0].id, license.id);
        assert_eq!(recent[1].id, enterprise.id);
    }
}
