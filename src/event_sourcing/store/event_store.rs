use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scylla::client::session::Session;
use std::sync::Arc;

use crate::db::keys::{check_limit, EVENTS_PARTITION};
use crate::error::{AdminError, Result};
use crate::event_sourcing::core::{Event, EventDetails, EventSummary};

// ============================================================================
// Event Store - append-only audit log
// ============================================================================
//
// All events live in one partition (`EVENTS`) of the `events` table, clustered
// by `<date>#<ENTITY_TYPE>#<event id>` in descending order so the newest
// event is always read first.
//
// Appends are unconditional: retries and duplicate change notifications may
// produce duplicate entries. The log is at-least-once.
//
// ============================================================================

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Persist one event. No dedup.
    async fn append(&self, event: &Event) -> Result<()>;

    /// Most recent events first. `limit` must be in [1, 100] when present.
    async fn list_recent(&self, limit: Option<i32>) -> Result<Vec<EventSummary>>;

    /// Same ordering as `list_recent`, full records.
    async fn list_recent_full(&self, limit: Option<i32>) -> Result<Vec<Event>>;
}

type EventRow = (
    String,
    DateTime<Utc>,
    String,
    String,
    Option<String>,
    Option<String>,
    String,
    String,
    String,
    Option<String>,
);

pub struct ScyllaEventStore {
    session: Arc<Session>,
}

/// A stored vocabulary value that no longer parses is a corrupt row.
fn parse_column<T>(column: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr<Err = AdminError>,
{
    value
        .parse()
        .map_err(|e| AdminError::store(anyhow::anyhow!("corrupt {} column: {}", column, e)))
}

impl ScyllaEventStore {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    fn row_to_event(row: EventRow) -> Result<Event> {
        let (
            id,
            event_date,
            event_name,
            event_type,
            event_source,
            event_source_id,
            entity_type,
            entity_id,
            user_id,
            details_json,
        ) = row;

        let details = match details_json {
            Some(json) if !json.is_empty() => {
                Some(serde_json::from_str::<EventDetails>(&json).map_err(AdminError::store)?)
            }
            _ => None,
        };

        Ok(Event {
            id,
            event_date,
            event_name: parse_column("event_name", &event_name)?,
            event_type: parse_column("event_type", &event_type)?,
            event_source,
            event_source_id,
            entity_type: parse_column("entity_type", &entity_type)?,
            entity_id,
            user_id,
            details,
        })
    }
}

#[async_trait]
impl EventRepository for ScyllaEventStore {
    async fn append(&self, event: &Event) -> Result<()> {
        let details_json = event
            .details
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(AdminError::store)?;

        self.session
            .query_unpaged(
                "INSERT INTO events (
                    pk, sk, id, event_date, event_name, event_type, event_source,
                    event_source_id, entity_type, entity_id, user_id, details
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                (
                    EVENTS_PARTITION,
                    event.sort_key(),
                    &event.id,
                    event.event_date,
                    event.event_name.as_str(),
                    event.event_type.as_str(),
                    &event.event_source,
                    &event.event_source_id,
                    event.entity_type.as_str(),
                    &event.entity_id,
                    &event.user_id,
                    details_json,
                ),
            )
            .await
            .map_err(AdminError::store)?;

        tracing::debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            entity_id = %event.entity_id,
            "📝 Appended event"
        );

        Ok(())
    }

    async fn list_recent(&self, limit: Option<i32>) -> Result<Vec<EventSummary>> {
        let events = self.list_recent_full(limit).await?;
        Ok(events.iter().map(Event::summary).collect())
    }

    async fn list_recent_full(&self, limit: Option<i32>) -> Result<Vec<Event>> {
        let limit = check_limit(limit)?;

        const SELECT: &str = "SELECT id, event_date, event_name, event_type, event_source,
                    event_source_id, entity_type, entity_id, user_id, details
             FROM events WHERE pk = ?";

        let result = match limit {
            Some(n) => {
                self.session
                    .query_unpaged(format!("{} LIMIT ?", SELECT), (EVENTS_PARTITION, n))
                    .await
            }
            None => self.session.query_unpaged(SELECT, (EVENTS_PARTITION,)).await,
        }
        .map_err(AdminError::store)?;

        let rows_result = result.into_rows_result().map_err(AdminError::store)?;

        let mut events = Vec::new();
        for row in rows_result.rows::<EventRow>().map_err(AdminError::store)? {
            let row = row.map_err(AdminError::store)?;
            events.push(Self::row_to_event(row)?);
        }

        tracing::debug!(count = events.len(), "Loaded recent events");
        Ok(events)
    }
}
