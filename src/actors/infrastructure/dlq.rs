use actix::prelude::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scylla::client::session::Session;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{AdminError, Result};
use crate::metrics::Metrics;

// ============================================================================
// Dead Letter Queue Actor
// ============================================================================
//
// Change records that still fail after redelivery land here with their raw
// JSON so an operator can inspect and replay them. Entries are keyed by the
// change record id; re-adding the same id overwrites the earlier attempt.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct DlqMessage {
    pub id: String,
    pub event_name: String,
    pub payload: String,
    pub error_message: String,
    pub failure_count: i32,
    pub first_failed_at: DateTime<Utc>,
    pub last_failed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct DlqStats {
    pub total_messages: i64,
    pub by_event_name: HashMap<String, i64>,
}

#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    async fn insert(&self, message: &DlqMessage) -> Result<()>;
    async fn list(&self, limit: i32) -> Result<Vec<DlqMessage>>;
}

// ============================================================================
// ScyllaDB storage
// ============================================================================

pub struct ScyllaDeadLetterStore {
    session: Arc<Session>,
}

impl ScyllaDeadLetterStore {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

type DlqRow = (
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<i32>,
    Option<DateTime<Utc>>,
    Option<DateTime<Utc>>,
);

#[async_trait]
impl DeadLetterStore for ScyllaDeadLetterStore {
    async fn insert(&self, message: &DlqMessage) -> Result<()> {
        self.session
            .query_unpaged(
                "INSERT INTO dead_letter_queue (
                    id, event_name, payload, error_message,
                    failure_count, first_failed_at, last_failed_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?)",
                (
                    &message.id,
                    &message.event_name,
                    &message.payload,
                    &message.error_message,
                    message.failure_count,
                    message.first_failed_at,
                    message.last_failed_at,
                ),
            )
            .await
            .map_err(AdminError::store)?;
        Ok(())
    }

    async fn list(&self, limit: i32) -> Result<Vec<DlqMessage>> {
        let result = self
            .session
            .query_unpaged(
                "SELECT id, event_name, payload, error_message,
                        failure_count, first_failed_at, last_failed_at
                 FROM dead_letter_queue
                 LIMIT ?",
                (limit,),
            )
            .await
            .map_err(AdminError::store)?;

        let rows_result = result.into_rows_result().map_err(AdminError::store)?;
        let mut messages = Vec::new();

        for row in rows_result.rows::<DlqRow>().map_err(AdminError::store)? {
            let (id, event_name, payload, error_message, failure_count, first, last) =
                row.map_err(AdminError::store)?;
            let first_failed_at = first.unwrap_or_else(Utc::now);
            messages.push(DlqMessage {
                id,
                event_name: event_name.unwrap_or_default(),
                payload: payload.unwrap_or_default(),
                error_message: error_message.unwrap_or_default(),
                failure_count: failure_count.unwrap_or(0),
                first_failed_at,
                last_failed_at: last.unwrap_or(first_failed_at),
            });
        }

        Ok(messages)
    }
}

/// In-memory queue for local runs and tests.
#[derive(Default)]
pub struct InMemoryDeadLetterStore {
    messages: RwLock<BTreeMap<String, DlqMessage>>,
}

impl InMemoryDeadLetterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeadLetterStore for InMemoryDeadLetterStore {
    async fn insert(&self, message: &DlqMessage) -> Result<()> {
        self.messages
            .write()
            .await
            .insert(message.id.clone(), message.clone());
        Ok(())
    }

    async fn list(&self, limit: i32) -> Result<Vec<DlqMessage>> {
        let take = usize::try_from(limit).unwrap_or(0);
        Ok(self.messages.read().await.values().take(take).cloned().collect())
    }
}

// ============================================================================
// Actor
// ============================================================================

pub struct DlqActor {
    store: Arc<dyn DeadLetterStore>,
    metrics: Option<Arc<Metrics>>,
}

impl DlqActor {
    pub fn new(store: Arc<dyn DeadLetterStore>) -> Self {
        Self {
            store,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

impl Actor for DlqActor {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        tracing::info!("DlqActor started - Dead Letter Queue ready");
    }
}

#[derive(Message, Debug, Clone)]
#[rtype(result = "Result<()>")]
pub struct AddToDlq {
    pub record_id: String,
    pub event_name: String,
    pub payload: String,
    pub error_message: String,
    pub failure_count: i32,
    pub first_failed_at: DateTime<Utc>,
}

#[derive(Message)]
#[rtype(result = "Result<Vec<DlqMessage>>")]
pub struct GetDlqMessages {
    pub limit: i32,
}

#[derive(Message)]
#[rtype(result = "Result<DlqStats>")]
pub struct GetDlqStats;

/// Scan size used when computing stats.
const STATS_SCAN_LIMIT: i32 = 10_000;

impl Handler<AddToDlq> for DlqActor {
    type Result = ResponseFuture<Result<()>>;

    fn handle(&mut self, msg: AddToDlq, _: &mut Self::Context) -> Self::Result {
        let store = self.store.clone();

        tracing::error!(
            record_id = %msg.record_id,
            event_name = %msg.event_name,
            error = %msg.error_message,
            failure_count = msg.failure_count,
            "💀 Adding change record to Dead Letter Queue"
        );

        if let Some(ref m) = self.metrics {
            m.record_dlq_message(&msg.event_name);
        }

        Box::pin(async move {
            let message = DlqMessage {
                id: msg.record_id,
                event_name: msg.event_name,
                payload: msg.payload,
                error_message: msg.error_message,
                failure_count: msg.failure_count,
                first_failed_at: msg.first_failed_at,
                last_failed_at: Utc::now(),
            };
            store.insert(&message).await?;

            tracing::info!(record_id = %message.id, "Change record stored in DLQ");
            Ok(())
        })
    }
}

impl Handler<GetDlqMessages> for DlqActor {
    type Result = ResponseFuture<Result<Vec<DlqMessage>>>;

    fn handle(&mut self, msg: GetDlqMessages, _: &mut Self::Context) -> Self::Result {
        let store = self.store.clone();
        Box::pin(async move { store.list(msg.limit).await })
    }
}

impl Handler<GetDlqStats> for DlqActor {
    type Result = ResponseFuture<Result<DlqStats>>;

    fn handle(&mut self, _msg: GetDlqStats, _: &mut Self::Context) -> Self::Result {
        let store = self.store.clone();

        Box::pin(async move {
            let messages = store.list(STATS_SCAN_LIMIT).await?;
            let mut stats = DlqStats {
                total_messages: messages.len() as i64,
                ..Default::default()
            };
            for message in messages {
                *stats.by_event_name.entry(message.event_name).or_insert(0) += 1;
            }
            Ok(stats)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(id: &str, event_name: &str) -> AddToDlq {
        AddToDlq {
            record_id: id.to_string(),
            event_name: event_name.to_string(),
            payload: "{}".to_string(),
            error_message: "append timed out".to_string(),
            failure_count: 3,
            first_failed_at: Utc::now(),
        }
    }

    #[actix::test]
    async fn test_dlq_stores_and_counts() {
        let store = Arc::new(InMemoryDeadLetterStore::new());
        let dlq = DlqActor::new(store.clone()).start();

        dlq.send(failed("rec-1", "INSERT")).await.unwrap().unwrap();
        dlq.send(failed("rec-2", "INSERT")).await.unwrap().unwrap();
        dlq.send(failed("rec-3", "REMOVE")).await.unwrap().unwrap();

        let messages = dlq.send(GetDlqMessages { limit: 10 }).await.unwrap().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].id, "rec-1");
        assert_eq!(messages[0].failure_count, 3);

        let stats = dlq.send(GetDlqStats).await.unwrap().unwrap();
        assert_eq!(stats.total_messages, 3);
        assert_eq!(stats.by_event_name.get("INSERT"), Some(&2));
        assert_eq!(stats.by_event_name.get("REMOVE"), Some(&1));
    }

    #[actix::test]
    async fn test_same_record_overwrites() {
        let store = Arc::new(InMemoryDeadLetterStore::new());
        let dlq = DlqActor::new(store.clone()).start();

        dlq.send(failed("rec-1", "INSERT")).await.unwrap().unwrap();
        let mut again = failed("rec-1", "INSERT");
        again.failure_count = 6;
        dlq.send(again).await.unwrap().unwrap();

        let messages = store.list(10).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].failure_count, 6);
    }
}
