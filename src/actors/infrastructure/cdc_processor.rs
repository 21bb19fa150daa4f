use actix::Addr;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kameo::actor::ActorRef;
use kameo::error::Infallible;
use kameo::message::{Context, Message};
use kameo::Actor;
use scylla::client::session::Session;
use scylla::value::CqlValue;
use scylla_cdc::consumer::{CDCRow, Consumer, ConsumerFactory, OperationType};
use scylla_cdc::log_reader::{CDCLogReader, CDCLogReaderBuilder};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::dlq::{AddToDlq, DlqActor};
use super::health_monitor::{HealthMonitorActor, UpdateHealth};
use crate::actors::core::HealthStatus;
use crate::change_stream::{AttributeValue, ChangeRecord, ChangeStreamProcessor, Image};
use crate::db::keys::format_key_timestamp;
use crate::db::schema::{ENTERPRISES_TABLE, ENTERPRISE_COLUMNS};
use crate::utils::{retry_with_backoff, RetryConfig, RetryResult};

// ============================================================================
// CDC Processor Actor - feeds the change-stream processor from ScyllaDB CDC
// ============================================================================
//
// The `enterprises` table has CDC with full pre-images and post-images, so
// one base-table write shows up in the log as:
//
//   PreImage (if the row existed) -> delta row -> PostImage
//
// with `end_of_batch` set on the last log row of the write. A logged batch
// (enterprise row + outbox row) yields several clustering rows under the
// same log timestamp; changes are grouped by sort key until end of batch and
// then handed to the ChangeStreamProcessor as one batch of ChangeRecords.
//
// Records the processor reports as failed are redelivered with backoff;
// records that still fail go to the DLQ. The consumer never returns an error
// to the log reader, so one poisoned record does not stall the stream.
//
// ============================================================================

pub const CHANGE_SOURCE: &str = "scylla-cdc";

/// Flatten a CQL value into a tagged attribute.
pub fn cql_to_attribute(value: &CqlValue) -> AttributeValue {
    match value {
        CqlValue::Text(s) | CqlValue::Ascii(s) => AttributeValue::S(s.clone()),
        CqlValue::Boolean(b) => AttributeValue::Bool(*b),
        CqlValue::Int(n) => AttributeValue::number(n),
        CqlValue::BigInt(n) => AttributeValue::number(n),
        CqlValue::SmallInt(n) => AttributeValue::number(n),
        CqlValue::TinyInt(n) => AttributeValue::number(n),
        CqlValue::Double(n) => AttributeValue::number(n),
        CqlValue::Float(n) => AttributeValue::number(n),
        CqlValue::Counter(c) => AttributeValue::number(c.0),
        CqlValue::Timestamp(ts) => match DateTime::<Utc>::from_timestamp_millis(ts.0) {
            Some(date) => AttributeValue::S(format_key_timestamp(&date)),
            None => AttributeValue::number(ts.0),
        },
        CqlValue::Uuid(u) => AttributeValue::S(u.to_string()),
        CqlValue::Timeuuid(u) => AttributeValue::S(u.to_string()),
        CqlValue::Empty => AttributeValue::Null(true),
        other => AttributeValue::Unsupported(serde_json::Value::String(format!("{:?}", other))),
    }
}

fn image_from_row(row: &CDCRow<'_>) -> Image {
    ENTERPRISE_COLUMNS
        .iter()
        .filter_map(|name| {
            row.get_value(name)
                .as_ref()
                .map(|value| (name.to_string(), cql_to_attribute(value)))
        })
        .collect()
}

// ============================================================================
// Grouping log rows into change records
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mutation {
    Upsert,
    Delete,
}

#[derive(Debug, Default)]
struct PendingChange {
    partition_key: String,
    sort_key: String,
    mutation: Option<Mutation>,
    keys: Image,
    old_image: Option<Image>,
    new_image: Option<Image>,
}

impl PendingChange {
    /// A partition delete carries only the partition key.
    fn is_partition_delete(&self) -> bool {
        self.mutation == Some(Mutation::Delete) && self.sort_key.is_empty()
    }
}

/// Collects the log rows of one CDC batch, keyed by base-table sort key.
///
/// A partition delete is resolved to the rows whose pre-images arrived in the
/// same batch. Without any pre-image the keys-only record is still emitted so
/// the processor fails it and it ends up in the DLQ.
#[derive(Debug, Default)]
pub struct ChangeAssembler {
    source_id: String,
    pending: BTreeMap<String, PendingChange>,
}

impl ChangeAssembler {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            pending: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Add one log row. `image` holds every non-null column of the row.
    pub fn observe(&mut self, operation: OperationType, image: Image) {
        let key_of = |name: &str| {
            image
                .get(name)
                .and_then(AttributeValue::scalar)
                .unwrap_or_default()
        };
        let (pk, sk) = (key_of("pk"), key_of("sk"));
        let entry = self
            .pending
            .entry(format!("{}#{}", pk, sk))
            .or_insert_with(|| PendingChange {
                partition_key: pk,
                sort_key: sk,
                ..Default::default()
            });

        match operation {
            OperationType::PreImage => entry.old_image = Some(image),
            OperationType::PostImage => entry.new_image = Some(image),
            OperationType::RowInsert | OperationType::RowUpdate => {
                entry.mutation = Some(Mutation::Upsert);
                entry.keys = keys_only(&image);
            }
            OperationType::RowDelete | OperationType::PartitionDelete => {
                entry.mutation = Some(Mutation::Delete);
                entry.keys = keys_only(&image);
            }
            _ => {}
        }
    }

    /// Close the batch: one ChangeRecord per mutated row.
    pub fn finish(&mut self, batch_id: &str, time: Option<DateTime<Utc>>) -> Vec<ChangeRecord> {
        let source_id = self.source_id.clone();
        let pending = std::mem::take(&mut self.pending);

        let deleted_partitions: BTreeSet<String> = pending
            .values()
            .filter(|c| c.is_partition_delete())
            .map(|c| c.partition_key.clone())
            .collect();
        let covered_by_pre_image = |c: &PendingChange| {
            c.mutation.is_none()
                && c.old_image.is_some()
                && deleted_partitions.contains(&c.partition_key)
        };
        let resolved_partitions: BTreeSet<String> = pending
            .values()
            .filter(|c| covered_by_pre_image(c))
            .map(|c| c.partition_key.clone())
            .collect();

        pending
            .into_iter()
            .filter_map(|(row_key, mut change)| {
                if covered_by_pre_image(&change) {
                    change.mutation = Some(Mutation::Delete);
                    if let Some(ref old) = change.old_image {
                        change.keys = keys_only(old);
                    }
                } else if change.is_partition_delete() {
                    if resolved_partitions.contains(&change.partition_key) {
                        return None;
                    }
                    tracing::warn!(
                        partition = %change.partition_key,
                        batch_id = %batch_id,
                        "⚠️ Partition delete without pre-images, entity cannot be resolved"
                    );
                }

                let mutation = change.mutation?;
                let record_id = format!("{}#{}", batch_id, row_key);
                let mut record =
                    ChangeRecord::new(record_id, "").with_source(CHANGE_SOURCE, source_id.clone());
                record.change.keys = change.keys.clone();
                record.change.approximate_creation_time = time;
                record.change.sequence_number = Some(batch_id.to_string());

                match mutation {
                    Mutation::Delete => {
                        record.event_name = "REMOVE".to_string();
                        record.change.old_image = change.old_image.or(Some(change.keys));
                    }
                    Mutation::Upsert => {
                        record.event_name = if change.old_image.is_some() {
                            "MODIFY".to_string()
                        } else {
                            "INSERT".to_string()
                        };
                        record.change.old_image = change.old_image;
                        record.change.new_image = change.new_image;
                    }
                }
                Some(record)
            })
            .collect()
    }
}

fn keys_only(image: &Image) -> Image {
    image
        .iter()
        .filter(|(name, _)| name.as_str() == "pk" || name.as_str() == "sk")
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

fn timeuuid_to_datetime(time: &uuid::Uuid) -> Option<DateTime<Utc>> {
    let (secs, nanos) = time.get_timestamp()?.to_unix();
    DateTime::<Utc>::from_timestamp(secs as i64, nanos)
}

// ============================================================================
// Consumer
// ============================================================================

pub(crate) struct EnterpriseCdcConsumer {
    processor: Arc<ChangeStreamProcessor>,
    dlq_actor: Option<Addr<DlqActor>>,
    retry_config: RetryConfig,
    assembler: ChangeAssembler,
}

impl EnterpriseCdcConsumer {
    fn new(
        processor: Arc<ChangeStreamProcessor>,
        dlq_actor: Option<Addr<DlqActor>>,
        retry_config: RetryConfig,
        source_id: String,
    ) -> Self {
        Self {
            processor,
            dlq_actor,
            retry_config,
            assembler: ChangeAssembler::new(source_id),
        }
    }

    async fn deliver(&self, records: Vec<ChangeRecord>) {
        let outcome = self.processor.process_batch(&records).await;
        if outcome.is_complete_success() {
            return;
        }

        let first_failed_at = Utc::now();
        for record in records.iter().filter(|r| outcome.failed.contains(&r.event_id)) {
            let processor = self.processor.clone();
            let result = retry_with_backoff(self.retry_config.clone(), |attempt| {
                let processor = processor.clone();
                let record = record.clone();
                async move {
                    tracing::debug!(attempt = attempt, record_id = %record.event_id, "Redelivering change record");
                    processor.process_record(&record).await
                }
            })
            .await;

            match result {
                RetryResult::Success(_) => {
                    tracing::info!(record_id = %record.event_id, "✅ Change record processed on redelivery");
                }
                RetryResult::Failed(e) | RetryResult::PermanentFailure(e) => {
                    tracing::error!(
                        record_id = %record.event_id,
                        error = %e,
                        "❌ Change record failed after retries, sending to DLQ"
                    );
                    self.send_to_dlq(record, e.to_string(), first_failed_at);
                }
            }
        }
    }

    fn send_to_dlq(&self, record: &ChangeRecord, error_message: String, first_failed_at: DateTime<Utc>) {
        let Some(ref dlq) = self.dlq_actor else {
            return;
        };
        let payload = serde_json::to_string(record).unwrap_or_default();
        dlq.do_send(AddToDlq {
            record_id: record.event_id.clone(),
            event_name: record.event_name.clone(),
            payload,
            error_message,
            // the batch delivery plus every redelivery
            failure_count: self.retry_config.max_attempts as i32 + 1,
            first_failed_at,
        });
    }
}

#[async_trait]
impl Consumer for EnterpriseCdcConsumer {
    async fn consume_cdc(&mut self, data: CDCRow<'_>) -> anyhow::Result<()> {
        tracing::debug!(
            stream_id = ?data.stream_id,
            operation = %data.operation,
            end_of_batch = data.end_of_batch,
            "Received CDC row"
        );

        let image = image_from_row(&data);
        self.assembler.observe(data.operation.clone(), image);

        if data.end_of_batch && !self.assembler.is_empty() {
            let records = self
                .assembler
                .finish(&data.time.to_string(), timeuuid_to_datetime(&data.time));
            if !records.is_empty() {
                self.deliver(records).await;
            }
        }

        Ok(())
    }
}

/// The log reader creates one consumer per stream group.
pub(crate) struct EnterpriseConsumerFactory {
    processor: Arc<ChangeStreamProcessor>,
    dlq_actor: Option<Addr<DlqActor>>,
    retry_config: RetryConfig,
    source_id: String,
}

#[async_trait]
impl ConsumerFactory for EnterpriseConsumerFactory {
    async fn new_consumer(&self) -> Box<dyn Consumer> {
        tracing::debug!("Creating new EnterpriseCdcConsumer instance");
        Box::new(EnterpriseCdcConsumer::new(
            self.processor.clone(),
            self.dlq_actor.clone(),
            self.retry_config.clone(),
            self.source_id.clone(),
        ))
    }
}

// ============================================================================
// Actor
// ============================================================================

pub struct CdcProcessor {
    session: Arc<Session>,
    keyspace: String,
    processor: Arc<ChangeStreamProcessor>,
    dlq_actor: Option<Addr<DlqActor>>,
    health_monitor: Option<ActorRef<HealthMonitorActor>>,
    retry_config: RetryConfig,
    reader: Option<CDCLogReader>,
}

impl CdcProcessor {
    pub fn new(
        session: Arc<Session>,
        keyspace: impl Into<String>,
        processor: Arc<ChangeStreamProcessor>,
        retry_config: RetryConfig,
    ) -> Self {
        Self {
            session,
            keyspace: keyspace.into(),
            processor,
            dlq_actor: None,
            health_monitor: None,
            retry_config,
            reader: None,
        }
    }

    pub fn with_dlq(mut self, dlq_actor: Addr<DlqActor>) -> Self {
        self.dlq_actor = Some(dlq_actor);
        self
    }

    pub fn with_health_monitor(mut self, health_monitor: ActorRef<HealthMonitorActor>) -> Self {
        self.health_monitor = Some(health_monitor);
        self
    }

    async fn start_cdc_streaming(&mut self) -> anyhow::Result<()> {
        let source_id = format!("{}.{}", self.keyspace, ENTERPRISES_TABLE);
        tracing::info!(table = %source_id, "🔄 Starting CDC streaming");

        let factory = Arc::new(EnterpriseConsumerFactory {
            processor: self.processor.clone(),
            dlq_actor: self.dlq_actor.clone(),
            retry_config: self.retry_config.clone(),
            source_id: source_id.clone(),
        });

        let (reader, handle) = CDCLogReaderBuilder::new()
            .session(self.session.clone())
            .keyspace(&self.keyspace)
            .table_name(ENTERPRISES_TABLE)
            .consumer_factory(factory)
            .build()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create CDC log reader: {}", e))?;
        self.reader = Some(reader);

        let health_monitor = self.health_monitor.clone();
        tokio::spawn(async move {
            let status = match handle.await {
                Ok(_) => {
                    tracing::info!("CDC reader completed");
                    HealthStatus::Degraded("CDC reader stopped".to_string())
                }
                Err(e) => {
                    tracing::error!(error = %e, "CDC reader failed");
                    HealthStatus::Unhealthy(format!("CDC reader failed: {}", e))
                }
            };
            report(health_monitor.as_ref(), status).await;
        });

        tracing::info!(table = %source_id, "✅ CDC log reader started");
        Ok(())
    }
}

async fn report(health_monitor: Option<&ActorRef<HealthMonitorActor>>, status: HealthStatus) {
    if let Some(monitor) = health_monitor {
        let _ = monitor
            .tell(UpdateHealth {
                component: "cdc_processor".to_string(),
                status,
                details: None,
            })
            .await;
    }
}

impl Actor for CdcProcessor {
    type Args = Self;
    type Error = Infallible;

    async fn on_start(mut state: Self::Args, _actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        tracing::info!("CdcProcessor actor started");

        let status = match state.start_cdc_streaming().await {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => {
                tracing::error!(error = %e, "Failed to start CDC streaming");
                HealthStatus::Unhealthy(e.to_string())
            }
        };
        report(state.health_monitor.as_ref(), status).await;

        Ok(state)
    }
}

/// Stop reading the log; already-delivered batches are unaffected.
#[derive(Debug)]
pub struct StopStreaming;

impl Message<StopStreaming> for CdcProcessor {
    type Reply = ();

    async fn handle(&mut self, _msg: StopStreaming, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        if let Some(mut reader) = self.reader.take() {
            reader.stop();
            tracing::info!("🛑 CDC streaming stopped");
        }
    }
}
