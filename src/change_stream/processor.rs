use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

use crate::db::keys::{decompose_enterprise_key, EntityKind};
use crate::error::AdminError;
use crate::event_sourcing::{EntityType, Event, EventName, EventRepository};
use crate::metrics::Metrics;

use super::record::{extract_scalar, image_to_details, ChangeRecord, Image};

// ============================================================================
// Change-Stream Processor
// ============================================================================
//
// Turns raw change notifications on the admin table into normalized audit
// events. Per record:
//   1. pick the image: new for INSERT/MODIFY, old for REMOVE
//   2. classify by the `entity_type` discriminator (exact sort-key prefix as
//      fallback); anything that is not ENTERPRISE or LICENSE is skipped, a
//      record with neither fails
//   3. build the Event and append it
//
// A failing record never aborts the batch: its identifier is reported so the
// host can redeliver only the failed subset. The processor holds no mutable
// state and can run concurrently across shards.
//
// ============================================================================

pub const SYSTEM_USER: &str = "system";

#[derive(Debug, thiserror::Error)]
pub enum ChangeRecordError {
    #[error("unknown operation '{0}'")]
    UnknownOperation(String),

    #[error("{operation} record carries no {image} image")]
    MissingImage {
        operation: EventName,
        image: &'static str,
    },

    #[error("record has neither sk nor pk to identify the entity")]
    MissingEntityKey,

    #[error("record has neither entity_type nor sk to classify the entity")]
    Unclassified,

    #[error("event append failed: {0}")]
    Append(#[from] AdminError),
}

/// What happened to a single record.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Appended(Event),
    Skipped { reason: String },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    pub processed: usize,
    pub skipped: usize,
    pub failed: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemFailure {
    pub item_identifier: String,
}

/// Partial-batch response understood by the delivering host.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub batch_item_failures: Vec<BatchItemFailure>,
}

impl BatchOutcome {
    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn to_response(&self) -> BatchResponse {
        BatchResponse {
            batch_item_failures: self
                .failed
                .iter()
                .map(|id| BatchItemFailure {
                    item_identifier: id.clone(),
                })
                .collect(),
        }
    }
}

/// `Err` when nothing identifies the kind of row, `Ok(None)` for rows that
/// are not audited.
fn classify(record: &ChangeRecord, image: &Image) -> Result<Option<EntityType>, ChangeRecordError> {
    let discriminator = extract_scalar(image, "entity_type");
    let sort_key = key_attribute(record, image, "sk");
    if discriminator.is_none() && sort_key.is_none() {
        return Err(ChangeRecordError::Unclassified);
    }

    let kind = discriminator
        .and_then(|t| EntityKind::parse(&t))
        .or_else(|| sort_key.and_then(|sk| EntityKind::from_sort_key(&sk)));

    Ok(match kind {
        Some(EntityKind::Enterprise) => Some(EntityType::Enterprise),
        Some(EntityKind::License) => Some(EntityType::License),
        Some(EntityKind::Outbox) | None => None,
    })
}

fn key_attribute(record: &ChangeRecord, image: &Image, name: &str) -> Option<String> {
    extract_scalar(image, name).or_else(|| extract_scalar(&record.change.keys, name))
}

fn acting_user(operation: EventName, image: &Image) -> String {
    let created_by = extract_scalar(image, "created_by");
    let updated_by = extract_scalar(image, "updated_by");
    let user = match operation {
        EventName::Insert => created_by.or(updated_by),
        EventName::Modify | EventName::Remove => updated_by.or(created_by),
    };
    user.filter(|u| !u.is_empty())
        .unwrap_or_else(|| SYSTEM_USER.to_string())
}

/// Build the normalized event for a record. `Ok(None)` means the record is
/// not about an audited entity and should be skipped.
pub fn to_event(record: &ChangeRecord) -> Result<Option<Event>, ChangeRecordError> {
    let operation: EventName = record
        .event_name
        .parse()
        .map_err(|_| ChangeRecordError::UnknownOperation(record.event_name.clone()))?;

    let (image, image_name) = match operation {
        EventName::Insert | EventName::Modify => (record.change.new_image.as_ref(), "new"),
        EventName::Remove => (record.change.old_image.as_ref(), "old"),
    };
    let image = image.ok_or(ChangeRecordError::MissingImage {
        operation,
        image: image_name,
    })?;

    let Some(entity_type) = classify(record, image)? else {
        return Ok(None);
    };

    let entity_id = key_attribute(record, image, "sk")
        .map(|sk| decompose_enterprise_key(&sk).to_string())
        .filter(|id| !id.is_empty())
        .or_else(|| key_attribute(record, image, "pk"))
        .ok_or(ChangeRecordError::MissingEntityKey)?;

    let event_date = record.change.approximate_creation_time.unwrap_or_else(Utc::now);

    let mut event = Event::new(operation, entity_type, entity_id, acting_user(operation, image))
        .at(event_date)
        .with_details(image_to_details(image));
    event.event_source = record.event_source.clone();
    event.event_source_id = record.event_source_id.clone();

    Ok(Some(event))
}

pub struct ChangeStreamProcessor {
    events: Arc<dyn EventRepository>,
    metrics: Option<Arc<Metrics>>,
}

impl ChangeStreamProcessor {
    pub fn new(events: Arc<dyn EventRepository>) -> Self {
        Self {
            events,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn process_record(
        &self,
        record: &ChangeRecord,
    ) -> Result<RecordOutcome, ChangeRecordError> {
        match to_event(record)? {
            Some(event) => {
                self.events.append(&event).await?;
                Ok(RecordOutcome::Appended(event))
            }
            None => Ok(RecordOutcome::Skipped {
                reason: "not an audited entity".to_string(),
            }),
        }
    }

    /// Process records in delivery order.
    pub async fn process_batch(&self, records: &[ChangeRecord]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        for record in records {
            let started = Instant::now();
            match self.process_record(record).await {
                Ok(RecordOutcome::Appended(event)) => {
                    outcome.processed += 1;
                    self.record_metric(event.event_type.as_str(), started, true);
                    tracing::debug!(
                        record_id = %record.event_id,
                        event_id = %event.id,
                        event_type = %event.event_type,
                        entity_id = %event.entity_id,
                        "📝 Change record normalized"
                    );
                }
                Ok(RecordOutcome::Skipped { reason }) => {
                    outcome.skipped += 1;
                    if let Some(ref m) = self.metrics {
                        m.record_change_skipped();
                    }
                    tracing::debug!(record_id = %record.event_id, reason = %reason, "Skipping change record");
                }
                Err(e) => {
                    self.record_metric(&record.event_name, started, false);
                    tracing::error!(
                        record_id = %record.event_id,
                        event_name = %record.event_name,
                        error = %e,
                        "❌ Failed to process change record"
                    );
                    outcome.failed.push(record.event_id.clone());
                }
            }
        }

        tracing::info!(
            total = records.len(),
            processed = outcome.processed,
            skipped = outcome.skipped,
            failed = outcome.failed.len(),
            "Change batch processed"
        );

        outcome
    }

    fn record_metric(&self, label: &str, started: Instant, success: bool) {
        if let Some(ref m) = self.metrics {
            m.record_change_record(label, started.elapsed().as_secs_f64(), success);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change_stream::record::AttributeValue;
    use crate::event_sourcing::{EventType, InMemoryEventStore, MockEventRepository};
    use chrono::TimeZone;

    fn image(pairs: &[(&str, &str)]) -> Image {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), AttributeValue::text(*v)))
            .collect()
    }

    fn enterprise_image(id: &str) -> Image {
        image(&[
            ("pk", id),
            ("sk", &format!("ENTERPRISE#{}", id)),
            ("entity_type", "ENTERPRISE"),
            ("name", "Acme"),
            ("created_by", "u-creator"),
            ("updated_by", "u-editor"),
        ])
    }

    fn insert(id: &str) -> ChangeRecord {
        ChangeRecord::new(format!("rec-{}", id), "INSERT")
            .with_source("scylla-cdc", "admin_ks.enterprises")
            .with_new_image(enterprise_image(id))
    }

    #[test]
    fn test_insert_uses_new_image_and_creator() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let event = to_event(&insert("acme").at(at)).unwrap().unwrap();
        assert_eq!(event.event_name, EventName::Insert);
        assert_eq!(event.event_type, EventType::EnterpriseCreated);
        assert_eq!(event.entity_id, "acme");
        assert_eq!(event.user_id, "u-creator");
        assert_eq!(event.event_date, at);
        assert_eq!(event.event_source.as_deref(), Some("scylla-cdc"));
        assert_eq!(event.event_source_id.as_deref(), Some("admin_ks.enterprises"));
        assert_eq!(
            event.details.unwrap()["name"],
            serde_json::json!({"S": "Acme"})
        );
    }

    #[test]
    fn test_modify_prefers_updated_by() {
        let record = ChangeRecord::new("r", "MODIFY")
            .with_old_image(enterprise_image("acme"))
            .with_new_image(enterprise_image("acme"));
        let event = to_event(&record).unwrap().unwrap();
        assert_eq!(event.event_type, EventType::EnterpriseUpdated);
        assert_eq!(event.user_id, "u-editor");
    }

    #[test]
    fn test_remove_reads_old_image() {
        let record = ChangeRecord::new("r", "REMOVE").with_old_image(enterprise_image("acme"));
        let event = to_event(&record).unwrap().unwrap();
        assert_eq!(event.event_type, EventType::EnterpriseDeleted);
        assert_eq!(event.entity_id, "acme");

        let missing = ChangeRecord::new("r", "REMOVE").with_new_image(enterprise_image("acme"));
        assert!(matches!(
            to_event(&missing),
            Err(ChangeRecordError::MissingImage { image: "old", .. })
        ));
    }

    #[test]
    fn test_user_falls_back_to_system() {
        let record = ChangeRecord::new("r", "INSERT")
            .with_new_image(image(&[("pk", "l-1"), ("sk", "LICENSE#l-1")]));
        let event = to_event(&record).unwrap().unwrap();
        assert_eq!(event.event_type, EventType::LicenseCreated);
        assert_eq!(event.user_id, SYSTEM_USER);
    }

    #[test]
    fn test_discriminator_wins_over_sort_key() {
        let record = ChangeRecord::new("r", "INSERT").with_new_image(image(&[
            ("pk", "x"),
            ("sk", "ENTERPRISE#x"),
            ("entity_type", "LICENSE"),
        ]));
        let event = to_event(&record).unwrap().unwrap();
        assert_eq!(event.entity_type, EntityType::License);
    }

    #[test]
    fn test_unknown_and_outbox_rows_are_skipped() {
        let unknown = ChangeRecord::new("r", "INSERT")
            .with_new_image(image(&[("pk", "x"), ("sk", "PROFILE#x")]));
        assert_eq!(to_event(&unknown).unwrap(), None);

        let substring_only = ChangeRecord::new("r", "INSERT")
            .with_new_image(image(&[("pk", "x"), ("sk", "MY_ENTERPRISE_NOTE#x")]));
        assert_eq!(to_event(&substring_only).unwrap(), None);

        let outbox = ChangeRecord::new("r", "INSERT").with_new_image(image(&[
            ("pk", "acme"),
            ("sk", "OUTBOX#e-1"),
            ("entity_type", "OUTBOX"),
        ]));
        assert_eq!(to_event(&outbox).unwrap(), None);
    }

    #[test]
    fn test_entity_id_from_keys_when_image_lacks_them() {
        let mut keys = Image::new();
        keys.insert("pk".into(), AttributeValue::text("acme"));
        keys.insert("sk".into(), AttributeValue::text("ENTERPRISE#acme"));
        let record = ChangeRecord::new("r", "INSERT")
            .with_keys(keys)
            .with_new_image(image(&[("entity_type", "ENTERPRISE")]));
        assert_eq!(to_event(&record).unwrap().unwrap().entity_id, "acme");

        let no_keys = ChangeRecord::new("r", "INSERT")
            .with_new_image(image(&[("entity_type", "ENTERPRISE")]));
        assert!(matches!(to_event(&no_keys), Err(ChangeRecordError::MissingEntityKey)));
    }

    #[test]
    fn test_keys_only_record_fails() {
        let record = ChangeRecord::new("r", "REMOVE").with_old_image(image(&[("pk", "acme")]));
        assert!(matches!(to_event(&record), Err(ChangeRecordError::Unclassified)));

        let mut keys = Image::new();
        keys.insert("sk".into(), AttributeValue::text("ENTERPRISE#acme"));
        let with_key = ChangeRecord::new("r", "REMOVE")
            .with_keys(keys)
            .with_old_image(image(&[("pk", "acme")]));
        assert_eq!(
            to_event(&with_key).unwrap().unwrap().event_type,
            EventType::EnterpriseDeleted
        );
    }

    #[test]
    fn test_unknown_operation_fails_record() {
        let record = ChangeRecord::new("r", "TRUNCATE").with_new_image(enterprise_image("a"));
        assert!(matches!(
            to_event(&record),
            Err(ChangeRecordError::UnknownOperation(_))
        ));
    }

    #[tokio::test]
    async fn test_one_bad_record_does_not_abort_batch() {
        let events = Arc::new(InMemoryEventStore::new());
        let processor = ChangeStreamProcessor::new(events.clone());

        let mut records: Vec<ChangeRecord> = (1..=5).map(|i| insert(&format!("e{}", i))).collect();
        records[2].change.new_image = None;

        let outcome = processor.process_batch(&records).await;
        assert_eq!(outcome.failed, vec!["rec-e3".to_string()]);
        assert_eq!(outcome.processed, 4);
        assert_eq!(outcome.skipped, 0);

        let mut ids: Vec<String> = events.all().await.into_iter().map(|e| e.entity_id).collect();
        ids.sort();
        assert_eq!(ids, vec!["e1", "e2", "e4", "e5"]);
    }

    #[tokio::test]
    async fn test_append_failure_reported_per_record() {
        let mut events = MockEventRepository::new();
        events
            .expect_append()
            .withf(|e| e.entity_id == "e2")
            .returning(|_| Err(AdminError::store(anyhow::anyhow!("write timeout"))));
        events.expect_append().returning(|_| Ok(()));

        let processor = ChangeStreamProcessor::new(Arc::new(events));
        let records = vec![insert("e1"), insert("e2"), insert("e3")];
        let outcome = processor.process_batch(&records).await;

        assert_eq!(outcome.processed, 2);
        assert_eq!(outcome.failed, vec!["rec-e2".to_string()]);
        let response = serde_json::to_value(outcome.to_response()).unwrap();
        assert_eq!(
            response,
            serde_json::json!({"batchItemFailures": [{"itemIdentifier": "rec-e2"}]})
        );
    }

    #[tokio::test]
    async fn test_skipped_records_are_not_failures() {
        let events = Arc::new(InMemoryEventStore::new());
        let processor = ChangeStreamProcessor::new(events.clone());
        let outbox = ChangeRecord::new("rec-o", "INSERT").with_new_image(image(&[
            ("pk", "acme"),
            ("sk", "OUTBOX#e-1"),
            ("entity_type", "OUTBOX"),
        ]));

        let outcome = processor.process_batch(&[outbox, insert("acme")]).await;
        assert!(outcome.is_complete_success());
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.processed, 1);
        assert_eq!(events.len().await, 1);
    }
}
