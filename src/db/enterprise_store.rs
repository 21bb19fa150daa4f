use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scylla::client::session::Session;
use scylla::response::query_result::QueryResult;
use scylla::statement::batch::Batch;
use scylla::value::{CqlTimestamp, CqlValue, Row};
use scylla::DeserializeRow;
use std::sync::Arc;

use crate::domain::enterprise::{Enterprise, EnterpriseChanges, EnterpriseSummary, SortOrder};
use crate::error::{AdminError, Result};
use crate::event_sourcing::Event;

use super::keys::{
    check_limit, compose_enterprise_key, compose_outbox_key, contract_end_index_key, EntityKind,
    ENTERPRISE_INDEX_PARTITION, OUTBOX_INDEX_PARTITION,
};
use super::outbox::OutboxEntry;

// ============================================================================
// Enterprise Store - repository for enterprise rows
// ============================================================================
//
// Row layout in `enterprises`:
//   pk = <id>, sk = ENTERPRISE#<id>, entity_type = ENTERPRISE
//   gsi1pk = TYPE#ENTERPRISE, gsi1sk = contract end date (or open-ended key)
//
// Mutations may carry an outbox event. It is written as
//   pk = <id>, sk = OUTBOX#<event id>, entity_type = OUTBOX
//   gsi1pk = TYPE#OUTBOX, gsi1sk = <event sort key>, payload = event JSON
// in the same single-partition batch, so the mutation and its audit intent
// commit together.
//
// Updates and deletes are lightweight transactions:
//   update  IF version = <expected>   (absent row reads back a null version)
//   delete  IF EXISTS
//
// The `enterprises_by_gsi1` view is partitioned by gsi1pk and clustered by
// the base key only, so listings read the whole index partition and order
// by (gsi1sk, pk) after the read.
//
// ============================================================================

#[async_trait]
pub trait EnterpriseRepository: Send + Sync {
    /// Unconditional insert/overwrite of the full record.
    async fn put(&self, enterprise: &Enterprise, outbox: Option<&Event>) -> Result<()>;

    /// Partial update guarded by the expected version. Returns the record as
    /// stored after the update.
    async fn update(
        &self,
        id: &str,
        changes: &EnterpriseChanges,
        expected_version: i64,
        outbox: Option<&Event>,
    ) -> Result<Enterprise>;

    async fn find_by_id(&self, id: &str) -> Result<Enterprise>;

    /// `Ok(true)` or `RecordNotFound`. Never `Ok(false)`.
    async fn exists(&self, id: &str) -> Result<bool>;

    async fn delete(&self, id: &str, outbox: Option<&Event>) -> Result<()>;

    async fn list_by_contract_end_date(
        &self,
        limit: Option<i32>,
        order: SortOrder,
    ) -> Result<Vec<EnterpriseSummary>>;

    /// Pending outbox entries, oldest first.
    async fn pending_outbox(&self, limit: i32) -> Result<Vec<OutboxEntry>>;

    async fn clear_outbox(&self, entity_id: &str, event_id: &str) -> Result<()>;
}

// ============================================================================
// Row mapping
// ============================================================================

const ENTERPRISE_COLUMNS: &str = "id, name, industry, size, status, subscription_tier,
    contact_email, contact_phone, address, website, max_licenses, used_licenses,
    contract_start_date, contract_end_date, monthly_revenue, created_date, updated_date,
    created_by, updated_by, group_name, version";

const SUMMARY_COLUMNS: &str = "gsi1sk, id, name, industry, website, status, subscription_tier,
    max_licenses, used_licenses, contract_end_date, monthly_revenue";

#[derive(Debug, DeserializeRow)]
struct EnterpriseRow {
    id: String,
    name: String,
    industry: Option<String>,
    size: Option<String>,
    status: String,
    subscription_tier: String,
    contact_email: String,
    contact_phone: Option<String>,
    address: Option<String>,
    website: Option<String>,
    max_licenses: i32,
    used_licenses: i32,
    contract_start_date: DateTime<Utc>,
    contract_end_date: Option<DateTime<Utc>>,
    monthly_revenue: f64,
    created_date: DateTime<Utc>,
    updated_date: DateTime<Utc>,
    created_by: String,
    updated_by: String,
    group_name: String,
    version: i64,
}

#[derive(Debug, DeserializeRow)]
struct SummaryRow {
    gsi1sk: Option<String>,
    id: String,
    name: String,
    industry: Option<String>,
    website: Option<String>,
    status: String,
    subscription_tier: String,
    max_licenses: i32,
    used_licenses: i32,
    contract_end_date: Option<DateTime<Utc>>,
    monthly_revenue: f64,
}

/// Stored text that no longer parses is a store-level problem, not caller input.
fn parse_column<T>(value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value.parse::<T>().map_err(AdminError::store)
}

fn parse_optional<T>(value: Option<String>) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value.as_deref().map(parse_column).transpose()
}

impl EnterpriseRow {
    fn into_enterprise(self) -> Result<Enterprise> {
        Ok(Enterprise {
            industry: parse_optional(self.industry)?,
            size: parse_optional(self.size)?,
            status: parse_column(&self.status)?,
            subscription_tier: parse_column(&self.subscription_tier)?,
            id: self.id,
            name: self.name,
            contact_email: self.contact_email,
            contact_phone: self.contact_phone,
            address: self.address,
            website: self.website,
            max_licenses: self.max_licenses,
            used_licenses: self.used_licenses,
            contract_start_date: self.contract_start_date,
            contract_end_date: self.contract_end_date,
            monthly_revenue: self.monthly_revenue,
            created_date: self.created_date,
            updated_date: self.updated_date,
            created_by: self.created_by,
            updated_by: self.updated_by,
            group_name: self.group_name,
            version: self.version,
        })
    }
}

/// Index rows as `(gsi1sk, pk, row)`, ordered by `(gsi1sk, pk)` in the
/// requested direction and cut to `limit`.
pub(crate) fn in_index_order<T>(
    mut rows: Vec<(String, String, T)>,
    order: SortOrder,
    limit: Option<usize>,
) -> Vec<T> {
    rows.sort_by(|(a_key, a_pk, _), (b_key, b_pk, _)| a_key.cmp(b_key).then_with(|| a_pk.cmp(b_pk)));
    if !order.is_ascending() {
        rows.reverse();
    }
    let take = limit.unwrap_or(rows.len());
    rows.into_iter().take(take).map(|(_, _, row)| row).collect()
}

impl SummaryRow {
    fn into_summary(self) -> Result<EnterpriseSummary> {
        Ok(EnterpriseSummary {
            industry: parse_optional(self.industry)?,
            status: parse_column(&self.status)?,
            subscription_tier: parse_column(&self.subscription_tier)?,
            id: self.id,
            name: self.name,
            website: self.website,
            max_licenses: self.max_licenses,
            used_licenses: self.used_licenses,
            contract_end_date: self.contract_end_date,
            monthly_revenue: self.monthly_revenue,
        })
    }
}

fn text(value: impl Into<String>) -> Option<CqlValue> {
    Some(CqlValue::Text(value.into()))
}

fn timestamp(value: &DateTime<Utc>) -> Option<CqlValue> {
    Some(CqlValue::Timestamp(CqlTimestamp(value.timestamp_millis())))
}

/// Column/value pairs for an UPDATE ... SET clause.
#[derive(Default)]
struct Assignments {
    columns: Vec<&'static str>,
    values: Vec<Option<CqlValue>>,
}

impl Assignments {
    fn set(&mut self, column: &'static str, value: Option<CqlValue>) {
        self.columns.push(column);
        self.values.push(value);
    }

    fn set_if<T>(&mut self, column: &'static str, value: Option<T>, to_cql: impl FnOnce(T) -> CqlValue) {
        if let Some(v) = value {
            self.set(column, Some(to_cql(v)));
        }
    }

    fn clause(&self) -> String {
        self.columns
            .iter()
            .map(|c| format!("{} = ?", c))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn update_assignments(changes: &EnterpriseChanges, expected_version: i64) -> Assignments {
    let mut a = Assignments::default();
    a.set_if("name", changes.name.clone(), CqlValue::Text);
    a.set_if("group_name", changes.group_name.clone(), CqlValue::Text);
    a.set_if("industry", changes.industry, |v| CqlValue::Text(v.as_str().into()));
    a.set_if("size", changes.size, |v| CqlValue::Text(v.as_str().into()));
    a.set_if("status", changes.status, |v| CqlValue::Text(v.as_str().into()));
    a.set_if("subscription_tier", changes.subscription_tier, |v| {
        CqlValue::Text(v.as_str().into())
    });
    a.set_if("contact_email", changes.contact_email.clone(), CqlValue::Text);
    a.set_if("contact_phone", changes.contact_phone.clone(), CqlValue::Text);
    a.set_if("address", changes.address.clone(), CqlValue::Text);
    a.set_if("website", changes.website.clone(), CqlValue::Text);
    a.set_if("max_licenses", changes.max_licenses, CqlValue::Int);
    a.set_if("used_licenses", changes.used_licenses, CqlValue::Int);
    a.set_if("contract_start_date", changes.contract_start_date, |d| {
        CqlValue::Timestamp(CqlTimestamp(d.timestamp_millis()))
    });
    if let Some(end) = changes.contract_end_date {
        a.set("contract_end_date", timestamp(&end));
        a.set("gsi1sk", text(contract_end_index_key(Some(&end))));
    }
    a.set_if("monthly_revenue", changes.monthly_revenue, CqlValue::Double);
    a.set("updated_by", text(changes.updated_by.clone()));
    a.set("updated_date", timestamp(&changes.updated_date));
    a.set("version", Some(CqlValue::BigInt(expected_version + 1)));
    a
}

const INSERT_ENTERPRISE: &str = "INSERT INTO enterprises (
        pk, sk, entity_type, gsi1pk, gsi1sk,
        id, name, industry, size, status, subscription_tier,
        contact_email, contact_phone, address, website, max_licenses, used_licenses,
        contract_start_date, contract_end_date, monthly_revenue, created_date, updated_date,
        created_by, updated_by, group_name, version
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

const INSERT_OUTBOX: &str = "INSERT INTO enterprises (
        pk, sk, entity_type, gsi1pk, gsi1sk, payload
    ) VALUES (?, ?, ?, ?, ?, ?)";

fn enterprise_values(e: &Enterprise) -> Vec<Option<CqlValue>> {
    vec![
        text(e.id.clone()),
        text(compose_enterprise_key(&e.id)),
        text(EntityKind::Enterprise.as_str()),
        text(ENTERPRISE_INDEX_PARTITION),
        text(contract_end_index_key(e.contract_end_date.as_ref())),
        text(e.id.clone()),
        text(e.name.clone()),
        e.industry.and_then(|v| text(v.as_str())),
        e.size.and_then(|v| text(v.as_str())),
        text(e.status.as_str()),
        text(e.subscription_tier.as_str()),
        text(e.contact_email.clone()),
        e.contact_phone.clone().and_then(text),
        e.address.clone().and_then(text),
        e.website.clone().and_then(text),
        Some(CqlValue::Int(e.max_licenses)),
        Some(CqlValue::Int(e.used_licenses)),
        timestamp(&e.contract_start_date),
        e.contract_end_date.as_ref().and_then(timestamp),
        Some(CqlValue::Double(e.monthly_revenue)),
        timestamp(&e.created_date),
        timestamp(&e.updated_date),
        text(e.created_by.clone()),
        text(e.updated_by.clone()),
        text(e.group_name.clone()),
        Some(CqlValue::BigInt(e.version)),
    ]
}

fn outbox_values(entity_id: &str, event: &Event) -> Result<(String, String, String, String, String, String)> {
    let payload = serde_json::to_string(event).map_err(AdminError::store)?;
    Ok((
        entity_id.to_string(),
        compose_outbox_key(&event.id),
        EntityKind::Outbox.as_str().to_string(),
        OUTBOX_INDEX_PARTITION.to_string(),
        event.sort_key(),
        payload,
    ))
}

/// Outcome of a lightweight transaction: `[applied]` plus the current
/// `version` the server reported when the condition failed.
#[derive(Debug, PartialEq)]
struct LwtOutcome {
    applied: bool,
    current_version: Option<i64>,
}

impl LwtOutcome {
    fn from_columns(columns: &[Option<CqlValue>], version_index: Option<usize>) -> Self {
        let applied = matches!(columns.first(), Some(Some(CqlValue::Boolean(true))));
        let current_version = version_index
            .and_then(|i| columns.get(i))
            .and_then(|v| match v {
                Some(CqlValue::BigInt(n)) => Some(*n),
                _ => None,
            });
        Self {
            applied,
            current_version,
        }
    }

    /// A rejected write is a version conflict when the row reported a
    /// version, otherwise the row is absent. `expected_version` is `None`
    /// for `IF EXISTS` writes.
    fn into_result(self, id: &str, expected_version: Option<i64>) -> Result<()> {
        if self.applied {
            return Ok(());
        }
        match (expected_version, self.current_version) {
            (Some(expected), Some(actual)) => Err(AdminError::ConcurrencyConflict {
                id: id.to_string(),
                expected,
                actual: Some(actual),
            }),
            _ => Err(AdminError::not_found(compose_enterprise_key(id))),
        }
    }
}

fn lwt_outcome(result: QueryResult) -> Result<LwtOutcome> {
    let rows = result.into_rows_result().map_err(AdminError::store)?;
    let version_index = rows
        .column_specs()
        .iter()
        .position(|spec| spec.name() == "version");

    match rows.maybe_first_row::<Row>().map_err(AdminError::store)? {
        Some(row) => Ok(LwtOutcome::from_columns(&row.columns, version_index)),
        None => Err(AdminError::store(anyhow::anyhow!(
            "conditional write returned no [applied] row"
        ))),
    }
}

// ============================================================================
// ScyllaDB implementation
// ============================================================================

pub struct ScyllaEnterpriseStore {
    session: Arc<Session>,
}

impl ScyllaEnterpriseStore {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl EnterpriseRepository for ScyllaEnterpriseStore {
    async fn put(&self, enterprise: &Enterprise, outbox: Option<&Event>) -> Result<()> {
        let values = enterprise_values(enterprise);

        match outbox {
            Some(event) => {
                let mut batch = Batch::default();
                batch.append_statement(INSERT_ENTERPRISE);
                batch.append_statement(INSERT_OUTBOX);
                let outbox_row = outbox_values(&enterprise.id, event)?;
                self.session
                    .batch(&batch, (values, outbox_row))
                    .await
                    .map_err(AdminError::store)?;
            }
            None => {
                self.session
                    .query_unpaged(INSERT_ENTERPRISE, values)
                    .await
                    .map_err(AdminError::store)?;
            }
        }

        tracing::info!(
            enterprise_id = %enterprise.id,
            version = enterprise.version,
            with_outbox = outbox.is_some(),
            "✅ Stored enterprise"
        );
        Ok(())
    }

    async fn update(
        &self,
        id: &str,
        changes: &EnterpriseChanges,
        expected_version: i64,
        outbox: Option<&Event>,
    ) -> Result<Enterprise> {
        let assignments = update_assignments(changes, expected_version);
        let statement = format!(
            "UPDATE enterprises SET {} WHERE pk = ? AND sk = ? IF version = ?",
            assignments.clause()
        );

        let mut values = assignments.values;
        values.push(text(id));
        values.push(text(compose_enterprise_key(id)));
        values.push(Some(CqlValue::BigInt(expected_version)));

        let result = match outbox {
            Some(event) => {
                let mut batch = Batch::default();
                batch.append_statement(statement.as_str());
                batch.append_statement(INSERT_OUTBOX);
                let outbox_row = outbox_values(id, event)?;
                self.session.batch(&batch, (values, outbox_row)).await
            }
            None => self.session.query_unpaged(statement, values).await,
        }
        .map_err(AdminError::store)?;

        lwt_outcome(result)?.into_result(id, Some(expected_version))?;

        tracing::info!(
            enterprise_id = %id,
            version = expected_version + 1,
            "✅ Updated enterprise"
        );

        self.find_by_id(id).await
    }

    async fn find_by_id(&self, id: &str) -> Result<Enterprise> {
        let result = self
            .session
            .query_unpaged(
                format!(
                    "SELECT {} FROM enterprises WHERE pk = ? AND sk = ?",
                    ENTERPRISE_COLUMNS
                ),
                (id, compose_enterprise_key(id)),
            )
            .await
            .map_err(AdminError::store)?;

        let rows = result.into_rows_result().map_err(AdminError::store)?;
        match rows
            .maybe_first_row::<EnterpriseRow>()
            .map_err(AdminError::store)?
        {
            Some(row) => row.into_enterprise(),
            None => Err(AdminError::not_found(compose_enterprise_key(id))),
        }
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        let result = self
            .session
            .query_unpaged(
                "SELECT sk FROM enterprises WHERE pk = ? AND sk = ?",
                (id, compose_enterprise_key(id)),
            )
            .await
            .map_err(AdminError::store)?;

        let rows = result.into_rows_result().map_err(AdminError::store)?;
        match rows.maybe_first_row::<(String,)>().map_err(AdminError::store)? {
            Some(_) => Ok(true),
            None => Err(AdminError::not_found(compose_enterprise_key(id))),
        }
    }

    async fn delete(&self, id: &str, outbox: Option<&Event>) -> Result<()> {
        const DELETE: &str = "DELETE FROM enterprises WHERE pk = ? AND sk = ? IF EXISTS";
        let key = (id.to_string(), compose_enterprise_key(id));

        let result = match outbox {
            Some(event) => {
                let mut batch = Batch::default();
                batch.append_statement(DELETE);
                batch.append_statement(INSERT_OUTBOX);
                let outbox_row = outbox_values(id, event)?;
                self.session.batch(&batch, (key, outbox_row)).await
            }
            None => self.session.query_unpaged(DELETE, key).await,
        }
        .map_err(AdminError::store)?;

        lwt_outcome(result)?.into_result(id, None)?;

        tracing::info!(enterprise_id = %id, "🗑️ Deleted enterprise");
        Ok(())
    }

    async fn list_by_contract_end_date(
        &self,
        limit: Option<i32>,
        order: SortOrder,
    ) -> Result<Vec<EnterpriseSummary>> {
        let limit = check_limit(limit)?;

        let result = self
            .session
            .query_unpaged(
                format!(
                    "SELECT {} FROM enterprises_by_gsi1 WHERE gsi1pk = ?",
                    SUMMARY_COLUMNS
                ),
                (ENTERPRISE_INDEX_PARTITION,),
            )
            .await
            .map_err(AdminError::store)?;

        let rows = result.into_rows_result().map_err(AdminError::store)?;
        let mut index = Vec::new();
        for row in rows.rows::<SummaryRow>().map_err(AdminError::store)? {
            let row = row.map_err(AdminError::store)?;
            index.push((row.gsi1sk.clone().unwrap_or_default(), row.id.clone(), row));
        }

        let summaries = in_index_order(index, order, limit.map(|n| n as usize))
            .into_iter()
            .map(SummaryRow::into_summary)
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(count = summaries.len(), ?order, "Listed enterprises by contract end date");
        Ok(summaries)
    }

    async fn pending_outbox(&self, limit: i32) -> Result<Vec<OutboxEntry>> {
        let result = self
            .session
            .query_unpaged(
                "SELECT gsi1sk, pk, payload FROM enterprises_by_gsi1 WHERE gsi1pk = ?",
                (OUTBOX_INDEX_PARTITION,),
            )
            .await
            .map_err(AdminError::store)?;

        let rows = result.into_rows_result().map_err(AdminError::store)?;
        let mut index = Vec::new();
        for row in rows
            .rows::<(Option<String>, String, Option<String>)>()
            .map_err(AdminError::store)?
        {
            let (sort_key, entity_id, payload) = row.map_err(AdminError::store)?;
            index.push((sort_key.unwrap_or_default(), entity_id.clone(), (entity_id, payload)));
        }

        let take = usize::try_from(limit).unwrap_or(0);
        let mut entries = Vec::new();
        for (entity_id, payload) in in_index_order(index, SortOrder::Ascending, Some(take)) {
            let Some(payload) = payload else {
                tracing::warn!(entity_id = %entity_id, "Outbox row without payload, skipping");
                continue;
            };
            let event: Event = serde_json::from_str(&payload).map_err(AdminError::store)?;
            entries.push(OutboxEntry { entity_id, event });
        }
        Ok(entries)
    }

    async fn clear_outbox(&self, entity_id: &str, event_id: &str) -> Result<()> {
        self.session
            .query_unpaged(
                "DELETE FROM enterprises WHERE pk = ? AND sk = ?",
                (entity_id, compose_outbox_key(event_id)),
            )
            .await
            .map_err(AdminError::store)?;
        Ok(())
    }
}
