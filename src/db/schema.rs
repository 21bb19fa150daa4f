use anyhow::Result;
use scylla::client::session::Session;

// ============================================================================
// Schema - keyspace, tables and views used by the admin backend
// ============================================================================
//
// enterprises               admin table: enterprise rows and their outbox rows
//                           share a partition (pk = entity id)
// enterprises_by_gsi1       secondary index partitioned by gsi1pk, used for
//                           contract-end listing and outbox draining. A view
//                           key may hold one non-key base column, so gsi1sk
//                           is a regular column here and ordering by it
//                           happens in the store
// events                    append-only audit log, single partition, newest first
// dead_letter_queue         change records that kept failing after redelivery
//
// CDC is enabled on `enterprises` with pre- and post-images so the change
// stream carries both item images.
//
// ============================================================================

pub const ENTERPRISES_TABLE: &str = "enterprises";
pub const ENTERPRISES_INDEX_VIEW: &str = "enterprises_by_gsi1";
pub const EVENTS_TABLE: &str = "events";
pub const DLQ_TABLE: &str = "dead_letter_queue";

const CREATE_ENTERPRISES: &str = "CREATE TABLE IF NOT EXISTS enterprises (
        pk text,
        sk text,
        entity_type text,
        gsi1pk text,
        gsi1sk text,
        id text,
        name text,
        industry text,
        size text,
        status text,
        subscription_tier text,
        contact_email text,
        contact_phone text,
        address text,
        website text,
        max_licenses int,
        used_licenses int,
        contract_start_date timestamp,
        contract_end_date timestamp,
        monthly_revenue double,
        created_date timestamp,
        updated_date timestamp,
        created_by text,
        updated_by text,
        group_name text,
        version bigint,
        payload text,
        PRIMARY KEY (pk, sk)
    ) WITH cdc = {'enabled': true, 'preimage': 'full', 'postimage': true}";

/// Regular and key columns of `enterprises`, in table order. Change-stream
/// images are built from these names.
pub const ENTERPRISE_COLUMNS: [&str; 27] = [
    "pk",
    "sk",
    "entity_type",
    "gsi1pk",
    "gsi1sk",
    "id",
    "name",
    "industry",
    "size",
    "status",
    "subscription_tier",
    "contact_email",
    "contact_phone",
    "address",
    "website",
    "max_licenses",
    "used_licenses",
    "contract_start_date",
    "contract_end_date",
    "monthly_revenue",
    "created_date",
    "updated_date",
    "created_by",
    "updated_by",
    "group_name",
    "version",
    "payload",
];

const CREATE_ENTERPRISES_INDEX: &str = "CREATE MATERIALIZED VIEW IF NOT EXISTS enterprises_by_gsi1 AS
        SELECT * FROM enterprises
        WHERE gsi1pk IS NOT NULL AND pk IS NOT NULL AND sk IS NOT NULL
        PRIMARY KEY ((gsi1pk), pk, sk)
        WITH CLUSTERING ORDER BY (pk ASC, sk ASC)";

const CREATE_EVENTS: &str = "CREATE TABLE IF NOT EXISTS events (
        pk text,
        sk text,
        id text,
        event_date timestamp,
        event_name text,
        event_type text,
        event_source text,
        event_source_id text,
        entity_type text,
        entity_id text,
        user_id text,
        details text,
        PRIMARY KEY (pk, sk)
    ) WITH CLUSTERING ORDER BY (sk DESC)";

const CREATE_DLQ: &str = "CREATE TABLE IF NOT EXISTS dead_letter_queue (
        id text PRIMARY KEY,
        event_name text,
        payload text,
        error_message text,
        failure_count int,
        first_failed_at timestamp,
        last_failed_at timestamp
    )";

pub fn create_keyspace_statement(keyspace: &str, replication_factor: u32) -> String {
    format!(
        "CREATE KEYSPACE IF NOT EXISTS {} WITH REPLICATION = \
         {{'class': 'SimpleStrategy', 'replication_factor': {}}}",
        keyspace, replication_factor
    )
}

pub fn table_statements() -> [&'static str; 4] {
    [CREATE_ENTERPRISES, CREATE_ENTERPRISES_INDEX, CREATE_EVENTS, CREATE_DLQ]
}

/// Create the keyspace and every table, then switch the session to it.
pub async fn ensure_schema(session: &Session, keyspace: &str, replication_factor: u32) -> Result<()> {
    session
        .query_unpaged(create_keyspace_statement(keyspace, replication_factor), &[])
        .await?;
    session.use_keyspace(keyspace, false).await?;

    for statement in table_statements() {
        session.query_unpaged(statement, &[]).await?;
    }

    tracing::info!(keyspace = %keyspace, "✅ Schema ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyspace_statement() {
        let cql = create_keyspace_statement("admin_ks", 3);
        assert!(cql.contains("CREATE KEYSPACE IF NOT EXISTS admin_ks"));
        assert!(cql.contains("'replication_factor': 3"));
    }

    #[test]
    fn test_enterprises_table_has_cdc_images() {
        assert!(CREATE_ENTERPRISES.contains("'preimage': 'full'"));
        assert!(CREATE_ENTERPRISES.contains("'postimage': true"));
        assert!(CREATE_ENTERPRISES.contains("entity_type text"));
        assert!(CREATE_ENTERPRISES.contains("version bigint"));
    }

    #[test]
    fn test_column_list_matches_table() {
        for column in ENTERPRISE_COLUMNS {
            assert!(
                CREATE_ENTERPRISES.contains(&format!("        {} ", column)),
                "column {} missing from DDL",
                column
            );
        }
    }

    #[test]
    fn test_events_cluster_newest_first() {
        assert!(CREATE_EVENTS.contains("CLUSTERING ORDER BY (sk DESC)"));
    }

    fn primary_key_columns(ddl: &str) -> Vec<String> {
        let start = ddl.find("PRIMARY KEY").unwrap() + "PRIMARY KEY".len();
        let mut depth = 0;
        let mut end = start;
        for (i, c) in ddl[start..].char_indices() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        end = start + i;
                        break;
                    }
                }
                _ => {}
            }
        }
        ddl[start..end]
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_view_key_has_at_most_one_regular_column() {
        let base_key = primary_key_columns(CREATE_ENTERPRISES);
        assert_eq!(base_key, vec!["pk", "sk"]);

        let view_key = primary_key_columns(CREATE_ENTERPRISES_INDEX);
        for column in &base_key {
            assert!(view_key.contains(column), "view key lacks base key column {}", column);
        }
        let regular: Vec<_> = view_key.iter().filter(|c| !base_key.contains(c)).collect();
        assert_eq!(regular, vec!["gsi1pk"]);

        for column in &view_key {
            assert!(
                CREATE_ENTERPRISES_INDEX.contains(&format!("{} IS NOT NULL", column)),
                "view key column {} needs IS NOT NULL",
                column
            );
        }
    }
}
