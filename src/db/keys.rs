use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{AdminError, Result};

// ============================================================================
// Key Codec
// ============================================================================
//
// Composite keys used in the admin and events tables.
//
//   enterprise row   pk = <id>            sk = ENTERPRISE#<id>
//   outbox row       pk = <entity id>     sk = OUTBOX#<event id>
//   event row        pk = EVENTS          sk = <date>#<ENTITY_TYPE>#<event id>
//
// Dates inside keys are fixed-width RFC 3339 UTC with milliseconds so that
// lexicographic order on the key equals chronological order.
//
// ============================================================================

pub const KEY_SEPARATOR: char = '#';

pub const ENTERPRISE_PREFIX: &str = "ENTERPRISE";
pub const LICENSE_PREFIX: &str = "LICENSE";
pub const EVENT_PREFIX: &str = "EVENT";
pub const OUTBOX_PREFIX: &str = "OUTBOX";

/// Index partition holding every enterprise, ordered by contract end date.
pub const ENTERPRISE_INDEX_PARTITION: &str = "TYPE#ENTERPRISE";
/// Index partition holding pending outbox rows, ordered by creation time.
pub const OUTBOX_INDEX_PARTITION: &str = "TYPE#OUTBOX";
/// Single partition of the events table.
pub const EVENTS_PARTITION: &str = "EVENTS";

/// Index sort key for enterprises without a contract end date.
pub const OPEN_ENDED_CONTRACT_KEY: &str = "9999-12-31T23:59:59.999Z";

pub const MIN_PAGE_LIMIT: i32 = 1;
pub const MAX_PAGE_LIMIT: i32 = 100;

/// Discriminator stored in the `entity_type` column of every admin row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Enterprise,
    License,
    Outbox,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Enterprise => ENTERPRISE_PREFIX,
            EntityKind::License => LICENSE_PREFIX,
            EntityKind::Outbox => OUTBOX_PREFIX,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            ENTERPRISE_PREFIX => Some(EntityKind::Enterprise),
            LICENSE_PREFIX => Some(EntityKind::License),
            OUTBOX_PREFIX => Some(EntityKind::Outbox),
            _ => None,
        }
    }

    /// Classify a sort key by its exact leading segment.
    pub fn from_sort_key(sort_key: &str) -> Option<Self> {
        let (prefix, rest) = sort_key.split_once(KEY_SEPARATOR)?;
        if rest.is_empty() {
            return None;
        }
        Self::parse(prefix)
    }
}

pub fn format_key_timestamp(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_key_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| AdminError::invalid(format!("malformed key timestamp '{}': {}", value, e)))
}

fn compose(prefix: &str, id: &str) -> String {
    format!("{}{}{}", prefix, KEY_SEPARATOR, id)
}

/// Everything after the last separator.
fn last_segment(key: &str) -> &str {
    key.rsplit(KEY_SEPARATOR).next().unwrap_or(key)
}

pub fn compose_enterprise_key(id: &str) -> String {
    compose(ENTERPRISE_PREFIX, id)
}

pub fn decompose_enterprise_key(key: &str) -> &str {
    last_segment(key)
}

pub fn compose_license_key(id: &str) -> String {
    compose(LICENSE_PREFIX, id)
}

pub fn compose_event_key(id: &str) -> String {
    compose(EVENT_PREFIX, id)
}

pub fn decompose_event_key(key: &str) -> &str {
    last_segment(key)
}

pub fn compose_outbox_key(event_id: &str) -> String {
    compose(OUTBOX_PREFIX, event_id)
}

pub fn decompose_outbox_key(key: &str) -> &str {
    last_segment(key)
}

pub fn compose_event_sort_key(
    event_date: &DateTime<Utc>,
    entity_type: &str,
    event_id: &str,
) -> String {
    format!(
        "{}{sep}{}{sep}{}",
        format_key_timestamp(event_date),
        entity_type,
        event_id,
        sep = KEY_SEPARATOR
    )
}

/// Split an event sort key back into (date, entity type, event id).
pub fn decompose_event_sort_key(key: &str) -> Result<(DateTime<Utc>, &str, &str)> {
    let mut parts = key.splitn(3, KEY_SEPARATOR);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(date), Some(entity), Some(id)) if !entity.is_empty() && !id.is_empty() => {
            Ok((parse_key_timestamp(date)?, entity, id))
        }
        _ => Err(AdminError::invalid(format!("malformed event sort key '{}'", key))),
    }
}

pub fn contract_end_index_key(contract_end: Option<&DateTime<Utc>>) -> String {
    match contract_end {
        Some(date) => format_key_timestamp(date),
        None => OPEN_ENDED_CONTRACT_KEY.to_string(),
    }
}

/// Entity ids end up inside composite keys, so the separator is reserved.
pub fn validate_entity_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(AdminError::invalid("id cannot be empty"));
    }
    if id.contains(KEY_SEPARATOR) {
        return Err(AdminError::invalid(format!(
            "id '{}' cannot contain '{}'",
            id, KEY_SEPARATOR
        )));
    }
    Ok(())
}

/// Page limits must fall in [1, 100]; `None` means unbounded.
pub fn check_limit(limit: Option<i32>) -> Result<Option<i32>> {
    match limit {
        Some(n) if !(MIN_PAGE_LIMIT..=MAX_PAGE_LIMIT).contains(&n) => Err(AdminError::invalid(
            format!(
                "limit must be between {} and {}, got {}",
                MIN_PAGE_LIMIT, MAX_PAGE_LIMIT, n
            ),
        )),
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_enterprise_key_round_trip() {
        let key = compose_enterprise_key("acme");
        assert_eq!(key, "ENTERPRISE#acme");
        assert_eq!(decompose_enterprise_key(&key), "acme");
    }

    #[test]
    fn test_decompose_takes_last_segment() {
        assert_eq!(decompose_enterprise_key("ENTERPRISE#a#b"), "b");
        assert_eq!(decompose_enterprise_key("plain"), "plain");
        assert_eq!(decompose_event_key("EVENT#e-1"), "e-1");
    }

    #[test]
    fn test_event_sort_key_is_fixed_width() {
        let date = Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap();
        let key = compose_event_sort_key(&date, "ENTERPRISE", "e-1");
        assert_eq!(key, "2024-01-15T09:00:00.000Z#ENTERPRISE#e-1");

        let (parsed, entity, id) = decompose_event_sort_key(&key).unwrap();
        assert_eq!(parsed, date);
        assert_eq!(entity, "ENTERPRISE");
        assert_eq!(id, "e-1");
    }

    #[test]
    fn test_event_sort_keys_order_chronologically() {
        let earlier = Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap();
        let later = earlier + chrono::Duration::milliseconds(5);
        let a = compose_event_sort_key(&earlier, "LICENSE", "z");
        let b = compose_event_sort_key(&later, "ENTERPRISE", "a");
        assert!(a < b);
    }

    #[test]
    fn test_malformed_event_sort_key_rejected() {
        assert!(decompose_event_sort_key("2024-01-15T09:00:00.000Z").is_err());
        assert!(decompose_event_sort_key("not-a-date#ENTERPRISE#x").is_err());
    }

    #[test]
    fn test_entity_kind_from_sort_key_is_exact() {
        assert_eq!(EntityKind::from_sort_key("ENTERPRISE#acme"), Some(EntityKind::Enterprise));
        assert_eq!(EntityKind::from_sort_key("LICENSE#l-1"), Some(EntityKind::License));
        assert_eq!(EntityKind::from_sort_key("OUTBOX#e-1"), Some(EntityKind::Outbox));
        assert_eq!(EntityKind::from_sort_key("SUBENTERPRISE#acme"), None);
        assert_eq!(EntityKind::from_sort_key("ENTERPRISE#"), None);
        assert_eq!(EntityKind::from_sort_key("ENTERPRISE"), None);
    }

    #[test]
    fn test_missing_contract_end_sorts_last() {
        let end = Utc.with_ymd_and_hms(2030, 6, 30, 0, 0, 0).unwrap();
        let dated = contract_end_index_key(Some(&end));
        let open = contract_end_index_key(None);
        assert_eq!(dated, "2030-06-30T00:00:00.000Z");
        assert!(dated < open);
    }

    #[test]
    fn test_limit_bounds() {
        assert_eq!(check_limit(None).unwrap(), None);
        assert_eq!(check_limit(Some(1)).unwrap(), Some(1));
        assert_eq!(check_limit(Some(100)).unwrap(), Some(100));
        for bad in [-1, 0, 101] {
            assert!(matches!(check_limit(Some(bad)), Err(AdminError::InvalidArgument(_))));
        }
    }

    #[test]
    fn test_entity_id_validation() {
        assert!(validate_entity_id("acme").is_ok());
        assert!(validate_entity_id("").is_err());
        assert!(validate_entity_id("a#b").is_err());
    }
}
