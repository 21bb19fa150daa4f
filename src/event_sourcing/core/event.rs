use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::db::keys::compose_event_sort_key;
use crate::error::AdminError;

// ============================================================================
// Audit Event - immutable record of a change to an entity
// ============================================================================
//
// Events are produced two ways:
// - by the enterprise command handler (through the outbox), and
// - by the change-stream processor from raw store change notifications.
//
// Both paths land in the same append-only log.
//
// ============================================================================

pub type EventDetails = Map<String, Value>;

/// Kind of change that produced the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventName {
    Insert,
    Modify,
    Remove,
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::Insert => "INSERT",
            EventName::Modify => "MODIFY",
            EventName::Remove => "REMOVE",
        }
    }
}

impl FromStr for EventName {
    type Err = AdminError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INSERT" => Ok(EventName::Insert),
            "MODIFY" => Ok(EventName::Modify),
            "REMOVE" => Ok(EventName::Remove),
            other => Err(AdminError::invalid(format!("unknown event name '{}'", other))),
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of entity an event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Enterprise,
    License,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Enterprise => "ENTERPRISE",
            EntityType::License => "LICENSE",
        }
    }
}

impl FromStr for EntityType {
    type Err = AdminError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ENTERPRISE" => Ok(EntityType::Enterprise),
            "LICENSE" => Ok(EntityType::License),
            other => Err(AdminError::invalid(format!("unknown entity type '{}'", other))),
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    EnterpriseCreated,
    EnterpriseUpdated,
    EnterpriseDeleted,
    LicenseCreated,
    LicenseUpdated,
    LicenseDeleted,
}

impl EventType {
    /// `{ENTITY}_{CREATED|UPDATED|DELETED}` for a change of the given kind.
    pub fn for_change(entity_type: EntityType, event_name: EventName) -> Self {
        match (entity_type, event_name) {
            (EntityType::Enterprise, EventName::Insert) => EventType::EnterpriseCreated,
            (EntityType::Enterprise, EventName::Modify) => EventType::EnterpriseUpdated,
            (EntityType::Enterprise, EventName::Remove) => EventType::EnterpriseDeleted,
            (EntityType::License, EventName::Insert) => EventType::LicenseCreated,
            (EntityType::License, EventName::Modify) => EventType::LicenseUpdated,
            (EntityType::License, EventName::Remove) => EventType::LicenseDeleted,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::EnterpriseCreated => "ENTERPRISE_CREATED",
            EventType::EnterpriseUpdated => "ENTERPRISE_UPDATED",
            EventType::EnterpriseDeleted => "ENTERPRISE_DELETED",
            EventType::LicenseCreated => "LICENSE_CREATED",
            EventType::LicenseUpdated => "LICENSE_UPDATED",
            EventType::LicenseDeleted => "LICENSE_DELETED",
        }
    }
}

impl FromStr for EventType {
    type Err = AdminError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ENTERPRISE_CREATED" => Ok(EventType::EnterpriseCreated),
            "ENTERPRISE_UPDATED" => Ok(EventType::EnterpriseUpdated),
            "ENTERPRISE_DELETED" => Ok(EventType::EnterpriseDeleted),
            "LICENSE_CREATED" => Ok(EventType::LicenseCreated),
            "LICENSE_UPDATED" => Ok(EventType::LicenseUpdated),
            "LICENSE_DELETED" => Ok(EventType::LicenseDeleted),
            other => Err(AdminError::invalid(format!("unknown event type '{}'", other))),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub event_date: DateTime<Utc>,
    pub event_name: EventName,
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_source_id: Option<String>,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<EventDetails>,
}

impl Event {
    pub fn new(
        event_name: EventName,
        entity_type: EntityType,
        entity_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_date: Utc::now().trunc_subsecs(3),
            event_name,
            event_type: EventType::for_change(entity_type, event_name),
            event_source: None,
            event_source_id: None,
            entity_type,
            entity_id: entity_id.into(),
            user_id: user_id.into(),
            details: None,
        }
    }

    pub fn at(mut self, event_date: DateTime<Utc>) -> Self {
        self.event_date = event_date.trunc_subsecs(3);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>, source_id: impl Into<String>) -> Self {
        self.event_source = Some(source.into());
        self.event_source_id = Some(source_id.into());
        self
    }

    pub fn with_details(mut self, details: EventDetails) -> Self {
        self.details = Some(details);
        self
    }

    /// Position of this event inside the events partition.
    pub fn sort_key(&self) -> String {
        compose_event_sort_key(&self.event_date, self.entity_type.as_str(), &self.id)
    }

    pub fn summary(&self) -> EventSummary {
        EventSummary {
            id: self.id.clone(),
            event_date: self.event_date,
            event_type: self.event_type,
        }
    }
}

/// Projection returned by event listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSummary {
    pub id: String,
    pub event_date: DateTime<Utc>,
    pub event_type: EventType,
}

/// Serialize a value into an event details mapping.
/// Values that don't serialize to a JSON object are wrapped under `value`.
pub fn details_from<T: Serialize>(value: &T) -> anyhow::Result<EventDetails> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            Ok(map)
        }
    }
}
