// ============================================================================
// Event Sourcing Core
// ============================================================================
//
// The audit event record and its closed vocabularies (event name, entity
// type, event type).
//
// ============================================================================

pub mod event;

pub use event::{
    details_from, EntityType, Event, EventDetails, EventName, EventSummary, EventType,
};
