// ============================================================================
// Event Store - persistence for the audit log
// ============================================================================

pub mod event_store;
pub mod memory;

pub use event_store::{EventRepository, ScyllaEventStore};
#[cfg(test)]
pub use event_store::MockEventRepository;
pub use memory::InMemoryEventStore;
