// ============================================================================
// Persistence - admin table access
// ============================================================================
//
// - keys:             composite key codec and paging limits
// - schema:           keyspace/table/view DDL
// - enterprise_store: EnterpriseRepository + ScyllaDB implementation
// - outbox:           audit intents and their relay into the event log
// - memory:           in-memory EnterpriseRepository
//
// ============================================================================

pub mod keys;
pub mod schema;
pub mod enterprise_store;
pub mod outbox;
pub mod memory;

pub use enterprise_store::{EnterpriseRepository, ScyllaEnterpriseStore};
pub use memory::InMemoryEnterpriseStore;
pub use outbox::{OutboxEntry, OutboxRelay};
pub use schema::ensure_schema;
