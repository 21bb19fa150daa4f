// ============================================================================
// Event Sourcing Infrastructure
// ============================================================================
//
// Append-only audit log: the event record (core) and its persistence (store).
//
// ============================================================================

mod core;
mod store;

pub use self::core::*;
pub use self::store::*;
