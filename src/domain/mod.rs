// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// Domain records, their rules and the command handlers that coordinate the
// stores. Persistence lives in `crate::db` and `crate::event_sourcing`.
//
// ============================================================================

pub mod enterprise;
