// ============================================================================
// Actors Module
// ============================================================================
//
// Background infrastructure only: change-stream consumption, dead letters,
// outbox draining and health. Enterprise commands go through the command
// handler directly, not through actors.
//
// actix actors: CoordinatorActor, DlqActor, OutboxRelayActor
// kameo actors: CdcProcessor, HealthMonitorActor
//
// ============================================================================

mod core;
mod infrastructure;

pub use self::core::{ComponentHealth, HealthStatus};
pub use infrastructure::*;
