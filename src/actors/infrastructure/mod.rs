// ============================================================================
// Infrastructure Actors
// ============================================================================
//
// - cdc_processor:  ScyllaDB CDC reader feeding the change-stream processor
// - dlq:            dead letter queue for change records
// - outbox_relay:   periodic outbox drain
// - health_monitor: component health aggregation
// - coordinator:    starts and stops the above
//
// ============================================================================

mod cdc_processor;
mod coordinator;
mod dlq;
mod health_monitor;
mod outbox_relay;

pub use cdc_processor::{cql_to_attribute, ChangeAssembler, CdcProcessor, StopStreaming};
pub use coordinator::{CdcSource, CoordinatorActor, CoordinatorConfig, GetHealth, Shutdown};
pub use dlq::{
    AddToDlq, DeadLetterStore, DlqActor, DlqMessage, DlqStats, GetDlqMessages, GetDlqStats,
    InMemoryDeadLetterStore, ScyllaDeadLetterStore,
};
pub use health_monitor::{
    GetSystemHealth, HealthMonitorActor, HealthProbe, OutboxBacklogProbe, RunProbes, ScyllaProbe,
    SystemHealth, UpdateHealth,
};
pub use outbox_relay::{DrainOutbox, OutboxRelayActor};
