mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry};

pub use server::start_metrics_server;

// ============================================================================
// Metrics - Prometheus instruments for the admin backend
// ============================================================================
//
// Covers:
// - enterprise mutations by operation
// - change-record normalization (throughput, latency, skips)
// - event appends and outbox relay
// - retry attempts and outcomes
// - dead letter queue volume
// - overall system health
//
// Everything registers into one Registry served on /metrics.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    pub enterprise_mutations: IntCounterVec,

    pub change_records_processed: IntCounterVec,
    pub change_records_failed: IntCounterVec,
    pub change_records_skipped: IntCounter,
    pub change_processing_duration: HistogramVec,

    pub events_appended: IntCounterVec,
    pub outbox_relayed: IntCounter,
    pub outbox_failures: IntCounter,

    pub retry_attempts_total: IntCounterVec,
    pub retry_success: IntCounterVec,
    pub retry_failure: IntCounterVec,

    pub dlq_messages_total: IntCounter,
    pub dlq_messages_by_event_name: IntCounterVec,

    pub system_health_status: IntGauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let enterprise_mutations = IntCounterVec::new(
            Opts::new("enterprise_mutations_total", "Enterprise create/modify/remove operations"),
            &["operation"],
        )?;
        registry.register(Box::new(enterprise_mutations.clone()))?;

        // Change stream
        let change_records_processed = IntCounterVec::new(
            Opts::new("change_records_processed_total", "Change records normalized into events"),
            &["event_type"],
        )?;
        registry.register(Box::new(change_records_processed.clone()))?;

        let change_records_failed = IntCounterVec::new(
            Opts::new("change_records_failed_total", "Change records that failed processing"),
            &["event_type"],
        )?;
        registry.register(Box::new(change_records_failed.clone()))?;

        let change_records_skipped = IntCounter::new(
            "change_records_skipped_total",
            "Change records ignored as non-audited entities",
        )?;
        registry.register(Box::new(change_records_skipped.clone()))?;

        let change_processing_duration = HistogramVec::new(
            HistogramOpts::new(
                "change_processing_duration_seconds",
                "Change record processing duration",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["event_type"],
        )?;
        registry.register(Box::new(change_processing_duration.clone()))?;

        // Events and outbox
        let events_appended = IntCounterVec::new(
            Opts::new("events_appended_total", "Events written to the event store"),
            &["event_type"],
        )?;
        registry.register(Box::new(events_appended.clone()))?;

        let outbox_relayed = IntCounter::new(
            "outbox_relayed_total",
            "Outbox entries relayed and cleared",
        )?;
        registry.register(Box::new(outbox_relayed.clone()))?;

        let outbox_failures = IntCounter::new(
            "outbox_failures_total",
            "Outbox entries left pending after retries",
        )?;
        registry.register(Box::new(outbox_failures.clone()))?;

        // Retry
        let retry_attempts_total = IntCounterVec::new(
            Opts::new("retry_attempts_total", "Total retry attempts"),
            &["operation", "attempt"],
        )?;
        registry.register(Box::new(retry_attempts_total.clone()))?;

        let retry_success = IntCounterVec::new(
            Opts::new("retry_success_total", "Total successful retries"),
            &["operation"],
        )?;
        registry.register(Box::new(retry_success.clone()))?;

        let retry_failure = IntCounterVec::new(
            Opts::new("retry_failure_total", "Total failed retries after all attempts"),
            &["operation"],
        )?;
        registry.register(Box::new(retry_failure.clone()))?;

        // DLQ
        let dlq_messages_total = IntCounter::new(
            "dlq_messages_total",
            "Total change records sent to the dead letter queue",
        )?;
        registry.register(Box::new(dlq_messages_total.clone()))?;

        let dlq_messages_by_event_name = IntCounterVec::new(
            Opts::new("dlq_messages_by_event_name", "DLQ messages by change operation"),
            &["event_name"],
        )?;
        registry.register(Box::new(dlq_messages_by_event_name.clone()))?;

        let system_health_status = IntGauge::new(
            "system_health_status",
            "System health (0=Unhealthy, 1=Degraded, 2=Healthy)",
        )?;
        registry.register(Box::new(system_health_status.clone()))?;

        Ok(Self {
            registry,
            enterprise_mutations,
            change_records_processed,
            change_records_failed,
            change_records_skipped,
            change_processing_duration,
            events_appended,
            outbox_relayed,
            outbox_failures,
            retry_attempts_total,
            retry_success,
            retry_failure,
            dlq_messages_total,
            dlq_messages_by_event_name,
            system_health_status,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_enterprise_mutation(&self, operation: &str) {
        self.enterprise_mutations.with_label_values(&[operation]).inc();
    }

    pub fn record_change_record(&self, event_type: &str, duration_secs: f64, success: bool) {
        if success {
            self.change_records_processed.with_label_values(&[event_type]).inc();
        } else {
            self.change_records_failed.with_label_values(&[event_type]).inc();
        }
        self.change_processing_duration
            .with_label_values(&[event_type])
            .observe(duration_secs);
    }

    pub fn record_change_skipped(&self) {
        self.change_records_skipped.inc();
    }

    pub fn record_event_appended(&self, event_type: &str) {
        self.events_appended.with_label_values(&[event_type]).inc();
    }

    pub fn record_outbox_relayed(&self) {
        self.outbox_relayed.inc();
    }

    pub fn record_outbox_failure(&self) {
        self.outbox_failures.inc();
    }

    pub fn record_retry_attempt(&self, operation: &str, attempt: u32) {
        self.retry_attempts_total
            .with_label_values(&[operation, &attempt.to_string()])
            .inc();
    }

    pub fn record_retry_outcome(&self, operation: &str, success: bool) {
        if success {
            self.retry_success.with_label_values(&[operation]).inc();
        } else {
            self.retry_failure.with_label_values(&[operation]).inc();
        }
    }

    pub fn record_dlq_message(&self, event_name: &str) {
        self.dlq_messages_total.inc();
        self.dlq_messages_by_event_name.with_label_values(&[event_name]).inc();
    }

    /// 0 = unhealthy, 1 = degraded, 2 = healthy.
    pub fn set_health_status(&self, level: i64) {
        self.system_health_status.set(level);
    }
}
