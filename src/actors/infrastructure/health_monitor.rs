use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kameo::actor::ActorRef;
use kameo::error::Infallible;
use kameo::message::{Context, Message};
use kameo::reply::{Reply, ReplyError};
use kameo::Actor;
use scylla::client::session::Session;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::actors::core::{ComponentHealth, HealthStatus};
use crate::db::EnterpriseRepository;
use crate::metrics::Metrics;

// ============================================================================
// Health Monitor Actor
// ============================================================================
//
// Keeps the latest status of every component. Status arrives two ways:
// - pushed by other actors via UpdateHealth
// - pulled by the periodic probe loop (cluster reachability, outbox backlog)
//
// The overall status is the worst component status and is mirrored into the
// `system_health_status` gauge.
//
// ============================================================================

const PROBE_INTERVAL: Duration = Duration::from_secs(10);

#[async_trait]
pub trait HealthProbe: Send + Sync {
    fn component(&self) -> &str;
    async fn probe(&self) -> HealthStatus;
}

pub struct ScyllaProbe {
    session: Arc<Session>,
}

impl ScyllaProbe {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl HealthProbe for ScyllaProbe {
    fn component(&self) -> &str {
        "scylla"
    }

    async fn probe(&self) -> HealthStatus {
        match self
            .session
            .query_unpaged("SELECT release_version FROM system.local", &[])
            .await
        {
            Ok(_) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        }
    }
}

/// Degraded once undelivered audit intents pile up past `threshold`.
pub struct OutboxBacklogProbe {
    enterprises: Arc<dyn EnterpriseRepository>,
    threshold: usize,
}

impl OutboxBacklogProbe {
    pub fn new(enterprises: Arc<dyn EnterpriseRepository>, threshold: usize) -> Self {
        Self {
            enterprises,
            threshold,
        }
    }
}

#[async_trait]
impl HealthProbe for OutboxBacklogProbe {
    fn component(&self) -> &str {
        "outbox"
    }

    async fn probe(&self) -> HealthStatus {
        let scan = i32::try_from(self.threshold.saturating_add(1)).unwrap_or(i32::MAX);
        match self.enterprises.pending_outbox(scan).await {
            Ok(pending) if pending.len() > self.threshold => {
                HealthStatus::Degraded(format!("more than {} pending outbox events", self.threshold))
            }
            Ok(_) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        }
    }
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug)]
pub struct UpdateHealth {
    pub component: String,
    pub status: HealthStatus,
    pub details: Option<String>,
}

/// Run every probe once and record the results.
#[derive(Debug)]
pub struct RunProbes;

#[derive(Debug)]
pub struct GetSystemHealth;

#[derive(Debug, Clone)]
pub struct SystemHealth {
    pub overall_status: HealthStatus,
    pub components: HashMap<String, ComponentHealth>,
    pub check_time: DateTime<Utc>,
}

impl Reply for SystemHealth {
    type Ok = Self;
    type Error = Infallible;
    type Value = Self;

    fn to_result(self) -> Result<Self, Infallible> {
        Ok(self)
    }

    fn into_any_err(self) -> Option<Box<dyn ReplyError>> {
        None
    }

    fn into_value(self) -> Self::Value {
        self
    }
}

// ============================================================================
// Actor
// ============================================================================

pub struct HealthMonitorActor {
    components: HashMap<String, ComponentHealth>,
    probes: Vec<Arc<dyn HealthProbe>>,
    metrics: Option<Arc<Metrics>>,
    probe_interval: Option<Duration>,
}

impl HealthMonitorActor {
    pub fn new(probes: Vec<Arc<dyn HealthProbe>>) -> Self {
        Self {
            components: HashMap::new(),
            probes,
            metrics: None,
            probe_interval: Some(PROBE_INTERVAL),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Disable the background loop; probes then run only on RunProbes.
    pub fn without_probe_loop(mut self) -> Self {
        self.probe_interval = None;
        self
    }

    fn record(&mut self, component: String, status: HealthStatus, details: Option<String>) {
        tracing::debug!(component = %component, status = ?status, "Updated component health");

        let mut health = ComponentHealth::new(component.clone(), status);
        health.details = details;
        self.components.insert(component, health);

        if let Some(ref m) = self.metrics {
            m.set_health_status(self.overall_status().level());
        }
    }

    fn overall_status(&self) -> HealthStatus {
        HealthStatus::aggregate(self.components.values())
    }
}

impl Actor for HealthMonitorActor {
    type Args = Self;
    type Error = Infallible;

    async fn on_start(state: Self::Args, actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        tracing::info!(probes = state.probes.len(), "HealthMonitorActor started");

        if let Some(every) = state.probe_interval {
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(every);
                loop {
                    interval.tick().await;
                    if actor_ref.tell(RunProbes).await.is_err() {
                        break;
                    }
                }
            });
        }

        Ok(state)
    }
}

impl Message<UpdateHealth> for HealthMonitorActor {
    type Reply = ();

    async fn handle(&mut self, msg: UpdateHealth, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        self.record(msg.component, msg.status, msg.details);
    }
}

impl Message<RunProbes> for HealthMonitorActor {
    type Reply = ();

    async fn handle(&mut self, _msg: RunProbes, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        let probes = self.probes.clone();
        for probe in probes {
            let status = probe.probe().await;
            self.record(probe.component().to_string(), status, None);
        }
    }
}

impl Message<GetSystemHealth> for HealthMonitorActor {
    type Reply = SystemHealth;

    async fn handle(&mut self, _msg: GetSystemHealth, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        SystemHealth {
            overall_status: self.overall_status(),
            components: self.components.clone(),
            check_time: Utc::now(),
        }
    }
}
