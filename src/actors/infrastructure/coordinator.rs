use actix::prelude::*;
use kameo::actor::ActorRef;
use kameo::Actor as KameoActor;
use scylla::client::session::Session;
use std::sync::Arc;
use std::time::Duration;

use super::cdc_processor::{CdcProcessor, StopStreaming};
use super::dlq::{DeadLetterStore, DlqActor};
use super::health_monitor::{GetSystemHealth, HealthMonitorActor, HealthProbe, SystemHealth, UpdateHealth};
use super::outbox_relay::OutboxRelayActor;
use crate::actors::core::HealthStatus;
use crate::change_stream::ChangeStreamProcessor;
use crate::db::OutboxRelay;
use crate::metrics::Metrics;
use crate::utils::RetryConfig;

// ============================================================================
// Coordinator Actor - owns the background actors
// ============================================================================
//
//   CoordinatorActor
//   ├── HealthMonitorActor   (kameo)
//   ├── DlqActor             (actix)
//   ├── OutboxRelayActor     (actix)
//   └── CdcProcessor         (kameo, only when CDC is enabled)
//
// ============================================================================

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(30);

/// Where the change stream comes from.
pub struct CdcSource {
    pub session: Arc<Session>,
    pub keyspace: String,
    pub processor: Arc<ChangeStreamProcessor>,
    pub retry_config: RetryConfig,
}

pub struct CoordinatorConfig {
    pub dlq_store: Arc<dyn DeadLetterStore>,
    pub relay: Arc<OutboxRelay>,
    pub outbox_poll_interval: Duration,
    pub outbox_batch_size: i32,
    pub probes: Vec<Arc<dyn HealthProbe>>,
    pub cdc: Option<CdcSource>,
    pub metrics: Option<Arc<Metrics>>,
}

pub struct CoordinatorActor {
    config: Option<CoordinatorConfig>,
    health_monitor: Option<ActorRef<HealthMonitorActor>>,
    dlq_actor: Option<Addr<DlqActor>>,
    outbox_relay: Option<Addr<OutboxRelayActor>>,
    cdc_processor: Option<ActorRef<CdcProcessor>>,
}

impl CoordinatorActor {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self {
            config: Some(config),
            health_monitor: None,
            dlq_actor: None,
            outbox_relay: None,
            cdc_processor: None,
        }
    }

    fn start_child_actors(&mut self) {
        let Some(config) = self.config.take() else {
            return;
        };
        tracing::info!("Starting supervised child actors");

        let mut monitor = HealthMonitorActor::new(config.probes);
        if let Some(ref m) = config.metrics {
            monitor = monitor.with_metrics(m.clone());
        }
        let health_monitor = HealthMonitorActor::spawn(monitor);
        self.health_monitor = Some(health_monitor.clone());

        let mut dlq = DlqActor::new(config.dlq_store);
        if let Some(ref m) = config.metrics {
            dlq = dlq.with_metrics(m.clone());
        }
        let dlq_actor = dlq.start();
        self.dlq_actor = Some(dlq_actor.clone());

        self.outbox_relay = Some(
            OutboxRelayActor::new(
                config.relay,
                config.outbox_poll_interval,
                config.outbox_batch_size,
            )
            .start(),
        );

        let mut started = vec![("dlq_actor", "started"), ("outbox_relay", "started")];

        match config.cdc {
            Some(source) => {
                let processor = CdcProcessor::new(
                    source.session,
                    source.keyspace,
                    source.processor,
                    source.retry_config,
                )
                .with_dlq(dlq_actor)
                .with_health_monitor(health_monitor.clone());
                self.cdc_processor = Some(CdcProcessor::spawn(processor));
            }
            None => {
                tracing::warn!("CDC disabled, change stream is not consumed");
                started.push(("cdc_processor", "disabled"));
            }
        }

        // cdc_processor reports its own status once the reader is up
        actix::spawn(async move {
            for (component, details) in started {
                let _ = health_monitor
                    .tell(UpdateHealth {
                        component: component.to_string(),
                        status: HealthStatus::Healthy,
                        details: Some(details.to_string()),
                    })
                    .await;
            }
        });

        tracing::info!("✅ All supervised actors started");
    }
}

impl Actor for CoordinatorActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!("🎯 CoordinatorActor started");
        self.start_child_actors();

        ctx.run_interval(HEALTH_LOG_INTERVAL, |act, _ctx| {
            let Some(health_monitor) = act.health_monitor.clone() else {
                return;
            };
            actix::spawn(async move {
                match health_monitor.ask(GetSystemHealth).await {
                    Ok(health) => match health.overall_status {
                        HealthStatus::Healthy => tracing::debug!("System health check: Healthy"),
                        HealthStatus::Degraded(ref msg) => {
                            tracing::warn!(reason = %msg, "System health check: Degraded")
                        }
                        HealthStatus::Unhealthy(ref msg) => {
                            tracing::error!(reason = %msg, "System health check: Unhealthy")
                        }
                    },
                    Err(e) => tracing::error!(error = ?e, "Failed to get system health"),
                }
            });
        });
    }

    fn stopped(&mut self, _: &mut Self::Context) {
        tracing::info!("🛑 CoordinatorActor stopped");
    }
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Message)]
#[rtype(result = "Option<SystemHealth>")]
pub struct GetHealth;

impl Handler<GetHealth> for CoordinatorActor {
    type Result = ResponseFuture<Option<SystemHealth>>;

    fn handle(&mut self, _msg: GetHealth, _ctx: &mut Self::Context) -> Self::Result {
        let health_monitor = self.health_monitor.clone();
        Box::pin(async move {
            match health_monitor {
                Some(monitor) => monitor.ask(GetSystemHealth).await.ok(),
                None => None,
            }
        })
    }
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Shutdown;

impl Handler<Shutdown> for CoordinatorActor {
    type Result = ();

    fn handle(&mut self, _msg: Shutdown, ctx: &mut Self::Context) {
        tracing::info!("Received shutdown signal");

        if let Some(cdc) = self.cdc_processor.take() {
            actix::spawn(async move {
                let _ = cdc.tell(StopStreaming).await;
                let _ = cdc.stop_gracefully().await;
            });
        }
        if let Some(monitor) = self.health_monitor.take() {
            actix::spawn(async move {
                let _ = monitor.stop_gracefully().await;
            });
        }
        if let Some(relay) = self.outbox_relay.take() {
            relay.do_send(StopChild);
        }
        if let Some(dlq) = self.dlq_actor.take() {
            dlq.do_send(StopChild);
        }

        ctx.stop();
    }
}

#[derive(Message)]
#[rtype(result = "()")]
struct StopChild;

impl Handler<StopChild> for OutboxRelayActor {
    type Result = ();

    fn handle(&mut self, _: StopChild, ctx: &mut Self::Context) {
        tracing::info!("OutboxRelayActor received stop signal");
        ctx.stop();
    }
}

impl Handler<StopChild> for DlqActor {
    type Result = ();

    fn handle(&mut self, _: StopChild, ctx: &mut Self::Context) {
        tracing::info!("DlqActor received stop signal");
        ctx.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actors::infrastructure::dlq::InMemoryDeadLetterStore;
    use crate::db::InMemoryEnterpriseStore;
    use crate::event_sourcing::InMemoryEventStore;

    #[actix::test]
    async fn test_children_report_healthy_without_cdc() {
        let relay = Arc::new(OutboxRelay::new(
            Arc::new(InMemoryEnterpriseStore::new()),
            Arc::new(InMemoryEventStore::new()),
            RetryConfig::default(),
        ));
        let coordinator = CoordinatorActor::new(CoordinatorConfig {
            dlq_store: Arc::new(InMemoryDeadLetterStore::new()),
            relay,
            outbox_poll_interval: Duration::from_secs(3600),
            outbox_batch_size: 10,
            probes: Vec::new(),
            cdc: None,
            metrics: None,
        })
        .start();

        // the startup reports are sent asynchronously
        let mut health = None;
        for _ in 0..50 {
            health = coordinator.send(GetHealth).await.unwrap();
            if health.as_ref().map(|h| h.components.len()) == Some(3) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let health = health.unwrap();
        assert_eq!(health.components.len(), 3);
        assert!(health.overall_status.is_healthy());

        coordinator.send(Shutdown).await.unwrap();
    }
}
