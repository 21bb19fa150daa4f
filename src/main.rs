use actix::prelude::*;
use actix_web::web;
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use enterprise_admin::actors::{
    CdcSource, CoordinatorActor, CoordinatorConfig, HealthProbe, OutboxBacklogProbe,
    ScyllaDeadLetterStore, ScyllaProbe, Shutdown,
};
use enterprise_admin::api::{start_api_server, ApiState};
use enterprise_admin::change_stream::ChangeStreamProcessor;
use enterprise_admin::config::Settings;
use enterprise_admin::db::{ensure_schema, EnterpriseRepository, OutboxRelay, ScyllaEnterpriseStore};
use enterprise_admin::domain::enterprise::EnterpriseCommandHandler;
use enterprise_admin::event_sourcing::{EventRepository, ScyllaEventStore};
use enterprise_admin::metrics::{self, Metrics};

#[actix::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides the default filter
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,enterprise_admin=debug")),
        )
        .init();

    tracing::info!("🚀 Starting enterprise admin backend");

    let settings = Settings::load()?;

    // === 1. ScyllaDB session and schema ===
    tracing::info!(nodes = ?settings.scylla.known_nodes, "Connecting to ScyllaDB...");
    let session: Session = SessionBuilder::new()
        .known_nodes(&settings.scylla.known_nodes)
        .build()
        .await?;
    ensure_schema(
        &session,
        &settings.scylla.keyspace,
        settings.scylla.replication_factor,
    )
    .await?;
    let session = Arc::new(session);

    // === 2. Metrics ===
    let metrics = Arc::new(Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    let metrics_registry = Arc::new(metrics.registry().clone());
    let metrics_port = settings.metrics.port;
    actix::spawn(async move {
        if let Err(e) = metrics::start_metrics_server(metrics_registry, metrics_port).await {
            tracing::error!(error = %e, "Metrics server error");
        }
    });

    // === 3. Stores, relay, command handler ===
    let enterprises: Arc<dyn EnterpriseRepository> = Arc::new(ScyllaEnterpriseStore::new(session.clone()));
    let events: Arc<dyn EventRepository> = Arc::new(ScyllaEventStore::new(session.clone()));
    let retry_config = settings.retry.to_retry_config();

    let relay = Arc::new(
        OutboxRelay::new(enterprises.clone(), events.clone(), retry_config.clone())
            .with_metrics(metrics.clone()),
    );
    let handler = Arc::new(
        EnterpriseCommandHandler::new(enterprises.clone(), events.clone(), relay.clone())
            .with_metrics(metrics.clone()),
    );

    // === 4. Background actors ===
    let cdc = settings.scylla.cdc_enabled.then(|| CdcSource {
        session: session.clone(),
        keyspace: settings.scylla.keyspace.clone(),
        processor: Arc::new(ChangeStreamProcessor::new(events.clone()).with_metrics(metrics.clone())),
        retry_config: retry_config.clone(),
    });
    let probes: Vec<Arc<dyn HealthProbe>> = vec![
        Arc::new(ScyllaProbe::new(session.clone())),
        Arc::new(OutboxBacklogProbe::new(
            enterprises.clone(),
            settings.outbox.batch_size as usize,
        )),
    ];

    tracing::info!("Starting coordinator actor");
    let coordinator = CoordinatorActor::new(CoordinatorConfig {
        dlq_store: Arc::new(ScyllaDeadLetterStore::new(session.clone())),
        relay,
        outbox_poll_interval: settings.outbox.poll_interval(),
        outbox_batch_size: settings.outbox.batch_size,
        probes,
        cdc,
        metrics: Some(metrics.clone()),
    })
    .start();

    // === 5. HTTP API (runs until SIGINT/SIGTERM) ===
    let state = web::Data::new(ApiState {
        handler,
        auth: settings.auth.clone(),
    });
    start_api_server(state, &settings.http.host, settings.http.port).await?;

    tracing::info!("🛑 API server stopped, shutting down actors");
    coordinator.send(Shutdown).await?;

    Ok(())
}
