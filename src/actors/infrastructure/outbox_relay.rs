use actix::prelude::*;
use std::sync::Arc;
use std::time::Duration;

use crate::db::OutboxRelay;
use crate::error::Result;

// ============================================================================
// Outbox Relay Actor
// ============================================================================
//
// Periodically drains audit intents that the eager relay in the command
// handler could not deliver (event store down, process crash between the
// mutation and the append). Only one drain runs at a time.
//
// ============================================================================

pub struct OutboxRelayActor {
    relay: Arc<OutboxRelay>,
    poll_interval: Duration,
    batch_size: i32,
    draining: bool,
}

impl OutboxRelayActor {
    pub fn new(relay: Arc<OutboxRelay>, poll_interval: Duration, batch_size: i32) -> Self {
        Self {
            relay,
            poll_interval,
            batch_size,
            draining: false,
        }
    }
}

impl Actor for OutboxRelayActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(
            poll_interval_secs = self.poll_interval.as_secs(),
            batch_size = self.batch_size,
            "OutboxRelayActor started"
        );

        ctx.run_interval(self.poll_interval, |_act, ctx| {
            ctx.notify(DrainOutbox);
        });
    }
}

#[derive(Message)]
#[rtype(result = "Result<usize>")]
pub struct DrainOutbox;

#[derive(Message)]
#[rtype(result = "()")]
struct DrainFinished;

impl Handler<DrainOutbox> for OutboxRelayActor {
    type Result = ResponseFuture<Result<usize>>;

    fn handle(&mut self, _msg: DrainOutbox, ctx: &mut Self::Context) -> Self::Result {
        if self.draining {
            tracing::debug!("Outbox drain already running, skipping tick");
            return Box::pin(async { Ok(0) });
        }
        self.draining = true;

        let relay = self.relay.clone();
        let batch_size = self.batch_size;
        let addr = ctx.address();

        Box::pin(async move {
            let result = relay.relay_pending(batch_size).await;
            addr.do_send(DrainFinished);
            if let Err(ref e) = result {
                tracing::error!(error = %e, "❌ Outbox drain failed");
            }
            result
        })
    }
}

impl Handler<DrainFinished> for OutboxRelayActor {
    type Result = ();

    fn handle(&mut self, _msg: DrainFinished, _ctx: &mut Self::Context) {
        self.draining = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{EnterpriseRepository, InMemoryEnterpriseStore};
    use crate::domain::enterprise::aggregate::fixtures::enterprise;
    use crate::event_sourcing::{EntityType, Event, EventName, EventRepository, InMemoryEventStore};
    use crate::utils::RetryConfig;

    #[actix::test]
    async fn test_drain_moves_pending_events() {
        let store = Arc::new(InMemoryEnterpriseStore::new());
        let events = Arc::new(InMemoryEventStore::new());
        for id in ["a", "b"] {
            let event = Event::new(EventName::Insert, EntityType::Enterprise, id, "u-1");
            store.put(&enterprise(id), Some(&event)).await.unwrap();
        }

        let relay = Arc::new(OutboxRelay::new(store.clone(), events.clone(), RetryConfig::default()));
        let actor = OutboxRelayActor::new(relay, Duration::from_secs(3600), 10).start();

        let relayed = actor.send(DrainOutbox).await.unwrap().unwrap();
        assert_eq!(relayed, 2);
        assert_eq!(events.list_recent(None).await.unwrap().len(), 2);
        assert!(store.pending_outbox(10).await.unwrap().is_empty());
    }
}
