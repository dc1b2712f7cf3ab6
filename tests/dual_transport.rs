//! Outage and recovery behavior of the two telemetry channels under a
//! running tick loop.

use chrono::{Duration as ChronoDuration, NaiveDate, NaiveDateTime};
use hydro_dam_sensor::controller::Orchestrator;
use hydro_dam_sensor::domain::DamLimits;
use hydro_dam_sensor::publisher::{Addressing, TelemetryPublisher};
use hydro_dam_sensor::simulation::{DamModel, FaultInjector, FaultProfile};
use hydro_dam_sensor::transport::{
    ConnectionState, InMemoryTransport, PublishOutcome, ReconnectPolicy, TransportChannel,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Harness {
    broker: Arc<InMemoryTransport>,
    queue: Arc<InMemoryTransport>,
    orchestrator: Orchestrator,
    ticks: i64,
}

impl Harness {
    fn new() -> Self {
        let limits = DamLimits::new(100.0, 1_000_000.0, 50.0, 50.0);
        let model = DamModel::new(
            limits.clone(),
            0.5,
            FaultInjector::new(FaultProfile {
                probability: 0.0,
                ..Default::default()
            }),
            Some(3),
        );
        let policy = ReconnectPolicy {
            retry_delay: Duration::from_millis(30),
            publish_timeout: Duration::from_millis(100),
        };
        let broker = Arc::new(InMemoryTransport::new("broker"));
        let queue = Arc::new(InMemoryTransport::new("queue"));
        let publisher = TelemetryPublisher::new(
            Addressing::new("Dam", "S1"),
            &limits,
            model.max_generation_capacity(),
            TransportChannel::new(broker.clone(), policy),
            TransportChannel::new(queue.clone(), policy),
        );
        Self {
            broker,
            queue,
            orchestrator: Orchestrator::new(model, publisher, Duration::from_secs(5)),
            ticks: 0,
        }
    }

    fn now(&self) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
            + ChronoDuration::seconds(5 * self.ticks)
    }

    async fn tick(&mut self) -> hydro_dam_sensor::controller::TickOutcome {
        let now = self.now();
        self.ticks += 1;
        self.orchestrator.tick(now).await
    }

    fn broker_channel(&self) -> &TransportChannel {
        self.orchestrator.publisher().broker()
    }

    fn queue_channel(&self) -> &TransportChannel {
        self.orchestrator.publisher().queue()
    }
}

async fn wait_for(channel: &TransportChannel, state: ConnectionState) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while channel.state() != state {
        assert!(Instant::now() < deadline, "timed out waiting for {state}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn broker_drop_recovers_while_queue_keeps_flowing() {
    let mut h = Harness::new();
    h.tick().await;
    wait_for(h.broker_channel(), ConnectionState::Connected).await;
    wait_for(h.queue_channel(), ConnectionState::Connected).await;

    h.broker.set_reachable(false);
    h.broker.drop_link("connection reset by peer");
    assert_eq!(h.broker_channel().state(), ConnectionState::Connecting);

    for _ in 0..3 {
        let outcome = h.tick().await;
        assert_ne!(outcome.dispatch.broker, PublishOutcome::Delivered);
        assert_eq!(outcome.dispatch.queue, PublishOutcome::Delivered);
    }
    assert_eq!(h.queue.sent().len(), 3);
    // Initial connect plus the single reconnect after the drop
    assert_eq!(h.broker_channel().reconnects_started(), 2);

    h.broker.set_reachable(true);
    wait_for(h.broker_channel(), ConnectionState::Connected).await;

    let outcome = h.tick().await;
    assert_eq!(outcome.dispatch.delivered_to(), 2);
    assert_eq!(h.broker.sent().len(), 9);
}

#[tokio::test]
async fn both_down_then_queue_returns() {
    let mut h = Harness::new();
    h.broker.set_reachable(false);
    h.queue.set_reachable(false);

    for _ in 0..5 {
        let outcome = h.tick().await;
        assert_eq!(outcome.dispatch.delivered_to(), 0);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(h.broker.sent().is_empty());
    assert!(h.queue.sent().is_empty());

    h.queue.set_reachable(true);
    wait_for(h.queue_channel(), ConnectionState::Connected).await;

    let outcome = h.tick().await;
    assert_eq!(outcome.dispatch.queue, PublishOutcome::Delivered);
    assert_eq!(outcome.dispatch.broker, PublishOutcome::Skipped);
    assert_eq!(h.queue.sent().len(), 1);
    assert_eq!(h.broker_channel().reconnects_started(), 1);
}

#[tokio::test]
async fn failed_publish_loses_only_that_tick() {
    let mut h = Harness::new();
    h.tick().await;
    wait_for(h.broker_channel(), ConnectionState::Connected).await;
    wait_for(h.queue_channel(), ConnectionState::Connected).await;

    h.queue.fail_next_publish();
    let outcome = h.tick().await;
    assert_eq!(outcome.dispatch.queue, PublishOutcome::Failed);
    assert_eq!(outcome.dispatch.broker, PublishOutcome::Delivered);

    wait_for(h.queue_channel(), ConnectionState::Connected).await;
    let outcome = h.tick().await;
    assert_eq!(outcome.dispatch.delivered_to(), 2);

    // Nothing from the failed tick is replayed
    assert_eq!(h.queue.sent().len(), 1);
    assert_eq!(h.broker.sent().len(), 18);
}

#[tokio::test]
async fn stale_link_report_is_ignored() {
    let mut h = Harness::new();
    h.tick().await;
    wait_for(h.queue_channel(), ConnectionState::Connected).await;

    let old_link = h.queue.current_link().unwrap();
    h.queue.drop_link("broker restarted");
    wait_for(h.queue_channel(), ConnectionState::Connected).await;

    // A late error from the first connection must not tear down the new one
    old_link.lost("late error");
    assert_eq!(h.queue_channel().state(), ConnectionState::Connected);
    assert_eq!(h.queue_channel().reconnects_started(), 2);
}
