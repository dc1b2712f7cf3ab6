use anyhow::Result;
use chrono::{Local, NaiveDateTime};
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::publisher::{DispatchReport, TelemetryPublisher};
use crate::simulation::{DamModel, FaultInjector, TickReport};
use crate::transport::{TransportChannel, TransportFactory};

/// What happened on one tick
#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub report: TickReport,
    pub dispatch: DispatchReport,
}

/// Fixed-interval loop driving the dam model and the publisher
pub struct Orchestrator {
    model: DamModel,
    publisher: TelemetryPublisher,
    interval: Duration,
    ticks: u64,
}

impl Orchestrator {
    pub fn new(model: DamModel, publisher: TelemetryPublisher, interval: Duration) -> Self {
        Self {
            model,
            publisher,
            interval,
            ticks: 0,
        }
    }

    /// Wire model, transports and publisher from configuration
    pub fn from_config(cfg: &Config) -> Self {
        let limits = cfg.dam.limits();
        let addressing = cfg.dam.addressing();
        let policy = cfg.reconnect.policy();

        let model = DamModel::new(
            limits.clone(),
            cfg.dam.initial_fill_percentage,
            FaultInjector::new(cfg.faults.clone()),
            cfg.dam.random_seed,
        );

        let factory = TransportFactory::new(addressing.clone());
        let broker = TransportChannel::new(factory.create_broker(&cfg.broker), policy);
        let queue = TransportChannel::new(factory.create_queue(&cfg.queue), policy);

        let publisher = TelemetryPublisher::new(
            addressing,
            &limits,
            model.max_generation_capacity(),
            broker,
            queue,
        );

        Self::new(model, publisher, cfg.dam.interval())
    }

    pub fn model(&self) -> &DamModel {
        &self.model
    }

    pub fn publisher(&self) -> &TelemetryPublisher {
        &self.publisher
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// One simulation/publish cycle at `now`
    pub async fn tick(&mut self, now: NaiveDateTime) -> TickOutcome {
        self.publisher.ensure_reconnecting();

        let report = self.model.advance(now);
        self.ticks += 1;

        if let Some(alert) = report.electrical.alert() {
            warn!(
                alert = %alert,
                efficiency = report.electrical.efficiency,
                "turbine sensor fault"
            );
        }
        debug!(
            tick = self.ticks,
            level_m = report.level,
            volume_m3 = report.volume,
            inflow_m3s = report.inflow,
            outflow_m3s = report.outflow,
            power_mw = report.power_mw,
            total_energy_mwh = report.total_energy_mwh,
            energy_request_mw = report.energy_request,
            "dam tick"
        );

        let dispatch = self.publisher.dispatch(&report).await;
        TickOutcome { report, dispatch }
    }

    /// Tick until `shutdown` resolves, then close both channels
    pub async fn run<F>(mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!(
            dam = %self.publisher.addressing().dam_id,
            sensor = %self.publisher.addressing().sensor_id,
            interval_s = self.interval.as_secs_f64(),
            max_capacity_mw = self.model.max_generation_capacity(),
            "starting dam simulation"
        );

        // Connect before the first tick so it has a chance to publish
        self.publisher.ensure_reconnecting();

        let mut interval = tokio::time::interval(self.interval.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => {
                    self.tick(Local::now().naive_local()).await;
                }
            }
        }

        info!(ticks = self.ticks, "stopping dam simulation");
        tokio::join!(
            self.publisher.broker().shutdown(),
            self.publisher.queue().shutdown(),
        );
        Ok(())
    }
}
