//! # Telemetry Publisher
//!
//! Turns a [`TickReport`] into payloads and fans them out over the two
//! transport channels:
//!
//! - telemetry broker: one scalar message per metric, then Status and Summary
//! - work queue: Status only
//!
//! Both channels are written concurrently and independently; an outage on
//! one never delays or blocks the other. Nothing is queued for later.

pub mod addressing;
pub mod payload;

use std::fmt;
use tracing::{debug, error, info, warn};

use crate::domain::DamLimits;
use crate::simulation::TickReport;
use crate::transport::{Envelope, PublishOutcome, TransportChannel};

pub use addressing::Addressing;
pub use payload::{format_timestamp, round2, MetricRanges, TelemetryStatus, TelemetrySummary};

/// Per-channel result of one tick's dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub broker: PublishOutcome,
    pub queue: PublishOutcome,
}

impl DispatchReport {
    const DROPPED: Self = Self {
        broker: PublishOutcome::Skipped,
        queue: PublishOutcome::Skipped,
    };

    /// Number of transports that received the full tick
    pub fn delivered_to(&self) -> usize {
        [self.broker, self.queue]
            .iter()
            .filter(|o| o.is_delivered())
            .count()
    }
}

impl fmt::Display for DispatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "broker={} queue={}", self.broker, self.queue)
    }
}

pub struct TelemetryPublisher {
    addressing: Addressing,
    ranges: MetricRanges,
    broker: TransportChannel,
    queue: TransportChannel,
}

impl TelemetryPublisher {
    pub fn new(
        addressing: Addressing,
        limits: &DamLimits,
        max_capacity: f64,
        broker: TransportChannel,
        queue: TransportChannel,
    ) -> Self {
        Self {
            addressing,
            ranges: MetricRanges::new(limits, max_capacity),
            broker,
            queue,
        }
    }

    pub fn addressing(&self) -> &Addressing {
        &self.addressing
    }

    pub fn broker(&self) -> &TransportChannel {
        &self.broker
    }

    pub fn queue(&self) -> &TransportChannel {
        &self.queue
    }

    /// Kick off reconnection on any channel that needs it
    pub fn ensure_reconnecting(&self) {
        self.broker.ensure_reconnecting();
        self.queue.ensure_reconnecting();
    }

    /// Envelopes for the telemetry broker, in publish order
    pub fn broker_envelopes(
        &self,
        summary: &TelemetrySummary,
        status: &TelemetryStatus,
    ) -> serde_json::Result<Vec<Envelope>> {
        let mut envelopes: Vec<Envelope> = summary
            .scalar_metrics()
            .iter()
            .map(|(metric, value)| Envelope::new(self.addressing.topic(metric), value.to_string()))
            .collect();

        envelopes.push(Envelope::new(
            self.addressing.status_topic(),
            serde_json::to_string(status)?,
        ));
        envelopes.push(Envelope::new(
            self.addressing.summary_topic(),
            serde_json::to_string(summary)?,
        ));
        Ok(envelopes)
    }

    pub fn queue_envelope(&self, status: &TelemetryStatus) -> serde_json::Result<Envelope> {
        Ok(Envelope::new(
            self.addressing.routing_key(),
            serde_json::to_string(status)?,
        ))
    }

    /// Build this tick's payloads and deliver them to whichever channels are
    /// connected
    pub async fn dispatch(&self, report: &TickReport) -> DispatchReport {
        if !self.broker.is_connected() && !self.queue.is_connected() {
            warn!(
                broker = %self.broker.state(),
                queue = %self.queue.state(),
                "both transports disconnected, skipping publish"
            );
            return DispatchReport::DROPPED;
        }

        let sensor_id = &self.addressing.sensor_id;
        let summary = TelemetrySummary::new(sensor_id, report, &self.ranges);
        let status = TelemetryStatus::new(sensor_id, report);

        let envelopes = self
            .broker_envelopes(&summary, &status)
            .and_then(|broker| Ok((broker, self.queue_envelope(&status)?)));
        let (broker_envelopes, queue_envelope) = match envelopes {
            Ok(envelopes) => envelopes,
            Err(e) => {
                error!(error = %e, "failed to encode telemetry");
                return DispatchReport::DROPPED;
            }
        };

        let (broker, queue) = tokio::join!(
            self.broker.publish_all(&broker_envelopes),
            self.queue.publish(&queue_envelope),
        );
        let dispatch = DispatchReport { broker, queue };

        if broker.is_delivered() {
            debug!(topic = %self.addressing.summary_topic(), summary = ?summary, "summary sent");
        }
        if queue.is_delivered() {
            debug!(routing_key = %queue_envelope.subject, status = ?status, "status queued");
        }
        info!(delivered_to = dispatch.delivered_to(), %dispatch, "telemetry dispatched");
        dispatch
    }
}
