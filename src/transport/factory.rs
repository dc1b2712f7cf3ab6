use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum::Display;

use super::{InMemoryTransport, Transport};
use crate::config::{BrokerConfig, QueueConfig};
use crate::publisher::Addressing;

/// Backend selection for a transport
///
/// `Live` only reaches a real server when the matching feature (`mqtt` or
/// `amqp`) is compiled in; otherwise the factory falls back to simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TransportMode {
    /// In-memory backend that logs what it would send
    #[default]
    Simulated,
    /// Real network client
    Live,
}

/// Factory for the two telemetry transports
pub struct TransportFactory {
    addressing: Addressing,
}

impl TransportFactory {
    pub fn new(addressing: Addressing) -> Self {
        Self { addressing }
    }

    pub fn addressing(&self) -> &Addressing {
        &self.addressing
    }

    /// Telemetry broker backend
    pub fn create_broker(&self, cfg: &BrokerConfig) -> Arc<dyn Transport> {
        match cfg.mode {
            TransportMode::Simulated => Arc::new(InMemoryTransport::new("mqtt-sim")),
            #[cfg(feature = "mqtt")]
            TransportMode::Live => {
                tracing::info!(host = %cfg.host, port = cfg.port, "using MQTT broker");
                Arc::new(super::mqtt::MqttTransport::new(&self.addressing.sensor_id, cfg))
            }
            #[cfg(not(feature = "mqtt"))]
            TransportMode::Live => {
                tracing::warn!("built without the 'mqtt' feature, falling back to simulated broker");
                Arc::new(InMemoryTransport::new("mqtt-sim"))
            }
        }
    }

    /// Work-queue backend
    pub fn create_queue(&self, cfg: &QueueConfig) -> Arc<dyn Transport> {
        match cfg.mode {
            TransportMode::Simulated => Arc::new(InMemoryTransport::new("amqp-sim")),
            #[cfg(feature = "amqp")]
            TransportMode::Live => {
                tracing::info!(
                    host = %cfg.host,
                    port = cfg.port,
                    queue = %self.addressing.queue_name(),
                    "using AMQP work queue"
                );
                Arc::new(super::amqp::AmqpTransport::new(cfg, &self.addressing))
            }
            #[cfg(not(feature = "amqp"))]
            TransportMode::Live => {
                tracing::warn!("built without the 'amqp' feature, falling back to simulated queue");
                Arc::new(InMemoryTransport::new("amqp-sim"))
            }
        }
    }
}
