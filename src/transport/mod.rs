//! # Telemetry Transports
//!
//! A [`Transport`] is the wire-level client of one publish/subscribe system.
//! A [`TransportChannel`] wraps a transport with the connection state machine
//! and reconnection policy, so that callers only ever see best-effort
//! publishing.
//!
//! ## Backends
//!
//! - **InMemory**: simulated backend used in `simulated` mode and by tests
//! - **Mqtt** (feature `mqtt`): telemetry broker client
//! - **Amqp** (feature `amqp`): durable work-queue client

pub mod channel;
pub mod factory;
pub mod memory;

#[cfg(feature = "amqp")]
pub mod amqp;
#[cfg(feature = "mqtt")]
pub mod mqtt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub use channel::{ConnectionState, LinkMonitor, PublishOutcome, ReconnectPolicy, TransportChannel};
pub use factory::{TransportFactory, TransportMode};
pub use memory::InMemoryTransport;

/// Transport-level errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("connection rejected by server: {0}")]
    Rejected(String),
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("transport not connected")]
    NotConnected,
    #[error("publish timed out after {0:?}")]
    Timeout(Duration),
}

/// One outbound message
///
/// `subject` is the MQTT topic or the AMQP routing key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub subject: String,
    pub body: String,
}

impl Envelope {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Open a connection
    ///
    /// On success the backend keeps `link` and calls [`LinkMonitor::lost`]
    /// if the connection later drops on its own.
    async fn connect(&self, link: LinkMonitor) -> Result<(), TransportError>;

    async fn publish(&self, envelope: &Envelope) -> Result<(), TransportError>;

    async fn disconnect(&self) -> Result<(), TransportError>;
}
