//! AMQP work-queue backend
//!
//! Declares a durable queue and a durable direct exchange, binds them with
//! the sensor's routing key and publishes persistent messages.

use async_trait::async_trait;
use lapin::options::{
    BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::{Envelope, LinkMonitor, Transport, TransportError};
use crate::config::QueueConfig;
use crate::publisher::Addressing;

const PERSISTENT: u8 = 2;

pub struct AmqpTransport {
    uri: String,
    queue: String,
    exchange: String,
    routing_key: String,
    session: Mutex<Option<(Connection, Channel)>>,
}

impl AmqpTransport {
    pub fn new(cfg: &QueueConfig, addressing: &Addressing) -> Self {
        let vhost = if cfg.vhost == "/" { "%2f" } else { cfg.vhost.as_str() };
        Self {
            uri: format!(
                "amqp://{}:{}@{}:{}/{}",
                cfg.username, cfg.password, cfg.host, cfg.port, vhost
            ),
            queue: addressing.queue_name(),
            exchange: addressing.exchange_name(),
            routing_key: addressing.routing_key(),
            session: Mutex::new(None),
        }
    }

    async fn open(&self) -> lapin::Result<(Connection, Channel)> {
        let connection = Connection::connect(&self.uri, ConnectionProperties::default()).await?;
        match self.declare(&connection).await {
            Ok(channel) => Ok((connection, channel)),
            Err(e) => {
                // Dropping the handle leaves the socket open at the broker
                if let Err(close) = connection.close(200, "topology setup failed").await {
                    warn!(error = %close, "closing half-open amqp connection failed");
                }
                Err(e)
            }
        }
    }

    async fn declare(&self, connection: &Connection) -> lapin::Result<Channel> {
        let channel = connection.create_channel().await?;

        channel
            .queue_declare(
                &self.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        channel
            .exchange_declare(
                &self.exchange,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        channel
            .queue_bind(
                &self.queue,
                &self.exchange,
                &self.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        Ok(channel)
    }

    async fn close_session(&self) -> Result<(), TransportError> {
        let session = self.session.lock().take();
        if let Some((connection, _)) = session {
            connection
                .close(200, "shutdown")
                .await
                .map_err(|e| TransportError::Publish(e.to_string()))?;
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for AmqpTransport {
    fn name(&self) -> &str {
        "amqp"
    }

    async fn connect(&self, link: LinkMonitor) -> Result<(), TransportError> {
        if let Err(e) = self.close_session().await {
            debug!(error = %e, "previous amqp session already gone");
        }

        let (connection, channel) = self
            .open()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        connection.on_error(move |e| link.lost(e));
        info!(queue = %self.queue, exchange = %self.exchange, "amqp topology declared");

        *self.session.lock() = Some((connection, channel));
        Ok(())
    }

    async fn publish(&self, envelope: &Envelope) -> Result<(), TransportError> {
        let channel = self
            .session
            .lock()
            .as_ref()
            .map(|(_, channel)| channel.clone())
            .ok_or(TransportError::NotConnected)?;

        channel
            .basic_publish(
                &self.exchange,
                &envelope.subject,
                BasicPublishOptions::default(),
                envelope.body.as_bytes(),
                BasicProperties::default().with_delivery_mode(PERSISTENT),
            )
            .await
            .map_err(|e| TransportError::Publish(e.to_string()))?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.close_session().await
    }
}
