//! MQTT telemetry broker backend
//!
//! Each connect builds a fresh client/event-loop pair, drives the loop until
//! the broker acknowledges the session, then hands the loop to a background
//! task that reports the first error through the [`LinkMonitor`].

use async_trait::async_trait;
use parking_lot::Mutex;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

use super::{Envelope, LinkMonitor, Transport, TransportError};
use crate::config::BrokerConfig;

const REQUEST_CAPACITY: usize = 64;

pub struct MqttTransport {
    options: MqttOptions,
    client: Mutex<Option<AsyncClient>>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl MqttTransport {
    pub fn new(client_id: &str, cfg: &BrokerConfig) -> Self {
        let mut options = MqttOptions::new(client_id, cfg.host.clone(), cfg.port);
        options.set_credentials(cfg.username.clone(), cfg.password.clone());
        options.set_keep_alive(Duration::from_secs(cfg.keep_alive_seconds.max(5)));

        Self {
            options,
            client: Mutex::new(None),
            driver: Mutex::new(None),
        }
    }

    fn stop_driver(&self) {
        if let Some(driver) = self.driver.lock().take() {
            driver.abort();
        }
    }
}

#[async_trait]
impl Transport for MqttTransport {
    fn name(&self) -> &str {
        "mqtt"
    }

    async fn connect(&self, link: LinkMonitor) -> Result<(), TransportError> {
        self.stop_driver();
        let (client, mut eventloop) = AsyncClient::new(self.options.clone(), REQUEST_CAPACITY);

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code == ConnectReturnCode::Success {
                        break;
                    }
                    return Err(TransportError::Rejected(format!("{:?}", ack.code)));
                }
                Ok(_) => continue,
                Err(e) => return Err(TransportError::Connect(e.to_string())),
            }
        }

        let driver = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(event) => debug!(?event, "mqtt event"),
                    Err(e) => {
                        link.lost(e);
                        return;
                    }
                }
            }
        });

        *self.client.lock() = Some(client);
        *self.driver.lock() = Some(driver);
        Ok(())
    }

    async fn publish(&self, envelope: &Envelope) -> Result<(), TransportError> {
        let client = self
            .client
            .lock()
            .clone()
            .ok_or(TransportError::NotConnected)?;

        client
            .publish(
                envelope.subject.clone(),
                QoS::AtMostOnce,
                false,
                envelope.body.clone().into_bytes(),
            )
            .await
            .map_err(|e| TransportError::Publish(e.to_string()))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let client = self.client.lock().take();
        let result = match client {
            Some(client) => client
                .disconnect()
                .await
                .map_err(|e| TransportError::Publish(e.to_string())),
            None => Ok(()),
        };
        self.stop_driver();
        result
    }
}
