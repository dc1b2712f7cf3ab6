//! In-memory transport
//!
//! Records every envelope instead of sending it anywhere. Used as the
//! simulated backend and as a controllable stand-in for a real broker in
//! tests: it can refuse connections, fail or stall publishes, hold connects
//! open and drop an established link.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

use super::{Envelope, LinkMonitor, Transport, TransportError};

pub struct InMemoryTransport {
    name: String,
    reachable: AtomicBool,
    connected: AtomicBool,
    fail_next_publish: AtomicBool,
    stall_publishes: AtomicBool,
    publish_delay: Mutex<Duration>,
    connect_attempts: AtomicU64,
    disconnects: AtomicU64,
    /// `true` while connects are held open
    connect_gate: watch::Sender<bool>,
    link: Mutex<Option<LinkMonitor>>,
    sent: Mutex<Vec<Envelope>>,
}

impl InMemoryTransport {
    pub fn new(name: impl Into<String>) -> Self {
        let (connect_gate, _) = watch::channel(false);
        Self {
            name: name.into(),
            reachable: AtomicBool::new(true),
            connected: AtomicBool::new(false),
            fail_next_publish: AtomicBool::new(false),
            stall_publishes: AtomicBool::new(false),
            publish_delay: Mutex::new(Duration::ZERO),
            connect_attempts: AtomicU64::new(0),
            disconnects: AtomicU64::new(0),
            connect_gate,
            link: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// When unreachable, every connect fails
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Make the next publish fail and drop the connection
    pub fn fail_next_publish(&self) {
        self.fail_next_publish.store(true, Ordering::SeqCst);
    }

    /// Make publishes hang until released
    pub fn stall_publishes(&self, stall: bool) {
        self.stall_publishes.store(stall, Ordering::SeqCst);
    }

    /// Delay every publish, for a server that is slow but still answering
    pub fn set_publish_delay(&self, delay: Duration) {
        *self.publish_delay.lock() = delay;
    }

    /// Keep connect calls pending until released
    pub fn hold_connects(&self, hold: bool) {
        self.connect_gate.send_replace(hold);
    }

    /// Simulate the server closing an established connection
    pub fn drop_link(&self, reason: &str) {
        self.connected.store(false, Ordering::SeqCst);
        let link = self.link.lock().take();
        if let Some(link) = link {
            link.lost(reason);
        }
    }

    pub fn current_link(&self) -> Option<LinkMonitor> {
        self.link.lock().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn connect_attempts(&self) -> u64 {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> u64 {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<Envelope> {
        self.sent.lock().clone()
    }

    /// Take and clear recorded envelopes
    pub fn drain(&self) -> Vec<Envelope> {
        std::mem::take(&mut *self.sent.lock())
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self, link: LinkMonitor) -> Result<(), TransportError> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);

        let mut gate = self.connect_gate.subscribe();
        // Sender lives in self, so this only errors if self is gone
        let _ = gate.wait_for(|held| !*held).await;

        if !self.reachable.load(Ordering::SeqCst) {
            return Err(TransportError::Connect(format!("{} unreachable", self.name)));
        }

        *self.link.lock() = Some(link);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn publish(&self, envelope: &Envelope) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        let delay = *self.publish_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.stall_publishes.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_next_publish.swap(false, Ordering::SeqCst) {
            self.connected.store(false, Ordering::SeqCst);
            return Err(TransportError::Publish("injected failure".into()));
        }

        debug!(transport = %self.name, subject = %envelope.subject, body = %envelope.body, "message recorded");
        self.sent.lock().push(envelope.clone());
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        self.link.lock().take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_envelopes() {
        let transport = InMemoryTransport::new("broker");
        transport.connect(LinkMonitor::detached()).await.unwrap();

        transport.publish(&Envelope::new("a", "1")).await.unwrap();
        transport.publish(&Envelope::new("b", "2")).await.unwrap();

        assert_eq!(transport.drain().len(), 2);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_refuses_connect() {
        let transport = InMemoryTransport::new("queue");
        transport.set_reachable(false);

        let result = transport.connect(LinkMonitor::detached()).await;

        assert!(matches!(result, Err(TransportError::Connect(_))));
        assert!(!transport.is_connected());
        assert_eq!(transport.connect_attempts(), 1);
    }

    #[tokio::test]
    async fn test_publish_requires_connection() {
        let transport = InMemoryTransport::new("broker");
        let result = transport.publish(&Envelope::new("a", "1")).await;
        assert!(matches!(result, Err(TransportError::NotConnected)));
    }

    #[tokio::test]
    async fn test_injected_failure_drops_connection() {
        let transport = InMemoryTransport::new("broker");
        transport.connect(LinkMonitor::detached()).await.unwrap();
        transport.fail_next_publish();

        assert!(transport.publish(&Envelope::new("a", "1")).await.is_err());
        assert!(!transport.is_connected());
    }
}
