//! # Resilient Transport Channel
//!
//! Connection state machine around a single [`Transport`]:
//!
//! ```text
//! Disconnected --ensure_reconnecting--> Connecting --ok--> Connected
//!      ^                                    |                  |
//!      +------- failure, retry after delay -+                  |
//!      +------------- publish failure / link lost -------------+
//! ```
//!
//! Every transition happens under the channel's status lock; the lock is
//! never held across an await, so publishing and connecting proceed without
//! it. At most one reconnect task runs per channel.

use parking_lot::Mutex;
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use strum::{AsRefStr, Display};
use tokio::runtime::Handle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use super::{Envelope, Transport, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Result of a best-effort publish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum PublishOutcome {
    Delivered,
    /// Channel was not connected; nothing was sent
    Skipped,
    /// Delivery failed; the channel dropped to disconnected and is reconnecting
    Failed,
}

impl PublishOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, PublishOutcome::Delivered)
    }
}

/// Retry and timeout policy for a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Wait after a failed connect before the next attempt
    pub retry_delay: Duration,
    /// Upper bound on one publish batch
    pub publish_timeout: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(10),
            publish_timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Debug)]
struct LinkStatus {
    state: ConnectionState,
    /// A reconnect task is alive (connecting or waiting out the retry delay)
    reconnect_pending: bool,
    /// Bumped on every connect attempt and on shutdown
    generation: u64,
    closed: bool,
    /// A lost connection whose transport session has not been released yet
    stale_session: bool,
}

struct ChannelInner {
    transport: Arc<dyn Transport>,
    policy: ReconnectPolicy,
    status: Mutex<LinkStatus>,
    runtime: Option<Handle>,
    connect_attempts: AtomicU64,
    reconnects_started: AtomicU64,
}

impl ChannelInner {
    fn name(&self) -> &str {
        self.transport.name()
    }
}

/// Handle a transport uses to report that an established connection dropped
///
/// Reports carrying a generation older than the channel's current one are
/// ignored, so a late callback from a superseded connection cannot tear down
/// its replacement.
#[derive(Clone)]
pub struct LinkMonitor {
    inner: Weak<ChannelInner>,
    generation: u64,
}

impl LinkMonitor {
    /// A monitor attached to no channel; reports go nowhere
    pub fn detached() -> Self {
        Self {
            inner: Weak::new(),
            generation: 0,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn lost(&self, reason: impl Display) {
        if let Some(inner) = self.inner.upgrade() {
            TransportChannel { inner }.mark_lost(self.generation, &reason);
        }
    }
}

impl std::fmt::Debug for LinkMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkMonitor")
            .field("generation", &self.generation)
            .finish()
    }
}

#[derive(Clone)]
pub struct TransportChannel {
    inner: Arc<ChannelInner>,
}

impl TransportChannel {
    /// Wrap a transport; the channel starts disconnected
    pub fn new(transport: Arc<dyn Transport>, policy: ReconnectPolicy) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                transport,
                policy,
                status: Mutex::new(LinkStatus {
                    state: ConnectionState::Disconnected,
                    reconnect_pending: false,
                    generation: 0,
                    closed: false,
                    stale_session: false,
                }),
                runtime: Handle::try_current().ok(),
                connect_attempts: AtomicU64::new(0),
                reconnects_started: AtomicU64::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.status.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.inner.policy
    }

    /// Total connect calls made on the transport
    pub fn connect_attempts(&self) -> u64 {
        self.inner.connect_attempts.load(Ordering::Relaxed)
    }

    /// Reconnect tasks started over the channel's lifetime
    pub fn reconnects_started(&self) -> u64 {
        self.inner.reconnects_started.load(Ordering::Relaxed)
    }

    /// Start a reconnect task unless one is already running
    ///
    /// Safe to call every tick. Returns `true` only when a new task was
    /// started.
    pub fn ensure_reconnecting(&self) -> bool {
        {
            let mut status = self.inner.status.lock();
            if status.closed
                || status.reconnect_pending
                || status.state != ConnectionState::Disconnected
            {
                return false;
            }
            status.reconnect_pending = true;
            status.state = ConnectionState::Connecting;
        }

        let Some(runtime) = Handle::try_current().ok().or_else(|| self.inner.runtime.clone())
        else {
            error!(transport = self.name(), "no async runtime available, cannot reconnect");
            let mut status = self.inner.status.lock();
            status.reconnect_pending = false;
            status.state = ConnectionState::Disconnected;
            return false;
        };

        self.inner.reconnects_started.fetch_add(1, Ordering::Relaxed);
        info!(transport = self.name(), "starting reconnect");
        runtime.spawn(reconnect_loop(Arc::clone(&self.inner)));
        true
    }

    /// Best-effort delivery of one envelope
    ///
    /// Never returns an error. A failure drops the channel to disconnected
    /// and schedules a reconnect; the envelope is lost.
    pub async fn publish(&self, envelope: &Envelope) -> PublishOutcome {
        self.publish_all(std::slice::from_ref(envelope)).await
    }

    /// Publish envelopes in order, stopping at the first one not delivered
    ///
    /// `publish_timeout` bounds the whole batch, not each envelope, so a
    /// slow transport costs a tick at most one timeout.
    pub async fn publish_all(&self, envelopes: &[Envelope]) -> PublishOutcome {
        let Some(first) = envelopes.first() else {
            return PublishOutcome::Delivered;
        };
        let generation = {
            let status = self.inner.status.lock();
            if status.state != ConnectionState::Connected {
                debug!(
                    transport = self.name(),
                    state = %status.state,
                    subject = %first.subject,
                    count = envelopes.len(),
                    "not connected, skipping publish"
                );
                return PublishOutcome::Skipped;
            }
            status.generation
        };

        let transport = &self.inner.transport;
        let mut pending = first;
        let batch = async {
            for envelope in envelopes {
                pending = envelope;
                transport.publish(envelope).await?;
            }
            Ok::<(), TransportError>(())
        };

        let limit = self.inner.policy.publish_timeout;
        let result = timeout(limit, batch).await;
        let error = match result {
            Ok(Ok(())) => return PublishOutcome::Delivered,
            Ok(Err(e)) => e,
            Err(_) => TransportError::Timeout(limit),
        };

        warn!(
            transport = self.name(),
            subject = %pending.subject,
            error = %error,
            "publish failed"
        );
        self.mark_lost(generation, &error);
        PublishOutcome::Failed
    }

    /// Stop reconnecting and close the connection if open
    pub async fn shutdown(&self) {
        let has_session = {
            let mut status = self.inner.status.lock();
            status.closed = true;
            status.generation += 1;
            let has_session = status.state == ConnectionState::Connected
                || std::mem::take(&mut status.stale_session);
            status.state = ConnectionState::Disconnected;
            has_session
        };

        if has_session {
            if let Err(e) = self.inner.transport.disconnect().await {
                warn!(transport = self.name(), error = %e, "disconnect failed");
            }
        }
        info!(transport = self.name(), "channel closed");
    }

    fn mark_lost(&self, generation: u64, reason: &dyn Display) {
        {
            let mut status = self.inner.status.lock();
            if status.generation != generation || status.state != ConnectionState::Connected {
                debug!(
                    transport = self.name(),
                    generation,
                    current = status.generation,
                    "ignoring stale link report"
                );
                return;
            }
            status.state = ConnectionState::Disconnected;
            status.stale_session = true;
        }

        warn!(transport = self.name(), reason = %reason, state = %ConnectionState::Disconnected, "connection lost");
        self.ensure_reconnecting();
    }
}

/// Begin a connect attempt; `None` once the channel is closed
///
/// The flag is set when the previous session was lost and must be released
/// before a new one is opened.
fn begin_attempt(inner: &Arc<ChannelInner>) -> Option<(LinkMonitor, bool)> {
    let mut status = inner.status.lock();
    if status.closed {
        status.reconnect_pending = false;
        status.state = ConnectionState::Disconnected;
        return None;
    }
    status.generation += 1;
    status.state = ConnectionState::Connecting;
    let link = LinkMonitor {
        inner: Arc::downgrade(inner),
        generation: status.generation,
    };
    Some((link, std::mem::take(&mut status.stale_session)))
}

async fn reconnect_loop(inner: Arc<ChannelInner>) {
    loop {
        let Some((link, release_previous)) = begin_attempt(&inner) else {
            return;
        };
        if release_previous {
            if let Err(e) = inner.transport.disconnect().await {
                debug!(transport = inner.name(), error = %e, "releasing lost session failed");
            }
        }
        let generation = link.generation;
        let attempt = inner.connect_attempts.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(transport = inner.name(), attempt, "connecting");

        match inner.transport.connect(link).await {
            Ok(()) => {
                let superseded = {
                    let mut status = inner.status.lock();
                    status.reconnect_pending = false;
                    if status.closed || status.generation != generation {
                        true
                    } else {
                        status.state = ConnectionState::Connected;
                        false
                    }
                };

                if superseded {
                    // Closed while connecting
                    if let Err(e) = inner.transport.disconnect().await {
                        debug!(transport = inner.name(), error = %e, "disconnect after close failed");
                    }
                } else {
                    info!(transport = inner.name(), attempt, state = %ConnectionState::Connected, "connected");
                }
                return;
            }
            Err(e) => {
                inner.status.lock().state = ConnectionState::Disconnected;
                warn!(
                    transport = inner.name(),
                    attempt,
                    error = %e,
                    retry_in_s = inner.policy.retry_delay.as_secs_f64(),
                    "connection failed, retrying"
                );
                sleep(inner.policy.retry_delay).await;
            }
        }
    }
}
