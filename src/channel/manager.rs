//! Channel manager
//!
//! Owns at most one live link. Opening retries with bounded exponential
//! backoff and then settles into `Disconnected` without surfacing an error;
//! callers observe the outcome through `status()`.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use typelens_core::ClientMessage;

use super::transport::Transport;
use super::transport_types::{
    ChannelError, ChannelEvent, ChannelTransport, ConnectionStatus, Frame, Link,
};

/// How long `close` waits for the pump to flush the close frame
const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// Retry schedule for `open`/`reopen`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Total connect attempts, at least one is always made
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(4),
        }
    }
}

impl ReconnectPolicy {
    /// Delay after the given failed attempt (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Lifecycle of the persistent connection to the analysis backend
#[derive(Debug)]
pub struct ChannelManager {
    url: String,
    transport: Transport,
    connect_timeout: Duration,
    policy: ReconnectPolicy,
    link: Option<Link>,
    status: ConnectionStatus,
    /// Events pulled off the link by `refresh`, served first by `recv`
    backlog: VecDeque<ChannelEvent>,
}

impl ChannelManager {
    pub fn new(
        url: impl Into<String>,
        transport: Transport,
        connect_timeout: Duration,
        policy: ReconnectPolicy,
    ) -> Self {
        Self {
            url: url.into(),
            transport,
            connect_timeout,
            policy,
            link: None,
            status: ConnectionStatus::Disconnected,
            backlog: VecDeque::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// A link whose pump has exited counts as disconnected
    pub fn status(&self) -> ConnectionStatus {
        match &self.link {
            Some(link) if link.pump.is_finished() => ConnectionStatus::Disconnected,
            _ => self.status,
        }
    }

    pub fn is_open(&self) -> bool {
        self.link
            .as_ref()
            .is_some_and(|link| !link.pump.is_finished())
    }

    /// Establish the connection, retrying per policy
    pub async fn open(&mut self) -> ConnectionStatus {
        if self.is_open() {
            return self.status;
        }
        self.abort_link();

        self.status = ConnectionStatus::Connecting;
        let attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=attempts {
            match self.connect_once().await {
                Ok(link) => {
                    info!(url = %self.url, attempt, "channel open");
                    self.link = Some(link);
                    self.status = ConnectionStatus::Connected;
                    return self.status;
                }
                Err(e) => {
                    warn!(url = %self.url, attempt, error = %e, "connect failed");
                    if attempt < attempts {
                        let delay = self.policy.backoff(attempt);
                        debug!(?delay, "backing off before reconnect");
                        sleep(delay).await;
                    }
                }
            }
        }

        warn!(url = %self.url, attempts, "giving up, channel disconnected");
        self.status = ConnectionStatus::Disconnected;
        self.status
    }

    /// Drop whatever link is left and open a fresh one
    ///
    /// Events still queued from the old link are discarded.
    pub async fn reopen(&mut self) -> ConnectionStatus {
        self.abort_link();
        if !self.backlog.is_empty() {
            debug!(dropped = self.backlog.len(), "discarding events of previous link");
            self.backlog.clear();
        }
        self.open().await
    }

    /// Take stock of the link without waiting
    ///
    /// Moves already-queued events into the backlog and drops a link that
    /// went away while nobody was reading. The loss is still reported once
    /// by `recv`.
    pub fn refresh(&mut self) -> ConnectionStatus {
        let Some(link) = self.link.as_mut() else {
            return self.status;
        };

        // Everything the pump sent happened before it finished
        let finished = link.pump.is_finished();
        let mut lost = None;
        loop {
            match link.inbound.try_recv() {
                Ok(ChannelEvent::Disconnected(reason)) => {
                    lost = Some(reason);
                    break;
                }
                Ok(event) => self.backlog.push_back(event),
                Err(TryRecvError::Empty) => {
                    if finished {
                        lost = Some("channel closed".to_string());
                    }
                    break;
                }
                Err(TryRecvError::Disconnected) => {
                    lost = Some("channel closed".to_string());
                    break;
                }
            }
        }

        if let Some(reason) = lost {
            self.lost(&reason);
            self.backlog.push_back(ChannelEvent::Disconnected(reason));
        }
        self.status
    }

    /// Queue one message for the peer
    pub fn send(&mut self, message: &ClientMessage) -> Result<(), ChannelError> {
        let link = self.link.as_ref().ok_or(ChannelError::NotOpen)?;
        let text = message
            .to_json()
            .map_err(|e| ChannelError::Serialize(e.to_string()))?;
        debug!(bytes = text.len(), "sending frame");
        if link.outbound.send(Frame::Text(text)).is_err() {
            self.lost("pump stopped before send");
            return Err(ChannelError::Closed);
        }
        Ok(())
    }

    /// Next inbound event in arrival order
    ///
    /// `None` when no link is open. A lost link is reported once as
    /// `Disconnected`, after which the manager is closed. Cancel safe.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }
        let link = self.link.as_mut()?;
        match link.inbound.recv().await {
            Some(ChannelEvent::Disconnected(reason)) => {
                self.lost(&reason);
                Some(ChannelEvent::Disconnected(reason))
            }
            Some(event) => Some(event),
            None => {
                let reason = "channel closed".to_string();
                self.lost(&reason);
                Some(ChannelEvent::Disconnected(reason))
            }
        }
    }

    /// Send a close frame and stop the pump. Idempotent.
    pub async fn close(&mut self) {
        let Some(link) = self.link.take() else {
            self.status = ConnectionStatus::Disconnected;
            return;
        };

        let Link {
            outbound, mut pump, ..
        } = link;
        let _ = outbound.send(Frame::Close);
        if timeout(CLOSE_GRACE, &mut pump).await.is_err() {
            pump.abort();
        }
        self.status = ConnectionStatus::Disconnected;
        info!(url = %self.url, "channel closed");
    }

    async fn connect_once(&self) -> Result<Link, ChannelError> {
        match timeout(self.connect_timeout, self.transport.connect(&self.url)).await {
            Ok(result) => result,
            Err(_) => Err(ChannelError::Timeout(self.connect_timeout)),
        }
    }

    fn lost(&mut self, reason: &str) {
        warn!(url = %self.url, reason, "channel lost");
        self.abort_link();
    }

    fn abort_link(&mut self) {
        if let Some(link) = self.link.take() {
            link.pump.abort();
        }
        self.status = ConnectionStatus::Disconnected;
    }
}

impl Drop for ChannelManager {
    fn drop(&mut self) {
        if let Some(link) = self.link.take() {
            link.pump.abort();
        }
    }
}
