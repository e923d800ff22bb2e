//! Fake transport for testing
//!
//! An in-process peer instead of a socket. Tests drive it through the
//! `FakeServer` handle: queue scripted replies, push frames, drop the
//! connection, refuse connects, inspect what the client sent.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, oneshot};

use super::transport_types::{ChannelError, ChannelEvent, ChannelTransport, Frame, Link};

#[derive(Debug, Default)]
struct FakeState {
    refusals: u32,
    refuse_all: bool,
    attempts: u32,
    connections: u32,
    closes: u32,
    /// Text frames received from the client
    sent: Vec<String>,
    /// Replies, one batch per received frame
    scripts: VecDeque<Vec<String>>,
    /// Generation of the live connection
    generation: u64,
    peer: Option<mpsc::UnboundedSender<ChannelEvent>>,
    kill: Option<oneshot::Sender<()>>,
}

fn lock(state: &Mutex<FakeState>) -> MutexGuard<'_, FakeState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fake transport for testing
#[derive(Debug, Clone, Default)]
pub struct FakeTransport {
    state: Arc<Mutex<FakeState>>,
}

/// Test-side handle of a fake transport
#[derive(Debug, Clone)]
pub struct FakeServer {
    state: Arc<Mutex<FakeState>>,
}

impl FakeTransport {
    /// Create a fake transport and the handle controlling it
    pub fn new() -> (Self, FakeServer) {
        let transport = Self::default();
        let server = FakeServer {
            state: Arc::clone(&transport.state),
        };
        (transport, server)
    }
}

impl ChannelTransport for FakeTransport {
    fn connect(&self, _url: &str) -> impl Future<Output = Result<Link, ChannelError>> + Send {
        let state = Arc::clone(&self.state);
        async move {
            let (outbound, outbound_rx) = mpsc::unbounded_channel::<Frame>();
            let (inbound_tx, inbound) = mpsc::unbounded_channel::<ChannelEvent>();
            let (kill_tx, kill_rx) = oneshot::channel::<()>();

            let generation = {
                let mut guard = lock(&state);
                guard.attempts += 1;
                if guard.refuse_all || guard.refusals > 0 {
                    guard.refusals = guard.refusals.saturating_sub(1);
                    return Err(ChannelError::Connect("connection refused".to_string()));
                }
                guard.connections += 1;
                guard.generation += 1;
                guard.peer = Some(inbound_tx.clone());
                guard.kill = Some(kill_tx);
                guard.generation
            };

            let pump = tokio::spawn(run_pump(
                state,
                generation,
                outbound_rx,
                inbound_tx,
                kill_rx,
            ));

            Ok(Link {
                outbound,
                inbound,
                pump,
            })
        }
    }
}

async fn run_pump(
    state: Arc<Mutex<FakeState>>,
    generation: u64,
    mut outbound_rx: mpsc::UnboundedReceiver<Frame>,
    inbound_tx: mpsc::UnboundedSender<ChannelEvent>,
    mut kill_rx: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            frame = outbound_rx.recv() => match frame {
                Some(Frame::Text(text)) => {
                    let replies = {
                        let mut guard = lock(&state);
                        guard.sent.push(text);
                        guard.scripts.pop_front()
                    };
                    for reply in replies.into_iter().flatten() {
                        let _ = inbound_tx.send(ChannelEvent::from_frame(&reply));
                    }
                }
                Some(Frame::Close) | None => {
                    lock(&state).closes += 1;
                    break;
                }
            },
            _ = &mut kill_rx => break,
        }
    }

    let mut guard = lock(&state);
    if guard.generation == generation {
        guard.peer = None;
        guard.kill = None;
    }
}

impl FakeServer {
    /// Refuse the next `count` connect attempts
    pub fn refuse_next(&self, count: u32) {
        lock(&self.state).refusals = count;
    }

    /// Refuse every connect attempt until switched off
    pub fn refuse_all(&self, refuse: bool) {
        lock(&self.state).refuse_all = refuse;
    }

    /// Queue the frames to answer the next client message with
    pub fn reply_with<I, S>(&self, frames: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let batch = frames.into_iter().map(Into::into).collect();
        lock(&self.state).scripts.push_back(batch);
    }

    /// Deliver one frame on the live connection. False when none is live.
    pub fn push(&self, frame: &str) -> bool {
        match lock(&self.state).peer.as_ref() {
            Some(peer) => peer.send(ChannelEvent::from_frame(frame)).is_ok(),
            None => false,
        }
    }

    /// Drop the live connection as if the peer went away
    ///
    /// The `Disconnected` event is queued before this returns; the pump
    /// stops once it is next scheduled.
    pub fn drop_connection(&self, reason: &str) -> bool {
        let mut guard = lock(&self.state);
        let delivered = guard
            .peer
            .take()
            .is_some_and(|peer| peer.send(ChannelEvent::Disconnected(reason.to_string())).is_ok());
        if let Some(kill) = guard.kill.take() {
            let _ = kill.send(());
        }
        delivered
    }

    pub fn sent(&self) -> Vec<String> {
        lock(&self.state).sent.clone()
    }

    /// Connect attempts, refused ones included
    pub fn attempts(&self) -> u32 {
        lock(&self.state).attempts
    }

    pub fn connections(&self) -> u32 {
        lock(&self.state).connections
    }

    /// Close frames received from the client
    pub fn closes(&self) -> u32 {
        lock(&self.state).closes
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.state).peer.is_some()
    }
}
