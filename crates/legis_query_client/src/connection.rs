//! WebSocket connection manager: one socket per instance, reported to its
//! owner as lifecycle events (ready, message, error, closed) tagged with the
//! generation the owner assigned when opening it.
//!
//! Socket I/O runs on a spawned task; events come back over an unbounded
//! channel in the order the transport produced them. Exactly one of
//! `Error`/`Closed` ends an instance's event sequence.

use futures_util::{SinkExt, StreamExt};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// Monotonic tag identifying one connection attempt within a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    pub fn next(self) -> Self {
        Generation(self.0 + 1)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transport lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Ready,
    Message(Vec<u8>),
    Error(String),
    Closed,
}

/// A [`LinkEvent`] plus the generation of the connection that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionEvent {
    pub generation: Generation,
    pub kind: LinkEvent,
}

impl ConnectionEvent {
    pub fn new(generation: Generation, kind: LinkEvent) -> Self {
        Self { generation, kind }
    }
}

pub type EventSender = mpsc::UnboundedSender<ConnectionEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ConnectionEvent>;

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Opening,
    Ready,
    Closed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Opening => "opening",
            Phase::Ready => "ready",
            Phase::Closed => "closed",
        })
    }
}

/// Send attempted outside the ready window.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("connection is not ready for sending ({phase})")]
    NotReady { phase: Phase },
}

/// One owned transport connection.
pub trait Connection {
    fn generation(&self) -> Generation;

    fn phase(&self) -> Phase;

    /// Queue one text frame. Fails before ready and after the owner's own
    /// `close`. Once ready, a frame queued after the peer hung up is dropped;
    /// the owner learns of the end from the pending `Closed`/`Error` event.
    fn send(&mut self, text: String) -> Result<(), ConnectionError>;

    /// Request closure. Idempotent; never fails.
    fn close(&mut self);
}

/// Opens connections whose events go to the owner's event channel.
pub trait Connector {
    type Connection: Connection;

    fn open(&mut self, endpoint: &str, generation: Generation) -> Self::Connection;
}

const OPENING: u8 = 0;
const READY: u8 = 1;
const CLOSED: u8 = 2;
// Transport ended after ready; its terminal event is already queued.
const ENDED: u8 = 3;

fn phase_of(raw: u8) -> Phase {
    match raw {
        OPENING => Phase::Opening,
        READY => Phase::Ready,
        _ => Phase::Closed,
    }
}

enum Outbound {
    Text(String),
    Close,
}

/// Opens WebSocket connections. Outside a tokio runtime nothing is spawned
/// and the connection reports an immediate `Error`.
#[derive(Debug, Clone)]
pub struct WsConnector {
    events: EventSender,
}

impl WsConnector {
    /// Returns the connector and the receiver all its connections report to.
    pub fn new() -> (Self, EventReceiver) {
        let (events, rx) = mpsc::unbounded_channel();
        (Self { events }, rx)
    }
}

impl Connector for WsConnector {
    type Connection = WsConnection;

    fn open(&mut self, endpoint: &str, generation: Generation) -> WsConnection {
        let phase = Arc::new(AtomicU8::new(OPENING));
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!(%endpoint, %generation, "opening connection");
                handle.spawn(drive(
                    endpoint.to_string(),
                    generation,
                    phase.clone(),
                    outbound_rx,
                    self.events.clone(),
                ));
            }
            Err(e) => {
                phase.store(CLOSED, Ordering::SeqCst);
                tracing::warn!(%endpoint, %generation, error = %e, "no runtime to drive connection");
                let _ = self.events.send(ConnectionEvent::new(
                    generation,
                    LinkEvent::Error(e.to_string()),
                ));
            }
        }
        WsConnection {
            generation,
            phase,
            outbound,
        }
    }
}

/// Handle to a WebSocket driven by a background task.
#[derive(Debug)]
pub struct WsConnection {
    generation: Generation,
    phase: Arc<AtomicU8>,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl Connection for WsConnection {
    fn generation(&self) -> Generation {
        self.generation
    }

    fn phase(&self) -> Phase {
        phase_of(self.phase.load(Ordering::SeqCst))
    }

    fn send(&mut self, text: String) -> Result<(), ConnectionError> {
        match self.phase.load(Ordering::SeqCst) {
            READY | ENDED => {
                if self.outbound.send(Outbound::Text(text)).is_err() {
                    tracing::debug!(generation = %self.generation, "peer gone, frame dropped");
                }
                Ok(())
            }
            raw => Err(ConnectionError::NotReady {
                phase: phase_of(raw),
            }),
        }
    }

    fn close(&mut self) {
        if self.phase.swap(CLOSED, Ordering::SeqCst) == CLOSED {
            return;
        }
        tracing::debug!(generation = %self.generation, "closing connection");
        // The task may already be gone; nothing left to stop then.
        let _ = self.outbound.send(Outbound::Close);
    }
}

async fn drive(
    endpoint: String,
    generation: Generation,
    phase: Arc<AtomicU8>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: EventSender,
) {
    let emit = |kind: LinkEvent| {
        // Owner gone means nobody is listening for this generation anymore.
        let _ = events.send(ConnectionEvent::new(generation, kind));
    };

    let ws = tokio::select! {
        res = tokio_tungstenite::connect_async(endpoint.as_str()) => match res {
            Ok((ws, _)) => ws,
            Err(e) => {
                phase.store(CLOSED, Ordering::SeqCst);
                tracing::debug!(%generation, error = %e, "connect failed");
                emit(LinkEvent::Error(e.to_string()));
                return;
            }
        },
        // Nothing can be queued before ready, so any wake-up is a close.
        _ = outbound.recv() => {
            phase.store(CLOSED, Ordering::SeqCst);
            emit(LinkEvent::Closed);
            return;
        }
    };

    let (mut sink, mut stream) = ws.split();

    if phase
        .compare_exchange(OPENING, READY, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        let _ = sink.close().await;
        emit(LinkEvent::Closed);
        return;
    }
    emit(LinkEvent::Ready);

    let terminal = loop {
        tokio::select! {
            cmd = outbound.recv() => match cmd {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        break LinkEvent::Error(e.to_string());
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = sink.close().await;
                    break LinkEvent::Closed;
                }
            },
            item = stream.next() => match item {
                Some(Ok(Message::Text(text))) => emit(LinkEvent::Message(text.into_bytes())),
                Some(Ok(Message::Binary(bytes))) => emit(LinkEvent::Message(bytes)),
                Some(Ok(Message::Close(_))) | None => break LinkEvent::Closed,
                Some(Ok(_)) => {}
                Some(Err(e)) => break LinkEvent::Error(e.to_string()),
            },
        }
    };

    // Only the owner's close makes sends fail; a peer-side end stays
    // accepting until the owner has seen `terminal`.
    let _ = phase.compare_exchange(READY, ENDED, Ordering::SeqCst, Ordering::SeqCst);
    tracing::debug!(%generation, event = ?terminal, "connection finished");
    emit(terminal);
}
