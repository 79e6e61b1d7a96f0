//! Query session state machine.
//!
//! Drives one query at a time through
//! `Idle → Connecting → Processing → Success | Error`. The session owns at
//! most one connection. Every submit or reset advances the generation and
//! closes the previous connection first, and events whose generation is not
//! current are dropped, so frames from a torn-down socket never reach the
//! new state.
//!
//! Each transition is published whole on a `watch` channel.

use serde::Serialize;
use std::fmt;
use tokio::sync::watch;

use crate::connection::{
    Connection, ConnectionError, ConnectionEvent, Connector, Generation, LinkEvent, Phase,
};
use crate::messages::{self, QueryResult, ServerFrame};

/// Why a session ended in [`SessionState::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Transport could not be established.
    ConnectionFailed,
    /// Transport closed or failed while waiting for the result.
    ConnectionLost,
    /// Undecodable frame or unrecognized `state`.
    ProtocolViolation,
    /// Request send attempted outside the ready window.
    NotReady,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConnectionFailed => "connection_failed",
            ErrorKind::ConnectionLost => "connection_lost",
            ErrorKind::ProtocolViolation => "protocol_violation",
            ErrorKind::NotReady => "not_ready",
        }
    }

    /// Short user-facing description.
    pub fn summary(&self) -> &'static str {
        match self {
            ErrorKind::ConnectionFailed => "Could not connect to the query service.",
            ErrorKind::ConnectionLost => "Lost connection to the query service.",
            ErrorKind::ProtocolViolation => "The query service sent an unexpected response.",
            ErrorKind::NotReady => "The connection was not ready to send the query.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Connecting {
        query: String,
    },
    Processing {
        query: String,
    },
    Success(QueryResult),
    Error {
        kind: ErrorKind,
        message: String,
    },
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Connecting { .. } => "connecting",
            SessionState::Processing { .. } => "processing",
            SessionState::Success(_) => "success",
            SessionState::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Success(_) | SessionState::Error { .. })
    }

    pub fn is_loading(&self) -> bool {
        matches!(
            self,
            SessionState::Connecting { .. } | SessionState::Processing { .. }
        )
    }

    /// Query of an in-flight or successful session.
    pub fn query(&self) -> Option<&str> {
        match self {
            SessionState::Connecting { query } | SessionState::Processing { query } => {
                Some(query.as_str())
            }
            SessionState::Success(result) => Some(result.query.as_str()),
            SessionState::Idle | SessionState::Error { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("query must not be empty")]
    EmptyQuery,
}

/// One query session bound to an endpoint.
pub struct Session<C: Connector> {
    connector: C,
    endpoint: String,
    generation: Generation,
    connection: Option<C::Connection>,
    state: SessionState,
    published: watch::Sender<SessionState>,
}

impl<C: Connector> Session<C> {
    pub fn new(connector: C, endpoint: impl Into<String>) -> Self {
        let (published, _) = watch::channel(SessionState::Idle);
        Self {
            connector,
            endpoint: endpoint.into(),
            generation: Generation::default(),
            connection: None,
            state: SessionState::Idle,
            published,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// True while the session holds an unreleased connection.
    pub fn has_connection(&self) -> bool {
        self.connection.is_some()
    }

    /// Receiver that sees every published state.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.published.subscribe()
    }

    /// Start a new query, cancelling whatever was in progress.
    ///
    /// With [`WsConnector`](crate::connection::WsConnector) this belongs
    /// inside a tokio runtime; without one the attempt ends in
    /// `Error { kind: ConnectionFailed }` once its event is handled.
    pub fn submit(&mut self, query: &str) -> Result<(), SessionError> {
        if query.trim().is_empty() {
            return Err(SessionError::EmptyQuery);
        }
        self.quiesce();
        let connection = self.connector.open(&self.endpoint, self.generation);
        self.connection = Some(connection);
        tracing::info!(generation = %self.generation, endpoint = %self.endpoint, "query submitted");
        self.transition(SessionState::Connecting {
            query: query.to_string(),
        });
        Ok(())
    }

    /// Cancel and return to `Idle`. Returns false when already idle.
    pub fn reset(&mut self) -> bool {
        if self.state == SessionState::Idle && self.connection.is_none() {
            return false;
        }
        self.quiesce();
        tracing::debug!(generation = %self.generation, "session reset");
        self.transition(SessionState::Idle);
        true
    }

    /// Apply one connection event. Returns true if the state changed.
    pub fn handle(&mut self, event: ConnectionEvent) -> bool {
        if event.generation != self.generation {
            tracing::debug!(
                event_generation = %event.generation,
                generation = %self.generation,
                "discarding stale connection event"
            );
            return false;
        }

        let current = std::mem::take(&mut self.state);
        let next = match (current, event.kind) {
            (SessionState::Connecting { query }, LinkEvent::Ready) => {
                match self.send_request(&query) {
                    Ok(()) => SessionState::Processing { query },
                    Err(e) => self.fail(ErrorKind::NotReady, e.to_string()),
                }
            }
            (SessionState::Connecting { .. }, LinkEvent::Message(_)) => self.fail(
                ErrorKind::ProtocolViolation,
                "frame received before the connection was ready".into(),
            ),
            (SessionState::Connecting { .. }, LinkEvent::Error(cause)) => self.fail(
                ErrorKind::ConnectionFailed,
                format!("could not connect to {}: {}", self.endpoint, cause),
            ),
            (SessionState::Connecting { .. }, LinkEvent::Closed) => self.fail(
                ErrorKind::ConnectionFailed,
                format!("connection to {} closed before it was established", self.endpoint),
            ),
            (SessionState::Processing { query }, LinkEvent::Message(payload)) => {
                match messages::decode_frame(&payload) {
                    Ok(ServerFrame::Success(result)) => self.succeed(result),
                    Ok(ServerFrame::Unrecognized(state)) => self.fail(
                        ErrorKind::ProtocolViolation,
                        format!("unrecognized frame state {:?}", state),
                    ),
                    // Still working; nothing to publish.
                    Ok(ServerFrame::Processing | ServerFrame::Empty) => {
                        self.state = SessionState::Processing { query };
                        return false;
                    }
                    Err(e) => self.fail(ErrorKind::ProtocolViolation, e.to_string()),
                }
            }
            (SessionState::Processing { .. }, LinkEvent::Error(cause)) => self.fail(
                ErrorKind::ConnectionLost,
                format!("connection lost while waiting for a result: {}", cause),
            ),
            (SessionState::Processing { .. }, LinkEvent::Closed) => self.fail(
                ErrorKind::ConnectionLost,
                "server closed the connection before sending a result".into(),
            ),
            // Duplicate ready, or anything reaching Idle or a terminal state.
            (current, kind) => {
                tracing::trace!(state = current.name(), event = ?kind, "ignoring event");
                self.state = current;
                return false;
            }
        };
        self.transition(next);
        true
    }

    fn send_request(&mut self, query: &str) -> Result<(), ConnectionError> {
        let request = messages::encode_request(query);
        match self.connection.as_mut() {
            Some(connection) => connection.send(request),
            None => Err(ConnectionError::NotReady {
                phase: Phase::Closed,
            }),
        }
    }

    fn succeed(&mut self, result: QueryResult) -> SessionState {
        self.release();
        tracing::info!(
            generation = %self.generation,
            sources = result.sources.len(),
            "query succeeded"
        );
        SessionState::Success(result)
    }

    fn fail(&mut self, kind: ErrorKind, message: String) -> SessionState {
        self.release();
        tracing::warn!(generation = %self.generation, %kind, %message, "query failed");
        SessionState::Error { kind, message }
    }

    /// Close and drop the current connection, if any.
    fn release(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.close();
        }
    }

    /// Supersede the current generation and close its connection.
    fn quiesce(&mut self) {
        self.generation = self.generation.next();
        self.release();
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!(generation = %self.generation, state = next.name(), "session transition");
        self.state = next.clone();
        self.published.send_replace(next);
    }
}

impl<C: Connector> Drop for Session<C> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<C: Connector> fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.endpoint)
            .field("generation", &self.generation)
            .field("connected", &self.connection.is_some())
            .field("state", &self.state)
            .finish()
    }
}
