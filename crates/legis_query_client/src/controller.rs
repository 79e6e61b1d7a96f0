//! Session controller: the adapter between an input surface, the session
//! state machine, and a rendering surface.
//!
//! Raw input is trimmed and empty queries are ignored. Every published
//! transition is turned into a read-only [`Snapshot`] for the renderer.
//! Connection events are pumped one at a time on the caller's task.

use serde::Serialize;
use std::time::Duration;
use tokio::sync::watch;

use crate::connection::{Connector, EventReceiver, WsConnector};
use crate::messages::{QueryResult, Source};
use crate::session::{ErrorKind, Session, SessionState};

/// What a rendering surface is handed on each transition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub is_loading: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<Source>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl From<&SessionState> for Snapshot {
    fn from(state: &SessionState) -> Self {
        match state {
            SessionState::Idle => Snapshot::default(),
            SessionState::Connecting { query } | SessionState::Processing { query } => Snapshot {
                is_loading: true,
                query: Some(query.clone()),
                ..Snapshot::default()
            },
            SessionState::Success(result) => Snapshot {
                is_loading: false,
                query: Some(result.query.clone()),
                result: Some(result.result.clone()),
                sources: Some(result.sources.clone()),
                ..Snapshot::default()
            },
            SessionState::Error { kind, message } => Snapshot {
                error_kind: Some(*kind),
                error_message: Some(message.clone()),
                ..Snapshot::default()
            },
        }
    }
}

/// Read-only consumer of session snapshots.
pub trait Renderer {
    fn render(&mut self, snapshot: &Snapshot);
}

impl<F: FnMut(&Snapshot)> Renderer for F {
    fn render(&mut self, snapshot: &Snapshot) {
        self(snapshot)
    }
}

/// How [`SessionController::run`] finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success(QueryResult),
    Failed { kind: ErrorKind, message: String },
    /// Session went back to idle before finishing.
    Cancelled,
    /// Bounded wait elapsed; the session was reset.
    TimedOut(Duration),
}

pub struct SessionController<C: Connector, R: Renderer> {
    session: Session<C>,
    events: EventReceiver,
    states: watch::Receiver<SessionState>,
    renderer: R,
}

impl<C: Connector, R: Renderer> SessionController<C, R> {
    /// `events` must be the channel `session`'s connector reports to.
    pub fn new(session: Session<C>, events: EventReceiver, renderer: R) -> Self {
        let states = session.subscribe();
        Self {
            session,
            events,
            states,
            renderer,
        }
    }

    pub fn session(&self) -> &Session<C> {
        &self.session
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn into_renderer(self) -> R {
        self.renderer
    }

    /// Submit raw input. Whitespace-only input is ignored and returns false.
    pub fn submit(&mut self, raw: &str) -> bool {
        let query = raw.trim();
        if query.is_empty() {
            tracing::debug!("ignoring empty query");
            return false;
        }
        if let Err(e) = self.session.submit(query) {
            tracing::warn!(error = %e, "submit rejected");
            return false;
        }
        self.publish();
        true
    }

    pub fn reset(&mut self) {
        if self.session.reset() {
            self.publish();
        }
    }

    /// Wait for the next connection event and apply it. Returns false once no
    /// further events can arrive.
    pub async fn pump(&mut self) -> bool {
        match self.events.recv().await {
            Some(event) => {
                if self.session.handle(event) {
                    self.publish();
                }
                true
            }
            None => false,
        }
    }

    /// Pump events until the session leaves the loading states. With a
    /// timeout, an unfinished session is reset when it elapses.
    pub async fn run(&mut self, timeout: Option<Duration>) -> Outcome {
        let Some(limit) = timeout else {
            return self.wait_finished().await;
        };
        let finished = tokio::time::timeout(limit, self.wait_finished()).await;
        match finished {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(timeout = ?limit, "query timed out");
                self.reset();
                Outcome::TimedOut(limit)
            }
        }
    }

    async fn wait_finished(&mut self) -> Outcome {
        loop {
            match self.session.state() {
                SessionState::Idle => return Outcome::Cancelled,
                SessionState::Success(result) => return Outcome::Success(result.clone()),
                SessionState::Error { kind, message } => {
                    return Outcome::Failed {
                        kind: *kind,
                        message: message.clone(),
                    }
                }
                SessionState::Connecting { .. } | SessionState::Processing { .. } => {}
            }
            if !self.pump().await {
                tracing::debug!("event channel closed mid-session");
                self.reset();
                return Outcome::Cancelled;
            }
        }
    }

    fn publish(&mut self) {
        if !self.states.has_changed().unwrap_or(false) {
            return;
        }
        let snapshot = Snapshot::from(&*self.states.borrow_and_update());
        self.renderer.render(&snapshot);
    }
}

/// Run one query against `endpoint` over a fresh WebSocket session.
/// Returns `None` when `query` is empty after trimming.
pub async fn run_query<R: Renderer>(
    endpoint: &str,
    query: &str,
    timeout: Option<Duration>,
    renderer: R,
) -> Option<Outcome> {
    let (connector, events) = WsConnector::new();
    let session = Session::new(connector, endpoint);
    let mut controller = SessionController::new(session, events, renderer);
    if !controller.submit(query) {
        return None;
    }
    Some(controller.run(timeout).await)
}
