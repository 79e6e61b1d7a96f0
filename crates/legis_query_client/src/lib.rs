//! Legislation query client library: message codec, WebSocket connection
//! manager, query session state machine and its controller.
//! Used by the `legis-query` terminal client.

pub mod config;
pub mod connection;
pub mod controller;
pub mod messages;
pub mod render;
pub mod session;

pub use config::{default_config_path, ClientSection, Config, ConfigError, ServerSection};
pub use connection::{
    Connection, ConnectionError, ConnectionEvent, Connector, Generation, LinkEvent, Phase,
    WsConnection, WsConnector,
};
pub use controller::{run_query, Outcome, Renderer, SessionController, Snapshot};
pub use messages::{decode_frame, encode_request, Citation, DecodeError, QueryResult, ServerFrame, Source};
pub use render::{JsonRenderer, TextRenderer};
pub use session::{ErrorKind, Session, SessionError, SessionState};
