//! WebSocket message types for the query protocol. Client ↔ server JSON.
//!
//! Client → server, once per session: `{"query": "..."}`.
//! Server → client: status frames tagged by `state` (`"PROCESSING"`, `""`,
//! `"SUCCESS"`). Any other `state` decodes to [`ServerFrame::Unrecognized`]
//! and is left for the session to reject.

use serde::{Deserialize, Serialize};

/// Client → server: query message.
#[derive(Debug, Clone, Serialize)]
pub struct QueryRequest<'a> {
    pub query: &'a str,
}

/// One cited passage backing an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub text: String,
    pub citation: String,
}

impl Source {
    pub fn citation(&self) -> Citation {
        Citation::parse(&self.citation)
    }
}

/// Citation split into its title and optional URL (`"Title - https://..."`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Citation {
    pub title: String,
    pub url: Option<String>,
}

impl Citation {
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(" - ") {
            Some((title, url)) => {
                let url = url.trim();
                Self {
                    title: title.trim().to_string(),
                    url: (!url.is_empty()).then(|| url.to_string()),
                }
            }
            None => Self {
                title: raw.trim().to_string(),
                url: None,
            },
        }
    }
}

/// Final answer for one query, in server order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResult {
    pub query: String,
    pub result: String,
    pub sources: Vec<Source>,
}

/// One decoded server frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFrame {
    /// `"state": "PROCESSING"`
    Processing,
    /// `"state": ""`
    Empty,
    /// `"state": "SUCCESS"` with the full result.
    Success(QueryResult),
    /// Any other state value.
    Unrecognized(String),
}

/// Frame could not be decoded.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame has no string `state` field")]
    MissingState,

    #[error("malformed {state:?} frame: {source}")]
    Malformed {
        state: String,
        #[source]
        source: serde_json::Error,
    },
}

const STATE_PROCESSING: &str = "PROCESSING";
const STATE_SUCCESS: &str = "SUCCESS";

/// Serialize the one request sent per session.
pub fn encode_request(query: &str) -> String {
    // A struct holding one &str always serializes.
    serde_json::to_string(&QueryRequest { query }).unwrap_or_default()
}

/// Parse one inbound frame. Unknown extra fields are ignored.
pub fn decode_frame(payload: &[u8]) -> Result<ServerFrame, DecodeError> {
    let value: serde_json::Value = serde_json::from_slice(payload)?;
    let state = value
        .get("state")
        .and_then(|s| s.as_str())
        .ok_or(DecodeError::MissingState)?;
    match state {
        STATE_PROCESSING => Ok(ServerFrame::Processing),
        "" => Ok(ServerFrame::Empty),
        STATE_SUCCESS => {
            let state = state.to_string();
            let result: QueryResult = serde_json::from_value(value)
                .map_err(|source| DecodeError::Malformed { state, source })?;
            Ok(ServerFrame::Success(result))
        }
        other => Ok(ServerFrame::Unrecognized(other.to_string())),
    }
}
