//! Wire protocol for client-server communication.

use relay_core::{Message, MessageType, Role};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::RelayError;

/// Header carrying the streaming session id, in both directions.
pub const SESSION_HEADER: &str = "mcp-session-id";
/// Header with the last event id the client saw.
pub const LAST_EVENT_ID_HEADER: &str = "last-event-id";
/// Media type that selects the streaming path.
pub const EVENT_STREAM: &str = "text/event-stream";
/// Query parameter accepted in place of a bearer header.
pub const TOKEN_QUERY_PARAM: &str = "token";

/// Event name for regular payloads.
pub const MESSAGE_EVENT: &str = "message";
/// Event name for a handler failure reported mid-stream.
pub const ERROR_EVENT: &str = "error";

/// Content of the acknowledgement sent first on every stream.
pub const CONNECTED: &str = "Connected to relay server";

/// Message body sent by clients.
///
/// Every field is optional on the wire: role defaults to `user`, content
/// to the empty string and type to `text`.
#[derive(Debug, Clone, Default, Deserialize)]
struct InboundMessage {
    role: Option<String>,
    content: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// Parse a request body into a message.
///
/// # Errors
/// Returns a validation error for malformed JSON, unknown roles,
/// malformed types, or content longer than `max_length` characters.
pub fn parse_message(body: &[u8], max_length: usize) -> Result<Message, RelayError> {
    let inbound: InboundMessage = serde_json::from_slice(body)
        .map_err(|e| RelayError::Validation(format!("Malformed message body: {e}")))?;

    let role = match inbound.role.as_deref() {
        None => Role::User,
        Some(raw) => raw
            .parse()
            .map_err(|e: relay_core::CoreError| RelayError::Validation(e.to_string()))?,
    };
    let kind = match inbound.kind.as_deref() {
        None => MessageType::Text,
        Some(raw) => raw
            .parse()
            .map_err(|e: relay_core::CoreError| RelayError::Validation(e.to_string()))?,
    };
    let content = inbound.content.unwrap_or_default();
    let length = content.chars().count();
    if length > max_length {
        return Err(RelayError::Validation(format!(
            "Content is {length} characters, limit is {max_length}"
        )));
    }

    Ok(Message::new(role, content, kind))
}

/// One event of a streamed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    event: String,
    data: Value,
}

impl Chunk {
    /// Create a chunk with a custom event name.
    ///
    /// Line breaks are removed from the name so it stays one SSE field.
    #[must_use]
    pub fn new(event: impl Into<String>, data: impl Into<Value>) -> Self {
        let mut event = event.into();
        event.retain(|c| c != '\n' && c != '\r');
        Self {
            id: None,
            event,
            data: data.into(),
        }
    }

    /// Create a `message` chunk.
    #[must_use]
    pub fn message(data: impl Into<Value>) -> Self {
        Self::new(MESSAGE_EVENT, data)
    }

    /// Create a `message` chunk from a message.
    #[must_use]
    pub fn from_message(message: &Message) -> Self {
        Self::message(message.to_json())
    }

    /// Create an `error` chunk.
    #[must_use]
    pub fn error(error: &impl std::fmt::Display) -> Self {
        Self::new(ERROR_EVENT, serde_json::json!({ "error": error.to_string() }))
    }

    #[must_use]
    pub(crate) fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id.to_string());
        self
    }

    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    #[must_use]
    pub fn event(&self) -> &str {
        &self.event
    }

    #[must_use]
    pub const fn data(&self) -> &Value {
        &self.data
    }

    #[must_use]
    pub fn into_data(self) -> Value {
        self.data
    }

    /// Convert to an axum SSE event.
    #[must_use]
    pub fn to_sse_event(&self) -> axum::response::sse::Event {
        let event = axum::response::sse::Event::default()
            .event(&self.event)
            .data(self.data.to_string());
        match &self.id {
            Some(id) => event.id(id),
            None => event,
        }
    }
}
