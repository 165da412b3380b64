//! Transport-neutral request and response envelopes.

use std::collections::HashMap;

use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use bytes::Bytes;
use futures::stream::BoxStream;
use serde_json::Value;

use crate::{
    Chunk,
    protocol::{EVENT_STREAM, LAST_EVENT_ID_HEADER, SESSION_HEADER, TOKEN_QUERY_PARAM},
};

/// Ordered chunks of one streamed response.
pub type ChunkStream = BoxStream<'static, Chunk>;

/// Inbound request as seen by the server.
#[derive(Debug, Clone, Default)]
pub struct RelayRequest {
    pub headers: HeaderMap,
    pub query: HashMap<String, String>,
    pub body: Bytes,
}

impl RelayRequest {
    /// Create a request with a raw body.
    #[must_use]
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    /// Create a request with a JSON body.
    #[must_use]
    pub fn json(body: &Value) -> Self {
        Self::new(body.to_string())
    }

    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Ask for a streamed response.
    #[must_use]
    pub fn streaming(self) -> Self {
        self.with_header(header::ACCEPT, HeaderValue::from_static(EVENT_STREAM))
    }

    /// First value of a header, if it is valid text.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Whether the client accepts an event stream.
    #[must_use]
    pub fn wants_stream(&self) -> bool {
        self.headers
            .get_all(header::ACCEPT)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|media| {
                media
                    .split(';')
                    .next()
                    .is_some_and(|m| m.trim().eq_ignore_ascii_case(EVENT_STREAM))
            })
    }

    /// Session id the client wants to resume.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.header(SESSION_HEADER).filter(|s| !s.trim().is_empty())
    }

    #[must_use]
    pub fn last_event_id(&self) -> Option<&str> {
        self.header(LAST_EVENT_ID_HEADER)
    }

    /// Bearer token from `Authorization`, else the `token` query parameter.
    #[must_use]
    pub fn credentials(&self) -> Option<&str> {
        let bearer = self
            .header(header::AUTHORIZATION.as_str())
            .and_then(|value| value.trim().split_once(char::is_whitespace))
            .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
            .map(|(_, token)| token.trim())
            .filter(|token| !token.is_empty());

        bearer.or_else(|| {
            self.query
                .get(TOKEN_QUERY_PARAM)
                .map(String::as_str)
                .filter(|token| !token.is_empty())
        })
    }
}

/// Body of a [`RelayResponse`].
pub enum ResponseBody {
    Json(Value),
    Stream(ChunkStream),
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json(value) => f.debug_tuple("Json").field(value).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Outbound response produced by the server or a middleware.
#[derive(Debug)]
pub struct RelayResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResponseBody,
}

impl RelayResponse {
    /// JSON response with the given status.
    #[must_use]
    pub fn json(status: StatusCode, body: Value) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        Self {
            status,
            headers,
            body: ResponseBody::Json(body),
        }
    }

    /// Event-stream response bound to a session.
    #[must_use]
    pub fn stream(session_id: &str, chunks: ChunkStream) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(EVENT_STREAM));
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        if let Ok(value) = HeaderValue::from_str(session_id) {
            headers.insert(SESSION_HEADER, value);
        }
        Self {
            status: StatusCode::OK,
            headers,
            body: ResponseBody::Stream(chunks),
        }
    }

    /// Session id header, present on streamed responses.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
    }

    #[must_use]
    pub const fn json_body(&self) -> Option<&Value> {
        match &self.body {
            ResponseBody::Json(value) => Some(value),
            ResponseBody::Stream(_) => None,
        }
    }

    #[must_use]
    pub fn into_chunks(self) -> Option<ChunkStream> {
        match self.body {
            ResponseBody::Stream(chunks) => Some(chunks),
            ResponseBody::Json(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_auth(value: &'static str) -> RelayRequest {
        RelayRequest::default().with_header(header::AUTHORIZATION, HeaderValue::from_static(value))
    }

    #[test]
    fn test_bearer_credentials() {
        assert_eq!(with_auth("Bearer abc123").credentials(), Some("abc123"));
        assert_eq!(with_auth("bearer   abc123 ").credentials(), Some("abc123"));
        assert_eq!(with_auth("Basic dXNlcg==").credentials(), None);
        assert_eq!(with_auth("Bearer").credentials(), None);
        assert_eq!(with_auth("abc123").credentials(), None);
    }

    #[test]
    fn test_query_token_fallback() {
        let request = RelayRequest::default().with_query("token", "q-token");
        assert_eq!(request.credentials(), Some("q-token"));

        let request = with_auth("Bearer h-token").with_query("token", "q-token");
        assert_eq!(request.credentials(), Some("h-token"));
    }

    #[test]
    fn test_wants_stream() {
        assert!(!RelayRequest::default().wants_stream());
        assert!(RelayRequest::default().streaming().wants_stream());

        let request = RelayRequest::default().with_header(
            header::ACCEPT,
            HeaderValue::from_static("application/json, text/event-stream;q=0.9"),
        );
        assert!(request.wants_stream());
    }

    #[test]
    fn test_session_headers() {
        let request = RelayRequest::default()
            .with_header(
                HeaderName::from_static(SESSION_HEADER),
                HeaderValue::from_static("s-1"),
            )
            .with_header(
                HeaderName::from_static(LAST_EVENT_ID_HEADER),
                HeaderValue::from_static("7"),
            );
        assert_eq!(request.session_id(), Some("s-1"));
        assert_eq!(request.last_event_id(), Some("7"));
    }

    #[test]
    fn test_stream_response_headers() {
        let response = RelayResponse::stream("abc", Box::pin(futures::stream::empty()));
        assert_eq!(response.session_id(), Some("abc"));
        assert_eq!(response.headers[header::CONTENT_TYPE], EVENT_STREAM);
        assert!(response.json_body().is_none());
    }
}
