//! Axum adapter.
//!
//! Routes:
//! - `POST /mcp` - relay a message, as JSON or as an event stream
//! - `GET /mcp/sessions/{id}` - inspect a live session

use std::{collections::HashMap, convert::Infallible, sync::Arc};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{
        IntoResponse, Response,
        sse::{KeepAlive, Sse},
    },
    routing::{get, post},
};
use bytes::Bytes;
use futures::StreamExt;
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::{RelayRequest, RelayResponse, ResponseBody, Server};

/// Build a router serving `server`.
#[must_use]
pub fn router(server: Arc<Server>) -> Router {
    Router::new()
        .route("/mcp", post(relay))
        .route("/mcp/sessions/{id}", get(session))
        .layer(TraceLayer::new_for_http())
        .with_state(server)
}

async fn relay(
    State(server): State<Arc<Server>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = RelayRequest {
        headers,
        query,
        body,
    };
    into_http(server.handle(request).await)
}

async fn session(
    State(server): State<Arc<Server>>,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let request = RelayRequest {
        headers,
        query,
        body: Bytes::new(),
    };
    if let Err(e) = server.authorize(&request) {
        tracing::warn!(code = e.code(), "Rejected session lookup");
        return into_http(e.into_response());
    }

    match server.get_session(&id).await {
        Some(session) => Json(session).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": format!("Session not found: {id}"),
                "code": "session_not_found",
            })),
        )
            .into_response(),
    }
}

fn into_http(response: RelayResponse) -> Response {
    let RelayResponse {
        status,
        headers,
        body,
    } = response;
    match body {
        ResponseBody::Json(value) => (status, headers, Json(value)).into_response(),
        ResponseBody::Stream(chunks) => {
            let events = chunks.map(|chunk| Ok::<_, Infallible>(chunk.to_sse_event()));
            (
                status,
                headers,
                Sse::new(events).keep_alive(KeepAlive::default()),
            )
                .into_response()
        }
    }
}
