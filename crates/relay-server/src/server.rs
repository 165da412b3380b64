//! Request dispatch.

use std::{
    any::Any,
    collections::HashMap,
    future::Future,
    panic::AssertUnwindSafe,
    sync::{Arc, PoisonError, RwLock},
};

use axum::http::StatusCode;
use futures::{FutureExt, StreamExt, TryStreamExt, stream::BoxStream};
use relay_auth::{AuthProvider, TokenRecord};
use relay_core::{Message, MessageType, RelayConfig};
use relay_session::{Session, SessionManager};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::{
    Chunk, Flow, Handler, HandlerError, Middleware, RelayError, RelayRequest, RelayResponse,
    Reply,
    auth::authenticate,
    protocol::{CONNECTED, parse_message},
};

/// Chunks buffered per stream before the producer waits for the client.
const STREAM_BUFFER: usize = 32;

/// Relay server: middleware chain, optional token check and one handler per
/// message type.
///
/// Registries are per instance, so independent servers can run side by side
/// in one process.
pub struct Server {
    sessions: Arc<SessionManager>,
    auth: Option<Arc<AuthProvider>>,
    handlers: RwLock<HashMap<MessageType, Arc<dyn Handler>>>,
    middleware: RwLock<Vec<Arc<dyn Middleware>>>,
    max_message_length: usize,
}

impl Default for Server {
    fn default() -> Self {
        Self::new(&RelayConfig::default())
    }
}

impl Server {
    /// Create a server without authentication.
    #[must_use]
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            sessions: Arc::new(SessionManager::from_config(&config.server)),
            auth: None,
            handlers: RwLock::new(HashMap::new()),
            middleware: RwLock::new(Vec::new()),
            max_message_length: config.message.max_length,
        }
    }

    /// Require a valid token on every request.
    #[must_use]
    pub fn with_auth(mut self, provider: Arc<AuthProvider>) -> Self {
        self.auth = Some(provider);
        self
    }

    #[must_use]
    pub fn auth_provider(&self) -> Option<&Arc<AuthProvider>> {
        self.auth.as_ref()
    }

    #[must_use]
    pub const fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Register the handler for a message type, replacing any previous one.
    pub fn register_handler(&self, kind: MessageType, handler: impl Handler + 'static) {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        if handlers.insert(kind.clone(), Arc::new(handler)).is_some() {
            tracing::debug!(%kind, "Replaced handler");
        } else {
            tracing::debug!(%kind, "Registered handler");
        }
    }

    /// Append a middleware to the chain.
    pub fn register_middleware(&self, middleware: impl Middleware + 'static) {
        let mut chain = self.middleware.write().unwrap_or_else(PoisonError::into_inner);
        chain.push(Arc::new(middleware));
        tracing::debug!(position = chain.len(), "Registered middleware");
    }

    /// Check the request's token when authentication is configured.
    ///
    /// Returns `None` on servers without an auth provider.
    ///
    /// # Errors
    /// Returns the authentication failure.
    pub fn authorize(&self, request: &RelayRequest) -> Result<Option<TokenRecord>, RelayError> {
        self.auth
            .as_deref()
            .map(|provider| authenticate(provider, request))
            .transpose()
    }

    /// Handle one request. Every failure is rendered as a response.
    pub async fn handle(&self, request: RelayRequest) -> RelayResponse {
        match self.dispatch(&request).await {
            Ok(response) => response,
            Err(e) => {
                match &e {
                    RelayError::Handler(inner) => tracing::error!("Handler failed: {inner}"),
                    RelayError::NoHandler(kind) => tracing::debug!(%kind, "No handler"),
                    other => tracing::warn!(code = other.code(), "Rejected request: {other}"),
                }
                e.into_response()
            }
        }
    }

    async fn dispatch(&self, request: &RelayRequest) -> Result<RelayResponse, RelayError> {
        let chain = self
            .middleware
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for middleware in chain {
            if let Flow::Respond(response) = middleware.process(request).await {
                return Ok(response);
            }
        }

        self.authorize(request)?;
        let message = parse_message(&request.body, self.max_message_length)?;

        if request.wants_stream() {
            self.stream(request, message).await
        } else {
            self.respond_once(message).await
        }
    }

    fn handler_for(&self, kind: &MessageType) -> Option<Arc<dyn Handler>> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(kind)
            .cloned()
    }

    async fn respond_once(&self, message: Message) -> Result<RelayResponse, RelayError> {
        let handler = self
            .handler_for(message.kind())
            .ok_or_else(|| RelayError::NoHandler(message.kind().clone()))?;

        let body = match invoke(handler, message).await? {
            Reply::Message(message) => message.to_json(),
            Reply::Json(value) => value,
            Reply::Stream(chunks) => {
                let collected = guarded(chunks.map_ok(Chunk::into_data).try_collect::<Vec<_>>())
                    .await??;
                Value::Array(collected)
            }
        };
        Ok(RelayResponse::json(StatusCode::OK, body))
    }

    async fn stream(
        &self,
        request: &RelayRequest,
        message: Message,
    ) -> Result<RelayResponse, RelayError> {
        let session = self
            .sessions
            .resolve(
                request.session_id(),
                request.last_event_id().map(str::to_owned),
            )
            .await?;
        let handler = self.handler_for(message.kind());
        self.sessions.mark_active(&session.id).await;

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let response = RelayResponse::stream(&session.id, ReceiverStream::new(rx).boxed());
        let emitter = Emitter {
            sessions: Arc::clone(&self.sessions),
            last_id: session.events_sent,
            session,
            tx,
        };
        tokio::spawn(emitter.run(handler, message));

        Ok(response)
    }

    /// Look up a live session.
    pub async fn get_session(&self, id: &str) -> Option<Session> {
        self.sessions.get(id).await
    }

    /// Remove expired sessions, returning how many were removed.
    pub async fn cleanup_sessions(&self) -> usize {
        self.sessions.cleanup().await
    }
}

/// Producer side of one streamed response.
struct Emitter {
    sessions: Arc<SessionManager>,
    session: Session,
    /// Last id this stream emitted.
    last_id: u64,
    tx: mpsc::Sender<Chunk>,
}

impl Emitter {
    async fn run(mut self, handler: Option<Arc<dyn Handler>>, message: Message) {
        let session_id = self.session.id.clone();

        let mut delivered = self
            .send(Chunk::from_message(&Message::assistant(CONNECTED)))
            .await;

        let outcome = match handler {
            Some(handler) => invoke(handler, message).await,
            None => Ok(Reply::Message(Message::assistant(
                RelayError::NoHandler(message.kind().clone()).to_string(),
            ))),
        };
        // the handler runs to completion even when the client is gone
        delivered &= match outcome {
            Ok(Reply::Message(message)) => self.send(Chunk::from_message(&message)).await,
            Ok(Reply::Json(value)) => self.send(Chunk::message(value)).await,
            Ok(Reply::Stream(chunks)) => self.forward(chunks).await,
            Err(e) => self.fail(&e).await,
        };

        self.sessions.close(&session_id).await;
        tracing::debug!(
            session_id = %session_id,
            last_event_id = self.last_id,
            delivered,
            "Stream finished"
        );
    }

    async fn forward(&mut self, chunks: BoxStream<'static, Result<Chunk, HandlerError>>) -> bool {
        let mut chunks = AssertUnwindSafe(chunks).catch_unwind();
        while let Some(item) = chunks.next().await {
            let chunk = match item {
                Ok(Ok(chunk)) => chunk,
                Ok(Err(e)) => return self.fail(&e).await,
                Err(payload) => return self.fail(&panicked(payload.as_ref())).await,
            };
            if !self.send(chunk).await {
                return false;
            }
        }
        true
    }

    async fn fail(&mut self, error: &HandlerError) -> bool {
        tracing::error!(session_id = %self.session.id, "Handler failed mid-stream: {error}");
        self.send(Chunk::error(error)).await
    }

    /// Number and send a chunk. Returns false once the client has gone.
    ///
    /// Ids come from the session so concurrent streams never share one;
    /// a session swept mid-stream keeps counting locally.
    async fn send(&mut self, chunk: Chunk) -> bool {
        let id = self
            .sessions
            .next_event_id(&self.session.id)
            .await
            .unwrap_or(self.last_id + 1);
        self.last_id = id;
        self.tx.send(chunk.with_id(id)).await.is_ok()
    }
}

async fn invoke(handler: Arc<dyn Handler>, message: Message) -> Result<Reply, HandlerError> {
    guarded(handler.handle(message)).await?
}

/// Await `future`, turning a panic into [`HandlerError::Panicked`].
async fn guarded<F: Future>(future: F) -> Result<F::Output, HandlerError> {
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .map_err(|payload| panicked(payload.as_ref()))
}

fn panicked(payload: &(dyn Any + Send)) -> HandlerError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned());
    HandlerError::Panicked(message)
}
