//! Handler and middleware traits.

use std::future::Future;

use async_trait::async_trait;
use futures::{Stream, StreamExt, stream::BoxStream};
use relay_core::Message;
use serde_json::Value;

use crate::{Chunk, HandlerError, RelayRequest, RelayResponse};

/// What a handler produces for one message.
pub enum Reply {
    /// A single message, sent as one chunk when streaming.
    Message(Message),
    /// Arbitrary JSON, sent as one chunk when streaming.
    Json(Value),
    /// Chunks produced incrementally, relayed in order.
    ///
    /// Non-streaming requests receive the chunk payloads as a JSON array.
    Stream(BoxStream<'static, Result<Chunk, HandlerError>>),
}

impl Reply {
    /// Wrap a chunk stream.
    pub fn stream<S>(chunks: S) -> Self
    where
        S: Stream<Item = Result<Chunk, HandlerError>> + Send + 'static,
    {
        Self::Stream(chunks.boxed())
    }
}

impl std::fmt::Debug for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Message(message) => f.debug_tuple("Message").field(message).finish(),
            Self::Json(value) => f.debug_tuple("Json").field(value).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<Message> for Reply {
    fn from(message: Message) -> Self {
        Self::Message(message)
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

/// Produces a reply for messages of one type.
///
/// Any `Fn(Message) -> impl Future<Output = Result<Reply, HandlerError>>`
/// is a handler.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, message: Message) -> Result<Reply, HandlerError>;
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Reply, HandlerError>> + Send + 'static,
{
    async fn handle(&self, message: Message) -> Result<Reply, HandlerError> {
        self(message).await
    }
}

/// Outcome of a middleware step.
#[derive(Debug)]
pub enum Flow {
    /// Hand the request to the next step.
    Continue,
    /// Answer now; later middleware, authentication and handlers are skipped.
    Respond(RelayResponse),
}

/// Pre-processing step run on the raw request, in registration order.
///
/// Any `Fn(&RelayRequest) -> Flow` is a middleware.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn process(&self, request: &RelayRequest) -> Flow;
}

#[async_trait]
impl<F> Middleware for F
where
    F: Fn(&RelayRequest) -> Flow + Send + Sync + 'static,
{
    async fn process(&self, request: &RelayRequest) -> Flow {
        self(request)
    }
}
