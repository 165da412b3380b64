//! Message dispatch and streaming for the relay runtime.
//!
//! Provides:
//! - `Server` - Middleware chain, authentication, type-keyed handlers
//! - Streaming responses as ordered chunk sequences bound to sessions
//! - Wire protocol (request parsing, chunks, SSE encoding)
//! - Axum router adapter (feature: http)

pub mod auth;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod request;
pub mod server;

#[cfg(feature = "http")]
pub mod http;

pub use auth::AuthMiddleware;
pub use error::{HandlerError, RelayError};
pub use handler::{Flow, Handler, Middleware, Reply};
pub use protocol::Chunk;
pub use request::{ChunkStream, RelayRequest, RelayResponse, ResponseBody};
pub use server::Server;

#[cfg(feature = "http")]
pub use http::router;
