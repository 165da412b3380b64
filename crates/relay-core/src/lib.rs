//! Core types and conversation services for the relay runtime.
//!
//! This crate provides the fundamental building blocks:
//! - `Message` - Immutable role/content/type value
//! - `Memory` - Bounded FIFO conversation history
//! - `Context` - Key/value store with an attached `Memory`
//! - `Progress` - Clamped progress counter with status and metadata
//! - `RelayConfig` - Externally supplied runtime settings

pub mod config;
pub mod context;
pub mod error;
pub mod memory;
pub mod message;
pub mod progress;

pub use config::RelayConfig;
pub use context::{Context, ContextSnapshot};
pub use error::CoreError;
pub use memory::Memory;
pub use message::{Message, MessageType, Role};
pub use progress::{Progress, ProgressSnapshot};
