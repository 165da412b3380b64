//! Token-based authentication for the relay runtime.
//!
//! Provides:
//! - `AuthProvider` - Issue, validate, revoke and expire opaque tokens
//! - `TokenRecord` - What the provider remembers about a token

pub mod provider;

pub use provider::{AuthError, AuthProvider, TokenRecord};
