//! Runtime configuration.
//!
//! Values are supplied from outside (environment or a deserialized file)
//! and handed to each component at construction time.

use std::{env, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

/// Top-level relay settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub memory: MemoryConfig,
    pub message: MessageConfig,
}

/// Session bookkeeping for the streaming path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Minutes after creation before a session is reclaimed.
    pub session_expiry_minutes: u64,
    /// Upper bound on live sessions.
    pub max_sessions: usize,
    /// Origins accepted by the HTTP adapter; `*` allows any.
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            session_expiry_minutes: 60,
            max_sessions: 100,
            allowed_origins: vec!["*".to_string()],
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub const fn session_expiry(&self) -> Duration {
        Duration::from_secs(self.session_expiry_minutes.saturating_mul(60))
    }
}

/// Token issuance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Minutes a freshly issued token stays valid.
    pub token_expiry_minutes: u64,
    /// Random bytes per token, before encoding.
    pub token_bytes: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_expiry_minutes: 60,
            token_bytes: 32,
        }
    }
}

impl AuthConfig {
    #[must_use]
    pub const fn token_expiry(&self) -> Duration {
        Duration::from_secs(self.token_expiry_minutes.saturating_mul(60))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub max_size: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_size: crate::memory::DEFAULT_MAX_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageConfig {
    /// Longest accepted content, in characters.
    pub max_length: usize,
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self { max_length: 4096 }
    }
}

impl RelayConfig {
    /// Read settings from `MCP_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read settings through `lookup`, falling back to defaults for
    /// missing or unparseable values.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let allowed_origins = lookup("MCP_ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
            })
            .filter(|origins| !origins.is_empty())
            .unwrap_or(defaults.server.allowed_origins);

        Self {
            server: ServerConfig {
                session_expiry_minutes: parse_or(
                    &lookup,
                    "MCP_SESSION_EXPIRY",
                    defaults.server.session_expiry_minutes,
                ),
                max_sessions: parse_or(&lookup, "MCP_MAX_CONNECTIONS", defaults.server.max_sessions),
                allowed_origins,
            },
            auth: AuthConfig {
                token_expiry_minutes: parse_or(
                    &lookup,
                    "MCP_TOKEN_EXPIRY",
                    defaults.auth.token_expiry_minutes,
                ),
                token_bytes: parse_or(&lookup, "MCP_TOKEN_LENGTH", defaults.auth.token_bytes),
            },
            memory: MemoryConfig {
                max_size: parse_or(&lookup, "MCP_MEMORY_MAX_SIZE", defaults.memory.max_size),
            },
            message: MessageConfig {
                max_length: parse_or(
                    &lookup,
                    "MCP_MAX_MESSAGE_LENGTH",
                    defaults.message.max_length,
                ),
            },
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Ignoring unparseable config value");
            default
        }),
    }
}
