//! In-memory token provider.

use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock},
    time::Duration,
};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, TimeDelta, Utc};
use rand::{RngCore, rngs::OsRng};
use relay_core::config::AuthConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fewest random bytes a token is generated from.
pub const MIN_TOKEN_BYTES: usize = 16;

/// Authentication error.
///
/// Validation and revocation report failures through this type; the
/// provider never answers with a bare `false`. The two variants stay
/// distinct so callers can tell "log in again" from "unknown credential".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Token not found")]
    TokenNotFound,
    #[error("Token expired at {0}")]
    TokenExpired(DateTime<Utc>),
}

/// Stored token metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub token: String,
    pub subject: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TokenRecord {
    /// Whether the token is still usable at `now`.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Issues and checks opaque bearer tokens.
///
/// Tokens live only in this process. Expired entries are evicted lazily
/// when validated, or in bulk by [`AuthProvider::clear_expired_tokens`].
pub struct AuthProvider {
    tokens: RwLock<HashMap<String, TokenRecord>>,
    expiry: RwLock<Duration>,
    token_bytes: usize,
}

impl Default for AuthProvider {
    fn default() -> Self {
        Self::from_config(&AuthConfig::default())
    }
}

impl AuthProvider {
    /// Create a provider whose tokens last `expiry`.
    #[must_use]
    pub fn new(expiry: Duration) -> Self {
        Self::with_token_bytes(expiry, AuthConfig::default().token_bytes)
    }

    /// Create a provider from configuration.
    #[must_use]
    pub fn from_config(config: &AuthConfig) -> Self {
        Self::with_token_bytes(config.token_expiry(), config.token_bytes)
    }

    fn with_token_bytes(expiry: Duration, token_bytes: usize) -> Self {
        if token_bytes < MIN_TOKEN_BYTES {
            tracing::warn!(
                requested = token_bytes,
                used = MIN_TOKEN_BYTES,
                "Token length too short, raising to minimum"
            );
        }
        Self {
            tokens: RwLock::new(HashMap::new()),
            expiry: RwLock::new(expiry),
            token_bytes: token_bytes.max(MIN_TOKEN_BYTES),
        }
    }

    /// Issue a new token, optionally bound to a subject.
    pub fn generate_token(&self, subject: Option<&str>) -> String {
        let mut bytes = vec![0u8; self.token_bytes];
        OsRng.fill_bytes(&mut bytes);
        let token = URL_SAFE_NO_PAD.encode(&bytes);

        let issued_at = Utc::now();
        let expires_at = add_duration(issued_at, self.expiry_time());
        let record = TokenRecord {
            token: token.clone(),
            subject: subject.map(ToString::to_string),
            issued_at,
            expires_at,
        };

        self.tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token.clone(), record);
        tracing::debug!(subject, %expires_at, "Issued token");

        token
    }

    /// Check a token.
    ///
    /// # Errors
    /// Returns `TokenNotFound` for unknown or revoked tokens and
    /// `TokenExpired` for tokens past their expiry; expired tokens are
    /// removed as a side effect.
    pub fn validate_token(&self, token: &str) -> Result<TokenRecord, AuthError> {
        let now = Utc::now();
        {
            let tokens = self.tokens.read().unwrap_or_else(PoisonError::into_inner);
            let record = tokens.get(token).ok_or(AuthError::TokenNotFound)?;
            if record.is_valid_at(now) {
                return Ok(record.clone());
            }
        }

        let mut tokens = self.tokens.write().unwrap_or_else(PoisonError::into_inner);
        match tokens.get(token) {
            None => Err(AuthError::TokenNotFound),
            Some(record) if record.is_valid_at(now) => Ok(record.clone()),
            Some(record) => {
                let expired_at = record.expires_at;
                tokens.remove(token);
                tracing::debug!(%expired_at, "Evicted expired token");
                Err(AuthError::TokenExpired(expired_at))
            }
        }
    }

    /// Remove a token before its natural expiry.
    ///
    /// # Errors
    /// Returns `TokenNotFound` if the token is unknown.
    pub fn revoke_token(&self, token: &str) -> Result<TokenRecord, AuthError> {
        self.tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(token)
            .ok_or(AuthError::TokenNotFound)
    }

    /// Drop every expired token, returning how many were removed.
    pub fn clear_expired_tokens(&self) -> usize {
        let now = Utc::now();
        let mut tokens = self.tokens.write().unwrap_or_else(PoisonError::into_inner);
        let before = tokens.len();
        tokens.retain(|_, record| record.is_valid_at(now));
        let removed = before - tokens.len();
        if removed > 0 {
            tracing::info!(removed, remaining = tokens.len(), "Cleared expired tokens");
        }
        removed
    }

    /// Change the lifetime of tokens issued from now on.
    pub fn set_expiry_time(&self, expiry: Duration) {
        *self.expiry.write().unwrap_or_else(PoisonError::into_inner) = expiry;
    }

    #[must_use]
    pub fn expiry_time(&self) -> Duration {
        *self.expiry.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of stored tokens, expired ones included until swept.
    #[must_use]
    pub fn token_count(&self) -> usize {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

fn add_duration(start: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(duration)
        .ok()
        .and_then(|delta| start.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use tokio_test::{assert_err, assert_ok};

    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_fresh_token_validates() {
        let provider = AuthProvider::new(HOUR);
        let token = provider.generate_token(Some("alice"));
        let record = assert_ok!(provider.validate_token(&token));
        assert_eq!(record.subject.as_deref(), Some("alice"));
        assert!(record.expires_at > record.issued_at);
    }

    #[test]
    fn test_tokens_are_unique_and_long() {
        let provider = AuthProvider::default();
        let a = provider.generate_token(None);
        let b = provider.generate_token(None);
        assert_ne!(a, b);
        // 32 bytes, base64 without padding
        assert_eq!(a.len(), 43);
        assert_eq!(provider.token_count(), 2);
    }

    #[test]
    fn test_short_token_length_is_raised() {
        let provider = AuthProvider::from_config(&AuthConfig {
            token_expiry_minutes: 1,
            token_bytes: 4,
        });
        assert_eq!(provider.generate_token(None).len(), 22);
    }

    #[test]
    fn test_unbounded_expiry_does_not_overflow() {
        let provider = AuthProvider::from_config(&AuthConfig {
            token_expiry_minutes: u64::MAX,
            token_bytes: 32,
        });
        let token = provider.generate_token(None);
        let record = assert_ok!(provider.validate_token(&token));
        assert_eq!(record.expires_at, DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_unknown_token_not_found() {
        let provider = AuthProvider::default();
        assert_eq!(
            provider.validate_token("nope"),
            Err(AuthError::TokenNotFound)
        );
    }

    #[test]
    fn test_expired_token_is_reported_and_evicted() {
        let provider = AuthProvider::new(Duration::from_millis(20));
        let token = provider.generate_token(None);
        thread::sleep(Duration::from_millis(50));

        let err = assert_err!(provider.validate_token(&token));
        assert!(matches!(err, AuthError::TokenExpired(_)));
        assert_eq!(provider.token_count(), 0);
        assert_eq!(
            provider.validate_token(&token),
            Err(AuthError::TokenNotFound)
        );
    }

    #[test]
    fn test_revoke() {
        let provider = AuthProvider::new(HOUR);
        let token = provider.generate_token(None);
        assert_ok!(provider.revoke_token(&token));
        assert_eq!(
            provider.validate_token(&token),
            Err(AuthError::TokenNotFound)
        );
        assert_eq!(provider.revoke_token(&token), Err(AuthError::TokenNotFound));
    }

    #[test]
    fn test_clear_expired_is_idempotent() {
        let provider = AuthProvider::new(Duration::ZERO);
        provider.generate_token(None);
        provider.generate_token(None);
        provider.set_expiry_time(HOUR);
        let kept = provider.generate_token(None);

        assert_eq!(provider.clear_expired_tokens(), 2);
        assert_eq!(provider.clear_expired_tokens(), 0);
        assert_eq!(provider.token_count(), 1);
        assert_ok!(provider.validate_token(&kept));
    }

    #[test]
    fn test_expiry_change_is_not_retroactive() {
        let provider = AuthProvider::new(HOUR);
        let early = provider.generate_token(None);
        provider.set_expiry_time(Duration::ZERO);
        let late = provider.generate_token(None);

        assert_eq!(provider.expiry_time(), Duration::ZERO);
        assert_ok!(provider.validate_token(&early));
        assert!(matches!(
            provider.validate_token(&late),
            Err(AuthError::TokenExpired(_))
        ));
    }

    #[test]
    fn test_concurrent_generate_and_sweep() {
        let provider = Arc::new(AuthProvider::new(HOUR));
        thread::scope(|s| {
            for _ in 0..4 {
                let provider = Arc::clone(&provider);
                s.spawn(move || {
                    for _ in 0..50 {
                        provider.generate_token(None);
                        provider.clear_expired_tokens();
                    }
                });
            }
        });
        assert_eq!(provider.token_count(), 200);
    }

    #[test]
    fn test_record_serializes() {
        let provider = AuthProvider::new(HOUR);
        let token = provider.generate_token(Some("svc"));
        let record = assert_ok!(provider.validate_token(&token));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["subject"], "svc");
        assert_eq!(json["token"], token.as_str());
    }
}
