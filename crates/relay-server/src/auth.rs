//! Bearer token checks.

use std::sync::Arc;

use async_trait::async_trait;
use relay_auth::{AuthProvider, TokenRecord};

use crate::{Flow, Middleware, RelayError, RelayRequest};

/// Validate the request's credentials against `provider`.
///
/// # Errors
/// Returns `MissingToken` when the request carries no token, otherwise
/// the provider's verdict.
pub fn authenticate(
    provider: &AuthProvider,
    request: &RelayRequest,
) -> Result<TokenRecord, RelayError> {
    let token = request.credentials().ok_or(RelayError::MissingToken)?;
    Ok(provider.validate_token(token)?)
}

/// Middleware that rejects requests without a valid token.
///
/// The server already authenticates every request when built with
/// [`crate::Server::with_auth`]; this is for chains that need the check
/// at a specific position, e.g. after a public health-check responder.
pub struct AuthMiddleware {
    provider: Arc<AuthProvider>,
}

impl AuthMiddleware {
    #[must_use]
    pub const fn new(provider: Arc<AuthProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Middleware for AuthMiddleware {
    async fn process(&self, request: &RelayRequest) -> Flow {
        match authenticate(&self.provider, request) {
            Ok(_) => Flow::Continue,
            Err(e) => {
                tracing::warn!(code = e.code(), "Rejected request in auth middleware");
                Flow::Respond(e.into_response())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::{HeaderValue, StatusCode, header};
    use tokio_test::assert_err;

    use super::*;

    fn bearer(token: &str) -> RelayRequest {
        RelayRequest::default().with_header(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        )
    }

    #[test]
    fn test_authenticate() {
        let provider = AuthProvider::new(Duration::from_secs(60));
        let token = provider.generate_token(Some("svc"));

        let record = authenticate(&provider, &bearer(&token)).unwrap();
        assert_eq!(record.subject.as_deref(), Some("svc"));

        let err = assert_err!(authenticate(&provider, &RelayRequest::default()));
        assert_eq!(err.code(), "missing_token");

        let err = assert_err!(authenticate(&provider, &bearer("forged")));
        assert_eq!(err.code(), "token_not_found");
    }

    #[tokio::test]
    async fn test_middleware_flow() {
        let provider = Arc::new(AuthProvider::new(Duration::from_secs(60)));
        let token = provider.generate_token(None);
        let middleware = AuthMiddleware::new(Arc::clone(&provider));

        assert!(matches!(
            middleware.process(&bearer(&token)).await,
            Flow::Continue
        ));

        match middleware.process(&RelayRequest::default()).await {
            Flow::Respond(response) => assert_eq!(response.status, StatusCode::UNAUTHORIZED),
            Flow::Continue => panic!("request without token passed"),
        }
    }
}
