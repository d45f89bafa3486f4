//! §4.9 Trust Boundary. The core depends only on this trait; how a caller
//! gets from a login form to a valid bearer credential is out of scope
//! (credential issuance/refresh/revocation is a Non-goal, §1) — this file
//! only draws the line the core sits behind.

use async_trait::async_trait;
use axum::http::HeaderMap;

/// Claims the core trusts once `authenticate` returns `Ok`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: i64,
    pub device_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing or invalid credentials")]
    Unauthenticated,
}

/// Given an HTTP request's headers, resolve the caller's identity. Given a
/// resolved identity, mint a single-use WS ticket.
#[async_trait]
pub trait Authenticator: Send + Sync + 'static {
    async fn authenticate(&self, headers: &HeaderMap) -> Result<AuthenticatedUser, AuthError>;
}

/// Stand-in for the real credential-issuance system (an external
/// collaborator per §1's Non-goals): trusts `X-User-Id`/`X-Device-Id`
/// headers verbatim, the way an internal service would trust headers
/// already validated and injected by an upstream gateway. A production
/// deployment swaps this for an implementation that verifies a session
/// token or JWT; the rest of the core never notices the difference since
/// it only depends on [`Authenticator`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderAuthenticator;

#[async_trait]
impl Authenticator for HeaderAuthenticator {
    async fn authenticate(&self, headers: &HeaderMap) -> Result<AuthenticatedUser, AuthError> {
        let user_id = headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
            .ok_or(AuthError::Unauthenticated)?;
        let device_id = headers
            .get("x-device-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown-device")
            .to_string();
        Ok(AuthenticatedUser { user_id, device_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[tokio::test]
    async fn header_authenticator_reads_identity_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_static("42"));
        headers.insert("x-device-id", HeaderValue::from_static("phone-1"));

        let auth = HeaderAuthenticator;
        let claims = auth.authenticate(&headers).await.unwrap();
        assert_eq!(claims.user_id, 42);
        assert_eq!(claims.device_id, "phone-1");
    }

    #[tokio::test]
    async fn missing_user_id_header_is_unauthenticated() {
        let headers = HeaderMap::new();
        let auth = HeaderAuthenticator;
        assert!(matches!(auth.authenticate(&headers).await, Err(AuthError::Unauthenticated)));
    }
}
