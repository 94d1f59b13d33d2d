/// Caller identity: client keys for anonymous callers and bearer-token
/// verification for registered accounts.
use crate::error::{ApiError, ApiResult};
use async_trait::async_trait;
use axum::http::HeaderMap;
use std::net::SocketAddr;

/// A verified account identity, as reported by the identity provider
#[derive(Debug, Clone)]
pub struct VerifiedAccount {
    pub id: String,
    pub email: String,
}

/// Token verification capability. The access controller only depends on
/// this trait; the production implementation is [`JwtVerifier`].
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verify an opaque bearer token, failing with an authentication error
    /// when it is invalid or expired.
    async fn verify(&self, token: &str) -> ApiResult<VerifiedAccount>;
}

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

/// Derive a best-effort stable key for an unauthenticated caller.
///
/// Checks forwarded-address headers first, then the socket address, then
/// falls back to a literal sentinel. Callers behind a shared address share
/// one key; that approximation is accepted policy, not a bug.
pub fn client_key(headers: &HeaderMap, remote: Option<SocketAddr>) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|h| h.to_str().ok()) {
        // First hop is the original client
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip").and_then(|h| h.to_str().ok()) {
        let real_ip = real_ip.trim();
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }

    if let Some(addr) = remote {
        return addr.ip().to_string();
    }

    "unknown".to_string()
}

/// Verifies HS256 JWTs issued by the identity provider.
///
/// Expects a `sub` claim carrying the account id; an `email` claim is
/// optional.
pub struct JwtVerifier {
    jwt_secret: String,
}

impl JwtVerifier {
    pub fn new(jwt_secret: String) -> Self {
        Self { jwt_secret }
    }
}

#[async_trait]
impl TokenVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> ApiResult<VerifiedAccount> {
        use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

        let decoding_key = DecodingKey::from_secret(self.jwt_secret.as_bytes());
        let mut validation = Validation::new(Algorithm::HS256);
        // Allow some clock skew (5 minutes)
        validation.leeway = 300;

        let token_data = decode::<serde_json::Value>(token, &decoding_key, &validation)
            .map_err(|e| {
                tracing::debug!("Token verification failed: {}", e);
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                        ApiError::Authentication("Token has expired".to_string())
                    }
                    jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                        ApiError::Authentication("Invalid token signature".to_string())
                    }
                    _ => ApiError::Authentication(format!("Invalid token: {}", e)),
                }
            })?;

        let claims = &token_data.claims;
        let id = claims
            .get("sub")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                ApiError::Authentication("Invalid token: missing 'sub' claim".to_string())
            })?
            .to_string();
        let email = claims
            .get("email")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        Ok(VerifiedAccount { id, email })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const TEST_SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn make_token(sub: &str, email: &str, expires_in: i64) -> String {
        use jsonwebtoken::{encode, EncodingKey, Header};

        let claims = serde_json::json!({
            "sub": sub,
            "email": email,
            "exp": chrono::Utc::now().timestamp() + expires_in,
        });
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_client_key_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));

        assert_eq!(client_key(&headers, None), "203.0.113.9");
    }

    #[test]
    fn test_client_key_falls_back_to_real_ip_then_remote() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));
        assert_eq!(client_key(&headers, None), "198.51.100.2");

        let headers = HeaderMap::new();
        let remote: SocketAddr = "192.0.2.7:4444".parse().unwrap();
        assert_eq!(client_key(&headers, Some(remote)), "192.0.2.7");
    }

    #[test]
    fn test_client_key_unknown_sentinel() {
        let headers = HeaderMap::new();
        assert_eq!(client_key(&headers, None), "unknown");
    }

    #[test]
    fn test_extract_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer abc123"));
        assert_eq!(extract_bearer_token(&headers), Some("abc123".to_string()));

        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("abc123"));
        assert_eq!(extract_bearer_token(&headers), None);
    }

    #[tokio::test]
    async fn test_jwt_verifier_round_trip() {
        let verifier = JwtVerifier::new(TEST_SECRET.to_string());
        let token = make_token("user-1", "user@example.com", 3600);

        let account = verifier.verify(&token).await.unwrap();
        assert_eq!(account.id, "user-1");
        assert_eq!(account.email, "user@example.com");
    }

    #[tokio::test]
    async fn test_jwt_verifier_rejects_expired() {
        let verifier = JwtVerifier::new(TEST_SECRET.to_string());
        // Expired well past the 5-minute leeway
        let token = make_token("user-1", "user@example.com", -3600);

        let err = verifier.verify(&token).await.unwrap_err();
        assert!(matches!(err, ApiError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_jwt_verifier_rejects_garbage() {
        let verifier = JwtVerifier::new(TEST_SECRET.to_string());
        let err = verifier.verify("not-a-jwt").await.unwrap_err();
        assert!(matches!(err, ApiError::Authentication(_)));
    }
}
