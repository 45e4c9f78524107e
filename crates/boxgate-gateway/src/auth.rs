//! Authentication and authorization

use crate::state::UserSession;
use crate::ApiError;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// Scope granting every file operation
pub const SCOPE_FILES_ALL: &str = "files.*";
/// Read file content and metadata
pub const SCOPE_FILES_READ: &str = "files.content.read";
/// Create, change and delete files
pub const SCOPE_FILES_WRITE: &str = "files.content.write";

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (account ID)
    pub sub: String,
    /// Expiration time
    pub exp: i64,
    /// Issued at
    pub iat: Option<i64>,
    /// App folder the token is confined to
    #[serde(default)]
    pub app: Option<String>,
    /// Scopes
    #[serde(default)]
    pub scope: String,
    /// Name
    pub name: Option<String>,
}

/// Validate a JWT token and extract claims
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, ApiError> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;

    decode::<Claims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::debug!("Token validation failed: {}", e);
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    ApiError::unauthorized("expired_access_token", "Token has expired")
                }
                _ => ApiError::unauthorized("invalid_access_token", "Invalid token"),
            }
        })
}

/// Convert claims to a user session
pub fn claims_to_session(claims: Claims) -> UserSession {
    let scopes: Vec<String> = claims
        .scope
        .split_whitespace()
        .map(|s| s.to_string())
        .collect();

    UserSession::new(
        claims.sub,
        claims.app,
        claims.name,
        scopes,
        DateTime::from_timestamp(claims.exp, 0).unwrap_or_else(|| Utc::now() + Duration::hours(1)),
    )
}

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .or_else(|| auth_header.strip_prefix("bearer "))
}

/// Create a development/test session
pub fn dev_session() -> UserSession {
    UserSession::new(
        "dev-user".to_string(),
        None,
        Some("Development User".to_string()),
        vec![SCOPE_FILES_ALL.to_string()],
        Utc::now() + Duration::days(365),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn create_test_token(claims: &Claims, secret: &str) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn claims(exp: DateTime<Utc>, scope: &str) -> Claims {
        Claims {
            sub: "user123".to_string(),
            exp: exp.timestamp(),
            iat: Some(Utc::now().timestamp()),
            app: Some("notes".to_string()),
            scope: scope.to_string(),
            name: Some("Test User".to_string()),
        }
    }

    #[test]
    fn test_validate_token() {
        let secret = "test-secret";
        let token = create_test_token(&claims(Utc::now() + Duration::hours(1), ""), secret);
        let validated = validate_token(&token, secret).unwrap();

        assert_eq!(validated.sub, "user123");
        assert_eq!(validated.app.as_deref(), Some("notes"));
    }

    #[test]
    fn test_expired_token() {
        let secret = "test-secret";
        let token = create_test_token(&claims(Utc::now() - Duration::hours(1), ""), secret);

        let result = validate_token(&token, secret);
        assert!(matches!(
            result,
            Err(ApiError::Unauthorized { tag: "expired_access_token", .. })
        ));
    }

    #[test]
    fn test_wrong_secret() {
        let token = create_test_token(&claims(Utc::now() + Duration::hours(1), ""), "one");
        assert!(matches!(
            validate_token(&token, "two"),
            Err(ApiError::Unauthorized { tag: "invalid_access_token", .. })
        ));
    }

    #[test]
    fn test_claims_to_session() {
        let session = claims_to_session(claims(
            Utc::now() + Duration::hours(1),
            "files.content.read files.content.write",
        ));

        assert_eq!(session.user_id, "user123");
        assert_eq!(session.app_id.as_deref(), Some("notes"));
        assert!(session.can_read());
        assert!(session.can_write());
    }

    #[test]
    fn test_read_only_session() {
        let session = claims_to_session(claims(Utc::now() + Duration::hours(1), "files.content.read"));
        assert!(session.can_read());
        assert!(!session.can_write());
    }

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token("Bearer abc123"), Some("abc123"));
        assert_eq!(extract_bearer_token("bearer abc123"), Some("abc123"));
        assert_eq!(extract_bearer_token("Basic xyz"), None);
    }
}
