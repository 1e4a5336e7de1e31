/// Token claims
///
/// Payloads of the two signed token kinds (RFC 7519 registered claims plus
/// the service's extended claims).
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AuthError};

/// Claims carried by an access token.
///
/// Self-contained: validity is decided by signature and `exp` alone, never by
/// a server-side lookup. `sid` correlates the token with the refresh session
/// that was minted alongside it.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AccessClaims {
    /// Subject (member ID as UUID string)
    pub sub: String,
    /// Role set granted at issuance
    pub roles: Vec<String>,
    /// Originating request path, informational
    pub iss: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Refresh-session id this token is paired with
    pub sid: String,
}

impl AccessClaims {
    pub fn new(
        member_id: Uuid,
        roles: Vec<String>,
        issuer: String,
        session_id: String,
        expiry_seconds: i64,
    ) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: member_id.to_string(),
            roles,
            iss: issuer,
            iat: now,
            exp: now + expiry_seconds,
            sid: session_id,
        }
    }

    /// Extract the member ID from the subject claim.
    pub fn member_id(&self) -> Result<Uuid, AppError> {
        Uuid::parse_str(&self.sub).map_err(|_| AppError::Auth(AuthError::TokenInvalid))
    }

    pub fn is_expired(&self) -> bool {
        let now = chrono::Utc::now().timestamp();
        self.exp < now
    }
}

/// Claims carried by a refresh token.
///
/// No subject claims: the token is only a correlation handle. `sid` is a
/// cryptographically random UUID, so the payload itself is unguessable.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RefreshClaims {
    pub sid: String,
    pub iat: i64,
    pub exp: i64,
}

impl RefreshClaims {
    pub fn new(expiry_seconds: i64) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sid: Uuid::new_v4().to_string(),
            iat: now,
            exp: now + expiry_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_claims_creation() {
        let member_id = Uuid::new_v4();
        let claims = AccessClaims::new(
            member_id,
            vec!["ROLE_USER".to_string()],
            "/auth/login".to_string(),
            "session-1".to_string(),
            3600,
        );

        assert_eq!(claims.sub, member_id.to_string());
        assert_eq!(claims.roles, vec!["ROLE_USER".to_string()]);
        assert_eq!(claims.iss, "/auth/login");
        assert_eq!(claims.sid, "session-1");
        assert_eq!(claims.exp, claims.iat + 3600);
        assert!(!claims.is_expired());
    }

    #[test]
    fn test_member_id_extraction() {
        let member_id = Uuid::new_v4();
        let claims = AccessClaims::new(
            member_id,
            vec![],
            "/auth/login".to_string(),
            "session-1".to_string(),
            3600,
        );

        assert_eq!(claims.member_id().unwrap(), member_id);
    }

    #[test]
    fn test_invalid_member_id() {
        let mut claims = AccessClaims::new(
            Uuid::new_v4(),
            vec![],
            "/auth/login".to_string(),
            "session-1".to_string(),
            3600,
        );
        claims.sub = "not-a-uuid".to_string();

        assert!(claims.member_id().is_err());
    }

    #[test]
    fn test_refresh_claims_are_random() {
        let a = RefreshClaims::new(3600);
        let b = RefreshClaims::new(3600);

        assert_ne!(a.sid, b.sid);
        assert_eq!(a.exp, a.iat + 3600);
    }
}
