/// Token Codec
///
/// Issues and consumes the two signed token kinds. This is the trust root of
/// the authentication subsystem: everything downstream believes whatever a
/// token that passes `verify` says.
///
/// The algorithm is pinned to HS512 and one shared secret signs both token
/// kinds, so there is no per-token algorithm negotiation surface.
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::auth::claims::{AccessClaims, RefreshClaims};
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError};

/// A freshly issued access token together with its expiry instant.
#[derive(Debug, Clone)]
pub struct IssuedAccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// A freshly issued refresh token and the session id embedded in it.
#[derive(Debug, Clone)]
pub struct IssuedRefreshToken {
    pub token: String,
    pub session_id: String,
}

#[derive(Clone)]
pub struct TokenCodec {
    secret: String,
    access_token_expiry: i64,
    refresh_token_expiry: i64,
}

impl TokenCodec {
    pub fn new(settings: &JwtSettings) -> Self {
        Self {
            secret: settings.secret.clone(),
            access_token_expiry: settings.access_token_expiry,
            refresh_token_expiry: settings.refresh_token_expiry,
        }
    }

    pub fn access_token_expiry(&self) -> i64 {
        self.access_token_expiry
    }

    /// Issue an access token for a member.
    ///
    /// `issuer` is the originating request path (informational only) and
    /// `session_id` is the refresh session the token is paired with.
    pub fn issue_access_token(
        &self,
        member_id: Uuid,
        roles: Vec<String>,
        issuer: &str,
        session_id: &str,
    ) -> Result<IssuedAccessToken, AppError> {
        let claims = AccessClaims::new(
            member_id,
            roles,
            issuer.to_string(),
            session_id.to_string(),
            self.access_token_expiry,
        );
        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .ok_or_else(|| AppError::Internal("Token expiry out of range".to_string()))?;

        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))?;

        Ok(IssuedAccessToken { token, expires_at })
    }

    /// Issue a refresh token carrying a fresh random session id.
    pub fn issue_refresh_token(&self) -> Result<IssuedRefreshToken, AppError> {
        let claims = RefreshClaims::new(self.refresh_token_expiry);
        let session_id = claims.sid.clone();

        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))?;

        Ok(IssuedRefreshToken { token, session_id })
    }

    /// Signature + expiry check for either token kind.
    ///
    /// Every failure mode (malformed, expired, forged, wrong algorithm,
    /// garbage) collapses to `false`, so a caller cannot learn which check
    /// rejected the token.
    pub fn verify(&self, token: &str) -> bool {
        let mut validation = Validation::new(Algorithm::HS512);
        validation.leeway = 0;

        decode::<serde_json::Value>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .is_ok()
    }

    /// Decode access-token claims without requiring the token to be unexpired.
    ///
    /// The signature is still checked, so unsigned or tampered input fails.
    /// Claims read this way must not back an authorization decision unless
    /// `verify` passed first.
    pub fn decode_access(&self, token: &str) -> Result<AccessClaims, AppError> {
        self.decode_lenient(token)
    }

    /// Decode refresh-token claims, same contract as [`Self::decode_access`].
    pub fn decode_refresh(&self, token: &str) -> Result<RefreshClaims, AppError> {
        self.decode_lenient(token)
    }

    /// Verify-then-decode for authorization use (the middleware path).
    pub fn authenticate(&self, token: &str) -> Result<AccessClaims, AppError> {
        if !self.verify(token) {
            return Err(AppError::Auth(AuthError::TokenInvalid));
        }
        self.decode_access(token)
    }

    /// Expiry instant of either token kind, readable while expired.
    pub fn expiry_of(&self, token: &str) -> Result<DateTime<Utc>, AppError> {
        let claims: serde_json::Value = self.decode_lenient(token)?;
        let exp = claims
            .get("exp")
            .and_then(|v| v.as_i64())
            .ok_or(AppError::Auth(AuthError::TokenInvalid))?;
        Utc.timestamp_opt(exp, 0)
            .single()
            .ok_or(AppError::Auth(AuthError::TokenInvalid))
    }

    /// Subject (member id) of an access token, readable while expired.
    pub fn subject_of(&self, token: &str) -> Result<Uuid, AppError> {
        self.decode_access(token)?.member_id()
    }

    /// Role set of an access token, readable while expired.
    pub fn roles_of(&self, token: &str) -> Result<Vec<String>, AppError> {
        Ok(self.decode_access(token)?.roles)
    }

    /// Session id claim of either token kind, readable while expired.
    pub fn session_of(&self, token: &str) -> Result<String, AppError> {
        let claims: serde_json::Value = self.decode_lenient(token)?;
        claims
            .get("sid")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or(AppError::Auth(AuthError::TokenInvalid))
    }

    fn decode_lenient<T: DeserializeOwned>(&self, token: &str) -> Result<T, AppError> {
        let mut validation = Validation::new(Algorithm::HS512);
        validation.leeway = 0;
        validation.validate_exp = false;

        decode::<T>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::warn!("Token decode failed: {}", e);
            AppError::Auth(AuthError::TokenInvalid)
        })
    }
}
