/// Authentication Gate
///
/// One login attempt runs straight through: parse credentials, verify them
/// against the resolved principal, mint a token pair, persist the refresh
/// session. Any failure is terminal for the attempt and leaves no state
/// behind — either a full token pair comes back or an error does.
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::identity::IdentityResolver;
use crate::auth::password::verify_password;
use crate::auth::session::RefreshSessionStore;
use crate::auth::token::TokenCodec;
use crate::error::{AppError, AuthError};

/// Inbound credential payload.
#[derive(Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// The pair returned by login and refresh.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token: String,
}

/// Verify credentials and mint a token pair.
///
/// `origin_path` becomes the access token's issuer claim. Resolution
/// failures, disabled accounts, hash-less (social-only) accounts and wrong
/// passwords all surface as the same credential error so the caller cannot
/// enumerate accounts.
pub async fn authenticate(
    credentials: &Credentials,
    origin_path: &str,
    codec: &TokenCodec,
    resolver: &dyn IdentityResolver,
    sessions: &dyn RefreshSessionStore,
) -> Result<TokenPair, AppError> {
    let principal = resolver
        .resolve_by_email(&credentials.email)
        .await?
        .ok_or(AppError::Auth(AuthError::InvalidCredentials))?;

    if !principal.enabled {
        return Err(AppError::Auth(AuthError::AccountInactive));
    }

    let password_hash = principal
        .password_hash
        .as_deref()
        .ok_or(AppError::Auth(AuthError::InvalidCredentials))?;

    if !verify_password(&credentials.password, password_hash)? {
        return Err(AppError::Auth(AuthError::InvalidCredentials));
    }

    let pair = mint_token_pair(
        principal.id,
        principal.roles(),
        origin_path,
        codec,
        sessions,
    )
    .await?;

    tracing::info!(member_id = %principal.id, "Member logged in");

    Ok(pair)
}

/// Issue a refresh session and the access token paired with it, then persist
/// the session. Shared by the password gate and social auto-signup.
pub async fn mint_token_pair(
    member_id: Uuid,
    roles: Vec<String>,
    origin_path: &str,
    codec: &TokenCodec,
    sessions: &dyn RefreshSessionStore,
) -> Result<TokenPair, AppError> {
    let refresh = codec.issue_refresh_token()?;
    let access = codec.issue_access_token(member_id, roles, origin_path, &refresh.session_id)?;

    sessions.put(&refresh.session_id, member_id).await?;

    Ok(TokenPair {
        access_token: access.token,
        access_token_expires_at: access.expires_at,
        refresh_token: refresh.token,
    })
}
