/// Session Refresh Coordinator
///
/// Exchanges a still-parseable (possibly expired) access token plus its
/// paired refresh token for a new access token, and tears sessions down on
/// logout.
///
/// Ordering inside one refresh call: session lookup happens before validity
/// checks, which happen before new-token issuance. Each store operation is
/// individually atomic; there is no transaction across the sequence, so a
/// racing logout simply makes a later lookup miss.
use crate::auth::gate::TokenPair;
use crate::auth::identity::IdentityResolver;
use crate::auth::session::RefreshSessionStore;
use crate::auth::token::TokenCodec;
use crate::error::{AppError, AuthError};

/// Exchange `(access_token, refresh_token)` for a new access token.
///
/// The access token may be expired — that is the point of refresh — but it
/// must still decode, i.e. carry a valid signature. The refresh token itself
/// must be currently valid; presenting an invalid one destroys the stored
/// session outright. Roles are re-resolved fresh so authority changes
/// propagate without a logout. The refresh token is returned unrotated.
pub async fn refresh_session(
    access_token: &str,
    refresh_token: &str,
    origin_path: &str,
    codec: &TokenCodec,
    resolver: &dyn IdentityResolver,
    sessions: &dyn RefreshSessionStore,
) -> Result<TokenPair, AppError> {
    let claims = codec.decode_access(access_token)?;
    let member_id = claims.member_id()?;
    let session_id = claims.sid;

    let session = sessions
        .get(&session_id)
        .await?
        .ok_or(AppError::Auth(AuthError::UnknownSession))?;

    if !codec.verify(refresh_token) {
        // An expired or forged refresh attempt invalidates the session
        // outright: there is nothing left to rotate.
        sessions.delete(&session_id).await?;
        tracing::warn!(member_id = %member_id, "Session invalidated by bad refresh token");

        return Err(AppError::Auth(AuthError::TokenInvalid));
    }

    let presented = codec.decode_refresh(refresh_token)?;
    if presented.sid != session.session_id {
        return Err(AppError::Auth(AuthError::SessionMismatch));
    }

    let principal = resolver
        .resolve_by_id(member_id)
        .await?
        .ok_or(AppError::Auth(AuthError::InvalidCredentials))?;

    if !principal.enabled {
        return Err(AppError::Auth(AuthError::AccountInactive));
    }

    let access = codec.issue_access_token(
        principal.id,
        principal.roles(),
        origin_path,
        &session.session_id,
    )?;

    tracing::info!(member_id = %principal.id, "Access token reissued");

    Ok(TokenPair {
        access_token: access.token,
        access_token_expires_at: access.expires_at,
        refresh_token: refresh_token.to_string(),
    })
}

/// Tear down the session named by a valid access token.
///
/// The session is resolved by the token's embedded session id, the same key
/// refresh uses. An already-absent session is reported as a failure, not a
/// silent success.
pub async fn logout(
    access_token: &str,
    codec: &TokenCodec,
    sessions: &dyn RefreshSessionStore,
) -> Result<(), AppError> {
    if !codec.verify(access_token) {
        return Err(AppError::Auth(AuthError::TokenInvalid));
    }

    let claims = codec.decode_access(access_token)?;
    let member_id = claims.member_id()?;

    let session = sessions
        .get(&claims.sid)
        .await?
        .ok_or(AppError::Auth(AuthError::UnknownSession))?;

    sessions.delete(&session.session_id).await?;
    tracing::info!(member_id = %member_id, "Member logged out");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::gate::{authenticate, Credentials};
    use crate::auth::identity::test_support::InMemoryIdentityResolver;
    use crate::auth::identity::Principal;
    use crate::auth::password::hash_password;
    use crate::auth::session::InMemoryRefreshSessionStore;
    use crate::configuration::JwtSettings;
    use uuid::Uuid;

    const SECRET: &str = "test-secret-key-at-least-32-characters-long";

    fn codec_with_ttls(access: i64, refresh: i64) -> TokenCodec {
        TokenCodec::new(&JwtSettings {
            secret: SECRET.to_string(),
            access_token_expiry: access,
            refresh_token_expiry: refresh,
        })
    }

    struct Fixture {
        codec: TokenCodec,
        resolver: InMemoryIdentityResolver,
        sessions: InMemoryRefreshSessionStore,
        member_id: Uuid,
    }

    impl Fixture {
        fn new(codec: TokenCodec) -> Self {
            let member_id = Uuid::new_v4();
            let resolver = InMemoryIdentityResolver::new();
            resolver.insert(Principal {
                id: member_id,
                email: "u1@example.com".to_string(),
                password_hash: Some(hash_password("Password123").unwrap()),
                authority: "ROLE_USER".to_string(),
                enabled: true,
            });

            Self {
                codec,
                resolver,
                sessions: InMemoryRefreshSessionStore::new(86400),
                member_id,
            }
        }

        async fn login(&self) -> TokenPair {
            authenticate(
                &Credentials {
                    email: "u1@example.com".to_string(),
                    password: "Password123".to_string(),
                },
                "/auth/login",
                &self.codec,
                &self.resolver,
                &self.sessions,
            )
            .await
            .unwrap()
        }

        async fn refresh(&self, pair: &TokenPair) -> Result<TokenPair, AppError> {
            refresh_session(
                &pair.access_token,
                &pair.refresh_token,
                "/auth/refresh",
                &self.codec,
                &self.resolver,
                &self.sessions,
            )
            .await
        }
    }

    #[tokio::test]
    async fn test_refresh_issues_new_access_token_same_subject() {
        let fx = Fixture::new(codec_with_ttls(3600, 86400));
        let pair = fx.login().await;

        let refreshed = fx.refresh(&pair).await.unwrap();

        let claims = fx.codec.decode_access(&refreshed.access_token).unwrap();
        assert_eq!(claims.member_id().unwrap(), fx.member_id);
        assert_eq!(claims.iss, "/auth/refresh");
        assert!(refreshed.access_token_expires_at >= pair.access_token_expires_at);

        // The refresh token is returned unrotated.
        assert_eq!(refreshed.refresh_token, pair.refresh_token);

        // And the pair refreshes again: the session survived.
        fx.refresh(&refreshed).await.unwrap();
    }

    #[tokio::test]
    async fn test_refresh_accepts_expired_access_token() {
        // Access tokens die at issuance; the refresh token outlives them.
        let fx = Fixture::new(codec_with_ttls(-120, 86400));
        let pair = fx.login().await;

        assert!(!fx.codec.verify(&pair.access_token));

        let refreshed = fx.refresh(&pair).await.unwrap();
        let claims = fx.codec.decode_access(&refreshed.access_token).unwrap();
        assert_eq!(claims.member_id().unwrap(), fx.member_id);
    }

    #[tokio::test]
    async fn test_refresh_with_garbage_access_token_fails() {
        let fx = Fixture::new(codec_with_ttls(3600, 86400));
        fx.login().await;

        let result = refresh_session(
            "not-a-token",
            "also-not-a-token",
            "/auth/refresh",
            &fx.codec,
            &fx.resolver,
            &fx.sessions,
        )
        .await;

        assert!(matches!(result, Err(AppError::Auth(AuthError::TokenInvalid))));
    }

    #[tokio::test]
    async fn test_refresh_against_deleted_session_fails_identically_twice() {
        let fx = Fixture::new(codec_with_ttls(3600, 86400));
        let pair = fx.login().await;

        let session_id = fx.codec.session_of(&pair.access_token).unwrap();
        fx.sessions.delete(&session_id).await.unwrap();

        // Idempotence of failure: both attempts land on the same error.
        for _ in 0..2 {
            let result = fx.refresh(&pair).await;
            assert!(matches!(
                result,
                Err(AppError::Auth(AuthError::UnknownSession))
            ));
        }
    }

    #[tokio::test]
    async fn test_invalid_refresh_token_destroys_the_session() {
        let fx = Fixture::new(codec_with_ttls(3600, -120));
        let pair = fx.login().await;

        let session_id = fx.codec.session_of(&pair.access_token).unwrap();
        assert!(fx.sessions.get(&session_id).await.unwrap().is_some());

        // The refresh token expired at issuance, so the attempt both fails
        // and deletes the stored session.
        let result = fx.refresh(&pair).await;
        assert!(matches!(result, Err(AppError::Auth(AuthError::TokenInvalid))));
        assert!(fx.sessions.get(&session_id).await.unwrap().is_none());

        // Follow-up attempts now miss the session entirely.
        let result = fx.refresh(&pair).await;
        assert!(matches!(
            result,
            Err(AppError::Auth(AuthError::UnknownSession))
        ));
    }

    #[tokio::test]
    async fn test_mismatched_refresh_token_is_rejected() {
        let fx = Fixture::new(codec_with_ttls(3600, 86400));
        let pair = fx.login().await;

        // A second live session for the same account: its refresh token is
        // valid and unexpired, but it does not correspond to the session the
        // access token names.
        let other = fx.login().await;
        assert_ne!(
            fx.codec.session_of(&pair.access_token).unwrap(),
            fx.codec.session_of(&other.access_token).unwrap()
        );

        let result = refresh_session(
            &pair.access_token,
            &other.refresh_token,
            "/auth/refresh",
            &fx.codec,
            &fx.resolver,
            &fx.sessions,
        )
        .await;

        assert!(matches!(
            result,
            Err(AppError::Auth(AuthError::SessionMismatch))
        ));

        // The session itself is untouched by a mismatch.
        let session_id = fx.codec.session_of(&pair.access_token).unwrap();
        assert!(fx.sessions.get(&session_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_roles_are_rederived_on_refresh() {
        let fx = Fixture::new(codec_with_ttls(3600, 86400));
        let pair = fx.login().await;

        let before = fx.codec.roles_of(&pair.access_token).unwrap();
        assert_eq!(before, vec!["ROLE_USER".to_string()]);

        fx.resolver.set_authority(fx.member_id, "ROLE_ADMIN");

        let refreshed = fx.refresh(&pair).await.unwrap();
        let after = fx.codec.roles_of(&refreshed.access_token).unwrap();
        assert_eq!(after, vec!["ROLE_ADMIN".to_string()]);
    }

    #[tokio::test]
    async fn test_logout_then_refresh_fails_with_unknown_session() {
        let fx = Fixture::new(codec_with_ttls(3600, 86400));
        let pair = fx.login().await;
        let refreshed = fx.refresh(&pair).await.unwrap();

        logout(&refreshed.access_token, &fx.codec, &fx.sessions)
            .await
            .unwrap();

        // The original refresh token is now orphaned.
        let result = fx.refresh(&pair).await;
        assert!(matches!(
            result,
            Err(AppError::Auth(AuthError::UnknownSession))
        ));
    }

    #[tokio::test]
    async fn test_logout_requires_a_valid_access_token() {
        let fx = Fixture::new(codec_with_ttls(-120, 86400));
        let pair = fx.login().await;

        let result = logout(&pair.access_token, &fx.codec, &fx.sessions).await;
        assert!(matches!(result, Err(AppError::Auth(AuthError::TokenInvalid))));

        // The session survives a failed logout.
        let session_id = fx.codec.session_of(&pair.access_token).unwrap();
        assert!(fx.sessions.get(&session_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_double_logout_reports_failure() {
        let fx = Fixture::new(codec_with_ttls(3600, 86400));
        let pair = fx.login().await;

        logout(&pair.access_token, &fx.codec, &fx.sessions)
            .await
            .unwrap();

        let result = logout(&pair.access_token, &fx.codec, &fx.sessions).await;
        assert!(matches!(
            result,
            Err(AppError::Auth(AuthError::UnknownSession))
        ));
    }

    #[tokio::test]
    async fn test_full_lifecycle_scenario() {
        // login -> refresh -> logout with the newest access token -> the
        // original refresh token is dead.
        let fx = Fixture::new(codec_with_ttls(3600, 86400));

        let pair = fx.login().await;
        let refreshed = fx.refresh(&pair).await.unwrap();

        let original_subject = fx.codec.subject_of(&pair.access_token).unwrap();
        let refreshed_subject = fx.codec.subject_of(&refreshed.access_token).unwrap();
        assert_eq!(original_subject, refreshed_subject);

        logout(&refreshed.access_token, &fx.codec, &fx.sessions)
            .await
            .unwrap();

        let result = refresh_session(
            &pair.access_token,
            &pair.refresh_token,
            "/auth/refresh",
            &fx.codec,
            &fx.resolver,
            &fx.sessions,
        )
        .await;
        assert!(matches!(
            result,
            Err(AppError::Auth(AuthError::UnknownSession))
        ));
    }
}
