/// Authentication Routes
///
/// Member signup, email verification, login, token refresh, logout, and
/// social auto-signup.
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::{
    authenticate, hash_password, logout, mint_token_pair, refresh_session, Credentials,
    IdentityResolver, RefreshSessionStore, TokenCodec, TokenPair,
};
use crate::email_client::EmailClient;
use crate::error::{AppError, AuthError, DatabaseError, ErrorContext, ValidationError};
use crate::validators::{is_valid_email, is_valid_nickname};
use crate::verification::{generate_verification_code, VerificationCodeStore};

/// Member signup request
#[derive(Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub nickname: String,
    pub password: String,
    pub check_password: String,
}

/// Token refresh request
#[derive(Deserialize)]
pub struct RefreshRequest {
    pub access_token: String,
    pub refresh_token: String,
}

/// Social auto-signup request: the identity supplier upstream has already
/// verified this pair.
#[derive(Deserialize)]
pub struct SocialLoginRequest {
    pub email: String,
    pub nickname: String,
}

/// Verification-code send request
#[derive(Deserialize)]
pub struct EmailVerificationRequest {
    pub email: String,
}

/// Verification-code check request
#[derive(Deserialize)]
pub struct EmailCodeCheckRequest {
    pub email: String,
    pub auth_code: String,
}

/// Token pair response shared by login, refresh and social signup
#[derive(Serialize)]
pub struct TokenPairResponse {
    pub access_token: String,
    pub access_token_expires_at: String,
    pub refresh_token: String,
}

impl From<TokenPair> for TokenPairResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            access_token: pair.access_token,
            access_token_expires_at: pair.access_token_expires_at.to_rfc3339(),
            refresh_token: pair.refresh_token,
        }
    }
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// POST /auth/signup
///
/// Register a new member with email, nickname, and password.
///
/// # Validation
/// - Email must be valid format and not already registered
/// - Password must be 8+ chars with digit, lowercase, and uppercase
/// - Password and confirmation must match
///
/// # Errors
/// - 400: Validation errors (invalid email/nickname/password)
/// - 409: Email already registered (duplicate)
/// - 500: Internal server error
pub async fn signup(
    form: web::Json<SignupRequest>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("member_signup");

    let email = is_valid_email(&form.email)?;
    let nickname = is_valid_nickname(&form.nickname)?;

    if form.password != form.check_password {
        return Err(AppError::Validation(ValidationError::PasswordMismatch));
    }
    let password_hash = hash_password(&form.password)?;

    let member_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO members (id, email, nickname, password_hash, authority, status, created_at, updated_at)
        VALUES ($1, $2, $3, $4, 'ROLE_USER', 'enabled', $5, $6)
        "#,
    )
    .bind(member_id)
    .bind(&email)
    .bind(&nickname)
    .bind(&password_hash)
    .bind(Utc::now())
    .bind(Utc::now())
    .execute(pool.get_ref())
    .await?;

    tracing::info!(
        request_id = %context.request_id,
        member_id = %member_id,
        "Member registered successfully"
    );

    Ok(HttpResponse::Created().json(MessageResponse {
        message: "Member registered".to_string(),
    }))
}

/// POST /auth/login
///
/// Authenticate a member with email and password.
/// Returns an access token and refresh token on success.
///
/// # Errors
/// - 400: Validation error (invalid email format)
/// - 401: Invalid credentials (email not found or wrong password)
/// - 403: Account is inactive
/// - 500: Internal server error
///
/// # Security Notes
/// - Uses the same error for "not found" and "wrong password"
/// - Prevents member enumeration attacks
pub async fn login(
    req: HttpRequest,
    form: web::Json<Credentials>,
    codec: web::Data<TokenCodec>,
    resolver: web::Data<dyn IdentityResolver>,
    sessions: web::Data<dyn RefreshSessionStore>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("member_login");

    is_valid_email(&form.email)?;

    let pair = authenticate(
        &form,
        req.path(),
        codec.get_ref(),
        resolver.get_ref(),
        sessions.get_ref(),
    )
    .await
    .map_err(|e| {
        context.log_error(&e);
        e
    })?;

    Ok(HttpResponse::Ok().json(TokenPairResponse::from(pair)))
}

/// POST /auth/refresh
///
/// Exchange a still-parseable access token and its paired refresh token for
/// a new access token. The access token may be expired; the refresh token
/// must be valid and must correspond to the session the access token names.
/// The refresh token is returned unchanged.
///
/// # Errors
/// - 401: Invalid token, unknown session, or session mismatch (one body)
/// - 403: Associated account is inactive
/// - 500: Internal server error
pub async fn refresh(
    req: HttpRequest,
    form: web::Json<RefreshRequest>,
    codec: web::Data<TokenCodec>,
    resolver: web::Data<dyn IdentityResolver>,
    sessions: web::Data<dyn RefreshSessionStore>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("token_refresh");

    let pair = refresh_session(
        &form.access_token,
        &form.refresh_token,
        req.path(),
        codec.get_ref(),
        resolver.get_ref(),
        sessions.get_ref(),
    )
    .await
    .map_err(|e| {
        context.log_error(&e);
        e
    })?;

    Ok(HttpResponse::Ok().json(TokenPairResponse::from(pair)))
}

/// POST /auth/logout
///
/// Tear down the refresh session named by the presented access token.
/// Logging out twice is reported as a failure, not a silent success.
///
/// # Errors
/// - 401: Missing/invalid access token, or no live session to tear down
pub async fn logout_member(
    req: HttpRequest,
    codec: web::Data<TokenCodec>,
    sessions: web::Data<dyn RefreshSessionStore>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("member_logout");

    let token = bearer_token(&req).ok_or(AppError::Auth(AuthError::MissingToken))?;

    logout(&token, codec.get_ref(), sessions.get_ref())
        .await
        .map_err(|e| {
            context.log_error(&e);
            e
        })?;

    Ok(HttpResponse::Ok().finish())
}

/// POST /auth/social
///
/// Login for members arriving from an external identity supplier. The
/// supplier has already verified the email; an unknown address is signed up
/// on the spot with no local credential, then a token pair is minted either
/// way.
///
/// # Errors
/// - 400: Validation errors
/// - 403: Account is inactive
/// - 500: Internal server error
pub async fn social_login(
    req: HttpRequest,
    form: web::Json<SocialLoginRequest>,
    pool: web::Data<PgPool>,
    codec: web::Data<TokenCodec>,
    resolver: web::Data<dyn IdentityResolver>,
    sessions: web::Data<dyn RefreshSessionStore>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("social_login");

    let email = is_valid_email(&form.email)?;
    let nickname = is_valid_nickname(&form.nickname)?;

    let principal = match resolver.resolve_by_email(&email).await? {
        Some(principal) => {
            if !principal.enabled {
                return Err(AppError::Auth(AuthError::AccountInactive));
            }
            principal
        }
        None => {
            // Auto-signup: no local credential, password login stays closed.
            let member_id = Uuid::new_v4();
            sqlx::query(
                r#"
                INSERT INTO members (id, email, nickname, password_hash, authority, status, created_at, updated_at)
                VALUES ($1, $2, $3, NULL, 'ROLE_USER', 'enabled', $4, $5)
                "#,
            )
            .bind(member_id)
            .bind(&email)
            .bind(&nickname)
            .bind(Utc::now())
            .bind(Utc::now())
            .execute(pool.get_ref())
            .await?;

            tracing::info!(
                request_id = %context.request_id,
                member_id = %member_id,
                "Member auto-registered via social login"
            );

            resolver
                .resolve_by_email(&email)
                .await?
                .ok_or_else(|| AppError::Internal("Auto-registered member vanished".to_string()))?
        }
    };

    let pair = mint_token_pair(
        principal.id,
        principal.roles(),
        req.path(),
        codec.get_ref(),
        sessions.get_ref(),
    )
    .await?;

    Ok(HttpResponse::Ok().json(TokenPairResponse::from(pair)))
}

/// POST /auth/email
///
/// Send a verification code to a not-yet-registered address. The code lives
/// for five minutes.
///
/// # Errors
/// - 400: Invalid email
/// - 409: Address already registered
/// - 503: Mail relay unavailable
pub async fn send_verification_email(
    form: web::Json<EmailVerificationRequest>,
    pool: web::Data<PgPool>,
    codes: web::Data<VerificationCodeStore>,
    email_client: web::Data<EmailClient>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("verification_email");

    let email = is_valid_email(&form.email)?;

    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM members WHERE email = $1)",
    )
    .bind(&email)
    .fetch_one(pool.get_ref())
    .await?;

    if exists {
        return Err(AppError::Database(DatabaseError::UniqueConstraintViolation(
            "Email already registered".to_string(),
        )));
    }

    let code = generate_verification_code();
    email_client
        .send_email(
            &email,
            "Verification code",
            &format!("Your verification code is: <b>{}</b>", code),
        )
        .await?;
    codes.put(&email, &code).await?;

    tracing::info!(
        request_id = %context.request_id,
        "Verification code sent"
    );

    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "Verification code sent".to_string(),
    }))
}

/// POST /auth/email/check
///
/// Verify a previously mailed code. An absent entry means the code expired
/// (or was never sent); a present-but-different code is a mismatch.
///
/// # Errors
/// - 400: Code expired or does not match
pub async fn check_verification_code(
    form: web::Json<EmailCodeCheckRequest>,
    codes: web::Data<VerificationCodeStore>,
) -> Result<HttpResponse, AppError> {
    let email = is_valid_email(&form.email)?;

    let stored = codes.get(&email).await?.ok_or_else(|| {
        AppError::Validation(ValidationError::InvalidFormat(
            "verification code has expired".to_string(),
        ))
    })?;

    if stored != form.auth_code {
        return Err(AppError::Validation(ValidationError::InvalidFormat(
            "verification code does not match".to_string(),
        )));
    }

    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "Email verified".to_string(),
    }))
}

fn bearer_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer ").map(|t| t.to_string()))
}
