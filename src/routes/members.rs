/// Member Routes
///
/// Profile reads and updates for the authenticated member, plus lookups used
/// by sibling services. All routes here sit behind the JWT middleware, which
/// injects the validated access claims.
use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::{hash_password, verify_password, AccessClaims};
use crate::error::{AppError, AuthError, DatabaseError, ErrorContext, ValidationError};
use crate::validators::is_valid_nickname;

/// Profile update request
#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    pub nickname: String,
    pub profile_image: Option<String>,
}

/// Password change request
#[derive(Deserialize)]
pub struct UpdatePasswordRequest {
    pub current_password: String,
    pub changed_password: String,
    pub check_changed_password: String,
}

#[derive(Deserialize)]
pub struct MemberCheckQuery {
    pub email: String,
}

/// Member information response
#[derive(Serialize)]
pub struct MemberInfoResponse {
    pub id: String,
    pub email: String,
    pub nickname: String,
    pub profile_image: Option<String>,
}

type MemberRow = (Uuid, String, String, Option<String>);

fn member_response(row: MemberRow) -> MemberInfoResponse {
    MemberInfoResponse {
        id: row.0.to_string(),
        email: row.1,
        nickname: row.2,
        profile_image: row.3,
    }
}

fn member_not_found() -> AppError {
    AppError::Database(DatabaseError::NotFound("Member not found".to_string()))
}

/// GET /members/me
///
/// The authenticated member's own profile.
pub async fn get_my_info(
    claims: web::ReqData<AccessClaims>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let member_id = claims.member_id()?;

    let row = sqlx::query_as::<_, MemberRow>(
        "SELECT id, email, nickname, profile_image FROM members WHERE id = $1 AND status = 'enabled'",
    )
    .bind(member_id)
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(member_not_found)?;

    Ok(HttpResponse::Ok().json(member_response(row)))
}

/// GET /members/{member_id}
///
/// Lookup by id for sibling services that only hold a member reference.
pub async fn get_member(
    path: web::Path<Uuid>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let member_id = path.into_inner();

    let row = sqlx::query_as::<_, MemberRow>(
        "SELECT id, email, nickname, profile_image FROM members WHERE id = $1 AND status = 'enabled'",
    )
    .bind(member_id)
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(member_not_found)?;

    Ok(HttpResponse::Ok().json(member_response(row)))
}

/// GET /members/check?email=
///
/// Lookup by email, used when inviting a member to a project.
pub async fn check_member(
    query: web::Query<MemberCheckQuery>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let row = sqlx::query_as::<_, MemberRow>(
        "SELECT id, email, nickname, profile_image FROM members WHERE email = $1 AND status = 'enabled'",
    )
    .bind(&query.email)
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(member_not_found)?;

    Ok(HttpResponse::Ok().json(member_response(row)))
}

/// PATCH /members/me
///
/// Update nickname and profile-image URL. The image itself is hosted
/// elsewhere; this service only stores the reference.
pub async fn update_profile(
    claims: web::ReqData<AccessClaims>,
    form: web::Json<UpdateProfileRequest>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("profile_update");
    let member_id = claims.member_id()?;
    let nickname = is_valid_nickname(&form.nickname)?;

    let result = sqlx::query(
        r#"
        UPDATE members
        SET nickname = $1, profile_image = $2, updated_at = $3
        WHERE id = $4 AND status = 'enabled'
        "#,
    )
    .bind(&nickname)
    .bind(&form.profile_image)
    .bind(Utc::now())
    .bind(member_id)
    .execute(pool.get_ref())
    .await?;

    if result.rows_affected() == 0 {
        return Err(member_not_found());
    }

    tracing::info!(
        request_id = %context.request_id,
        member_id = %member_id,
        "Member profile updated"
    );

    Ok(HttpResponse::Ok().finish())
}

/// PATCH /members/me/password
///
/// Change the member's password: the current password must verify and the
/// new password must match its confirmation and pass the strength rules.
///
/// # Errors
/// - 400: Confirmation mismatch or weak new password
/// - 401: Current password does not verify (or the account has none)
pub async fn update_password(
    claims: web::ReqData<AccessClaims>,
    form: web::Json<UpdatePasswordRequest>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("password_update");
    let member_id = claims.member_id()?;

    let password_hash = sqlx::query_scalar::<_, Option<String>>(
        "SELECT password_hash FROM members WHERE id = $1 AND status = 'enabled'",
    )
    .bind(member_id)
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(member_not_found)?;

    // Social-only accounts have no credential to change.
    let password_hash = password_hash.ok_or(AppError::Auth(AuthError::InvalidCredentials))?;

    if !verify_password(&form.current_password, &password_hash)? {
        return Err(AppError::Auth(AuthError::InvalidCredentials));
    }

    if form.changed_password != form.check_changed_password {
        return Err(AppError::Validation(ValidationError::PasswordMismatch));
    }

    let new_hash = hash_password(&form.changed_password)?;

    sqlx::query("UPDATE members SET password_hash = $1, updated_at = $2 WHERE id = $3")
        .bind(&new_hash)
        .bind(Utc::now())
        .bind(member_id)
        .execute(pool.get_ref())
        .await?;

    tracing::info!(
        request_id = %context.request_id,
        member_id = %member_id,
        "Member password updated"
    );

    Ok(HttpResponse::Ok().finish())
}
