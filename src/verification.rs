/// Email verification codes
///
/// Signup asks for proof of mailbox ownership: a 6-digit code is mailed out
/// and cached for five minutes. Same TTL-on-read pattern as the refresh
/// session store, but a plain keyed cache is enough here — the code is the
/// whole secret.
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sqlx::PgPool;

use crate::error::AppError;

const CODE_TTL_SECONDS: i64 = 60 * 5;
const CODE_LENGTH: usize = 6;

/// Generate a random 6-digit numeric code.
pub fn generate_verification_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LENGTH)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

/// Postgres-backed code cache keyed by email address.
#[derive(Clone)]
pub struct VerificationCodeStore {
    pool: PgPool,
}

impl VerificationCodeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upsert the code for an address; the 5-minute clock restarts on write.
    pub async fn put(&self, email: &str, code: &str) -> Result<(), AppError> {
        let expires_at = Utc::now() + Duration::seconds(CODE_TTL_SECONDS);

        sqlx::query(
            r#"
            INSERT INTO email_verification_codes (email, code, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (email)
            DO UPDATE SET code = $2, expires_at = $3
            "#,
        )
        .bind(email)
        .bind(code)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Current unexpired code for an address, if any.
    pub async fn get(&self, email: &str) -> Result<Option<String>, AppError> {
        let row = sqlx::query_as::<_, (String, DateTime<Utc>)>(
            "SELECT code, expires_at FROM email_verification_codes WHERE email = $1 AND expires_at > $2",
        )
        .bind(email)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(code, _)| code))
    }

    pub async fn delete(&self, email: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM email_verification_codes WHERE email = $1")
            .bind(email)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
