/// Refresh Session Store
///
/// Server-side half of the refresh trust boundary: a TTL-bounded mapping from
/// an opaque session id to the member that owns it. Consumers depend only on
/// `put`/`get`/`delete`, never on a backend-specific feature, so the backend
/// can be swapped for any TTL-capable key-value store.
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;

/// A live refresh session.
///
/// Expiry is a store-level concern: an expired entry is simply absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshSession {
    pub session_id: String,
    pub member_id: Uuid,
}

#[async_trait]
pub trait RefreshSessionStore: Send + Sync {
    /// Upsert a session. The TTL clock restarts on every write.
    async fn put(&self, session_id: &str, member_id: Uuid) -> Result<(), AppError>;

    async fn get(&self, session_id: &str) -> Result<Option<RefreshSession>, AppError>;

    async fn delete(&self, session_id: &str) -> Result<(), AppError>;
}

/// Postgres-backed store.
///
/// TTL is realized as an `expires_at` column written on upsert and filtered
/// on read, the same lazy-expiry scheme the rest of the service uses for
/// verification codes.
pub struct PgRefreshSessionStore {
    pool: PgPool,
    ttl: Duration,
}

impl PgRefreshSessionStore {
    pub fn new(pool: PgPool, ttl_seconds: i64) -> Self {
        Self {
            pool,
            ttl: Duration::seconds(ttl_seconds),
        }
    }
}

#[async_trait]
impl RefreshSessionStore for PgRefreshSessionStore {
    async fn put(&self, session_id: &str, member_id: Uuid) -> Result<(), AppError> {
        let expires_at = Utc::now() + self.ttl;

        sqlx::query(
            r#"
            INSERT INTO refresh_sessions (session_id, member_id, expires_at, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (session_id)
            DO UPDATE SET member_id = $2, expires_at = $3
            "#,
        )
        .bind(session_id)
        .bind(member_id)
        .bind(expires_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Option<RefreshSession>, AppError> {
        let row = sqlx::query_as::<_, (String, Uuid, DateTime<Utc>)>(
            r#"
            SELECT session_id, member_id, expires_at
            FROM refresh_sessions
            WHERE session_id = $1 AND expires_at > $2
            "#,
        )
        .bind(session_id)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(session_id, member_id, _)| RefreshSession {
            session_id,
            member_id,
        }))
    }

    async fn delete(&self, session_id: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM refresh_sessions WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

/// In-memory store with the same TTL semantics, for tests and local runs.
pub struct InMemoryRefreshSessionStore {
    entries: Mutex<HashMap<String, (Uuid, DateTime<Utc>)>>,
    ttl: Duration,
}

impl InMemoryRefreshSessionStore {
    pub fn new(ttl_seconds: i64) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: Duration::seconds(ttl_seconds),
        }
    }

    /// Number of stored entries, live or expired.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RefreshSessionStore for InMemoryRefreshSessionStore {
    async fn put(&self, session_id: &str, member_id: Uuid) -> Result<(), AppError> {
        let expires_at = Utc::now() + self.ttl;
        self.entries
            .lock()
            .unwrap()
            .insert(session_id.to_string(), (member_id, expires_at));

        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Option<RefreshSession>, AppError> {
        let entries = self.entries.lock().unwrap();

        Ok(entries.get(session_id).and_then(|(member_id, expires_at)| {
            if *expires_at > Utc::now() {
                Some(RefreshSession {
                    session_id: session_id.to_string(),
                    member_id: *member_id,
                })
            } else {
                None
            }
        }))
    }

    async fn delete(&self, session_id: &str) -> Result<(), AppError> {
        self.entries.lock().unwrap().remove(session_id);

        Ok(())
    }
}
