/// Identity Resolver
///
/// Adapter over the credential store: given an identifier, returns the stored
/// principal (credential hash + role) or absent. The authentication gate and
/// the refresh coordinator both depend on this seam, never on the members
/// table directly.
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;

/// The identity facts authentication decisions are made from.
#[derive(Debug, Clone)]
pub struct Principal {
    pub id: Uuid,
    pub email: String,
    /// Absent for members created through social auto-signup; such accounts
    /// cannot pass the password gate.
    pub password_hash: Option<String>,
    pub authority: String,
    pub enabled: bool,
}

impl Principal {
    /// Role set as carried in token claims.
    pub fn roles(&self) -> Vec<String> {
        vec![self.authority.clone()]
    }
}

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve_by_email(&self, email: &str) -> Result<Option<Principal>, AppError>;

    async fn resolve_by_id(&self, member_id: Uuid) -> Result<Option<Principal>, AppError>;
}

pub struct PgIdentityResolver {
    pool: PgPool,
}

impl PgIdentityResolver {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

type PrincipalRow = (Uuid, String, Option<String>, String, bool);

fn row_to_principal(row: PrincipalRow) -> Principal {
    let (id, email, password_hash, authority, enabled) = row;
    Principal {
        id,
        email,
        password_hash,
        authority,
        enabled,
    }
}

#[async_trait]
impl IdentityResolver for PgIdentityResolver {
    async fn resolve_by_email(&self, email: &str) -> Result<Option<Principal>, AppError> {
        let row = sqlx::query_as::<_, PrincipalRow>(
            "SELECT id, email, password_hash, authority, status = 'enabled' FROM members WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_principal))
    }

    async fn resolve_by_id(&self, member_id: Uuid) -> Result<Option<Principal>, AppError> {
        let row = sqlx::query_as::<_, PrincipalRow>(
            "SELECT id, email, password_hash, authority, status = 'enabled' FROM members WHERE id = $1",
        )
        .bind(member_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_principal))
    }
}

#[cfg(test)]
pub mod test_support {
    //! In-memory resolver backing the gate and coordinator unit tests.
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    pub struct InMemoryIdentityResolver {
        members: Mutex<HashMap<Uuid, Principal>>,
    }

    impl InMemoryIdentityResolver {
        pub fn new() -> Self {
            Self {
                members: Mutex::new(HashMap::new()),
            }
        }

        pub fn insert(&self, principal: Principal) {
            self.members
                .lock()
                .unwrap()
                .insert(principal.id, principal);
        }

        pub fn set_authority(&self, member_id: Uuid, authority: &str) {
            if let Some(p) = self.members.lock().unwrap().get_mut(&member_id) {
                p.authority = authority.to_string();
            }
        }
    }

    #[async_trait]
    impl IdentityResolver for InMemoryIdentityResolver {
        async fn resolve_by_email(&self, email: &str) -> Result<Option<Principal>, AppError> {
            Ok(self
                .members
                .lock()
                .unwrap()
                .values()
                .find(|p| p.email == email)
                .cloned())
        }

        async fn resolve_by_id(&self, member_id: Uuid) -> Result<Option<Principal>, AppError> {
            Ok(self.members.lock().unwrap().get(&member_id).cloned())
        }
    }
}
