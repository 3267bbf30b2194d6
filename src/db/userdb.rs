// db/userdb.rs
use async_trait::async_trait;
use uuid::Uuid;
use sqlx::Row;

use super::db::DBClient;
use crate::models::usermodel::*;
use crate::service::error::ServiceError;

#[async_trait]
pub trait UserExt {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, ServiceError>;

    /// Trust level is maintained by the external reputation collaborator;
    /// the core only reads it as a precondition gate.
    async fn get_trust_level(&self, user_id: Uuid) -> Result<i32, ServiceError>;

    async fn has_verified_certification(
        &self,
        user_id: Uuid,
        kind: CertificationKind,
    ) -> Result<bool, ServiceError>;

    async fn get_certifications(&self, user_id: Uuid) -> Result<Vec<Certification>, ServiceError>;
}

#[async_trait]
impl UserExt for DBClient {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, ServiceError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, name, role, trust_level, created_at FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn get_trust_level(&self, user_id: Uuid) -> Result<i32, ServiceError> {
        let row = sqlx::query("SELECT trust_level FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServiceError::UserNotFound(user_id))?;

        Ok(row.get::<i32, _>("trust_level"))
    }

    async fn has_verified_certification(
        &self,
        user_id: Uuid,
        kind: CertificationKind,
    ) -> Result<bool, ServiceError> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM certifications
                WHERE user_id = $1 AND kind = $2 AND verified = TRUE
            ) AS certified
            "#,
        )
        .bind(user_id)
        .bind(kind)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<bool, _>("certified"))
    }

    async fn get_certifications(&self, user_id: Uuid) -> Result<Vec<Certification>, ServiceError> {
        let rows = sqlx::query_as::<_, Certification>(
            r#"
            SELECT id, user_id, kind, verified, created_at
            FROM certifications
            WHERE user_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
