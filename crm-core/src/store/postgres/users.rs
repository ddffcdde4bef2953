use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{conflict_on_unique, PgStore};
use crate::error::{CrmError, CrmResult};
use crate::models::user::normalize_email;
use crate::models::User;
use crate::store::UserStore;

const USER_COLUMNS: &str = r#"
    id, name, email, password_hash, role, is_active,
    last_login_at, created_at, updated_at
"#;

#[async_trait]
impl UserStore for PgStore {
    async fn insert(&self, user: User) -> CrmResult<User> {
        sqlx::query(
            r#"
            INSERT INTO users (
                id, name, email, password_hash, role, is_active,
                last_login_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role)
        .bind(user.is_active)
        .bind(user.last_login_at)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(self.pool())
        .await
        .map_err(|e| conflict_on_unique(e, "User already exists"))?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> CrmResult<Option<User>> {
        let query = format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS);
        let user = sqlx::query_as::<_, User>(&query)
            .bind(normalize_email(email))
            .fetch_optional(self.pool())
            .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> CrmResult<Option<User>> {
        let query = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let user = sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(user)
    }

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> CrmResult<()> {
        let result = sqlx::query("UPDATE users SET last_login_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(CrmError::NotFound("User"));
        }
        Ok(())
    }
}
