use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use super::PgStore;
use crate::calendar::DateWindow;
use crate::error::{CrmError, CrmResult};
use crate::models::Task;
use crate::store::TaskStore;

const TASK_COLUMNS: &str = r#"
    id, user_id, title, priority, status, due_at,
    task_date, expire_at, created_at, completed_at
"#;

#[async_trait]
impl TaskStore for PgStore {
    async fn insert(&self, task: Task) -> CrmResult<Task> {
        sqlx::query(
            r#"
            INSERT INTO today_tasks (
                id, user_id, title, priority, status, due_at,
                task_date, expire_at, created_at, completed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(task.id)
        .bind(task.user_id)
        .bind(&task.title)
        .bind(task.priority)
        .bind(task.status)
        .bind(task.due_at)
        .bind(task.task_date)
        .bind(task.expire_at)
        .bind(task.created_at)
        .bind(task.completed_at)
        .execute(self.pool())
        .await?;
        Ok(task)
    }

    async fn list_for_day(
        &self,
        user: Uuid,
        day: DateWindow,
        now: DateTime<Utc>,
    ) -> CrmResult<Vec<Task>> {
        let query = format!(
            r#"
            SELECT {} FROM today_tasks
            WHERE user_id = $1
                AND expire_at > $2
                AND ($3::timestamptz IS NULL OR task_date >= $3)
                AND ($4::timestamptz IS NULL OR task_date < $4)
            ORDER BY due_at ASC, created_at ASC
            "#,
            TASK_COLUMNS
        );
        let tasks = sqlx::query_as::<_, Task>(&query)
            .bind(user)
            .bind(now)
            .bind(day.start)
            .bind(day.end)
            .fetch_all(self.pool())
            .await?;
        Ok(tasks)
    }

    async fn toggle(&self, id: Uuid, user: Uuid, now: DateTime<Utc>) -> CrmResult<Task> {
        let mut tx = self.pool().begin().await?;

        let query = format!(
            r#"
            SELECT {} FROM today_tasks
            WHERE id = $1 AND user_id = $2 AND expire_at > $3
            FOR UPDATE
            "#,
            TASK_COLUMNS
        );
        let mut task = sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .bind(user)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(CrmError::NotFound("Task"))?;

        task.toggle(now);

        sqlx::query("UPDATE today_tasks SET status = $2, completed_at = $3 WHERE id = $1")
            .bind(task.id)
            .bind(task.status)
            .bind(task.completed_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(task)
    }

    async fn delete(&self, id: Uuid, user: Uuid, now: DateTime<Utc>) -> CrmResult<()> {
        let result = sqlx::query(
            "DELETE FROM today_tasks WHERE id = $1 AND user_id = $2 AND expire_at > $3",
        )
        .bind(id)
        .bind(user)
        .bind(now)
        .execute(self.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(CrmError::NotFound("Task"));
        }
        Ok(())
    }

    async fn clear_completed(
        &self,
        user: Uuid,
        day: DateWindow,
        now: DateTime<Utc>,
    ) -> CrmResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM today_tasks
            WHERE user_id = $1
                AND status = 'completed'
                AND expire_at > $2
                AND ($3::timestamptz IS NULL OR task_date >= $3)
                AND ($4::timestamptz IS NULL OR task_date < $4)
            "#,
        )
        .bind(user)
        .bind(now)
        .bind(day.start)
        .bind(day.end)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> CrmResult<u64> {
        let result = sqlx::query("DELETE FROM today_tasks WHERE expire_at <= $1")
            .bind(now)
            .execute(self.pool())
            .await?;
        let purged = result.rows_affected();
        if purged > 0 {
            info!("Purged {} expired task(s)", purged);
        }
        Ok(purged)
    }
}
