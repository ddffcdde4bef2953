use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::PgStore;
use crate::error::{CrmError, CrmResult};
use crate::models::expense::ExpenseFilter;
use crate::models::{Expense, UpdateExpense};
use crate::store::ExpenseStore;

const EXPENSE_COLUMNS: &str = r#"
    id, date, category, amount, description, payment_method,
    receipt_number, created_by, created_at, updated_at
"#;

#[async_trait]
impl ExpenseStore for PgStore {
    async fn insert(&self, expense: Expense) -> CrmResult<Expense> {
        sqlx::query(
            r#"
            INSERT INTO expenses (
                id, date, category, amount, description, payment_method,
                receipt_number, created_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(expense.id)
        .bind(expense.date)
        .bind(expense.category)
        .bind(expense.amount)
        .bind(&expense.description)
        .bind(expense.payment_method)
        .bind(&expense.receipt_number)
        .bind(expense.created_by)
        .bind(expense.created_at)
        .bind(expense.updated_at)
        .execute(self.pool())
        .await?;
        Ok(expense)
    }

    async fn update(
        &self,
        id: Uuid,
        patch: UpdateExpense,
        now: DateTime<Utc>,
    ) -> CrmResult<Expense> {
        let mut tx = self.pool().begin().await?;

        let query = format!("SELECT {} FROM expenses WHERE id = $1 FOR UPDATE", EXPENSE_COLUMNS);
        let mut expense = sqlx::query_as::<_, Expense>(&query)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(CrmError::NotFound("Expense"))?;

        expense.apply_update(patch, now)?;

        sqlx::query(
            r#"
            UPDATE expenses SET
                date = $2, category = $3, amount = $4, description = $5,
                payment_method = $6, receipt_number = $7, updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(expense.id)
        .bind(expense.date)
        .bind(expense.category)
        .bind(expense.amount)
        .bind(&expense.description)
        .bind(expense.payment_method)
        .bind(&expense.receipt_number)
        .bind(expense.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(expense)
    }

    async fn delete(&self, id: Uuid) -> CrmResult<()> {
        let result = sqlx::query("DELETE FROM expenses WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(CrmError::NotFound("Expense"));
        }
        Ok(())
    }

    async fn list(&self, filter: &ExpenseFilter) -> CrmResult<Vec<Expense>> {
        let query = format!(
            r#"
            SELECT {} FROM expenses
            WHERE ($1::varchar IS NULL OR category = $1)
                AND ($2::timestamptz IS NULL OR date >= $2)
                AND ($3::timestamptz IS NULL OR date < $3)
            ORDER BY date DESC
            "#,
            EXPENSE_COLUMNS
        );
        let expenses = sqlx::query_as::<_, Expense>(&query)
            .bind(filter.category)
            .bind(filter.date.start)
            .bind(filter.date.end)
            .fetch_all(self.pool())
            .await?;
        Ok(expenses)
    }
}
