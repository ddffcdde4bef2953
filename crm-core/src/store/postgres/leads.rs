use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::PgStore;
use crate::error::{CrmError, CrmResult};
use crate::models::lead::LeadFilter;
use crate::models::{Lead, UpdateLead};
use crate::store::LeadStore;

const LEAD_COLUMNS: &str = r#"
    id, client_name, phone_number, reference_source, status, notes,
    date, follow_up_date, created_by, assigned_to, created_at, updated_at
"#;

#[async_trait]
impl LeadStore for PgStore {
    async fn insert(&self, lead: Lead) -> CrmResult<Lead> {
        sqlx::query(
            r#"
            INSERT INTO leads (
                id, client_name, phone_number, reference_source, status, notes,
                date, follow_up_date, created_by, assigned_to, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(lead.id)
        .bind(&lead.client_name)
        .bind(&lead.phone_number)
        .bind(lead.reference_source)
        .bind(lead.status)
        .bind(&lead.notes)
        .bind(lead.date)
        .bind(lead.follow_up_date)
        .bind(lead.created_by)
        .bind(lead.assigned_to)
        .bind(lead.created_at)
        .bind(lead.updated_at)
        .execute(self.pool())
        .await?;
        Ok(lead)
    }

    async fn update(&self, id: Uuid, patch: UpdateLead, now: DateTime<Utc>) -> CrmResult<Lead> {
        let mut tx = self.pool().begin().await?;

        let query = format!("SELECT {} FROM leads WHERE id = $1 FOR UPDATE", LEAD_COLUMNS);
        let mut lead = sqlx::query_as::<_, Lead>(&query)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(CrmError::NotFound("Lead"))?;

        lead.apply_update(patch, now)?;

        sqlx::query(
            r#"
            UPDATE leads SET
                client_name = $2, phone_number = $3, reference_source = $4,
                status = $5, notes = $6, date = $7, follow_up_date = $8,
                assigned_to = $9, updated_at = $10
            WHERE id = $1
            "#,
        )
        .bind(lead.id)
        .bind(&lead.client_name)
        .bind(&lead.phone_number)
        .bind(lead.reference_source)
        .bind(lead.status)
        .bind(&lead.notes)
        .bind(lead.date)
        .bind(lead.follow_up_date)
        .bind(lead.assigned_to)
        .bind(lead.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(lead)
    }

    async fn delete(&self, id: Uuid) -> CrmResult<()> {
        let result = sqlx::query("DELETE FROM leads WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(CrmError::NotFound("Lead"));
        }
        Ok(())
    }

    async fn list(&self, filter: &LeadFilter) -> CrmResult<Vec<Lead>> {
        let query = format!(
            r#"
            SELECT {} FROM leads
            WHERE ($1::varchar IS NULL OR status = $1)
                AND ($2::varchar IS NULL OR reference_source = $2)
                AND ($3::timestamptz IS NULL OR date >= $3)
                AND ($4::timestamptz IS NULL OR date < $4)
            ORDER BY created_at DESC
            "#,
            LEAD_COLUMNS
        );
        let leads = sqlx::query_as::<_, Lead>(&query)
            .bind(filter.status)
            .bind(filter.source)
            .bind(filter.date.start)
            .bind(filter.date.end)
            .fetch_all(self.pool())
            .await?;
        Ok(leads)
    }

    async fn follow_ups(&self, since: DateTime<Utc>) -> CrmResult<Vec<Lead>> {
        let query = format!(
            r#"
            SELECT {} FROM leads
            WHERE follow_up_date >= $1
                AND status NOT IN ('Converted', 'Closed', 'Dead')
            ORDER BY follow_up_date ASC
            "#,
            LEAD_COLUMNS
        );
        let leads = sqlx::query_as::<_, Lead>(&query)
            .bind(since)
            .fetch_all(self.pool())
            .await?;
        Ok(leads)
    }
}
