use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use super::PgStore;
use crate::calendar::DateWindow;
use crate::error::{CrmError, CrmResult};
use crate::models::client::{AddPayment, ClientFilter};
use crate::models::{Client, UpdateClient};
use crate::store::{ClientStore, OwnerScope};

const CLIENT_COLUMNS: &str = r#"
    id, client_name, email, phone_number, project_details,
    total_amount, advance_received, remaining_amount, bond_signed,
    project_start_date, project_end_date, delivery_status, payment_history,
    lead_id, created_by, created_at, updated_at
"#;

fn owner_of(scope: OwnerScope) -> Option<Uuid> {
    match scope {
        OwnerScope::All => None,
        OwnerScope::Owner(id) => Some(id),
    }
}

/// Loads and row-locks a client visible to `scope`.
async fn lock_client(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    scope: OwnerScope,
) -> CrmResult<Client> {
    let query = format!(
        r#"
        SELECT {} FROM clients
        WHERE id = $1 AND ($2::uuid IS NULL OR created_by = $2)
        FOR UPDATE
        "#,
        CLIENT_COLUMNS
    );
    sqlx::query_as::<_, Client>(&query)
        .bind(id)
        .bind(owner_of(scope))
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(CrmError::NotFound("Client"))
}

/// Writes every mutable column of `client` back to its row.
async fn write_back(tx: &mut Transaction<'_, Postgres>, client: &Client) -> CrmResult<()> {
    sqlx::query(
        r#"
        UPDATE clients SET
            client_name = $2, email = $3, phone_number = $4, project_details = $5,
            total_amount = $6, advance_received = $7, remaining_amount = $8,
            bond_signed = $9, project_start_date = $10, project_end_date = $11,
            delivery_status = $12, payment_history = $13, lead_id = $14,
            updated_at = $15
        WHERE id = $1
        "#,
    )
    .bind(client.id)
    .bind(&client.client_name)
    .bind(&client.email)
    .bind(&client.phone_number)
    .bind(&client.project_details)
    .bind(client.total_amount)
    .bind(client.advance_received)
    .bind(client.remaining_amount)
    .bind(client.bond_signed)
    .bind(client.project_start_date)
    .bind(client.project_end_date)
    .bind(client.delivery_status)
    .bind(Json(&client.payment_history))
    .bind(client.lead_id)
    .bind(client.updated_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait]
impl ClientStore for PgStore {
    async fn insert(&self, client: Client) -> CrmResult<Client> {
        sqlx::query(
            r#"
            INSERT INTO clients (
                id, client_name, email, phone_number, project_details,
                total_amount, advance_received, remaining_amount, bond_signed,
                project_start_date, project_end_date, delivery_status, payment_history,
                lead_id, created_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(client.id)
        .bind(&client.client_name)
        .bind(&client.email)
        .bind(&client.phone_number)
        .bind(&client.project_details)
        .bind(client.total_amount)
        .bind(client.advance_received)
        .bind(client.remaining_amount)
        .bind(client.bond_signed)
        .bind(client.project_start_date)
        .bind(client.project_end_date)
        .bind(client.delivery_status)
        .bind(Json(&client.payment_history))
        .bind(client.lead_id)
        .bind(client.created_by)
        .bind(client.created_at)
        .bind(client.updated_at)
        .execute(self.pool())
        .await?;
        Ok(client)
    }

    async fn update(
        &self,
        id: Uuid,
        scope: OwnerScope,
        patch: UpdateClient,
        now: DateTime<Utc>,
    ) -> CrmResult<Client> {
        let mut tx = self.pool().begin().await?;
        let mut client = lock_client(&mut tx, id, scope).await?;
        client.apply_update(patch, now)?;
        write_back(&mut tx, &client).await?;
        tx.commit().await?;
        Ok(client)
    }

    async fn add_payment(
        &self,
        id: Uuid,
        scope: OwnerScope,
        payment: AddPayment,
        actor: Uuid,
        now: DateTime<Utc>,
    ) -> CrmResult<Client> {
        let mut tx = self.pool().begin().await?;
        let mut client = lock_client(&mut tx, id, scope).await?;
        client.record_payment(payment, actor, now)?;
        write_back(&mut tx, &client).await?;
        tx.commit().await?;
        Ok(client)
    }

    async fn delete(&self, id: Uuid, scope: OwnerScope) -> CrmResult<()> {
        let result = sqlx::query(
            "DELETE FROM clients WHERE id = $1 AND ($2::uuid IS NULL OR created_by = $2)",
        )
        .bind(id)
        .bind(owner_of(scope))
        .execute(self.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(CrmError::NotFound("Client"));
        }
        Ok(())
    }

    async fn list(&self, filter: &ClientFilter, scope: OwnerScope) -> CrmResult<Vec<Client>> {
        let query = format!(
            r#"
            SELECT {} FROM clients
            WHERE ($1::uuid IS NULL OR created_by = $1)
                AND ($2::varchar IS NULL OR delivery_status = $2)
                AND ($3::timestamptz IS NULL OR project_start_date >= $3)
                AND ($4::timestamptz IS NULL OR project_start_date < $4)
            ORDER BY created_at DESC
            "#,
            CLIENT_COLUMNS
        );
        let clients = sqlx::query_as::<_, Client>(&query)
            .bind(owner_of(scope))
            .bind(filter.delivery_status)
            .bind(filter.project_start.start)
            .bind(filter.project_start.end)
            .fetch_all(self.pool())
            .await?;
        Ok(clients)
    }

    async fn created_within(&self, window: DateWindow) -> CrmResult<Vec<Client>> {
        let query = format!(
            r#"
            SELECT {} FROM clients
            WHERE ($1::timestamptz IS NULL OR created_at >= $1)
                AND ($2::timestamptz IS NULL OR created_at < $2)
            ORDER BY created_at DESC
            "#,
            CLIENT_COLUMNS
        );
        let clients = sqlx::query_as::<_, Client>(&query)
            .bind(window.start)
            .bind(window.end)
            .fetch_all(self.pool())
            .await?;
        Ok(clients)
    }
}
