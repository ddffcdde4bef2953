//! Persistence seams for the CRM entities.
//!
//! Each entity has its own store trait. `PgStore` backs them with Postgres,
//! `MemoryStore` with in-process maps (development and tests). Both apply
//! the same model methods (`Client::apply_update`, `Client::record_payment`,
//! `Task::toggle`, ...) inside a per-record critical section, so derived
//! fields are computed in exactly one place.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::calendar::DateWindow;
use crate::error::CrmResult;
use crate::models::client::{AddPayment, ClientFilter};
use crate::models::expense::ExpenseFilter;
use crate::models::lead::LeadFilter;
use crate::models::{Client, Expense, Lead, Task, UpdateClient, UpdateExpense, UpdateLead, User};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Which records a caller may see or touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerScope {
    /// Administrators see every record.
    All,
    /// Everyone else only sees records they created.
    Owner(Uuid),
}

impl OwnerScope {
    pub fn allows(&self, created_by: Option<Uuid>) -> bool {
        match self {
            OwnerScope::All => true,
            OwnerScope::Owner(id) => created_by == Some(*id),
        }
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `Conflict` if the email is already registered.
    async fn insert(&self, user: User) -> CrmResult<User>;
    async fn find_by_email(&self, email: &str) -> CrmResult<Option<User>>;
    async fn find_by_id(&self, id: Uuid) -> CrmResult<Option<User>>;
    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> CrmResult<()>;
}

#[async_trait]
pub trait LeadStore: Send + Sync {
    async fn insert(&self, lead: Lead) -> CrmResult<Lead>;
    async fn update(&self, id: Uuid, patch: UpdateLead, now: DateTime<Utc>) -> CrmResult<Lead>;
    async fn delete(&self, id: Uuid) -> CrmResult<()>;
    /// Newest `created_at` first.
    async fn list(&self, filter: &LeadFilter) -> CrmResult<Vec<Lead>>;
    /// Leads with `follow_up_date >= since` that still need a call,
    /// earliest follow-up first.
    async fn follow_ups(&self, since: DateTime<Utc>) -> CrmResult<Vec<Lead>>;
}

#[async_trait]
pub trait ClientStore: Send + Sync {
    async fn insert(&self, client: Client) -> CrmResult<Client>;
    /// Read-modify-write under a per-record lock.
    async fn update(
        &self,
        id: Uuid,
        scope: OwnerScope,
        patch: UpdateClient,
        now: DateTime<Utc>,
    ) -> CrmResult<Client>;
    /// Read-modify-write under a per-record lock; concurrent payments compose.
    async fn add_payment(
        &self,
        id: Uuid,
        scope: OwnerScope,
        payment: AddPayment,
        actor: Uuid,
        now: DateTime<Utc>,
    ) -> CrmResult<Client>;
    async fn delete(&self, id: Uuid, scope: OwnerScope) -> CrmResult<()>;
    /// Newest `created_at` first.
    async fn list(&self, filter: &ClientFilter, scope: OwnerScope) -> CrmResult<Vec<Client>>;
    /// Clients whose `created_at` falls in `window`.
    async fn created_within(&self, window: DateWindow) -> CrmResult<Vec<Client>>;
}

#[async_trait]
pub trait ExpenseStore: Send + Sync {
    async fn insert(&self, expense: Expense) -> CrmResult<Expense>;
    async fn update(
        &self,
        id: Uuid,
        patch: UpdateExpense,
        now: DateTime<Utc>,
    ) -> CrmResult<Expense>;
    async fn delete(&self, id: Uuid) -> CrmResult<()>;
    /// Newest `date` first.
    async fn list(&self, filter: &ExpenseFilter) -> CrmResult<Vec<Expense>>;
}

/// Every task query ignores rows whose `expire_at` is at or before `now`,
/// so a task is gone for callers the instant it expires even if the
/// reaper has not run yet.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn insert(&self, task: Task) -> CrmResult<Task>;
    /// All of `user`'s live tasks whose `task_date` is in `day`, ordered by
    /// `due_at` then `created_at`.
    async fn list_for_day(
        &self,
        user: Uuid,
        day: DateWindow,
        now: DateTime<Utc>,
    ) -> CrmResult<Vec<Task>>;
    async fn toggle(&self, id: Uuid, user: Uuid, now: DateTime<Utc>) -> CrmResult<Task>;
    async fn delete(&self, id: Uuid, user: Uuid, now: DateTime<Utc>) -> CrmResult<()>;
    /// Deletes `user`'s completed tasks in `day`; returns how many went.
    async fn clear_completed(
        &self,
        user: Uuid,
        day: DateWindow,
        now: DateTime<Utc>,
    ) -> CrmResult<u64>;
    /// Hard-deletes every task with `expire_at <= now`.
    async fn purge_expired(&self, now: DateTime<Utc>) -> CrmResult<u64>;
}

/// The set of stores the application runs against.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub leads: Arc<dyn LeadStore>,
    pub clients: Arc<dyn ClientStore>,
    pub expenses: Arc<dyn ExpenseStore>,
    pub tasks: Arc<dyn TaskStore>,
    pool: Option<sqlx::PgPool>,
}

impl Stores {
    pub fn postgres(store: PgStore) -> Self {
        let pool = store.pool().clone();
        let store = Arc::new(store);
        Stores {
            users: store.clone(),
            leads: store.clone(),
            clients: store.clone(),
            expenses: store.clone(),
            tasks: store,
            pool: Some(pool),
        }
    }

    pub fn memory(store: MemoryStore) -> Self {
        let store = Arc::new(store);
        Stores {
            users: store.clone(),
            leads: store.clone(),
            clients: store.clone(),
            expenses: store.clone(),
            tasks: store,
            pool: None,
        }
    }

    /// Checks that the backing database answers.
    pub async fn ping(&self) -> CrmResult<()> {
        if let Some(pool) = &self.pool {
            sqlx::query("SELECT 1").execute(pool).await?;
        }
        Ok(())
    }

    pub fn backend_name(&self) -> &'static str {
        if self.pool.is_some() {
            "postgres"
        } else {
            "memory"
        }
    }
}
