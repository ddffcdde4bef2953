use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::calendar::DateWindow;
use crate::error::{CrmError, CrmResult};
use crate::models::client::{AddPayment, ClientFilter};
use crate::models::expense::ExpenseFilter;
use crate::models::lead::LeadFilter;
use crate::models::task::TaskStatus;
use crate::models::user::normalize_email;
use crate::models::{Client, Expense, Lead, Task, UpdateClient, UpdateExpense, UpdateLead, User};
use crate::store::{ClientStore, ExpenseStore, LeadStore, OwnerScope, TaskStore, UserStore};

/// In-process store used for development and tests.
///
/// Each collection sits behind its own `RwLock`; mutations take the write
/// lock for the whole read-modify-write, which serializes writes per
/// collection and therefore per record.
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<Uuid, User>>,
    leads: RwLock<HashMap<Uuid, Lead>>,
    clients: RwLock<HashMap<Uuid, Client>>,
    expenses: RwLock<HashMap<Uuid, Expense>>,
    tasks: RwLock<HashMap<Uuid, Task>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert(&self, user: User) -> CrmResult<User> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == user.email) {
            return Err(CrmError::Conflict("User already exists".to_string()));
        }
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> CrmResult<Option<User>> {
        let email = normalize_email(email);
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> CrmResult<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> CrmResult<()> {
        let mut users = self.users.write().await;
        let user = users.get_mut(&id).ok_or(CrmError::NotFound("User"))?;
        user.last_login_at = Some(at);
        Ok(())
    }
}

#[async_trait]
impl LeadStore for MemoryStore {
    async fn insert(&self, lead: Lead) -> CrmResult<Lead> {
        self.leads.write().await.insert(lead.id, lead.clone());
        Ok(lead)
    }

    async fn update(&self, id: Uuid, patch: UpdateLead, now: DateTime<Utc>) -> CrmResult<Lead> {
        let mut leads = self.leads.write().await;
        let lead = leads.get_mut(&id).ok_or(CrmError::NotFound("Lead"))?;
        lead.apply_update(patch, now)?;
        Ok(lead.clone())
    }

    async fn delete(&self, id: Uuid) -> CrmResult<()> {
        self.leads
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(CrmError::NotFound("Lead"))
    }

    async fn list(&self, filter: &LeadFilter) -> CrmResult<Vec<Lead>> {
        let leads = self.leads.read().await;
        let mut found: Vec<Lead> = leads.values().filter(|l| filter.matches(l)).cloned().collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn follow_ups(&self, since: DateTime<Utc>) -> CrmResult<Vec<Lead>> {
        let leads = self.leads.read().await;
        let mut found: Vec<Lead> = leads
            .values()
            .filter(|l| l.status.needs_follow_up())
            .filter(|l| l.follow_up_date.is_some_and(|f| f >= since))
            .cloned()
            .collect();
        found.sort_by_key(|l| l.follow_up_date);
        Ok(found)
    }
}

#[async_trait]
impl ClientStore for MemoryStore {
    async fn insert(&self, client: Client) -> CrmResult<Client> {
        self.clients.write().await.insert(client.id, client.clone());
        Ok(client)
    }

    async fn update(
        &self,
        id: Uuid,
        scope: OwnerScope,
        patch: UpdateClient,
        now: DateTime<Utc>,
    ) -> CrmResult<Client> {
        let mut clients = self.clients.write().await;
        let client = clients
            .get_mut(&id)
            .filter(|c| scope.allows(c.created_by))
            .ok_or(CrmError::NotFound("Client"))?;
        client.apply_update(patch, now)?;
        Ok(client.clone())
    }

    async fn add_payment(
        &self,
        id: Uuid,
        scope: OwnerScope,
        payment: AddPayment,
        actor: Uuid,
        now: DateTime<Utc>,
    ) -> CrmResult<Client> {
        let mut clients = self.clients.write().await;
        let client = clients
            .get_mut(&id)
            .filter(|c| scope.allows(c.created_by))
            .ok_or(CrmError::NotFound("Client"))?;
        client.record_payment(payment, actor, now)?;
        Ok(client.clone())
    }

    async fn delete(&self, id: Uuid, scope: OwnerScope) -> CrmResult<()> {
        let mut clients = self.clients.write().await;
        if !clients.get(&id).is_some_and(|c| scope.allows(c.created_by)) {
            return Err(CrmError::NotFound("Client"));
        }
        clients.remove(&id);
        Ok(())
    }

    async fn list(&self, filter: &ClientFilter, scope: OwnerScope) -> CrmResult<Vec<Client>> {
        let clients = self.clients.read().await;
        let mut found: Vec<Client> = clients
            .values()
            .filter(|c| scope.allows(c.created_by) && filter.matches(c))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn created_within(&self, window: DateWindow) -> CrmResult<Vec<Client>> {
        let clients = self.clients.read().await;
        let mut found: Vec<Client> = clients
            .values()
            .filter(|c| window.contains(c.created_at))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }
}

#[async_trait]
impl ExpenseStore for MemoryStore {
    async fn insert(&self, expense: Expense) -> CrmResult<Expense> {
        self.expenses.write().await.insert(expense.id, expense.clone());
        Ok(expense)
    }

    async fn update(
        &self,
        id: Uuid,
        patch: UpdateExpense,
        now: DateTime<Utc>,
    ) -> CrmResult<Expense> {
        let mut expenses = self.expenses.write().await;
        let expense = expenses.get_mut(&id).ok_or(CrmError::NotFound("Expense"))?;
        expense.apply_update(patch, now)?;
        Ok(expense.clone())
    }

    async fn delete(&self, id: Uuid) -> CrmResult<()> {
        self.expenses
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(CrmError::NotFound("Expense"))
    }

    async fn list(&self, filter: &ExpenseFilter) -> CrmResult<Vec<Expense>> {
        let expenses = self.expenses.read().await;
        let mut found: Vec<Expense> = expenses
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(found)
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn insert(&self, task: Task) -> CrmResult<Task> {
        self.tasks.write().await.insert(task.id, task.clone());
        Ok(task)
    }

    async fn list_for_day(
        &self,
        user: Uuid,
        day: DateWindow,
        now: DateTime<Utc>,
    ) -> CrmResult<Vec<Task>> {
        let tasks = self.tasks.read().await;
        let mut found: Vec<Task> = tasks
            .values()
            .filter(|t| t.user_id == user && !t.is_expired(now) && day.contains(t.task_date))
            .cloned()
            .collect();
        found.sort_by(|a, b| (a.due_at, a.created_at).cmp(&(b.due_at, b.created_at)));
        Ok(found)
    }

    async fn toggle(&self, id: Uuid, user: Uuid, now: DateTime<Utc>) -> CrmResult<Task> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(&id)
            .filter(|t| t.user_id == user && !t.is_expired(now))
            .ok_or(CrmError::NotFound("Task"))?;
        task.toggle(now);
        Ok(task.clone())
    }

    async fn delete(&self, id: Uuid, user: Uuid, now: DateTime<Utc>) -> CrmResult<()> {
        let mut tasks = self.tasks.write().await;
        if !tasks
            .get(&id)
            .is_some_and(|t| t.user_id == user && !t.is_expired(now))
        {
            return Err(CrmError::NotFound("Task"));
        }
        tasks.remove(&id);
        Ok(())
    }

    async fn clear_completed(
        &self,
        user: Uuid,
        day: DateWindow,
        now: DateTime<Utc>,
    ) -> CrmResult<u64> {
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|_, t| {
            !(t.user_id == user
                && t.status == TaskStatus::Completed
                && !t.is_expired(now)
                && day.contains(t.task_date))
        });
        Ok((before - tasks.len()) as u64)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> CrmResult<u64> {
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|_, t| !t.is_expired(now));
        let purged = (before - tasks.len()) as u64;
        if purged > 0 {
            info!("Purged {} expired task(s) from memory store", purged);
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::BusinessCalendar;
    use crate::models::client::CreateClient;
    use crate::models::task::CreateTask;
    use chrono::{Duration, TimeZone};
    use rust_decimal::Decimal;
    use std::sync::Arc;

    fn client_request(total: i64, advance: i64) -> CreateClient {
        CreateClient {
            client_name: "Sharma Traders".to_string(),
            email: "accounts@sharma.in".to_string(),
            phone_number: "9811111111".to_string(),
            project_details: "ERP rollout".to_string(),
            total_amount: Decimal::from(total),
            advance_received: Some(Decimal::from(advance)),
            bond_signed: Some(true),
            project_start_date: Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap(),
            project_end_date: Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap(),
            delivery_status: None,
            lead_id: None,
        }
    }

    fn payment(amount: i64, description: &str) -> AddPayment {
        AddPayment {
            amount: Decimal::from(amount),
            description: Some(description.to_string()),
        }
    }

    #[tokio::test]
    async fn test_end_to_end_client_payments() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let client = Client::new(client_request(1000, 200), owner, Utc::now()).unwrap();
        let client = ClientStore::insert(&store, client).await.unwrap();
        assert_eq!(client.remaining_amount, Decimal::from(800));
        assert_eq!(client.payment_history.len(), 1);

        let updated = store
            .add_payment(client.id, OwnerScope::All, payment(300, "Milestone 1"), owner, Utc::now())
            .await
            .unwrap();
        assert_eq!(updated.advance_received, Decimal::from(500));
        assert_eq!(updated.remaining_amount, Decimal::from(500));
        assert_eq!(updated.payment_history.len(), 2);
    }

    #[tokio::test]
    async fn test_two_payments_add_exactly() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let client = ClientStore::insert(
            &store,
            Client::new(client_request(1000, 0), owner, Utc::now()).unwrap(),
        )
        .await
        .unwrap();

        for _ in 0..2 {
            store
                .add_payment(client.id, OwnerScope::All, payment(100, "Instalment"), owner, Utc::now())
                .await
                .unwrap();
        }

        let listed = ClientStore::list(&store, &ClientFilter::default(), OwnerScope::All)
            .await
            .unwrap();
        assert_eq!(listed[0].advance_received, Decimal::from(200));
        assert_eq!(listed[0].payment_history.len(), 2);
        assert_eq!(listed[0].remaining_amount, Decimal::from(800));
    }

    #[tokio::test]
    async fn test_concurrent_payments_compose() {
        let store = Arc::new(MemoryStore::new());
        let owner = Uuid::new_v4();
        let client = ClientStore::insert(
            store.as_ref(),
            Client::new(client_request(10_000, 0), owner, Utc::now()).unwrap(),
        )
        .await
        .unwrap();

        let mut handles = Vec::new();
        for _ in 0..25 {
            let store = store.clone();
            let id = client.id;
            handles.push(tokio::spawn(async move {
                store
                    .add_payment(id, OwnerScope::All, payment(100, "Instalment"), owner, Utc::now())
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let listed = ClientStore::list(store.as_ref(), &ClientFilter::default(), OwnerScope::All)
            .await
            .unwrap();
        assert_eq!(listed[0].advance_received, Decimal::from(2_500));
        assert_eq!(listed[0].remaining_amount, Decimal::from(7_500));
        assert_eq!(listed[0].payment_history.len(), 25);
    }

    #[tokio::test]
    async fn test_failed_payment_leaves_client_unchanged() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let client = ClientStore::insert(
            &store,
            Client::new(client_request(1000, 200), owner, Utc::now()).unwrap(),
        )
        .await
        .unwrap();

        let err = store
            .add_payment(client.id, OwnerScope::All, payment(0, "oops"), owner, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::Validation(_)));

        let missing = store
            .add_payment(Uuid::new_v4(), OwnerScope::All, payment(10, "x"), owner, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(missing, CrmError::NotFound("Client")));

        let listed = ClientStore::list(&store, &ClientFilter::default(), OwnerScope::All)
            .await
            .unwrap();
        assert_eq!(listed[0].advance_received, Decimal::from(200));
        assert_eq!(listed[0].payment_history.len(), 1);
    }

    #[tokio::test]
    async fn test_owner_scope_hides_other_clients() {
        let store = MemoryStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let client = ClientStore::insert(
            &store,
            Client::new(client_request(1000, 0), alice, Utc::now()).unwrap(),
        )
        .await
        .unwrap();

        let bobs = ClientStore::list(&store, &ClientFilter::default(), OwnerScope::Owner(bob))
            .await
            .unwrap();
        assert!(bobs.is_empty());

        let err = ClientStore::delete(&store, client.id, OwnerScope::Owner(bob))
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::NotFound(_)));

        ClientStore::delete(&store, client.id, OwnerScope::Owner(alice))
            .await
            .unwrap();
        let err = ClientStore::delete(&store, client.id, OwnerScope::All)
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_expired_tasks_are_invisible_and_purged() {
        let store = MemoryStore::new();
        let calendar = BusinessCalendar::new(chrono_tz::UTC);
        let user = Uuid::new_v4();
        let now = Utc.with_ymd_and_hms(2024, 8, 1, 10, 0, 0).unwrap();
        let task = Task::schedule(
            user,
            CreateTask {
                title: Some("Visit site".to_string()),
                ..Default::default()
            },
            &calendar,
            now,
        )
        .unwrap();
        TaskStore::insert(&store, task.clone()).await.unwrap();

        let today = calendar.today(now);
        assert_eq!(store.list_for_day(user, today, now).await.unwrap().len(), 1);

        let later = task.expire_at + Duration::milliseconds(1);
        assert!(store.list_for_day(user, today, later).await.unwrap().is_empty());
        assert!(matches!(
            store.toggle(task.id, user, later).await,
            Err(CrmError::NotFound("Task"))
        ));

        assert_eq!(store.purge_expired(later).await.unwrap(), 1);
        assert_eq!(store.purge_expired(later).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let user = User::new(
            "A".to_string(),
            "a@x.io",
            "h".to_string(),
            crate::models::Role::Admin,
            now,
        );
        UserStore::insert(&store, user).await.unwrap();
        let again = User::new(
            "B".to_string(),
            "A@X.io",
            "h".to_string(),
            crate::models::Role::CallingStaff,
            now,
        );
        assert!(matches!(
            UserStore::insert(&store, again).await,
            Err(CrmError::Conflict(_))
        ));
        assert!(store.find_by_email(" a@x.IO").await.unwrap().is_some());
    }
}
