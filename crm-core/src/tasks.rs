//! The per-user daily task board.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::calendar::BusinessCalendar;
use crate::clock::Clock;
use crate::error::{CrmError, CrmResult};
use crate::models::task::CreateTask;
use crate::models::{Task, TaskStatus};
use crate::store::TaskStore;

/// `status` query filter for the day listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatusFilter {
    #[default]
    Pending,
    Completed,
    All,
}

impl TaskStatusFilter {
    pub fn parse(raw: Option<&str>) -> CrmResult<Self> {
        match raw.map(str::trim) {
            None | Some("") | Some("pending") => Ok(TaskStatusFilter::Pending),
            Some("completed") => Ok(TaskStatusFilter::Completed),
            Some("all") => Ok(TaskStatusFilter::All),
            Some(other) => Err(CrmError::validation(format!("Invalid status: {}", other))),
        }
    }

    fn admits(&self, status: TaskStatus) -> bool {
        match self {
            TaskStatusFilter::All => true,
            TaskStatusFilter::Pending => status == TaskStatus::Pending,
            TaskStatusFilter::Completed => status == TaskStatus::Completed,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskCounts {
    pub pending: u64,
    pub completed: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TodayTasks {
    pub tasks: Vec<Task>,
    /// Always over the whole day, whatever the filter
    pub counts: TaskCounts,
}

#[derive(Clone)]
pub struct TaskBoard {
    store: Arc<dyn TaskStore>,
    calendar: BusinessCalendar,
    clock: Arc<dyn Clock>,
}

impl TaskBoard {
    pub fn new(store: Arc<dyn TaskStore>, calendar: BusinessCalendar, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            calendar,
            clock,
        }
    }

    pub async fn create(&self, user: Uuid, request: CreateTask) -> CrmResult<Task> {
        let task = Task::schedule(user, request, &self.calendar, self.clock.now())?;
        let task = self.store.insert(task).await?;
        info!("Task {} created for user {}", task.id, user);
        Ok(task)
    }

    pub async fn list_today(&self, user: Uuid, filter: TaskStatusFilter) -> CrmResult<TodayTasks> {
        let now = self.clock.now();
        let day = self.store.list_for_day(user, self.calendar.today(now), now).await?;

        let counts = day.iter().fold(TaskCounts::default(), |mut counts, task| {
            match task.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::Completed => counts.completed += 1,
            }
            counts
        });
        let tasks = day.into_iter().filter(|t| filter.admits(t.status)).collect();

        Ok(TodayTasks { tasks, counts })
    }

    pub async fn toggle(&self, id: Uuid, user: Uuid) -> CrmResult<Task> {
        self.store.toggle(id, user, self.clock.now()).await
    }

    pub async fn delete(&self, id: Uuid, user: Uuid) -> CrmResult<()> {
        self.store.delete(id, user, self.clock.now()).await?;
        info!("Task {} deleted by user {}", id, user);
        Ok(())
    }

    /// Removes today's completed tasks; returns how many were removed.
    pub async fn clear_completed(&self, user: Uuid) -> CrmResult<u64> {
        let now = self.clock.now();
        let deleted = self
            .store
            .clear_completed(user, self.calendar.today(now), now)
            .await?;
        info!("Cleared {} completed task(s) for user {}", deleted, user);
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::TaskPriority;
    use crate::store::MemoryStore;
    use chrono::{Duration, TimeZone, Utc};

    fn board(clock: &ManualClock) -> TaskBoard {
        TaskBoard::new(
            Arc::new(MemoryStore::new()),
            BusinessCalendar::default(),
            Arc::new(clock.clone()),
        )
    }

    fn create(title: &str, time: &str) -> CreateTask {
        CreateTask {
            title: Some(title.to_string()),
            time: Some(time.to_string()),
            priority: Some(TaskPriority::High),
        }
    }

    #[tokio::test]
    async fn test_list_orders_by_due_and_counts_whole_day() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 9, 2, 4, 0, 0).unwrap());
        let board = board(&clock);
        let me = Uuid::new_v4();

        let late = board.create(me, create("Send invoice", "17:00")).await.unwrap();
        let early = board.create(me, create("Standup", "10:00")).await.unwrap();
        board.create(Uuid::new_v4(), create("Not mine", "11:00")).await.unwrap();
        board.toggle(late.id, me).await.unwrap();

        let pending = board.list_today(me, TaskStatusFilter::Pending).await.unwrap();
        assert_eq!(pending.tasks.len(), 1);
        assert_eq!(pending.tasks[0].id, early.id);
        assert_eq!(pending.counts, TaskCounts { pending: 1, completed: 1 });

        let all = board.list_today(me, TaskStatusFilter::All).await.unwrap();
        let ids: Vec<Uuid> = all.tasks.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![early.id, late.id]);
    }

    #[tokio::test]
    async fn test_expired_task_disappears() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 9, 2, 4, 0, 0).unwrap());
        let board = board(&clock);
        let me = Uuid::new_v4();

        let task = board.create(me, create("Call supplier", "12:00")).await.unwrap();
        let listed = board.list_today(me, TaskStatusFilter::All).await.unwrap();
        assert_eq!(listed.tasks.len(), 1);

        clock.set(task.expire_at + Duration::milliseconds(1));
        let listed = board.list_today(me, TaskStatusFilter::All).await.unwrap();
        assert!(listed.tasks.is_empty());
        assert_eq!(listed.counts, TaskCounts::default());
        assert!(matches!(
            board.toggle(task.id, me).await,
            Err(CrmError::NotFound(_))
        ));
        assert!(matches!(
            board.delete(task.id, me).await,
            Err(CrmError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_owner_scoping_and_clear_completed() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 9, 2, 4, 0, 0).unwrap());
        let board = board(&clock);
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();

        let a = board.create(me, create("A", "09:30")).await.unwrap();
        let b = board.create(me, create("B", "09:45")).await.unwrap();
        board.create(me, create("C", "10:00")).await.unwrap();

        assert!(matches!(
            board.toggle(a.id, other).await,
            Err(CrmError::NotFound(_))
        ));
        board.toggle(a.id, me).await.unwrap();
        board.toggle(b.id, me).await.unwrap();

        assert_eq!(board.clear_completed(other).await.unwrap(), 0);
        assert_eq!(board.clear_completed(me).await.unwrap(), 2);
        let left = board.list_today(me, TaskStatusFilter::All).await.unwrap();
        assert_eq!(left.counts, TaskCounts { pending: 1, completed: 0 });
    }

    #[test]
    fn test_status_filter_parse() {
        assert_eq!(TaskStatusFilter::parse(None).unwrap(), TaskStatusFilter::Pending);
        assert_eq!(TaskStatusFilter::parse(Some("all")).unwrap(), TaskStatusFilter::All);
        assert!(TaskStatusFilter::parse(Some("done")).is_err());
    }
}
