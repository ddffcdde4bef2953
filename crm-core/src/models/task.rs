use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::calendar::BusinessCalendar;
use crate::error::{CrmError, CrmResult};

pub const MAX_TITLE_CHARS: usize = 140;

/// Tasks without a parseable time are due at 09:00.
pub fn default_due_time() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

impl Default for TaskPriority {
    fn default() -> Self {
        TaskPriority::Medium
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Completed,
}

impl TaskStatus {
    pub fn toggled(self) -> Self {
        match self {
            TaskStatus::Pending => TaskStatus::Completed,
            TaskStatus::Completed => TaskStatus::Pending,
        }
    }
}

/// Day-scoped to-do item owned by a single user.
///
/// Maps to the `today_tasks` table. The row is purged once `expire_at`
/// passes, whatever its status.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    /// When the task is due on its day
    pub due_at: DateTime<Utc>,
    /// Start of the business day the task belongs to
    pub task_date: DateTime<Utc>,
    /// Last millisecond of that business day
    pub expire_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Body of `POST /api/tasks`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateTask {
    #[serde(default)]
    pub title: Option<String>,
    /// Local time of day, `HH:MM`
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub priority: Option<TaskPriority>,
}

/// Parses `HH:MM` (or `HH:MM:SS`), falling back to [`default_due_time`].
pub fn parse_time_of_day(raw: Option<&str>) -> NaiveTime {
    raw.map(str::trim)
        .and_then(|t| {
            NaiveTime::parse_from_str(t, "%H:%M")
                .or_else(|_| NaiveTime::parse_from_str(t, "%H:%M:%S"))
                .ok()
        })
        .unwrap_or_else(default_due_time)
}

impl Task {
    /// Schedules a new pending task on the business day containing `now`.
    pub fn schedule(
        user_id: Uuid,
        request: CreateTask,
        calendar: &BusinessCalendar,
        now: DateTime<Utc>,
    ) -> CrmResult<Self> {
        let title = request
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| CrmError::validation("Title is required"))?;
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(CrmError::validation(format!(
                "Title must be at most {} characters",
                MAX_TITLE_CHARS
            )));
        }

        let day = calendar.local_date(now);
        let time = parse_time_of_day(request.time.as_deref());

        Ok(Task {
            id: Uuid::new_v4(),
            user_id,
            title: title.to_string(),
            priority: request.priority.unwrap_or_default(),
            status: TaskStatus::Pending,
            due_at: calendar.at_time(day, time),
            task_date: calendar.start_of_day(day),
            expire_at: calendar.end_of_day(day),
            created_at: now,
            completed_at: None,
        })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expire_at <= now
    }

    /// Flips pending/completed and stamps or clears `completed_at`.
    pub fn toggle(&mut self, now: DateTime<Utc>) {
        self.status = self.status.toggled();
        self.completed_at = match self.status {
            TaskStatus::Completed => Some(now),
            TaskStatus::Pending => None,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn create(title: Option<&str>, time: Option<&str>) -> CreateTask {
        CreateTask {
            title: title.map(str::to_string),
            time: time.map(str::to_string),
            priority: None,
        }
    }

    #[test]
    fn test_schedule_in_business_timezone() {
        let calendar = BusinessCalendar::new(chrono_tz::Asia::Kolkata);
        // 19:00 UTC = 00:30 IST the next day.
        let now = Utc.with_ymd_and_hms(2024, 7, 9, 19, 0, 0).unwrap();
        let task = Task::schedule(Uuid::new_v4(), create(Some("Call Meera"), Some("14:30")), &calendar, now)
            .unwrap();

        assert_eq!(
            task.task_date,
            Utc.with_ymd_and_hms(2024, 7, 9, 18, 30, 0).unwrap()
        );
        assert_eq!(task.due_at, Utc.with_ymd_and_hms(2024, 7, 10, 9, 0, 0).unwrap());
        assert_eq!(
            task.expire_at,
            Utc.with_ymd_and_hms(2024, 7, 10, 18, 29, 59).unwrap() + Duration::milliseconds(999)
        );
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority, TaskPriority::Medium);
        assert_eq!(calendar.local_date(task.expire_at), calendar.local_date(task.task_date));
    }

    #[test]
    fn test_unparseable_time_defaults_to_nine() {
        assert_eq!(parse_time_of_day(None), default_due_time());
        assert_eq!(parse_time_of_day(Some("soon")), default_due_time());
        assert_eq!(
            parse_time_of_day(Some("07:05")),
            NaiveTime::from_hms_opt(7, 5, 0).unwrap()
        );
    }

    #[test]
    fn test_title_is_required() {
        let calendar = BusinessCalendar::default();
        for title in [None, Some(""), Some("   ")] {
            let err = Task::schedule(Uuid::new_v4(), create(title, None), &calendar, Utc::now())
                .unwrap_err();
            assert!(matches!(err, CrmError::Validation(_)));
        }
        let long = "x".repeat(MAX_TITLE_CHARS + 1);
        assert!(Task::schedule(Uuid::new_v4(), create(Some(&long), None), &calendar, Utc::now()).is_err());
    }

    #[test]
    fn test_toggle_round_trip() {
        let calendar = BusinessCalendar::default();
        let now = Utc::now();
        let mut task = Task::schedule(Uuid::new_v4(), create(Some("Send quote"), None), &calendar, now)
            .unwrap();
        task.toggle(now);
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.completed_at, Some(now));
        task.toggle(now);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.completed_at, None);
    }
}
