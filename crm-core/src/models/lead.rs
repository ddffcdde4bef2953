use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::calendar::DateWindow;
use crate::error::{CrmError, CrmResult};
use crate::models::{double_option, required_bounded, MAX_NAME_CHARS, MAX_PHONE_CHARS};

pub const MAX_NOTES_CHARS: usize = 500;

/// Where a lead came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar")]
pub enum ReferenceSource {
    Justdial,
    Adkriti,
    Meta,
    Google,
    Reference,
    #[sqlx(rename = "Walk-in")]
    #[serde(rename = "Walk-in")]
    WalkIn,
    Other,
}

/// Free-form pipeline label. Any status may follow any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar")]
pub enum LeadStatus {
    New,
    Interested,
    #[sqlx(rename = "Not Connected")]
    #[serde(rename = "Not Connected")]
    NotConnected,
    #[sqlx(rename = "Not Answered")]
    #[serde(rename = "Not Answered")]
    NotAnswered,
    Converted,
    Visited,
    #[sqlx(rename = "In Progress")]
    #[serde(rename = "In Progress")]
    InProgress,
    Closed,
    #[sqlx(rename = "Not Interested")]
    #[serde(rename = "Not Interested")]
    NotInterested,
    Dead,
}

impl LeadStatus {
    /// Statuses that no longer need a follow-up call.
    pub const FOLLOW_UP_DONE: [LeadStatus; 3] =
        [LeadStatus::Converted, LeadStatus::Closed, LeadStatus::Dead];

    pub fn needs_follow_up(&self) -> bool {
        !Self::FOLLOW_UP_DONE.contains(self)
    }

    /// A won deal, counted by the performance metrics.
    pub fn is_closed_deal(&self) -> bool {
        matches!(self, LeadStatus::Converted | LeadStatus::Closed)
    }

    /// Whether the prospect has responded to outreach at all.
    pub fn is_response(&self) -> bool {
        !matches!(
            self,
            LeadStatus::New | LeadStatus::NotConnected | LeadStatus::NotAnswered
        )
    }
}

impl Default for LeadStatus {
    fn default() -> Self {
        LeadStatus::New
    }
}

/// Lead model representing an unconverted prospect.
///
/// Maps to the `leads` table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: Uuid,
    pub client_name: String,
    pub phone_number: String,
    pub reference_source: ReferenceSource,
    pub status: LeadStatus,
    pub notes: Option<String>,
    /// Intake date
    pub date: DateTime<Utc>,
    pub follow_up_date: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLead {
    pub client_name: String,
    pub phone_number: String,
    pub reference_source: ReferenceSource,
    pub status: Option<LeadStatus>,
    pub notes: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub follow_up_date: Option<DateTime<Utc>>,
}

/// Partial lead update. `null` clears `notes` / `followUpDate`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLead {
    pub client_name: Option<String>,
    pub phone_number: Option<String>,
    pub reference_source: Option<ReferenceSource>,
    pub status: Option<LeadStatus>,
    #[serde(default, deserialize_with = "double_option")]
    pub notes: Option<Option<String>>,
    pub date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "double_option")]
    pub follow_up_date: Option<Option<DateTime<Utc>>>,
    pub assigned_to: Option<Uuid>,
}

/// Lead list filter.
#[derive(Debug, Clone, Default)]
pub struct LeadFilter {
    pub status: Option<LeadStatus>,
    pub source: Option<ReferenceSource>,
    /// Range over the intake `date`
    pub date: DateWindow,
}

impl LeadFilter {
    pub fn matches(&self, lead: &Lead) -> bool {
        self.status.map_or(true, |s| lead.status == s)
            && self.source.map_or(true, |s| lead.reference_source == s)
            && self.date.contains(lead.date)
    }
}

fn check_notes(notes: Option<String>) -> CrmResult<Option<String>> {
    match notes {
        Some(n) if n.chars().count() > MAX_NOTES_CHARS => Err(CrmError::validation(format!(
            "notes must be at most {} characters",
            MAX_NOTES_CHARS
        ))),
        other => Ok(other),
    }
}

impl Lead {
    /// Builds a new lead owned and assigned to `owner`.
    pub fn new(request: CreateLead, owner: Uuid, now: DateTime<Utc>) -> CrmResult<Self> {
        Ok(Lead {
            id: Uuid::new_v4(),
            client_name: required_bounded(&request.client_name, "clientName", MAX_NAME_CHARS)?,
            phone_number: required_bounded(&request.phone_number, "phoneNumber", MAX_PHONE_CHARS)?,
            reference_source: request.reference_source,
            status: request.status.unwrap_or_default(),
            notes: check_notes(request.notes)?,
            date: request.date.unwrap_or(now),
            follow_up_date: request.follow_up_date,
            created_by: Some(owner),
            assigned_to: Some(owner),
            created_at: now,
            updated_at: now,
        })
    }

    /// Applies a patch in place. On error the lead is left untouched.
    pub fn apply_update(&mut self, patch: UpdateLead, now: DateTime<Utc>) -> CrmResult<()> {
        let mut next = self.clone();
        if let Some(name) = patch.client_name {
            next.client_name = required_bounded(&name, "clientName", MAX_NAME_CHARS)?;
        }
        if let Some(phone) = patch.phone_number {
            next.phone_number = required_bounded(&phone, "phoneNumber", MAX_PHONE_CHARS)?;
        }
        if let Some(source) = patch.reference_source {
            next.reference_source = source;
        }
        if let Some(status) = patch.status {
            next.status = status;
        }
        if let Some(notes) = patch.notes {
            next.notes = check_notes(notes)?;
        }
        if let Some(date) = patch.date {
            next.date = date;
        }
        if let Some(follow_up) = patch.follow_up_date {
            next.follow_up_date = follow_up;
        }
        if let Some(assignee) = patch.assigned_to {
            next.assigned_to = Some(assignee);
        }
        next.updated_at = now;
        *self = next;
        Ok(())
    }

    /// Hours between intake and the scheduled follow-up, if both are known.
    pub fn follow_up_lead_hours(&self) -> Option<f64> {
        self.follow_up_date
            .map(|f| (f - self.date).num_milliseconds() as f64 / 3_600_000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn request() -> CreateLead {
        CreateLead {
            client_name: " Meera Textiles ".to_string(),
            phone_number: "9876543210".to_string(),
            reference_source: ReferenceSource::Justdial,
            status: None,
            notes: None,
            date: None,
            follow_up_date: None,
        }
    }

    #[test]
    fn test_new_lead_defaults() {
        let owner = Uuid::new_v4();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        let lead = Lead::new(request(), owner, now).unwrap();
        assert_eq!(lead.status, LeadStatus::New);
        assert_eq!(lead.client_name, "Meera Textiles");
        assert_eq!(lead.date, now);
        assert_eq!(lead.created_by, Some(owner));
        assert_eq!(lead.assigned_to, Some(owner));
    }

    #[test]
    fn test_notes_are_bounded() {
        let mut req = request();
        req.notes = Some("x".repeat(MAX_NOTES_CHARS + 1));
        assert!(matches!(
            Lead::new(req, Uuid::new_v4(), Utc::now()),
            Err(CrmError::Validation(_))
        ));
    }

    #[test]
    fn test_name_and_phone_fit_their_columns() {
        let mut req = request();
        req.client_name = "m".repeat(MAX_NAME_CHARS + 1);
        assert!(matches!(
            Lead::new(req, Uuid::new_v4(), Utc::now()),
            Err(CrmError::Validation(_))
        ));

        let mut req = request();
        req.phone_number = "9".repeat(MAX_PHONE_CHARS + 1);
        assert!(matches!(
            Lead::new(req, Uuid::new_v4(), Utc::now()),
            Err(CrmError::Validation(_))
        ));

        let mut lead = Lead::new(request(), Uuid::new_v4(), Utc::now()).unwrap();
        let patch = UpdateLead {
            phone_number: Some("9".repeat(MAX_PHONE_CHARS + 1)),
            ..Default::default()
        };
        assert!(lead.apply_update(patch, Utc::now()).is_err());
        assert_eq!(lead.phone_number, "9876543210");
    }

    #[test]
    fn test_update_can_clear_follow_up() {
        let now = Utc::now();
        let mut req = request();
        req.follow_up_date = Some(now);
        let mut lead = Lead::new(req, Uuid::new_v4(), now).unwrap();

        let patch: UpdateLead =
            serde_json::from_str(r#"{"followUpDate": null, "status": "Dead"}"#).unwrap();
        lead.apply_update(patch, now).unwrap();
        assert_eq!(lead.follow_up_date, None);
        assert_eq!(lead.status, LeadStatus::Dead);

        // Absent fields stay as they are.
        let patch: UpdateLead = serde_json::from_str(r#"{"notes": "call after 5"}"#).unwrap();
        lead.apply_update(patch, now).unwrap();
        assert_eq!(lead.status, LeadStatus::Dead);
        assert_eq!(lead.notes.as_deref(), Some("call after 5"));
    }

    #[test]
    fn test_failed_update_leaves_lead_untouched() {
        let now = Utc::now();
        let mut lead = Lead::new(request(), Uuid::new_v4(), now).unwrap();
        let patch = UpdateLead {
            status: Some(LeadStatus::Interested),
            client_name: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(lead.apply_update(patch, now).is_err());
        assert_eq!(lead.status, LeadStatus::New);
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_value(LeadStatus::NotInterested).unwrap(),
            "Not Interested"
        );
        assert_eq!(serde_json::to_value(ReferenceSource::WalkIn).unwrap(), "Walk-in");
        assert!(!LeadStatus::Converted.needs_follow_up());
        assert!(LeadStatus::NotInterested.needs_follow_up());
    }
}
