//! Week and month scoped productivity metrics, read from the lead store.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

use crate::calendar::BusinessCalendar;
use crate::clock::Clock;
use crate::models::lead::LeadFilter;
use crate::models::Lead;
use crate::store::LeadStore;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub new_leads_this_week: u64,
    pub deals_closed_this_month: u64,
    pub pending_follow_ups: u64,
    /// Whole percent of this month's leads that responded
    pub response_rate: u64,
}

fn count(leads: &[Lead], pred: impl Fn(&Lead) -> bool) -> u64 {
    leads.iter().filter(|l| pred(l)).count() as u64
}

impl PerformanceMetrics {
    pub fn compute(leads: &[Lead], calendar: &BusinessCalendar, now: DateTime<Utc>) -> Self {
        let week_start = calendar.start_of_week(now);
        let month_start = calendar.start_of_month(now);

        let this_month = count(leads, |l| l.created_at >= month_start);
        let responded = count(leads, |l| l.created_at >= month_start && l.status.is_response());
        let response_rate = if this_month > 0 {
            (responded as f64 / this_month as f64 * 100.0).round() as u64
        } else {
            0
        };

        PerformanceMetrics {
            new_leads_this_week: count(leads, |l| l.created_at >= week_start),
            deals_closed_this_month: count(leads, |l| {
                l.status.is_closed_deal() && l.updated_at >= month_start
            }),
            pending_follow_ups: count(leads, |l| {
                l.status.needs_follow_up() && l.follow_up_date.is_some_and(|f| f >= now)
            }),
            response_rate,
        }
    }
}

#[derive(Clone)]
pub struct MetricsService {
    leads: Arc<dyn LeadStore>,
    calendar: BusinessCalendar,
    clock: Arc<dyn Clock>,
}

impl MetricsService {
    pub fn new(leads: Arc<dyn LeadStore>, calendar: BusinessCalendar, clock: Arc<dyn Clock>) -> Self {
        Self {
            leads,
            calendar,
            clock,
        }
    }

    /// Store failures degrade to all-zero metrics.
    pub async fn performance(&self) -> PerformanceMetrics {
        let now = self.clock.now();
        match self.leads.list(&LeadFilter::default()).await {
            Ok(leads) => PerformanceMetrics::compute(&leads, &self.calendar, now),
            Err(e) => {
                error!("Performance metrics failed: {}", e);
                PerformanceMetrics::default()
            }
        }
    }
}
