use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::calendar::{BusinessCalendar, DateWindow};
use crate::clock::Clock;
use crate::error::CrmResult;
use crate::models::client::ClientFilter;
use crate::models::lead::LeadFilter;
use crate::models::{Client, Lead, LeadStatus};
use crate::store::{OwnerScope, Stores};

/// Public counters shown on the landing page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LandingStats {
    pub leads_managed: u64,
    pub clients_converted: u64,
    pub delivered_clients: u64,
    pub avg_follow_up_hours: f64,
    pub avg_follow_up_label: String,
    pub today_follow_ups: u64,
    pub todays_tasks: u64,
    pub updated_at: DateTime<Utc>,
}

/// Renders an hour count as `~Nd`, `~Nh` or `~Nm`.
pub fn follow_up_label(hours: f64) -> String {
    if hours >= 24.0 {
        format!("~{}d", (hours / 24.0).round())
    } else if hours >= 1.0 {
        format!("~{}h", hours.round())
    } else {
        format!("~{}m", (hours * 60.0).round())
    }
}

fn counts_as_today_follow_up(lead: &Lead, today: DateWindow) -> bool {
    lead.follow_up_date.is_some_and(|f| today.contains(f))
        && lead.status.needs_follow_up()
        && lead.status != LeadStatus::NotInterested
}

impl LandingStats {
    pub fn compute(
        leads: &[Lead],
        clients: &[Client],
        today: DateWindow,
        now: DateTime<Utc>,
    ) -> Self {
        // Negative gaps (follow-up before intake) are data noise.
        let gaps: Vec<f64> = leads
            .iter()
            .filter_map(Lead::follow_up_lead_hours)
            .filter(|h| *h >= 0.0)
            .collect();
        let avg_follow_up_hours = if gaps.is_empty() {
            0.0
        } else {
            gaps.iter().sum::<f64>() / gaps.len() as f64
        };

        LandingStats {
            leads_managed: leads.len() as u64,
            clients_converted: clients.len() as u64,
            delivered_clients: clients.iter().filter(|c| c.is_delivered()).count() as u64,
            avg_follow_up_label: follow_up_label(avg_follow_up_hours),
            avg_follow_up_hours,
            today_follow_ups: leads
                .iter()
                .filter(|l| counts_as_today_follow_up(l, today))
                .count() as u64,
            todays_tasks: clients
                .iter()
                .filter(|c| !c.is_delivered() && today.contains(c.project_end_date))
                .count() as u64,
            updated_at: now,
        }
    }

    /// All-zero snapshot served when the stores cannot be read.
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self::compute(&[], &[], DateWindow::UNBOUNDED, now)
    }
}

struct CachedStats {
    computed_at: DateTime<Utc>,
    stats: LandingStats,
}

/// Single-slot, process-wide cache for [`LandingStats`].
///
/// A hit returns the stored snapshot unchanged, `updated_at` included.
/// Writes to leads or clients do not invalidate it.
pub struct LandingCache {
    stores: Stores,
    calendar: BusinessCalendar,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    slot: Mutex<Option<CachedStats>>,
}

impl LandingCache {
    pub fn new(
        stores: Stores,
        calendar: BusinessCalendar,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Self {
        Self {
            stores,
            calendar,
            clock,
            ttl,
            slot: Mutex::new(None),
        }
    }

    async fn compute(&self, now: DateTime<Utc>) -> CrmResult<LandingStats> {
        let leads = self.stores.leads.list(&LeadFilter::default()).await?;
        let clients = self
            .stores
            .clients
            .list(&ClientFilter::default(), OwnerScope::All)
            .await?;
        Ok(LandingStats::compute(
            &leads,
            &clients,
            self.calendar.today(now),
            now,
        ))
    }

    /// Returns the cached snapshot if it is younger than the TTL, otherwise
    /// recomputes. Failed computations are served as zeros and not cached.
    pub async fn get(&self) -> LandingStats {
        // Held across the recompute so concurrent misses compute once.
        let mut slot = self.slot.lock().await;
        let now = self.clock.now();

        if let Some(cached) = slot.as_ref() {
            if now - cached.computed_at < self.ttl {
                debug!("Landing stats served from cache");
                return cached.stats.clone();
            }
        }

        match self.compute(now).await {
            Ok(stats) => {
                *slot = Some(CachedStats {
                    computed_at: now,
                    stats: stats.clone(),
                });
                stats
            }
            Err(e) => {
                error!("Landing stats computation failed: {}", e);
                LandingStats::empty(now)
            }
        }
    }
}
