use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::ValidateEmail;

use crate::calendar::DateWindow;
use crate::error::{CrmError, CrmResult};
use crate::models::{
    double_option, money, required, required_bounded, MAX_EMAIL_CHARS, MAX_NAME_CHARS,
    MAX_PHONE_CHARS,
};

pub const ADVANCE_PAYMENT_DESCRIPTION: &str = "Advance Payment";
pub const DEFAULT_PAYMENT_DESCRIPTION: &str = "Payment Received";

/// Project delivery state, independent of payment state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar")]
pub enum DeliveryStatus {
    Pending,
    #[sqlx(rename = "In Progress")]
    #[serde(rename = "In Progress")]
    InProgress,
    Delivered,
}

impl Default for DeliveryStatus {
    fn default() -> Self {
        DeliveryStatus::Pending
    }
}

/// One entry of a client's payment history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentEntry {
    pub amount: Decimal,
    pub date: DateTime<Utc>,
    pub description: String,
    pub added_by: Uuid,
}

/// Client model representing a converted lead and its project.
///
/// Maps to the `clients` table. `remaining_amount` is derived and is
/// rewritten by [`Client::recompute_derived`] on every mutation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: Uuid,
    pub client_name: String,
    /// Stored trimmed and lowercased
    pub email: String,
    pub phone_number: String,
    pub project_details: String,

    /// Contracted project value
    pub total_amount: Decimal,

    /// Sum of all payments received to date
    pub advance_received: Decimal,

    /// `total_amount - advance_received`; negative after an overpayment
    pub remaining_amount: Decimal,

    pub bond_signed: bool,
    pub project_start_date: DateTime<Utc>,
    pub project_end_date: DateTime<Utc>,
    pub delivery_status: DeliveryStatus,

    /// Ordered oldest first, stored as JSONB
    #[sqlx(json)]
    pub payment_history: Vec<PaymentEntry>,

    /// Originating lead, if the client was converted from one
    pub lead_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Client creation request. `remainingAmount` is never accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateClient {
    pub client_name: String,
    pub email: String,
    pub phone_number: String,
    pub project_details: String,
    pub total_amount: Decimal,
    pub advance_received: Option<Decimal>,
    pub bond_signed: Option<bool>,
    pub project_start_date: DateTime<Utc>,
    pub project_end_date: DateTime<Utc>,
    pub delivery_status: Option<DeliveryStatus>,
    pub lead_id: Option<Uuid>,
}

/// Partial client update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateClient {
    pub client_name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub project_details: Option<String>,
    pub total_amount: Option<Decimal>,
    pub advance_received: Option<Decimal>,
    pub bond_signed: Option<bool>,
    pub project_start_date: Option<DateTime<Utc>>,
    pub project_end_date: Option<DateTime<Utc>>,
    pub delivery_status: Option<DeliveryStatus>,
    #[serde(default, deserialize_with = "double_option")]
    pub lead_id: Option<Option<Uuid>>,
}

/// A payment to record against a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddPayment {
    pub amount: Decimal,
    pub description: Option<String>,
}

/// Client list filter.
#[derive(Debug, Clone, Default)]
pub struct ClientFilter {
    pub delivery_status: Option<DeliveryStatus>,
    /// Range over `project_start_date`
    pub project_start: DateWindow,
}

impl ClientFilter {
    pub fn matches(&self, client: &Client) -> bool {
        self.delivery_status
            .map_or(true, |s| client.delivery_status == s)
            && self.project_start.contains(client.project_start_date)
    }
}

fn check_email(email: &str) -> CrmResult<String> {
    let email = email.trim().to_lowercase();
    if email.chars().count() > MAX_EMAIL_CHARS || !email.validate_email() {
        return Err(CrmError::validation("Please enter a valid email"));
    }
    Ok(email)
}

fn check_name(name: &str) -> CrmResult<String> {
    required_bounded(name, "clientName", MAX_NAME_CHARS)
}

fn check_phone(phone: &str) -> CrmResult<String> {
    required_bounded(phone, "phoneNumber", MAX_PHONE_CHARS)
}

/// Whole cents, at least zero.
fn non_negative(value: Decimal, field: &str) -> CrmResult<Decimal> {
    let value = money(value, field)?;
    if value < Decimal::ZERO {
        return Err(CrmError::validation(format!("{} must be >= 0", field)));
    }
    Ok(value)
}

impl Client {
    /// Builds a new client owned by `owner`.
    ///
    /// A positive advance seeds the payment history with an
    /// "Advance Payment" entry.
    pub fn new(request: CreateClient, owner: Uuid, now: DateTime<Utc>) -> CrmResult<Self> {
        let total_amount = non_negative(request.total_amount, "totalAmount")?;
        let advance_received = non_negative(
            request.advance_received.unwrap_or(Decimal::ZERO),
            "advanceReceived",
        )?;

        let payment_history = if advance_received > Decimal::ZERO {
            vec![PaymentEntry {
                amount: advance_received,
                date: now,
                description: ADVANCE_PAYMENT_DESCRIPTION.to_string(),
                added_by: owner,
            }]
        } else {
            Vec::new()
        };

        let mut client = Client {
            id: Uuid::new_v4(),
            client_name: check_name(&request.client_name)?,
            email: check_email(&request.email)?,
            phone_number: check_phone(&request.phone_number)?,
            project_details: required(&request.project_details, "projectDetails")?,
            total_amount,
            advance_received,
            remaining_amount: Decimal::ZERO,
            bond_signed: request.bond_signed.unwrap_or(false),
            project_start_date: request.project_start_date,
            project_end_date: request.project_end_date,
            delivery_status: request.delivery_status.unwrap_or_default(),
            payment_history,
            lead_id: request.lead_id,
            created_by: Some(owner),
            created_at: now,
            updated_at: now,
        };
        client.recompute_derived();
        Ok(client)
    }

    /// Re-derives `remaining_amount` from the stored operands.
    ///
    /// Every mutating entry point ends by calling this.
    pub fn recompute_derived(&mut self) {
        self.remaining_amount = self.total_amount - self.advance_received;
    }

    /// Applies a patch in place.
    ///
    /// Fields absent from the patch keep their stored values, so the balance
    /// is computed from the effective operands. On error the client is left
    /// untouched.
    pub fn apply_update(&mut self, patch: UpdateClient, now: DateTime<Utc>) -> CrmResult<()> {
        let mut next = self.clone();
        if let Some(name) = patch.client_name {
            next.client_name = check_name(&name)?;
        }
        if let Some(email) = patch.email {
            next.email = check_email(&email)?;
        }
        if let Some(phone) = patch.phone_number {
            next.phone_number = check_phone(&phone)?;
        }
        if let Some(details) = patch.project_details {
            next.project_details = required(&details, "projectDetails")?;
        }
        if let Some(total) = patch.total_amount {
            next.total_amount = non_negative(total, "totalAmount")?;
        }
        if let Some(advance) = patch.advance_received {
            next.advance_received = non_negative(advance, "advanceReceived")?;
        }
        if let Some(bond) = patch.bond_signed {
            next.bond_signed = bond;
        }
        if let Some(start) = patch.project_start_date {
            next.project_start_date = start;
        }
        if let Some(end) = patch.project_end_date {
            next.project_end_date = end;
        }
        if let Some(status) = patch.delivery_status {
            next.delivery_status = status;
        }
        if let Some(lead_id) = patch.lead_id {
            next.lead_id = lead_id;
        }
        next.updated_at = now;
        next.recompute_derived();
        *self = next;
        Ok(())
    }

    /// Records a payment: bumps `advance_received`, re-derives the balance
    /// and appends to the history.
    ///
    /// The amount is rounded to whole cents first, so the history entry and
    /// the running total always agree. Amounts that are not positive after
    /// rounding are rejected. Overpayment is allowed and shows up as a
    /// negative remaining amount.
    pub fn record_payment(
        &mut self,
        payment: AddPayment,
        actor: Uuid,
        now: DateTime<Utc>,
    ) -> CrmResult<()> {
        let amount = money(payment.amount, "amount")?;
        if amount <= Decimal::ZERO {
            return Err(CrmError::validation("Payment amount must be greater than 0"));
        }
        let advance_received = money(self.advance_received + amount, "advanceReceived")?;

        let description = payment
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| DEFAULT_PAYMENT_DESCRIPTION.to_string());

        self.advance_received = advance_received;
        self.payment_history.push(PaymentEntry {
            amount,
            date: now,
            description,
            added_by: actor,
        });
        self.updated_at = now;
        self.recompute_derived();
        Ok(())
    }

    pub fn is_delivered(&self) -> bool {
        self.delivery_status == DeliveryStatus::Delivered
    }
}

/// Collection-wide client statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientStats {
    pub total_clients: u64,
    pub pending_projects: u64,
    pub in_progress_projects: u64,
    pub delivered_projects: u64,
    pub total_revenue: Decimal,
    pub total_received: Decimal,
    pub total_pending: Decimal,
}

impl ClientStats {
    pub fn from_clients<'a>(clients: impl IntoIterator<Item = &'a Client>) -> Self {
        clients
            .into_iter()
            .fold(ClientStats::default(), |mut stats, client| {
                stats.total_clients += 1;
                match client.delivery_status {
                    DeliveryStatus::Pending => stats.pending_projects += 1,
                    DeliveryStatus::InProgress => stats.in_progress_projects += 1,
                    DeliveryStatus::Delivered => stats.delivered_projects += 1,
                }
                stats.total_revenue += client.total_amount;
                stats.total_received += client.advance_received;
                stats.total_pending += client.remaining_amount;
                stats
            })
    }
}
