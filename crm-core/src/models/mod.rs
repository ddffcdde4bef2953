pub mod client;
pub mod expense;
pub mod lead;
pub mod task;
pub mod user;

pub use client::{Client, ClientStats, CreateClient, DeliveryStatus, PaymentEntry, UpdateClient};
pub use expense::{CreateExpense, Expense, ExpenseCategory, PaymentMethod, UpdateExpense};
pub use lead::{CreateLead, Lead, LeadStatus, ReferenceSource, UpdateLead};
pub use task::{Task, TaskPriority, TaskStatus};
pub use user::{Role, User};

use rust_decimal::{Decimal, RoundingStrategy};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

use crate::error::{CrmError, CrmResult};

/// Distinguishes an absent patch field (`None`) from an explicit `null`
/// (`Some(None)`), so optional columns can be cleared by an update.
pub(crate) fn double_option<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

/// Parses an enum query filter. Empty values and `all` mean "no filter".
pub fn parse_filter<T: DeserializeOwned>(raw: Option<&str>, field: &str) -> CrmResult<Option<T>> {
    match raw.map(str::trim) {
        None | Some("") | Some("all") => Ok(None),
        Some(value) => serde_json::from_value(serde_json::Value::String(value.to_string()))
            .map(Some)
            .map_err(|_| CrmError::validation(format!("Invalid {}: {}", field, value))),
    }
}

/// Trims a required text field, rejecting blank input.
pub(crate) fn required(value: &str, field: &str) -> CrmResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CrmError::validation(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

/// Column widths shared by the `users`, `leads` and `clients` tables.
pub const MAX_NAME_CHARS: usize = 255;
pub const MAX_EMAIL_CHARS: usize = 255;
pub const MAX_PHONE_CHARS: usize = 64;

/// Rejects text longer than its `VARCHAR(max)` column, counted in characters.
pub(crate) fn bounded(value: String, field: &str, max: usize) -> CrmResult<String> {
    if value.chars().count() > max {
        return Err(CrmError::validation(format!(
            "{} must be at most {} characters",
            field, max
        )));
    }
    Ok(value)
}

/// [`required`] plus [`bounded`].
pub(crate) fn required_bounded(value: &str, field: &str, max: usize) -> CrmResult<String> {
    bounded(required(value, field)?, field, max)
}

/// Largest magnitude a `NUMERIC(14, 2)` money column can hold.
pub fn max_money() -> Decimal {
    Decimal::new(99_999_999_999_999, 2)
}

/// Brings an amount to whole cents, rounding half away from zero as the
/// `NUMERIC(14, 2)` columns do, so every backend stores the same value.
///
/// # Errors
///
/// `Validation` when the rounded amount does not fit the column.
pub(crate) fn money(value: Decimal, field: &str) -> CrmResult<Decimal> {
    let rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    if rounded.abs() > max_money() {
        return Err(CrmError::validation(format!(
            "{} must be at most {}",
            field,
            max_money()
        )));
    }
    Ok(rounded)
}
