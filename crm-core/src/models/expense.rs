use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::calendar::DateWindow;
use crate::error::{CrmError, CrmResult};
use crate::models::{bounded, double_option, money, required};

pub const MAX_RECEIPT_CHARS: usize = 128;

/// Expense category enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar")]
pub enum ExpenseCategory {
    Marketing,
    #[sqlx(rename = "Staff Salary")]
    #[serde(rename = "Staff Salary")]
    StaffSalary,
    Tools,
    Other,
}

/// Payment method enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar")]
pub enum PaymentMethod {
    Cash,
    #[sqlx(rename = "Bank Transfer")]
    #[serde(rename = "Bank Transfer")]
    BankTransfer,
    #[sqlx(rename = "UPI")]
    #[serde(rename = "UPI")]
    Upi,
    Cheque,
    Other,
}

impl Default for PaymentMethod {
    fn default() -> Self {
        PaymentMethod::Cash
    }
}

/// Expense model representing a business outflow.
///
/// Maps to the `expenses` table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: Uuid,
    pub date: DateTime<Utc>,
    pub category: ExpenseCategory,
    pub amount: Decimal,
    pub description: String,
    pub payment_method: PaymentMethod,
    pub receipt_number: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateExpense {
    pub date: Option<DateTime<Utc>>,
    pub category: ExpenseCategory,
    pub amount: Decimal,
    pub description: String,
    pub payment_method: Option<PaymentMethod>,
    pub receipt_number: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateExpense {
    pub date: Option<DateTime<Utc>>,
    pub category: Option<ExpenseCategory>,
    pub amount: Option<Decimal>,
    pub description: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    #[serde(default, deserialize_with = "double_option")]
    pub receipt_number: Option<Option<String>>,
}

/// Expense list filter.
#[derive(Debug, Clone, Default)]
pub struct ExpenseFilter {
    pub category: Option<ExpenseCategory>,
    pub date: DateWindow,
}

impl ExpenseFilter {
    pub fn matches(&self, expense: &Expense) -> bool {
        self.category.map_or(true, |c| expense.category == c) && self.date.contains(expense.date)
    }
}

fn check_amount(amount: Decimal) -> CrmResult<Decimal> {
    let amount = money(amount, "amount")?;
    if amount < Decimal::ZERO {
        return Err(CrmError::validation("amount must be >= 0"));
    }
    Ok(amount)
}

fn clean_receipt(receipt: Option<String>) -> CrmResult<Option<String>> {
    receipt
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .map(|r| bounded(r, "receiptNumber", MAX_RECEIPT_CHARS))
        .transpose()
}

impl Expense {
    pub fn new(request: CreateExpense, created_by: Uuid, now: DateTime<Utc>) -> CrmResult<Self> {
        Ok(Expense {
            id: Uuid::new_v4(),
            date: request.date.unwrap_or(now),
            category: request.category,
            amount: check_amount(request.amount)?,
            description: required(&request.description, "description")?,
            payment_method: request.payment_method.unwrap_or_default(),
            receipt_number: clean_receipt(request.receipt_number)?,
            created_by,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn apply_update(&mut self, patch: UpdateExpense, now: DateTime<Utc>) -> CrmResult<()> {
        let mut next = self.clone();
        if let Some(date) = patch.date {
            next.date = date;
        }
        if let Some(category) = patch.category {
            next.category = category;
        }
        if let Some(amount) = patch.amount {
            next.amount = check_amount(amount)?;
        }
        if let Some(description) = patch.description {
            next.description = required(&description, "description")?;
        }
        if let Some(method) = patch.payment_method {
            next.payment_method = method;
        }
        if let Some(receipt) = patch.receipt_number {
            next.receipt_number = clean_receipt(receipt)?;
        }
        next.updated_at = now;
        *self = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_expense_defaults() {
        let admin = Uuid::new_v4();
        let now = Utc::now();
        let expense = Expense::new(
            CreateExpense {
                date: None,
                category: ExpenseCategory::Tools,
                amount: Decimal::new(4999, 2),
                description: " Figma seat ".to_string(),
                payment_method: None,
                receipt_number: Some("  ".to_string()),
            },
            admin,
            now,
        )
        .unwrap();
        assert_eq!(expense.date, now);
        assert_eq!(expense.payment_method, PaymentMethod::Cash);
        assert_eq!(expense.description, "Figma seat");
        assert_eq!(expense.receipt_number, None);
        assert_eq!(expense.created_by, admin);
    }

    #[test]
    fn test_negative_amount_rejected() {
        let result = Expense::new(
            CreateExpense {
                date: None,
                category: ExpenseCategory::Other,
                amount: Decimal::from(-1),
                description: "refund".to_string(),
                payment_method: None,
                receipt_number: None,
            },
            Uuid::new_v4(),
            Utc::now(),
        );
        assert!(matches!(result, Err(CrmError::Validation(_))));
    }

    #[test]
    fn test_amount_is_kept_to_whole_cents() {
        let request = |amount| CreateExpense {
            date: None,
            category: ExpenseCategory::Marketing,
            amount,
            description: "Flyers".to_string(),
            payment_method: None,
            receipt_number: None,
        };
        let mut expense =
            Expense::new(request(Decimal::new(49_995, 3)), Uuid::new_v4(), Utc::now()).unwrap();
        assert_eq!(expense.amount, Decimal::new(5_000, 2));

        let patch = UpdateExpense {
            amount: Some(Decimal::new(12_344, 3)),
            ..Default::default()
        };
        expense.apply_update(patch, Utc::now()).unwrap();
        assert_eq!(expense.amount, Decimal::new(1_234, 2));

        let too_large = request(crate::models::max_money() + Decimal::ONE);
        assert!(matches!(
            Expense::new(too_large, Uuid::new_v4(), Utc::now()),
            Err(CrmError::Validation(_))
        ));

        let patch = UpdateExpense {
            receipt_number: Some(Some("R".repeat(MAX_RECEIPT_CHARS + 1))),
            ..Default::default()
        };
        assert!(expense.apply_update(patch, Utc::now()).is_err());
        assert_eq!(expense.amount, Decimal::new(1_234, 2));
    }

    #[test]
    fn test_category_wire_names() {
        let parsed: ExpenseCategory = serde_json::from_str(r#""Staff Salary""#).unwrap();
        assert_eq!(parsed, ExpenseCategory::StaffSalary);
        assert_eq!(serde_json::to_value(PaymentMethod::Upi).unwrap(), "UPI");
    }
}
