//! Financial aggregation: period summaries, monthly reports and the
//! public landing counters.
//!
//! Aggregates are computed in Rust over the rows a store returns for the
//! requested window, so both backends share one implementation.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{error, info};

use crate::calendar::{BusinessCalendar, DateWindow};
use crate::error::CrmResult;
use crate::models::expense::ExpenseFilter;
use crate::models::{Client, Expense, ExpenseCategory};
use crate::store::Stores;

pub mod landing;

pub use landing::{LandingCache, LandingStats};

/// Per-category expense total.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub category: ExpenseCategory,
    pub total: Decimal,
    pub count: u64,
}

/// Expenses for one calendar month of the business timezone.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyExpense {
    pub year: i32,
    pub month: u32,
    pub total_expense: Decimal,
    pub count: u64,
}

/// Income vs. expense summary for a window.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialSummary {
    pub total_income: Decimal,
    pub total_received: Decimal,
    pub total_expenses: Decimal,
    /// Invoiced income minus expenses
    pub profit: Decimal,
    /// Cash received minus expenses
    pub actual_profit: Decimal,
    /// Percentage, two decimal places; zero when there is no income
    pub profit_margin: Decimal,
    pub expenses_by_category: Vec<CategoryTotal>,
    pub monthly_data: Vec<MonthlyExpense>,
}

impl FinancialSummary {
    /// Folds the expenses and clients of one window into a summary.
    ///
    /// The caller is responsible for having filtered both slices to the
    /// same window (expenses by `date`, clients by `created_at`).
    pub fn compute(expenses: &[Expense], clients: &[Client], calendar: &BusinessCalendar) -> Self {
        let mut by_category: BTreeMap<ExpenseCategory, (Decimal, u64)> = BTreeMap::new();
        let mut by_month: BTreeMap<(i32, u32), (Decimal, u64)> = BTreeMap::new();
        let mut total_expenses = Decimal::ZERO;

        for expense in expenses {
            total_expenses += expense.amount;

            let slot = by_category.entry(expense.category).or_default();
            slot.0 += expense.amount;
            slot.1 += 1;

            let slot = by_month.entry(calendar.year_month(expense.date)).or_default();
            slot.0 += expense.amount;
            slot.1 += 1;
        }

        let total_income: Decimal = clients.iter().map(|c| c.total_amount).sum();
        let total_received: Decimal = clients.iter().map(|c| c.advance_received).sum();
        let profit = total_income - total_expenses;

        FinancialSummary {
            total_income,
            total_received,
            total_expenses,
            profit,
            actual_profit: total_received - total_expenses,
            profit_margin: profit_margin(profit, total_income),
            expenses_by_category: by_category
                .into_iter()
                .map(|(category, (total, count))| CategoryTotal {
                    category,
                    total,
                    count,
                })
                .collect(),
            monthly_data: by_month
                .into_iter()
                .map(|((year, month), (total_expense, count))| MonthlyExpense {
                    year,
                    month,
                    total_expense,
                    count,
                })
                .collect(),
        }
    }
}

fn profit_margin(profit: Decimal, income: Decimal) -> Decimal {
    if income > Decimal::ZERO {
        (profit / income * Decimal::ONE_HUNDRED).round_dp(2)
    } else {
        Decimal::ZERO
    }
}

/// Expenses and new clients of a single month.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyReport {
    pub year: i32,
    pub month: u32,
    /// Newest first
    pub expenses: Vec<Expense>,
    pub clients: Vec<Client>,
    pub total_expense: Decimal,
    pub total_income: Decimal,
    pub total_received: Decimal,
}

/// Read-only reporting over the expense and client stores.
#[derive(Clone)]
pub struct FinanceService {
    stores: Stores,
    calendar: BusinessCalendar,
}

impl FinanceService {
    pub fn new(stores: Stores, calendar: BusinessCalendar) -> Self {
        Self { stores, calendar }
    }

    async fn window_rows(&self, window: DateWindow) -> CrmResult<(Vec<Expense>, Vec<Client>)> {
        let filter = ExpenseFilter {
            category: None,
            date: window,
        };
        let expenses = self.stores.expenses.list(&filter).await?;
        let clients = self.stores.clients.created_within(window).await?;
        Ok((expenses, clients))
    }

    /// Summary for a year, a month of a year, or all time.
    ///
    /// An invalid period is a validation error. A failing store query is
    /// logged and yields the zero summary.
    pub async fn summarize(
        &self,
        year: Option<i32>,
        month: Option<u32>,
    ) -> CrmResult<FinancialSummary> {
        let window = self.calendar.period_window(year, month)?;
        match self.window_rows(window).await {
            Ok((expenses, clients)) => {
                Ok(FinancialSummary::compute(&expenses, &clients, &self.calendar))
            }
            Err(e) => {
                error!("Financial summary failed for {:?}-{:?}: {}", year, month, e);
                Ok(FinancialSummary::default())
            }
        }
    }

    pub async fn monthly_report(&self, year: i32, month: u32) -> CrmResult<MonthlyReport> {
        let window = self.calendar.month_window(year, month)?;
        let (expenses, clients) = self.window_rows(window).await?;
        info!(
            "Monthly report {}-{:02}: {} expense(s), {} client(s)",
            year,
            month,
            expenses.len(),
            clients.len()
        );

        Ok(MonthlyReport {
            year,
            month,
            total_expense: expenses.iter().map(|e| e.amount).sum(),
            total_income: clients.iter().map(|c| c.total_amount).sum(),
            total_received: clients.iter().map(|c| c.advance_received).sum(),
            expenses,
            clients,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::client::CreateClient;
    use crate::models::CreateExpense;
    use crate::store::MemoryStore;
    use chrono::{DateTime, TimeZone, Utc};
    use uuid::Uuid;

    fn expense(category: ExpenseCategory, amount: i64, date: DateTime<Utc>) -> Expense {
        Expense::new(
            CreateExpense {
                date: Some(date),
                category,
                amount: Decimal::from(amount),
                description: "test".to_string(),
                payment_method: None,
                receipt_number: None,
            },
            Uuid::new_v4(),
            date,
        )
        .unwrap()
    }

    fn client(total: i64, advance: i64, created_at: DateTime<Utc>) -> Client {
        Client::new(
            CreateClient {
                client_name: "Nair Foods".to_string(),
                email: "hello@nairfoods.in".to_string(),
                phone_number: "9400000000".to_string(),
                project_details: "Menu app".to_string(),
                total_amount: Decimal::from(total),
                advance_received: Some(Decimal::from(advance)),
                bond_signed: None,
                project_start_date: created_at,
                project_end_date: created_at,
                delivery_status: None,
                lead_id: None,
            },
            Uuid::new_v4(),
            created_at,
        )
        .unwrap()
    }

    async fn service_with(expenses: Vec<Expense>, clients: Vec<Client>) -> FinanceService {
        let stores = Stores::memory(MemoryStore::new());
        for e in expenses {
            stores.expenses.insert(e).await.unwrap();
        }
        for c in clients {
            stores.clients.insert(c).await.unwrap();
        }
        FinanceService::new(stores, BusinessCalendar::default())
    }

    #[test]
    fn test_expenses_without_clients() {
        let at = Utc.with_ymd_and_hms(2024, 5, 10, 6, 0, 0).unwrap();
        let expenses = vec![
            expense(ExpenseCategory::Tools, 50, at),
            expense(ExpenseCategory::Marketing, 100, at),
        ];
        let summary = FinancialSummary::compute(&expenses, &[], &BusinessCalendar::default());

        assert_eq!(summary.total_expenses, Decimal::from(150));
        assert_eq!(summary.total_income, Decimal::ZERO);
        assert_eq!(summary.profit, Decimal::from(-150));
        assert_eq!(summary.profit_margin, Decimal::ZERO);
        assert_eq!(
            summary.expenses_by_category,
            vec![
                CategoryTotal {
                    category: ExpenseCategory::Marketing,
                    total: Decimal::from(100),
                    count: 1,
                },
                CategoryTotal {
                    category: ExpenseCategory::Tools,
                    total: Decimal::from(50),
                    count: 1,
                },
            ]
        );
    }

    #[test]
    fn test_empty_summary_is_zero() {
        let summary = FinancialSummary::compute(&[], &[], &BusinessCalendar::default());
        assert_eq!(summary, FinancialSummary::default());
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["totalIncome"], 0.0);
        assert_eq!(json["expensesByCategory"], serde_json::json!([]));
    }

    #[test]
    fn test_profit_margin_rounds_to_two_places() {
        let at = Utc.with_ymd_and_hms(2024, 5, 10, 6, 0, 0).unwrap();
        let expenses = vec![expense(ExpenseCategory::Other, 100, at)];
        let clients = vec![client(300, 120, at)];
        let summary = FinancialSummary::compute(&expenses, &clients, &BusinessCalendar::default());
        assert_eq!(summary.profit, Decimal::from(200));
        assert_eq!(summary.actual_profit, Decimal::from(20));
        assert_eq!(summary.profit_margin, Decimal::new(6667, 2));
    }

    #[test]
    fn test_monthly_data_uses_business_months() {
        // 20:00 UTC on Jan 31 is Feb 1 in IST.
        let late_jan = Utc.with_ymd_and_hms(2024, 1, 31, 20, 0, 0).unwrap();
        let mid_jan = Utc.with_ymd_and_hms(2024, 1, 15, 6, 0, 0).unwrap();
        let expenses = vec![
            expense(ExpenseCategory::Tools, 10, late_jan),
            expense(ExpenseCategory::Tools, 5, mid_jan),
        ];
        let summary = FinancialSummary::compute(&expenses, &[], &BusinessCalendar::default());
        let months: Vec<(i32, u32)> = summary.monthly_data.iter().map(|m| (m.year, m.month)).collect();
        assert_eq!(months, vec![(2024, 1), (2024, 2)]);
    }

    #[tokio::test]
    async fn test_window_excludes_other_months() {
        let may = Utc.with_ymd_and_hms(2024, 5, 31, 17, 0, 0).unwrap();
        let june = Utc.with_ymd_and_hms(2024, 6, 2, 6, 0, 0).unwrap();
        let service = service_with(
            vec![
                expense(ExpenseCategory::Marketing, 100, may),
                expense(ExpenseCategory::Tools, 40, june),
            ],
            vec![client(1000, 200, june)],
        )
        .await;

        let may_summary = service.summarize(Some(2024), Some(5)).await.unwrap();
        assert_eq!(may_summary.total_expenses, Decimal::from(100));
        assert_eq!(may_summary.total_income, Decimal::ZERO);

        let june_summary = service.summarize(Some(2024), Some(6)).await.unwrap();
        assert_eq!(june_summary.total_expenses, Decimal::from(40));
        assert_eq!(june_summary.total_income, Decimal::from(1000));

        let all_time = service.summarize(None, None).await.unwrap();
        assert_eq!(all_time.total_expenses, Decimal::from(140));

        // A month without a year is ignored.
        let month_only = service.summarize(None, Some(5)).await.unwrap();
        assert_eq!(month_only, all_time);
    }

    #[tokio::test]
    async fn test_monthly_report() {
        let june = Utc.with_ymd_and_hms(2024, 6, 2, 6, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 6, 20, 6, 0, 0).unwrap();
        let service = service_with(
            vec![
                expense(ExpenseCategory::Marketing, 100, june),
                expense(ExpenseCategory::Tools, 40, later),
            ],
            vec![client(1000, 200, june)],
        )
        .await;

        let report = service.monthly_report(2024, 6).await.unwrap();
        assert_eq!(report.total_expense, Decimal::from(140));
        assert_eq!(report.total_income, Decimal::from(1000));
        assert_eq!(report.total_received, Decimal::from(200));
        assert_eq!(report.expenses[0].date, later);

        assert!(service.monthly_report(2024, 13).await.is_err());
    }
}
