use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::api::AppState;
use crate::auth::RequireAdmin;
use crate::error::CrmResult;
use crate::finance::{FinancialSummary, MonthlyReport};
use crate::models::expense::ExpenseFilter;
use crate::models::{parse_filter, CreateExpense, Expense, UpdateExpense};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseQuery {
    pub category: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PeriodQuery {
    pub year: Option<i32>,
    pub month: Option<u32>,
}

pub async fn list(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(query): Query<ExpenseQuery>,
) -> CrmResult<Json<Vec<Expense>>> {
    let filter = ExpenseFilter {
        category: parse_filter(query.category.as_deref(), "category")?,
        date: state
            .calendar
            .range(query.start_date.as_deref(), query.end_date.as_deref())?,
    };
    Ok(Json(state.stores.expenses.list(&filter).await?))
}

pub async fn create(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Json(request): Json<CreateExpense>,
) -> CrmResult<(StatusCode, Json<Expense>)> {
    let expense = Expense::new(request, admin.id, state.clock.now())?;
    let expense = state.stores.expenses.insert(expense).await?;
    info!("Expense {} of {} recorded by {}", expense.id, expense.amount, admin.id);
    Ok((StatusCode::CREATED, Json(expense)))
}

pub async fn update(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<Uuid>,
    Json(patch): Json<UpdateExpense>,
) -> CrmResult<Json<Expense>> {
    let expense = state
        .stores
        .expenses
        .update(id, patch, state.clock.now())
        .await?;
    info!("Expense {} updated by {}", id, admin.id);
    Ok(Json(expense))
}

pub async fn remove(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<Uuid>,
) -> CrmResult<Json<Value>> {
    state.stores.expenses.delete(id).await?;
    info!("Expense {} deleted by {}", id, admin.id);
    Ok(Json(json!({ "message": "Expense deleted successfully" })))
}

pub async fn summary(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(period): Query<PeriodQuery>,
) -> CrmResult<Json<FinancialSummary>> {
    Ok(Json(state.finance.summarize(period.year, period.month).await?))
}

pub async fn monthly_report(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path((year, month)): Path<(i32, u32)>,
) -> CrmResult<Json<MonthlyReport>> {
    Ok(Json(state.finance.monthly_report(year, month).await?))
}
