//! Dashboard handlers
//!
//! Rows are loaded with narrow `select_only` queries and folded by [`crate::stats`].
//! Deleted employees and their reviews and goals are left out of every figure.

use axum::{
    extract::State,
    response::Json,
};
use chrono::{Duration, NaiveDate, Utc};
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait, QueryFilter,
    QuerySelect,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::entity::{department_history, employee, goal, performance_review};
use crate::error::{AppError, AppResult};
use crate::extract::ApiQuery;
use crate::handlers::employee::{live_employee_ids, live_employees};
use crate::handlers::goal::live_goals;
use crate::handlers::performance::live_reviews;
use crate::routes::ApiResponse;
use crate::state::AppState;
use crate::stats::{self, DepartmentStats, GoalCounts, MonthlyScore, ScoreBucket};

pub const DEFAULT_TREND_MONTHS: u32 = 12;
pub const MAX_TREND_MONTHS: u32 = 36;

#[derive(Debug, Serialize)]
pub struct Summary {
    pub total_employees: u64,
    pub departments: u64,
    pub new_hires_30d: u64,
    pub reviews: u64,
    pub average_score: Option<f64>,
    pub goals: GoalCounts,
}

#[derive(Debug, Deserialize)]
pub struct TrendQuery {
    pub months: Option<u32>,
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

async fn active_assignments(db: &DatabaseConnection) -> Result<Vec<(i64, String, f64)>, DbErr> {
    department_history::Entity::find()
        .select_only()
        .column(department_history::Column::EmployeeId)
        .column(department_history::Column::Department)
        .column(department_history::Column::Salary)
        .filter(department_history::Column::IsActive.eq(true))
        .filter(department_history::Column::EmployeeId.in_subquery(live_employee_ids()))
        .into_tuple()
        .all(db)
        .await
}

async fn review_scores(db: &DatabaseConnection) -> Result<Vec<(i64, f64)>, DbErr> {
    live_reviews()
        .select_only()
        .column(performance_review::Column::EmployeeId)
        .column(performance_review::Column::Score)
        .into_tuple()
        .all(db)
        .await
}

async fn goal_statuses(db: &DatabaseConnection) -> Result<Vec<String>, DbErr> {
    live_goals()
        .select_only()
        .column(goal::Column::Status)
        .into_tuple()
        .all(db)
        .await
}

/// GET /api/dashboard/summary
pub async fn summary(State(state): State<AppState>) -> AppResult<Json<ApiResponse<Summary>>> {
    let hired_since = today() - Duration::days(30);

    let (total_employees, new_hires_30d, assignments, reviews, statuses) = tokio::try_join!(
        live_employees().count(&*state.db),
        live_employees()
            .filter(employee::Column::HireDate.gte(hired_since))
            .count(&*state.db),
        active_assignments(&*state.db),
        review_scores(&*state.db),
        goal_statuses(&*state.db),
    )?;

    let departments = assignments
        .iter()
        .map(|(_, department, _)| department.as_str())
        .collect::<HashSet<_>>()
        .len() as u64;

    Ok(Json(ApiResponse::success(Summary {
        total_employees,
        departments,
        new_hires_30d,
        reviews: reviews.len() as u64,
        average_score: stats::average_score(reviews.iter().map(|(_, score)| *score)),
        goals: stats::goal_status_counts(statuses.iter().map(String::as_str)),
    })))
}

/// GET /api/dashboard/departments
pub async fn departments(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<Vec<DepartmentStats>>>> {
    let (assignments, reviews) =
        tokio::try_join!(active_assignments(&*state.db), review_scores(&*state.db))?;

    Ok(Json(ApiResponse::success(stats::department_breakdown(
        &assignments,
        &reviews,
    ))))
}

/// GET /api/dashboard/score-trend
pub async fn score_trend(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<TrendQuery>,
) -> AppResult<Json<ApiResponse<Vec<MonthlyScore>>>> {
    let months = query.months.unwrap_or(DEFAULT_TREND_MONTHS);
    if !(1..=MAX_TREND_MONTHS).contains(&months) {
        return Err(AppError::BadRequest(format!(
            "months must be between 1 and {}",
            MAX_TREND_MONTHS
        )));
    }

    let today = today();
    let reviews: Vec<(NaiveDate, f64)> = live_reviews()
        .select_only()
        .column(performance_review::Column::ReviewDate)
        .column(performance_review::Column::Score)
        .filter(performance_review::Column::ReviewDate.gte(stats::trend_start(months, today)))
        .into_tuple()
        .all(&*state.db)
        .await?;

    Ok(Json(ApiResponse::success(stats::score_trend(
        &reviews, months, today,
    ))))
}

/// GET /api/dashboard/score-distribution
pub async fn score_distribution(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<Vec<ScoreBucket>>>> {
    let reviews = review_scores(&*state.db).await?;
    Ok(Json(ApiResponse::success(stats::score_distribution(
        reviews.into_iter().map(|(_, score)| score),
    ))))
}
