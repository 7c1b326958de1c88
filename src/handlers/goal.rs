//! Goal handlers

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    Extension,
};
use chrono::NaiveDate;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Select, Set};
use serde::Deserialize;
use validator::Validate;

use crate::entity::activity_log::{OpResult, OpType};
use crate::entity::goal::{self, GoalStatus};
use crate::entity::now_ts;
use crate::error::{AppResult, OptionExt};
use crate::extract::{ApiPath, ApiQuery, ValidatedJson};
use crate::handlers::activity::service::log_operation;
use crate::handlers::employee::{find_live_employee, live_employee_ids};
use crate::handlers::ensure_changes;
use crate::middleware::CurrentUser;
use crate::routes::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateGoalRequest {
    pub employee_id: i64,
    #[validate(length(min = 1, max = 128, message = "must be 1 to 128 characters"))]
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub status: Option<GoalStatus>,
    #[validate(range(min = 0, max = 100, message = "must be between 0 and 100"))]
    pub progress: Option<i32>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateGoalRequest {
    #[validate(length(min = 1, max = 128, message = "must be 1 to 128 characters"))]
    pub title: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub status: Option<GoalStatus>,
    #[validate(range(min = 0, max = 100, message = "must be between 0 and 100"))]
    pub progress: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct GoalQuery {
    pub status: Option<GoalStatus>,
}

/// Completing a goal without an explicit progress implies 100%
fn effective_progress(status: Option<GoalStatus>, progress: Option<i32>) -> Option<i32> {
    match (status, progress) {
        (_, Some(p)) => Some(p),
        (Some(GoalStatus::Completed), None) => Some(100),
        _ => None,
    }
}

/// Non-deleted goals of non-deleted employees
pub fn live_goals() -> Select<goal::Entity> {
    goal::Entity::find()
        .filter(goal::Column::DeletedAt.is_null())
        .filter(goal::Column::EmployeeId.in_subquery(live_employee_ids()))
}

async fn find_live_goal(state: &AppState, id: i64) -> AppResult<goal::Model> {
    live_goals()
        .filter(goal::Column::Id.eq(id))
        .one(&*state.db)
        .await?
        .ok_or_not_found(format!("goal {} not found", id))
}

/// GET /api/employees/:id/goals
pub async fn list_employee_goals(
    State(state): State<AppState>,
    ApiPath(employee_id): ApiPath<i64>,
    ApiQuery(query): ApiQuery<GoalQuery>,
) -> AppResult<Json<ApiResponse<Vec<goal::Model>>>> {
    find_live_employee(&*state.db, employee_id).await?;

    let mut select = live_goals().filter(goal::Column::EmployeeId.eq(employee_id));
    if let Some(status) = query.status {
        select = select.filter(goal::Column::Status.eq(status.as_str()));
    }
    let goals = select
        .order_by_asc(goal::Column::DueDate)
        .order_by_asc(goal::Column::Id)
        .all(&*state.db)
        .await?;

    Ok(Json(ApiResponse::success(goals)))
}

/// POST /api/goals
pub async fn create_goal(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    ValidatedJson(req): ValidatedJson<CreateGoalRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<goal::Model>>)> {
    let employee = find_live_employee(&*state.db, req.employee_id).await?;

    let status = req.status.unwrap_or(GoalStatus::NotStarted);
    let progress = effective_progress(Some(status), req.progress).unwrap_or(0);

    let now = now_ts();
    let created = goal::ActiveModel {
        employee_id: Set(employee.id),
        title: Set(req.title),
        description: Set(req.description),
        status: Set(status.as_str().to_string()),
        progress: Set(progress),
        due_date: Set(req.due_date),
        created_by: Set(current_user.id),
        created_at: Set(now),
        updated_at: Set(now),
        deleted_at: Set(None),
        ..Default::default()
    }
    .insert(&*state.db)
    .await?;

    log_operation(
        &current_user.username,
        OpType::CreateGoal,
        format!("{}: {}", employee.employee_code, created.title),
        OpResult::Success,
    );

    Ok(ApiResponse::created(created))
}

/// PATCH /api/goals/:id
pub async fn update_goal(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    ApiPath(id): ApiPath<i64>,
    ValidatedJson(req): ValidatedJson<UpdateGoalRequest>,
) -> AppResult<Json<ApiResponse<goal::Model>>> {
    let existing = find_live_goal(&state, id).await?;

    let mut active: goal::ActiveModel = existing.into();
    let mut changed = false;
    if let Some(v) = req.title {
        active.title = Set(v);
        changed = true;
    }
    if let Some(v) = req.description {
        active.description = Set(Some(v));
        changed = true;
    }
    if let Some(v) = req.due_date {
        active.due_date = Set(Some(v));
        changed = true;
    }
    if let Some(status) = req.status {
        active.status = Set(status.as_str().to_string());
        changed = true;
    }
    if let Some(progress) = effective_progress(req.status, req.progress) {
        active.progress = Set(progress);
        changed = true;
    }
    ensure_changes(changed)?;
    active.updated_at = Set(now_ts());

    let updated = active.update(&*state.db).await?;

    log_operation(
        &current_user.username,
        OpType::UpdateGoal,
        format!("goal {}: {} ({}%)", updated.id, updated.status, updated.progress),
        OpResult::Success,
    );

    Ok(Json(ApiResponse::success(updated)))
}

/// DELETE /api/goals/:id
pub async fn delete_goal(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<Json<ApiResponse<()>>> {
    let existing = find_live_goal(&state, id).await?;
    let desc = format!("goal {}: {}", existing.id, existing.title);

    let now = now_ts();
    let mut active: goal::ActiveModel = existing.into();
    active.deleted_at = Set(Some(now));
    active.updated_at = Set(now);
    active.update(&*state.db).await?;

    log_operation(&current_user.username, OpType::DeleteGoal, desc, OpResult::Success);
    Ok(Json(ApiResponse::success_msg("goal deleted")))
}
