//! Department history handlers
//!
//! Each employee has at most one active assignment. Reassignment closes the
//! active row and opens a new one inside a single transaction.

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    Extension,
};
use chrono::NaiveDate;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, ModelTrait, QueryFilter, QueryOrder, QuerySelect,
    Set, TransactionTrait,
};
use serde::Deserialize;
use validator::Validate;

use crate::entity::activity_log::{OpResult, OpType};
use crate::entity::{department_history, now_ts};
use crate::error::{AppError, AppResult, OptionExt};
use crate::extract::{ApiPath, ValidatedJson};
use crate::handlers::activity::service::log_operation;
use crate::handlers::employee::find_live_employee;
use crate::handlers::ensure_changes;
use crate::middleware::CurrentUser;
use crate::routes::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct AssignDepartmentRequest {
    #[validate(length(min = 1, max = 64, message = "must be 1 to 64 characters"))]
    pub department: String,
    #[validate(length(min = 1, max = 64, message = "must be 1 to 64 characters"))]
    pub designation: String,
    #[validate(range(min = 0.0, message = "must not be negative"))]
    pub salary: f64,
    pub start_date: NaiveDate,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateHistoryRequest {
    #[validate(length(min = 1, max = 64, message = "must be 1 to 64 characters"))]
    pub department: Option<String>,
    #[validate(length(min = 1, max = 64, message = "must be 1 to 64 characters"))]
    pub designation: Option<String>,
    #[validate(range(min = 0.0, message = "must not be negative"))]
    pub salary: Option<f64>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// `end_date` may not precede `start_date`
fn check_range(start: NaiveDate, end: Option<NaiveDate>) -> AppResult<()> {
    match end {
        Some(end) if end < start => Err(AppError::Validation(format!(
            "end_date: {} is before start_date {}",
            end, start
        ))),
        _ => Ok(()),
    }
}

/// A new assignment may not start before the one it replaces
fn check_successor(current: &department_history::Model, start: NaiveDate) -> AppResult<()> {
    if start < current.start_date {
        return Err(AppError::BadRequest(format!(
            "start_date {} is before the current assignment start {}",
            start, current.start_date
        )));
    }
    Ok(())
}

/// GET /api/employees/:id/departments
pub async fn list_history(
    State(state): State<AppState>,
    ApiPath(employee_id): ApiPath<i64>,
) -> AppResult<Json<ApiResponse<Vec<department_history::Model>>>> {
    find_live_employee(&*state.db, employee_id).await?;

    let rows = department_history::Entity::find()
        .filter(department_history::Column::EmployeeId.eq(employee_id))
        .order_by_desc(department_history::Column::StartDate)
        .order_by_desc(department_history::Column::Id)
        .all(&*state.db)
        .await?;

    Ok(Json(ApiResponse::success(rows)))
}

/// POST /api/employees/:id/departments
pub async fn assign_department(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    ApiPath(employee_id): ApiPath<i64>,
    ValidatedJson(req): ValidatedJson<AssignDepartmentRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<department_history::Model>>)> {
    let txn = state.db.begin().await?;

    let employee = find_live_employee(&txn, employee_id).await?;

    let current = department_history::Entity::find()
        .filter(department_history::Column::EmployeeId.eq(employee_id))
        .filter(department_history::Column::IsActive.eq(true))
        .lock_exclusive()
        .one(&txn)
        .await?;

    if let Some(current) = current {
        check_successor(&current, req.start_date)?;
        let mut closing: department_history::ActiveModel = current.into();
        closing.is_active = Set(false);
        closing.end_date = Set(Some(req.start_date));
        closing.update(&txn).await?;
    }

    let created = department_history::ActiveModel {
        employee_id: Set(employee_id),
        department: Set(req.department),
        designation: Set(req.designation),
        salary: Set(req.salary),
        start_date: Set(req.start_date),
        end_date: Set(None),
        is_active: Set(true),
        created_at: Set(now_ts()),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;

    log_operation(
        &current_user.username,
        OpType::AssignDepartment,
        format!(
            "{}: {} / {} from {}",
            employee.employee_code, created.department, created.designation, created.start_date
        ),
        OpResult::Success,
    );

    Ok(ApiResponse::created(created))
}

/// PATCH /api/department-history/:id
pub async fn update_history(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    ApiPath(id): ApiPath<i64>,
    ValidatedJson(req): ValidatedJson<UpdateHistoryRequest>,
) -> AppResult<Json<ApiResponse<department_history::Model>>> {
    let existing = department_history::Entity::find_by_id(id)
        .one(&*state.db)
        .await?
        .ok_or_not_found(format!("department history {} not found", id))?;

    check_range(
        req.start_date.unwrap_or(existing.start_date),
        req.end_date.or(existing.end_date),
    )?;

    let mut active: department_history::ActiveModel = existing.into();
    let mut changed = false;
    if let Some(v) = req.department {
        active.department = Set(v);
        changed = true;
    }
    if let Some(v) = req.designation {
        active.designation = Set(v);
        changed = true;
    }
    if let Some(v) = req.salary {
        active.salary = Set(v);
        changed = true;
    }
    if let Some(v) = req.start_date {
        active.start_date = Set(v);
        changed = true;
    }
    if let Some(v) = req.end_date {
        active.end_date = Set(Some(v));
        changed = true;
    }
    ensure_changes(changed)?;

    let updated = active.update(&*state.db).await?;

    log_operation(
        &current_user.username,
        OpType::UpdateDepartmentHistory,
        format!("history {} of employee {}", updated.id, updated.employee_id),
        OpResult::Success,
    );

    Ok(Json(ApiResponse::success(updated)))
}

/// DELETE /api/department-history/:id
pub async fn delete_history(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<Json<ApiResponse<()>>> {
    let existing = department_history::Entity::find_by_id(id)
        .one(&*state.db)
        .await?
        .ok_or_not_found(format!("department history {} not found", id))?;

    let desc = format!(
        "history {} of employee {} ({})",
        existing.id, existing.employee_id, existing.department
    );
    existing.delete(&*state.db).await?;

    log_operation(
        &current_user.username,
        OpType::DeleteDepartmentHistory,
        desc,
        OpResult::Success,
    );

    Ok(Json(ApiResponse::success_msg("department history deleted")))
}
