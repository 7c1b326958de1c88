//! Performance review handlers

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    Extension,
};
use chrono::NaiveDate;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Select, Set,
};
use serde::Deserialize;
use validator::Validate;

use crate::entity::activity_log::{OpResult, OpType};
use crate::entity::{now_ts, performance_review};
use crate::error::{AppResult, OptionExt};
use crate::extract::{ApiPath, ApiQuery, ValidatedJson};
use crate::handlers::activity::service::log_operation;
use crate::handlers::employee::{find_live_employee, live_employee_ids};
use crate::handlers::ensure_changes;
use crate::middleware::CurrentUser;
use crate::permission::require_owner_or_admin;
use crate::routes::{ApiResponse, Page, PageQuery};
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateReviewRequest {
    pub employee_id: i64,
    #[validate(length(min = 1, max = 32, message = "must be 1 to 32 characters"))]
    pub review_period: String,
    pub review_date: NaiveDate,
    #[validate(range(min = 1.0, max = 5.0, message = "must be between 1 and 5"))]
    pub score: f64,
    pub strengths: Option<String>,
    pub improvements: Option<String>,
    pub comments: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateReviewRequest {
    #[validate(length(min = 1, max = 32, message = "must be 1 to 32 characters"))]
    pub review_period: Option<String>,
    pub review_date: Option<NaiveDate>,
    #[validate(range(min = 1.0, max = 5.0, message = "must be between 1 and 5"))]
    pub score: Option<f64>,
    pub strengths: Option<String>,
    pub improvements: Option<String>,
    pub comments: Option<String>,
}

/// GET /api/performance query parameters
#[derive(Debug, Default, Deserialize)]
pub struct ReviewQuery {
    pub employee_id: Option<i64>,
    pub reviewer_id: Option<i64>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

/// Non-deleted reviews of non-deleted employees
pub fn live_reviews() -> Select<performance_review::Entity> {
    performance_review::Entity::find()
        .filter(performance_review::Column::DeletedAt.is_null())
        .filter(performance_review::Column::EmployeeId.in_subquery(live_employee_ids()))
}

fn filtered(query: &ReviewQuery) -> Select<performance_review::Entity> {
    let mut select = live_reviews();
    if let Some(id) = query.employee_id {
        select = select.filter(performance_review::Column::EmployeeId.eq(id));
    }
    if let Some(id) = query.reviewer_id {
        select = select.filter(performance_review::Column::ReviewerId.eq(id));
    }
    if let Some(from) = query.from {
        select = select.filter(performance_review::Column::ReviewDate.gte(from));
    }
    if let Some(to) = query.to {
        select = select.filter(performance_review::Column::ReviewDate.lte(to));
    }
    select
        .order_by_desc(performance_review::Column::ReviewDate)
        .order_by_desc(performance_review::Column::Id)
}

async fn find_live_review(state: &AppState, id: i64) -> AppResult<performance_review::Model> {
    live_reviews()
        .filter(performance_review::Column::Id.eq(id))
        .one(&*state.db)
        .await?
        .ok_or_not_found(format!("review {} not found", id))
}

/// GET /api/performance
pub async fn list_reviews(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ReviewQuery>,
) -> AppResult<Json<ApiResponse<Page<performance_review::Model>>>> {
    let paging = PageQuery {
        page: query.page,
        page_size: query.page_size,
    };
    let (page, page_size) = paging.resolve();

    let select = filtered(&query);
    let (items, total) = tokio::try_join!(
        select
            .clone()
            .offset(paging.offset())
            .limit(page_size)
            .all(&*state.db),
        select.count(&*state.db),
    )?;

    Ok(Json(ApiResponse::success(Page {
        items,
        total,
        page,
        page_size,
    })))
}

/// GET /api/employees/:id/performance
pub async fn list_employee_reviews(
    State(state): State<AppState>,
    ApiPath(employee_id): ApiPath<i64>,
) -> AppResult<Json<ApiResponse<Vec<performance_review::Model>>>> {
    find_live_employee(&*state.db, employee_id).await?;

    let reviews = filtered(&ReviewQuery {
        employee_id: Some(employee_id),
        ..Default::default()
    })
    .all(&*state.db)
    .await?;

    Ok(Json(ApiResponse::success(reviews)))
}

/// GET /api/performance/:id
pub async fn get_review(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<Json<ApiResponse<performance_review::Model>>> {
    Ok(Json(ApiResponse::success(find_live_review(&state, id).await?)))
}

/// POST /api/performance
pub async fn create_review(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    ValidatedJson(req): ValidatedJson<CreateReviewRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<performance_review::Model>>)> {
    let employee = find_live_employee(&*state.db, req.employee_id).await?;

    let now = now_ts();
    let review = performance_review::ActiveModel {
        employee_id: Set(employee.id),
        reviewer_id: Set(current_user.id),
        review_period: Set(req.review_period),
        review_date: Set(req.review_date),
        score: Set(req.score),
        strengths: Set(req.strengths),
        improvements: Set(req.improvements),
        comments: Set(req.comments),
        created_at: Set(now),
        updated_at: Set(now),
        deleted_at: Set(None),
        ..Default::default()
    }
    .insert(&*state.db)
    .await?;

    log_operation(
        &current_user.username,
        OpType::CreateReview,
        format!(
            "{} {}: score {}",
            employee.employee_code, review.review_period, review.score
        ),
        OpResult::Success,
    );

    Ok(ApiResponse::created(review))
}

/// PATCH /api/performance/:id
pub async fn update_review(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    ApiPath(id): ApiPath<i64>,
    ValidatedJson(req): ValidatedJson<UpdateReviewRequest>,
) -> AppResult<Json<ApiResponse<performance_review::Model>>> {
    let existing = find_live_review(&state, id).await?;
    require_owner_or_admin(&current_user, existing.reviewer_id)?;

    let mut active: performance_review::ActiveModel = existing.into();
    let mut changed = false;
    if let Some(v) = req.review_period {
        active.review_period = Set(v);
        changed = true;
    }
    if let Some(v) = req.review_date {
        active.review_date = Set(v);
        changed = true;
    }
    if let Some(v) = req.score {
        active.score = Set(v);
        changed = true;
    }
    if let Some(v) = req.strengths {
        active.strengths = Set(Some(v));
        changed = true;
    }
    if let Some(v) = req.improvements {
        active.improvements = Set(Some(v));
        changed = true;
    }
    if let Some(v) = req.comments {
        active.comments = Set(Some(v));
        changed = true;
    }
    ensure_changes(changed)?;
    active.updated_at = Set(now_ts());

    let review = active.update(&*state.db).await?;

    log_operation(
        &current_user.username,
        OpType::UpdateReview,
        format!("review {} of employee {}", review.id, review.employee_id),
        OpResult::Success,
    );

    Ok(Json(ApiResponse::success(review)))
}

/// DELETE /api/performance/:id
pub async fn delete_review(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<Json<ApiResponse<()>>> {
    let existing = find_live_review(&state, id).await?;
    require_owner_or_admin(&current_user, existing.reviewer_id)?;

    let desc = format!("review {} of employee {}", existing.id, existing.employee_id);
    let now = now_ts();
    let mut active: performance_review::ActiveModel = existing.into();
    active.deleted_at = Set(Some(now));
    active.updated_at = Set(now);
    active.update(&*state.db).await?;

    log_operation(&current_user.username, OpType::DeleteReview, desc, OpResult::Success);
    Ok(Json(ApiResponse::success_msg("review deleted")))
}
