//! Account handlers
//!
//! Admin management of the accounts that can sign in

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    Extension,
};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::Deserialize;
use validator::Validate;

use crate::entity::account::{self, AccountResponse, AccountStatus};
use crate::entity::activity_log::{OpResult, OpType};
use crate::entity::now_ts;
use crate::entity::refresh_token::RevokeReason;
use crate::error::{AppError, AppResult, OptionExt};
use crate::extract::{ApiPath, ValidatedJson};
use crate::handlers::activity::service::log_operation;
use crate::handlers::{ensure_changes, hash_password};
use crate::middleware::CurrentUser;
use crate::permission::{require_admin, Role};
use crate::routes::ApiResponse;
use crate::session;
use crate::state::AppState;

/// Create account request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateAccountRequest {
    #[validate(length(min = 3, max = 32, message = "must be 3 to 32 characters"))]
    pub username: String,
    #[validate(length(min = 8, max = 72, message = "must be 8 to 72 characters"))]
    pub password: String,
    #[validate(length(min = 1, max = 64, message = "must be 1 to 64 characters"))]
    pub full_name: String,
    #[validate(email(message = "must be a valid email"))]
    pub email: Option<String>,
    pub role: Role,
}

/// Partial account update; absent fields are left unchanged
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateAccountRequest {
    #[validate(length(min = 1, max = 64, message = "must be 1 to 64 characters"))]
    pub full_name: Option<String>,
    #[validate(email(message = "must be a valid email"))]
    pub email: Option<String>,
    pub role: Option<Role>,
    #[validate(range(min = 1, max = 2, message = "must be 1 (active) or 2 (disabled)"))]
    pub status: Option<i32>,
    #[validate(length(min = 8, max = 72, message = "must be 8 to 72 characters"))]
    pub password: Option<String>,
}

/// GET /api/accounts
pub async fn list_accounts(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> AppResult<Json<ApiResponse<Vec<AccountResponse>>>> {
    require_admin(&current_user)?;

    let accounts = account::Entity::find()
        .order_by_asc(account::Column::Id)
        .all(&*state.db)
        .await?;

    Ok(Json(ApiResponse::success(
        accounts.into_iter().map(Into::into).collect(),
    )))
}

/// POST /api/accounts
pub async fn create_account(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    ValidatedJson(req): ValidatedJson<CreateAccountRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<AccountResponse>>)> {
    require_admin(&current_user)?;

    let existing = account::Entity::find()
        .filter(account::Column::Username.eq(&req.username))
        .one(&*state.db)
        .await?;
    if existing.is_some() {
        return Err(AppError::Conflict(format!(
            "username '{}' already exists",
            req.username
        )));
    }

    let password = hash_password(req.password).await?;
    let created = account::ActiveModel {
        username: Set(req.username),
        password: Set(password),
        full_name: Set(req.full_name),
        email: Set(req.email),
        role: Set(req.role.as_str().to_string()),
        status: Set(AccountStatus::Active.into()),
        last_login: Set(0),
        created_at: Set(now_ts()),
        ..Default::default()
    }
    .insert(&*state.db)
    .await?;

    log_operation(
        &current_user.username,
        OpType::CreateAccount,
        format!("account: {}, role: {}", created.username, created.role),
        OpResult::Success,
    );

    Ok(ApiResponse::created(created.into()))
}

/// PATCH /api/accounts/:id
pub async fn update_account(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    ApiPath(id): ApiPath<i64>,
    ValidatedJson(req): ValidatedJson<UpdateAccountRequest>,
) -> AppResult<Json<ApiResponse<AccountResponse>>> {
    require_admin(&current_user)?;

    if id == current_user.id {
        if req.status == Some(AccountStatus::Disabled.into()) {
            return Err(AppError::BadRequest("cannot disable your own account".to_string()));
        }
        if matches!(req.role, Some(role) if role != Role::Admin) {
            return Err(AppError::BadRequest("cannot remove your own admin role".to_string()));
        }
    }

    let found = account::Entity::find_by_id(id)
        .one(&*state.db)
        .await?
        .ok_or_not_found(format!("account {} not found", id))?;

    let mut active: account::ActiveModel = found.into();
    let mut changed = false;

    if let Some(full_name) = req.full_name {
        active.full_name = Set(full_name);
        changed = true;
    }
    if let Some(email) = req.email {
        active.email = Set(Some(email));
        changed = true;
    }
    if let Some(role) = req.role {
        active.role = Set(role.as_str().to_string());
        changed = true;
    }
    if let Some(status) = req.status {
        active.status = Set(status);
        changed = true;
    }
    let password_reset = req.password.is_some();
    if let Some(password) = req.password {
        active.password = Set(hash_password(password).await?);
        changed = true;
    }
    ensure_changes(changed)?;

    let updated = active.update(&*state.db).await?;

    // Disabled accounts and reset passwords end every existing session
    if !updated.is_active() || password_reset {
        let revoked = session::revoke_all(&*state.db, updated.id, RevokeReason::Admin).await?;
        tracing::info!("Revoked {} sessions of {}", revoked, updated.username);
    }

    log_operation(
        &current_user.username,
        OpType::UpdateAccount,
        format!("account: {}", updated.username),
        OpResult::Success,
    );

    Ok(Json(ApiResponse::success(updated.into())))
}
