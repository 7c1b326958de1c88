//! Setup handlers
//!
//! First-run bootstrap: report whether an admin exists and create the first one

use axum::{extract::State, http::StatusCode, Json};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::entity::account::{self, AccountResponse, AccountStatus};
use crate::entity::activity_log::{OpResult, OpType};
use crate::entity::now_ts;
use crate::error::{AppError, AppResult};
use crate::extract::ValidatedJson;
use crate::handlers::activity::service::log_operation;
use crate::handlers::hash_password;
use crate::permission::Role;
use crate::routes::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SetupStatus {
    pub initialized: bool,
}

/// First admin request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateAdminRequest {
    #[validate(length(min = 3, max = 32, message = "must be 3 to 32 characters"))]
    pub username: String,
    #[validate(length(min = 8, max = 72, message = "must be 8 to 72 characters"))]
    pub password: String,
    #[validate(length(min = 1, max = 64, message = "must be 1 to 64 characters"))]
    pub full_name: String,
    #[validate(email(message = "must be a valid email"))]
    pub email: Option<String>,
}

async fn admin_exists(state: &AppState) -> AppResult<bool> {
    let admins = account::Entity::find()
        .filter(account::Column::Role.eq(Role::Admin.as_str()))
        .count(&*state.db)
        .await?;
    Ok(admins > 0)
}

/// GET /api/setup/status
pub async fn setup_status(State(state): State<AppState>) -> AppResult<Json<ApiResponse<SetupStatus>>> {
    Ok(Json(ApiResponse::success(SetupStatus {
        initialized: admin_exists(&state).await?,
    })))
}

/// POST /api/setup/admin
pub async fn create_first_admin(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<CreateAdminRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<AccountResponse>>)> {
    if admin_exists(&state).await? {
        return Err(AppError::Conflict("system is already initialized".to_string()));
    }

    let password = hash_password(req.password).await?;
    let admin = account::ActiveModel {
        username: Set(req.username.clone()),
        password: Set(password),
        full_name: Set(req.full_name),
        email: Set(req.email),
        role: Set(Role::Admin.as_str().to_string()),
        status: Set(AccountStatus::Active.into()),
        last_login: Set(0),
        created_at: Set(now_ts()),
        ..Default::default()
    }
    .insert(&*state.db)
    .await?;

    tracing::info!("Initial admin account created: {}", admin.username);
    log_operation(&admin.username, OpType::Setup, "initial admin created", OpResult::Success);

    Ok(ApiResponse::created(admin.into()))
}
