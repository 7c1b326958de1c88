use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    middleware,
    response::Json,
    routing::{get, patch, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

use crate::handlers;
use crate::middleware::auth_layer;
use crate::state::AppState;

pub mod health;

/// API response wrapper: `{success, message, data}`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            message: "success".to_string(),
            data: Some(data),
        }
    }

    pub fn with_message(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    /// 201 response for newly created records
    pub fn created(data: T) -> (StatusCode, Json<Self>) {
        (StatusCode::CREATED, Json(Self::with_message("created", data)))
    }
}

impl ApiResponse<()> {
    pub fn success_msg(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }
}

/// One page of a list
#[derive(Debug, Serialize)]
pub struct Page<T: Serialize> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
}

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 100;

/// `page` / `page_size` query parameters
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

impl PageQuery {
    /// Page number (1-based) and clamped page size
    pub fn resolve(&self) -> (u64, u64) {
        let page = self.page.unwrap_or(1).max(1);
        let page_size = self
            .page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        (page, page_size)
    }

    pub fn offset(&self) -> u64 {
        let (page, page_size) = self.resolve();
        (page - 1) * page_size
    }
}

fn api_routes() -> Router<AppState> {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Setup routes
        .route("/setup/status", get(handlers::setup::setup_status))
        .route("/setup/admin", post(handlers::setup::create_first_admin))
        // Auth routes
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/me", get(handlers::auth::me))
        .route("/auth/password", post(handlers::auth::change_password))
        // Account routes (admin)
        .route(
            "/accounts",
            get(handlers::account::list_accounts).post(handlers::account::create_account),
        )
        .route("/accounts/:id", patch(handlers::account::update_account))
        // Employee routes
        .route(
            "/employees",
            get(handlers::employee::list_employees).post(handlers::employee::create_employee),
        )
        .route(
            "/employees/:id",
            get(handlers::employee::get_employee)
                .patch(handlers::employee::update_employee)
                .delete(handlers::employee::delete_employee),
        )
        .route("/employees/:id/restore", post(handlers::employee::restore_employee))
        // Department history routes
        .route(
            "/employees/:id/departments",
            get(handlers::department_history::list_history)
                .post(handlers::department_history::assign_department),
        )
        .route(
            "/department-history/:id",
            patch(handlers::department_history::update_history)
                .delete(handlers::department_history::delete_history),
        )
        // Performance history routes
        .route(
            "/performance",
            get(handlers::performance::list_reviews).post(handlers::performance::create_review),
        )
        .route(
            "/performance/:id",
            get(handlers::performance::get_review)
                .patch(handlers::performance::update_review)
                .delete(handlers::performance::delete_review),
        )
        .route(
            "/employees/:id/performance",
            get(handlers::performance::list_employee_reviews),
        )
        // Goal routes
        .route("/goals", post(handlers::goal::create_goal))
        .route(
            "/goals/:id",
            patch(handlers::goal::update_goal).delete(handlers::goal::delete_goal),
        )
        .route("/employees/:id/goals", get(handlers::goal::list_employee_goals))
        // Dashboard routes
        .route("/dashboard/summary", get(handlers::dashboard::summary))
        .route("/dashboard/departments", get(handlers::dashboard::departments))
        .route("/dashboard/score-trend", get(handlers::dashboard::score_trend))
        .route(
            "/dashboard/score-distribution",
            get(handlers::dashboard::score_distribution),
        )
        // Activity log routes (admin)
        .route("/activity", get(handlers::activity::query_activity))
        .route("/activity/delete", post(handlers::activity::delete_activity))
        .fallback(fallback)
}

/// CORS for the configured dashboard origins; cookies require explicit origins
fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", o);
                None
            }
        })
        .collect();
    if origins.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE])
            .allow_credentials(true),
    )
}

/// Create the main router
pub fn create_router(state: AppState) -> Router {
    // Serves the dashboard bundle, falls back to index.html for SPA routing
    let static_dir = &state.config.static_dir;
    let serve_dir =
        ServeDir::new(static_dir).not_found_service(ServeFile::new(static_dir.join("index.html")));

    let mut router = Router::new()
        .nest("/api", api_routes())
        .fallback_service(serve_dir)
        .layer(middleware::from_fn_with_state(state.clone(), auth_layer))
        .layer(TraceLayer::new_for_http());

    if let Some(cors) = cors_layer(&state.config.cors_origins) {
        router = router.layer(cors);
    }

    router.with_state(state)
}

/// Fallback handler for unknown API routes
pub async fn fallback() -> (StatusCode, Json<ApiResponse<()>>) {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse {
            success: false,
            message: "Not Found".to_string(),
            data: None,
        }),
    )
}
