//! Activity log handlers
//!
//! Query and prune the audit trail (admin only). Entries are written
//! asynchronously through [`service::log_operation`].

use axum::{
    extract::State,
    response::Json,
    Extension,
};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect};
use serde::Serialize;

use crate::entity::activity_log::{self, OpResult, OpType};
use crate::error::{AppError, AppResult};
use crate::extract::{ApiJson, ApiQuery};
use crate::middleware::CurrentUser;
use crate::permission::require_admin;
use crate::routes::{ApiResponse, Page, PageQuery};
use crate::state::AppState;

/// Log response
#[derive(Debug, Serialize)]
pub struct ActivityResponse {
    pub id: i64,
    pub op_time: i64,
    pub username: String,
    pub op_type: String,
    pub op_desc: String,
    pub result: String,
    pub ip: String,
}

impl From<activity_log::Model> for ActivityResponse {
    fn from(m: activity_log::Model) -> Self {
        Self {
            id: m.id,
            op_time: m.op_time,
            username: m.username,
            op_type: m.op_type,
            op_desc: m.op_desc,
            result: m.result,
            ip: m.ip.unwrap_or_default(),
        }
    }
}

/// GET /api/activity
pub async fn query_activity(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> AppResult<Json<ApiResponse<Page<ActivityResponse>>>> {
    require_admin(&current_user)?;

    let (page, page_size) = query.resolve();
    let (logs, total) = tokio::try_join!(
        activity_log::Entity::find()
            .order_by_desc(activity_log::Column::Id)
            .offset(query.offset())
            .limit(page_size)
            .all(&*state.db),
        activity_log::Entity::find().count(&*state.db),
    )?;

    Ok(Json(ApiResponse::success(Page {
        items: logs.into_iter().map(Into::into).collect(),
        total,
        page,
        page_size,
    })))
}

/// POST /api/activity/delete
pub async fn delete_activity(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    ApiJson(ids): ApiJson<Vec<i64>>,
) -> AppResult<Json<ApiResponse<()>>> {
    require_admin(&current_user)?;

    if ids.is_empty() {
        return Err(AppError::BadRequest("No IDs provided".to_string()));
    }

    let requested = ids.len();
    let result = activity_log::Entity::delete_many()
        .filter(activity_log::Column::Id.is_in(ids))
        .exec(&*state.db)
        .await?;

    // The pruning itself stays on record
    service::log_operation(
        &current_user.username,
        OpType::DeleteActivity,
        format!("{} of {} requested entries", result.rows_affected, requested),
        OpResult::Success,
    );

    Ok(Json(ApiResponse::success_msg(format!(
        "Deleted {} log entries",
        result.rows_affected
    ))))
}

/// Service for adding activity log entries
pub mod service {
    use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    use crate::entity::activity_log::{self, OpResult, OpType};

    /// Log entry to be added
    #[derive(Debug, Clone)]
    pub struct LogEntry {
        pub username: String,
        pub op_type: OpType,
        pub op_desc: String,
        pub result: OpResult,
        pub ip: Option<String>,
    }

    /// Global log channel
    static LOG_TX: std::sync::OnceLock<mpsc::Sender<LogEntry>> = std::sync::OnceLock::new();

    /// Initialize the activity log writer. Calling it more than once is a no-op.
    pub fn init(db: Arc<DatabaseConnection>) {
        if LOG_TX.get().is_some() {
            tracing::debug!("Activity log service already initialized, skipping");
            return;
        }

        let (tx, mut rx) = mpsc::channel::<LogEntry>(200);
        if LOG_TX.set(tx).is_err() {
            tracing::debug!("Activity log service initialized by another thread");
            return;
        }

        tokio::spawn(async move {
            while let Some(entry) = rx.recv().await {
                let log = activity_log::ActiveModel {
                    op_time: Set(chrono::Utc::now().timestamp()),
                    username: Set(entry.username),
                    op_type: Set(entry.op_type.label().to_string()),
                    op_desc: Set(entry.op_desc),
                    result: Set(entry.result.label().to_string()),
                    ip: Set(entry.ip),
                    ..Default::default()
                };

                if let Err(e) = log.insert(&*db).await {
                    tracing::error!("Failed to write activity log: {}", e);
                }
            }
        });
    }

    /// Queue an entry; dropped with a warning when the writer is behind or absent
    pub fn add_log(entry: LogEntry) {
        if let Some(tx) = LOG_TX.get() {
            if tx.try_send(entry).is_err() {
                tracing::warn!("Activity log channel is full, entry dropped");
            }
        } else {
            tracing::debug!(
                "Activity log service not initialized, dropped: {} - {}",
                entry.op_type.label(),
                entry.op_desc
            );
        }
    }

    pub fn log_operation(username: &str, op_type: OpType, op_desc: impl Into<String>, result: OpResult) {
        add_log(LogEntry {
            username: username.to_string(),
            op_type,
            op_desc: op_desc.into(),
            result,
            ip: None,
        });
    }

    pub fn log_operation_from(
        username: &str,
        op_type: OpType,
        op_desc: impl Into<String>,
        result: OpResult,
        ip: Option<String>,
    ) {
        add_log(LogEntry {
            username: username.to_string(),
            op_type,
            op_desc: op_desc.into(),
            result,
            ip,
        });
    }

}
