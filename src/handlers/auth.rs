//! Authentication handlers
//!
//! Login, explicit refresh, logout, current account and password change

use axum::{extract::State, http::HeaderMap, response::Json, Extension};
use axum_extra::extract::cookie::CookieJar;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::Deserialize;
use validator::Validate;

use crate::entity::account::{self, AccountResponse};
use crate::entity::refresh_token::RevokeReason;
use crate::entity::activity_log::{OpResult, OpType};
use crate::entity::now_ts;
use crate::error::{AppError, AppResult};
use crate::extract::ValidatedJson;
use crate::handlers::activity::service::{log_operation, log_operation_from};
use crate::handlers::{client_ip, hash_password, verify_password};
use crate::middleware::auth::cookie_value;
use crate::middleware::CurrentUser;
use crate::routes::ApiResponse;
use crate::session::{self, Rotation};
use crate::state::AppState;
use crate::token::{hash_refresh, TokenKind, TokenPair, REFRESH_COOKIE};

/// Login request body
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "is required"))]
    pub username: String,
    #[validate(length(min = 1, message = "is required"))]
    pub password: String,
}

/// Password change request body
#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "is required"))]
    pub old_password: String,
    #[validate(length(min = 8, max = 72, message = "must be 8 to 72 characters"))]
    pub new_password: String,
}

fn with_pair(state: &AppState, jar: CookieJar, pair: TokenPair) -> CookieJar {
    jar.add(state.tokens.access_cookie(pair.access))
        .add(state.tokens.refresh_cookie(pair.refresh))
}

fn cleared(state: &AppState, mut jar: CookieJar) -> CookieJar {
    for cookie in state.tokens.clear_cookies() {
        jar = jar.add(cookie);
    }
    jar
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> AppResult<(CookieJar, Json<ApiResponse<AccountResponse>>)> {
    let ip = client_ip(&headers);

    let found = account::Entity::find()
        .filter(account::Column::Username.eq(&req.username))
        .one(&*state.db)
        .await?;

    let Some(found) = found else {
        tracing::warn!("Login failed: unknown account {}", req.username);
        log_operation_from(&req.username, OpType::Login, "unknown account", OpResult::Failed, ip);
        return Err(AppError::InvalidCredentials);
    };

    if !verify_password(req.password, found.password.clone()).await {
        tracing::warn!("Login failed: wrong password for {}", req.username);
        log_operation_from(&req.username, OpType::Login, "wrong password", OpResult::Failed, ip);
        return Err(AppError::InvalidCredentials);
    }

    if !found.is_active() {
        tracing::warn!("Login failed: account disabled - {}", req.username);
        log_operation_from(&req.username, OpType::Login, "account disabled", OpResult::Failed, ip);
        return Err(AppError::Forbidden("account is disabled".to_string()));
    }

    let mut active: account::ActiveModel = found.into();
    active.last_login = Set(now_ts());
    let found = active.update(&*state.db).await?;

    let pair = session::start(&*state.db, &state.tokens, &found).await?;

    tracing::info!("Account logged in: {}", found.username);
    log_operation_from(&found.username, OpType::Login, "", OpResult::Success, ip);

    Ok((
        with_pair(&state, jar, pair),
        Json(ApiResponse::with_message("login success", found.into())),
    ))
}

/// POST /api/auth/refresh
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<ApiResponse<AccountResponse>>)> {
    let Some(token) = cookie_value(&jar, REFRESH_COOKIE) else {
        return Err(AppError::Unauthorized);
    };

    match session::rotate(&*state.db, &state.tokens, &token).await {
        Ok(Rotation::Rotated { account, pair }) => Ok((
            with_pair(&state, jar, pair),
            Json(ApiResponse::with_message("refreshed", account.into())),
        )),
        Ok(Rotation::Grace { account }) => {
            Ok((jar, Json(ApiResponse::with_message("refreshed", account.into()))))
        }
        Err(e) => {
            tracing::debug!("Refresh rejected: {}", e);
            Err(e)
        }
    }
}

/// POST /api/auth/logout
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<ApiResponse<()>>)> {
    if let Some(token) = cookie_value(&jar, REFRESH_COOKIE) {
        let owner = state
            .tokens
            .verify(&token, TokenKind::Refresh)
            .ok()
            .map(|claims| claims.username);
        // Cookies are cleared even when the row cannot be revoked
        if let Err(e) = session::revoke(&*state.db, &token).await {
            tracing::error!("Failed to revoke refresh token on logout: {}", e);
        }
        if let Some(username) = owner {
            log_operation(&username, OpType::Logout, "", OpResult::Success);
        }
    }

    Ok((cleared(&state, jar), Json(ApiResponse::success_msg("logout success"))))
}

/// GET /api/auth/me
pub async fn me(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> AppResult<Json<ApiResponse<AccountResponse>>> {
    let found = session::load_active_account(&*state.db, user.id).await?;
    Ok(Json(ApiResponse::success(found.into())))
}

/// POST /api/auth/password
pub async fn change_password(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<ChangePasswordRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    let found = session::load_active_account(&*state.db, user.id).await?;

    if !verify_password(req.old_password, found.password.clone()).await {
        log_operation(&user.username, OpType::ChangePassword, "wrong old password", OpResult::Failed);
        return Err(AppError::BadRequest("old password is incorrect".to_string()));
    }

    let hashed = hash_password(req.new_password).await?;
    let mut active: account::ActiveModel = found.into();
    active.password = Set(hashed);
    active.update(&*state.db).await?;

    // Other devices must sign in again; this session keeps its refresh token
    let keep = cookie_value(&jar, REFRESH_COOKIE).map(|t| hash_refresh(&t));
    let revoked =
        session::revoke_all_except(&*state.db, user.id, keep.as_deref(), RevokeReason::Password)
            .await?;
    tracing::info!("Password changed for {}, {} other sessions revoked", user.username, revoked);

    log_operation(&user.username, OpType::ChangePassword, "", OpResult::Success);
    Ok(Json(ApiResponse::success_msg("password changed")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::entity::refresh_token;
    use crate::permission::Role;
    use crate::token::tests::{test_account, test_config};
    use crate::token::ACCESS_COOKIE;
    use axum::{body::to_bytes, http::StatusCode, response::IntoResponse};
    use axum_extra::extract::cookie::Cookie;
    use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase, MockExecResult, Transaction};
    use std::sync::Arc;

    fn state_with(db: DatabaseConnection) -> AppState {
        let mut config = Config::default();
        config.auth = test_config();
        AppState::new(db, config)
    }

    fn account_with_password(password: &str, status: i32) -> account::Model {
        account::Model {
            password: bcrypt::hash(password, 4).unwrap(),
            status,
            ..test_account()
        }
    }

    fn login_request(password: &str) -> ValidatedJson<LoginRequest> {
        ValidatedJson(LoginRequest {
            username: "manager".to_string(),
            password: password.to_string(),
        })
    }

    fn current_user() -> CurrentUser {
        CurrentUser {
            id: 7,
            username: "manager".to_string(),
            full_name: "Morgan Manager".to_string(),
            role: Role::Manager,
        }
    }

    async fn body_of(err: AppError) -> (StatusCode, String) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let unknown = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<account::Model>::new()])
            .into_connection();
        let Err(unknown_err) = login(
            State(state_with(unknown)),
            HeaderMap::new(),
            CookieJar::new(),
            login_request("whatever-pass"),
        )
        .await
        else {
            panic!("unknown account must not log in");
        };

        let wrong = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![account_with_password("right-pass", 1)]])
            .into_connection();
        let Err(wrong_err) = login(
            State(state_with(wrong)),
            HeaderMap::new(),
            CookieJar::new(),
            login_request("wrong-pass"),
        )
        .await
        else {
            panic!("wrong password must not log in");
        };

        let (unknown_status, unknown_body) = body_of(unknown_err).await;
        let (wrong_status, wrong_body) = body_of(wrong_err).await;
        assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
        assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
        assert_eq!(unknown_body, wrong_body);
        assert!(unknown_body.contains("username or password error"), "{}", unknown_body);
    }

    #[tokio::test]
    async fn test_disabled_account_is_forbidden() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![account_with_password("right-pass", 2)]])
            .into_connection();

        let Err(err) = login(
            State(state_with(db)),
            HeaderMap::new(),
            CookieJar::new(),
            login_request("right-pass"),
        )
        .await
        else {
            panic!("disabled account must not log in");
        };
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_logout_clears_cookies_without_session() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();

        let (jar, Json(response)) = logout(State(state_with(db)), CookieJar::new())
            .await
            .unwrap();
        assert!(response.success);
        for name in [ACCESS_COOKIE, REFRESH_COOKIE] {
            let cookie = jar.get(name).unwrap();
            assert_eq!(cookie.value(), "");
            assert_eq!(cookie.max_age(), Some(time::Duration::ZERO));
        }
    }

    #[tokio::test]
    async fn test_logout_succeeds_when_revoke_fails() {
        // No exec result queued, so the revoke update errors
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let jar = CookieJar::new().add(Cookie::new(REFRESH_COOKIE, "stale-token"));

        let (jar, _) = logout(State(state_with(db)), jar).await.unwrap();
        assert_eq!(jar.get(REFRESH_COOKIE).unwrap().value(), "");
    }

    #[tokio::test]
    async fn test_refresh_without_cookie_is_unauthorized() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();

        let Err(err) = refresh(State(state_with(db)), CookieJar::new()).await else {
            panic!("refresh without a cookie must fail");
        };
        assert!(matches!(err, AppError::Unauthorized));
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_refresh_with_logged_out_token_is_unauthorized() {
        let tokens = crate::token::TokenService::new(&test_config());
        let pair = tokens.issue_pair(&test_account()).unwrap();
        let now = now_ts();

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![refresh_token::Model {
                id: 1,
                account_id: 7,
                token_hash: pair.refresh_hash.clone(),
                expires_at: now + 3600,
                revoked_at: Some(now - 1),
                revoke_reason: Some(RevokeReason::Logout.as_str().to_string()),
                created_at: now - 60,
            }]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .into_connection();
        let jar = CookieJar::new().add(Cookie::new(REFRESH_COOKIE, pair.refresh));

        let Err(err) = refresh(State(state_with(db)), jar).await else {
            panic!("logged-out token must not refresh");
        };
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_change_password_rejects_wrong_old_password() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![account_with_password("old-pass-1", 1)]])
            .into_connection();

        let req = ChangePasswordRequest {
            old_password: "not-the-old-one".to_string(),
            new_password: "new-pass-123".to_string(),
        };
        let err = change_password(
            State(state_with(db)),
            Extension(current_user()),
            CookieJar::new(),
            ValidatedJson(req),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_change_password_revokes_other_sessions() {
        let old = account_with_password("old-pass-1", 1);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![old.clone()]])
            .append_query_results([vec![old]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 2,
            }])
            .into_connection();
        let state = state_with(db);
        let jar = CookieJar::new().add(Cookie::new(REFRESH_COOKIE, "current-refresh"));

        let req = ChangePasswordRequest {
            old_password: "old-pass-1".to_string(),
            new_password: "new-pass-123".to_string(),
        };
        let Json(response) = change_password(
            State(state.clone()),
            Extension(current_user()),
            jar,
            ValidatedJson(req),
        )
        .await
        .unwrap();
        assert!(response.success);

        let log = Arc::try_unwrap(state.db)
            .unwrap_or_else(|_| panic!("connection still shared"))
            .into_transaction_log();
        let revoke = log
            .iter()
            .flat_map(Transaction::statements)
            .find(|s| s.sql.starts_with(r#"UPDATE "ept_refresh_token""#))
            .expect("sessions revoked");
        assert!(revoke.sql.contains(r#""revoke_reason""#), "{}", revoke.sql);
        assert!(revoke.sql.contains(r#""token_hash" <>"#), "{}", revoke.sql);
        let values = format!("{:?}", revoke.values);
        assert!(values.contains(&hash_refresh("current-refresh")), "{}", values);
        assert!(values.contains("password"), "{}", values);
    }
}
