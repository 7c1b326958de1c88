//! Authentication middleware
//!
//! Verifies the access-token cookie on API routes. When the access token is
//! expired (or already dropped by the browser) the refresh-token cookie is
//! rotated and both cookies are re-issued on the response.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};

use crate::entity::account;
use crate::error::{AppError, AppResult};
use crate::permission::Role;
use crate::session::{self, Rotation};
use crate::state::AppState;
use crate::token::{TokenError, TokenKind, TokenPair, ACCESS_COOKIE, REFRESH_COOKIE};

/// Extension to store current account in request
#[derive(Clone, Debug)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
    pub full_name: String,
    pub role: Role,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl TryFrom<account::Model> for CurrentUser {
    type Error = AppError;

    fn try_from(account: account::Model) -> Result<Self, Self::Error> {
        let role = account.role.parse::<Role>().map_err(|_| {
            AppError::Internal(format!("account {} has unknown role '{}'", account.id, account.role))
        })?;
        Ok(Self {
            id: account.id,
            username: account.username,
            full_name: account.full_name,
            role,
        })
    }
}

/// Paths that don't require authentication
fn is_public_path(path: &str) -> bool {
    // Everything outside the API is the static dashboard bundle
    if !path.starts_with("/api") {
        return true;
    }

    matches!(
        path,
        "/api/health"
            | "/api/setup/status"
            | "/api/setup/admin"
            | "/api/auth/login"
            | "/api/auth/refresh"
            | "/api/auth/logout"
    )
}

/// Read a non-empty cookie value
pub fn cookie_value(jar: &CookieJar, name: &str) -> Option<String> {
    jar.get(name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

struct Authenticated {
    user: CurrentUser,
    /// New pair to send back when the refresh token was rotated
    rotated: Option<TokenPair>,
}

async fn authenticate(state: &AppState, jar: &CookieJar) -> AppResult<Authenticated> {
    if let Some(access) = cookie_value(jar, ACCESS_COOKIE) {
        match state.tokens.verify(&access, TokenKind::Access) {
            Ok(claims) => {
                let account = session::load_active_account(&*state.db, claims.account_id()?).await?;
                return Ok(Authenticated {
                    user: CurrentUser::try_from(account)?,
                    rotated: None,
                });
            }
            // Expired: fall through to the refresh token
            Err(TokenError::Expired) => {}
            Err(e) => return Err(e.into()),
        }
    }

    let refresh = cookie_value(jar, REFRESH_COOKIE).ok_or(AppError::Unauthorized)?;
    match session::rotate(&*state.db, &state.tokens, &refresh).await? {
        Rotation::Rotated { account, pair } => {
            tracing::debug!("Rotated refresh token for {}", account.username);
            Ok(Authenticated {
                user: CurrentUser::try_from(account)?,
                rotated: Some(pair),
            })
        }
        Rotation::Grace { account } => Ok(Authenticated {
            user: CurrentUser::try_from(account)?,
            rotated: None,
        }),
    }
}

/// Append a Set-Cookie header
pub fn append_cookie(response: &mut Response, cookie: Cookie<'static>) {
    match HeaderValue::from_str(&cookie.to_string()) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => tracing::error!("Failed to encode cookie {}: {}", cookie.name(), e),
    }
}

/// Authentication middleware
pub async fn auth_layer(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if is_public_path(request.uri().path()) {
        return next.run(request).await;
    }

    match authenticate(&state, &jar).await {
        Ok(Authenticated { user, rotated }) => {
            request.extensions_mut().insert(user);
            let mut response = next.run(request).await;
            if let Some(pair) = rotated {
                append_cookie(&mut response, state.tokens.access_cookie(pair.access));
                append_cookie(&mut response, state.tokens.refresh_cookie(pair.refresh));
            }
            response
        }
        Err(err) => {
            let unauthorized = err.status() == axum::http::StatusCode::UNAUTHORIZED;
            if unauthorized {
                tracing::debug!("Rejected request to {}: {}", request.uri().path(), err);
            }
            let mut response = err.into_response();
            if unauthorized {
                for cookie in state.tokens.clear_cookies() {
                    append_cookie(&mut response, cookie);
                }
            }
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::entity::{now_ts, refresh_token};
    use crate::token::tests::{test_account, test_config};
    use crate::token::TokenService;
    use axum::{
        http::StatusCode,
        middleware,
        routing::get,
        Extension, Router,
    };
    use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase, MockExecResult};
    use tower::ServiceExt;

    fn state_with(db: DatabaseConnection) -> AppState {
        let mut config = Config::default();
        config.auth = test_config();
        AppState::new(db, config)
    }

    fn app(state: AppState) -> Router {
        Router::new()
            .route(
                "/api/whoami",
                get(|Extension(user): Extension<CurrentUser>| async move { user.username }),
            )
            .route("/api/health", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(state.clone(), auth_layer))
            .with_state(state)
    }

    fn request(cookies: Option<String>) -> Request<Body> {
        let mut builder = Request::builder().uri("/api/whoami");
        if let Some(c) = cookies {
            builder = builder.header(header::COOKIE, c);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn set_cookies(response: &Response) -> Vec<String> {
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_public_paths() {
        assert!(is_public_path("/"));
        assert!(is_public_path("/assets/app.js"));
        assert!(is_public_path("/api/auth/login"));
        assert!(is_public_path("/api/health"));
        assert!(!is_public_path("/api/employees"));
        assert!(!is_public_path("/api/auth/me"));
    }

    #[tokio::test]
    async fn test_public_path_needs_no_cookie() {
        let state = state_with(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let response = app(state)
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_cookies_unauthorized_and_cleared() {
        let state = state_with(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let response = app(state).oneshot(request(None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let cookies = set_cookies(&response);
        assert_eq!(cookies.len(), 2);
        assert!(cookies.iter().all(|c| c.contains("Max-Age=0")));
    }

    #[tokio::test]
    async fn test_valid_access_token() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![test_account()]])
            .into_connection();
        let state = state_with(db);
        let pair = state.tokens.issue_pair(&test_account()).unwrap();

        let response = app(state)
            .oneshot(request(Some(format!("{}={}", ACCESS_COOKIE, pair.access))))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(set_cookies(&response).is_empty());
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"manager");
    }

    #[tokio::test]
    async fn test_invalid_access_token_rejected() {
        let state = state_with(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let response = app(state)
            .oneshot(request(Some(format!("{}=garbage", ACCESS_COOKIE))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_disabled_account_rejected() {
        let mut disabled = test_account();
        disabled.status = 2;
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![disabled]])
            .into_connection();
        let state = state_with(db);
        let pair = state.tokens.issue_pair(&test_account()).unwrap();

        let response = app(state)
            .oneshot(request(Some(format!("{}={}", ACCESS_COOKIE, pair.access))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_expired_access_token_rotates_refresh() {
        let tokens = TokenService::new(&test_config());
        let account = test_account();
        let now = now_ts();
        let expired_access = tokens.sign(&account, TokenKind::Access, now - 3600).unwrap();
        let refresh = tokens.issue_pair(&account).unwrap();

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![refresh_token::Model {
                id: 1,
                account_id: account.id,
                token_hash: refresh.refresh_hash.clone(),
                expires_at: now + 3600,
                revoked_at: None,
                revoke_reason: None,
                created_at: now,
            }]])
            .append_query_results([vec![account.clone()]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .append_query_results([vec![refresh_token::Model {
                id: 2,
                account_id: account.id,
                token_hash: "next".to_string(),
                expires_at: now + 3600,
                revoked_at: None,
                revoke_reason: None,
                created_at: now,
            }]])
            .into_connection();
        let state = state_with(db);

        let cookie = format!(
            "{}={}; {}={}",
            ACCESS_COOKIE, expired_access, REFRESH_COOKIE, refresh.refresh
        );
        let response = app(state).oneshot(request(Some(cookie))).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let cookies = set_cookies(&response);
        assert_eq!(cookies.len(), 2);
        assert!(cookies.iter().any(|c| c.starts_with("access_token=") && !c.contains("Max-Age=0")));
        assert!(cookies
            .iter()
            .any(|c| c.starts_with("refresh_token=") && !c.contains(&refresh.refresh)));
    }
}
