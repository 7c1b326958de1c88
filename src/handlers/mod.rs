//! Request handlers module

use axum::http::HeaderMap;

use crate::error::{AppError, AppResult};

pub mod account;
pub mod activity;
pub mod auth;
pub mod dashboard;
pub mod department_history;
pub mod employee;
pub mod goal;
pub mod performance;
pub mod setup;

/// bcrypt cost used for every stored password
#[cfg(not(test))]
pub const BCRYPT_COST: u32 = 12;
#[cfg(test)]
pub const BCRYPT_COST: u32 = 4;

/// Client address as reported by the reverse proxy, if any
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim().to_string())
        })
}

/// Reject PATCH bodies that set nothing
pub fn ensure_changes(changed: bool) -> AppResult<()> {
    if changed {
        Ok(())
    } else {
        Err(AppError::BadRequest("no fields to update".to_string()))
    }
}

/// Hash a password on the blocking pool; bcrypt is CPU-bound
pub async fn hash_password(password: String) -> AppResult<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, BCRYPT_COST))
        .await
        .map_err(|e| AppError::Internal(format!("hashing task failed: {}", e)))?
        .map_err(AppError::from)
}

/// Verify a password on the blocking pool
pub async fn verify_password(password: String, hash: String) -> bool {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash).unwrap_or(false))
        .await
        .unwrap_or(false)
}
