//! Entity module - SeaORM entity definitions
//!
//! One module per table

pub mod account;
pub mod activity_log;
pub mod department_history;
pub mod employee;
pub mod goal;
pub mod performance_review;
pub mod refresh_token;

/// Current Unix timestamp in seconds
pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}
