//! Perftrack - employee performance tracker
//!
//! HTTP API over employee records, department history, performance reviews
//! and goals, with cookie-carried JWT sessions for admin and manager accounts.

pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod permission;
pub mod routes;
pub mod session;
pub mod state;
pub mod stats;
pub mod token;

// Re-export commonly used types
pub use config::Config;
pub use state::AppState;
