use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::config::Config;
use crate::token::TokenService;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: Arc<DatabaseConnection>,
    /// Application configuration
    pub config: Arc<Config>,
    /// Access / refresh token signer
    pub tokens: TokenService,
}

impl AppState {
    /// Create new application state
    pub fn new(db: impl Into<Arc<DatabaseConnection>>, config: Config) -> Self {
        let tokens = TokenService::new(&config.auth);
        Self {
            db: db.into(),
            config: Arc::new(config),
            tokens,
        }
    }
}
