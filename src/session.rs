//! Refresh-token persistence and rotation
//!
//! Every refresh token handed out is recorded by hash. Using one revokes it and
//! issues a new pair; presenting an already-revoked token outside the grace
//! window is treated as theft and revokes every live token of the account.

use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, Set,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::entity::refresh_token::RevokeReason;
use crate::entity::{account, now_ts, refresh_token};
use crate::error::{AppError, AppResult};
use crate::token::{hash_refresh, TokenError, TokenKind, TokenPair, TokenService};

/// A token rotated this recently is still honoured (without re-issuing) so that
/// parallel requests racing on the same expired access token don't log the user out
pub const ROTATION_GRACE_SECS: i64 = 30;

/// Revoked tokens are kept this long for reuse detection before being purged
const REVOKED_RETENTION_SECS: i64 = 24 * 60 * 60;

const PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Outcome of presenting a refresh token
#[derive(Debug)]
pub enum Rotation {
    /// Old token revoked, new pair issued and stored
    Rotated {
        account: account::Model,
        pair: TokenPair,
    },
    /// Token was rotated moments ago by a concurrent request
    Grace { account: account::Model },
}

impl Rotation {
    pub fn account(&self) -> &account::Model {
        match self {
            Rotation::Rotated { account, .. } | Rotation::Grace { account } => account,
        }
    }
}

/// Persist the refresh half of a freshly issued pair
pub async fn store_refresh<C: ConnectionTrait>(
    db: &C,
    account_id: i64,
    pair: &TokenPair,
) -> Result<(), DbErr> {
    refresh_token::ActiveModel {
        account_id: Set(account_id),
        token_hash: Set(pair.refresh_hash.clone()),
        expires_at: Set(pair.refresh_expires_at),
        revoked_at: Set(None),
        revoke_reason: Set(None),
        created_at: Set(now_ts()),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(())
}

/// Issue a pair for the account and record its refresh token
pub async fn start(
    db: &DatabaseConnection,
    tokens: &TokenService,
    account: &account::Model,
) -> AppResult<TokenPair> {
    let pair = tokens.issue_pair(account)?;
    store_refresh(db, account.id, &pair).await?;
    Ok(pair)
}

/// Load an account that may hold a session
pub async fn load_active_account(
    db: &DatabaseConnection,
    account_id: i64,
) -> AppResult<account::Model> {
    account::Entity::find_by_id(account_id)
        .one(db)
        .await?
        .filter(|a| a.is_active())
        .ok_or(AppError::Unauthorized)
}

/// Exchange a refresh token for a new pair
pub async fn rotate(
    db: &DatabaseConnection,
    tokens: &TokenService,
    refresh: &str,
) -> AppResult<Rotation> {
    let claims = tokens.verify(refresh, TokenKind::Refresh)?;
    let now = now_ts();

    let row = refresh_token::Entity::find()
        .filter(refresh_token::Column::TokenHash.eq(hash_refresh(refresh)))
        .one(db)
        .await?
        .ok_or(TokenError::Invalid("unknown refresh token".to_string()))?;

    if claims.account_id()? != row.account_id {
        return Err(TokenError::Invalid("subject mismatch".to_string()).into());
    }

    if let Some(revoked_at) = row.revoked_at {
        if row.revoked_by_rotation() && now - revoked_at <= ROTATION_GRACE_SECS {
            let account = load_active_account(db, row.account_id).await?;
            return Ok(Rotation::Grace { account });
        }
        warn!(
            "Revoked refresh token presented for account {}, revoking all sessions",
            row.account_id
        );
        revoke_all(db, row.account_id, RevokeReason::Reuse).await?;
        return Err(TokenError::Revoked.into());
    }

    if row.is_expired(now) {
        return Err(TokenError::Expired.into());
    }

    let account = load_active_account(db, row.account_id).await?;

    // Conditional update so two racing rotations cannot both win
    let revoked = refresh_token::Entity::update_many()
        .col_expr(refresh_token::Column::RevokedAt, Expr::value(now))
        .col_expr(
            refresh_token::Column::RevokeReason,
            Expr::value(RevokeReason::Rotated.as_str()),
        )
        .filter(refresh_token::Column::Id.eq(row.id))
        .filter(refresh_token::Column::RevokedAt.is_null())
        .exec(db)
        .await?;
    if revoked.rows_affected == 0 {
        return Ok(Rotation::Grace { account });
    }

    let pair = tokens.issue_pair(&account)?;
    store_refresh(db, account.id, &pair).await?;

    Ok(Rotation::Rotated { account, pair })
}

/// Revoke a single refresh token (logout). Unknown tokens are ignored.
pub async fn revoke(db: &DatabaseConnection, refresh: &str) -> Result<u64, DbErr> {
    let result = refresh_token::Entity::update_many()
        .col_expr(refresh_token::Column::RevokedAt, Expr::value(now_ts()))
        .col_expr(
            refresh_token::Column::RevokeReason,
            Expr::value(RevokeReason::Logout.as_str()),
        )
        .filter(refresh_token::Column::TokenHash.eq(hash_refresh(refresh)))
        .filter(refresh_token::Column::RevokedAt.is_null())
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

/// Revoke every live refresh token of an account
pub async fn revoke_all<C: ConnectionTrait>(
    db: &C,
    account_id: i64,
    reason: RevokeReason,
) -> Result<u64, DbErr> {
    revoke_all_except(db, account_id, None, reason).await
}

/// Revoke every live refresh token of an account except the one with `keep_hash`
pub async fn revoke_all_except<C: ConnectionTrait>(
    db: &C,
    account_id: i64,
    keep_hash: Option<&str>,
    reason: RevokeReason,
) -> Result<u64, DbErr> {
    let mut update = refresh_token::Entity::update_many()
        .col_expr(refresh_token::Column::RevokedAt, Expr::value(now_ts()))
        .col_expr(refresh_token::Column::RevokeReason, Expr::value(reason.as_str()))
        .filter(refresh_token::Column::AccountId.eq(account_id))
        .filter(refresh_token::Column::RevokedAt.is_null());
    if let Some(hash) = keep_hash {
        update = update.filter(refresh_token::Column::TokenHash.ne(hash));
    }
    Ok(update.exec(db).await?.rows_affected)
}

/// Delete expired tokens and revoked tokens past the retention window
pub async fn purge(db: &DatabaseConnection) -> Result<u64, DbErr> {
    let now = now_ts();
    let result = refresh_token::Entity::delete_many()
        .filter(
            refresh_token::Column::ExpiresAt
                .lte(now)
                .or(refresh_token::Column::RevokedAt.lte(now - REVOKED_RETENTION_SECS)),
        )
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

/// Purge stale refresh tokens now and then every hour
pub fn spawn_purge_task(db: Arc<DatabaseConnection>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            match purge(&db).await {
                Ok(0) => {}
                Ok(n) => info!("Purged {} stale refresh tokens", n),
                Err(e) => tracing::error!("Failed to purge refresh tokens: {}", e),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::tests::{test_account, test_config};
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn row(
        id: i64,
        hash: &str,
        expires_at: i64,
        revoked: Option<(i64, RevokeReason)>,
    ) -> refresh_token::Model {
        refresh_token::Model {
            id,
            account_id: 7,
            token_hash: hash.to_string(),
            expires_at,
            revoked_at: revoked.map(|(at, _)| at),
            revoke_reason: revoked.map(|(_, reason)| reason.as_str().to_string()),
            created_at: 0,
        }
    }

    #[tokio::test]
    async fn test_rotate_issues_new_pair() {
        let tokens = TokenService::new(&test_config());
        let old = tokens.issue_pair(&test_account()).unwrap();
        let now = now_ts();

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![row(1, &old.refresh_hash, now + 600, None)]])
            .append_query_results([vec![test_account()]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .append_query_results([vec![row(2, "new", now + 600, None)]])
            .into_connection();

        let rotation = rotate(&db, &tokens, &old.refresh).await.unwrap();
        match rotation {
            Rotation::Rotated { account, pair } => {
                assert_eq!(account.id, 7);
                assert_ne!(pair.refresh, old.refresh);
                assert!(tokens.verify(&pair.access, TokenKind::Access).is_ok());
            }
            other => panic!("expected rotation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_replayed_token_revokes_everything() {
        let tokens = TokenService::new(&test_config());
        let old = tokens.issue_pair(&test_account()).unwrap();
        let now = now_ts();

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![row(
                1,
                &old.refresh_hash,
                now + 600,
                Some((now - ROTATION_GRACE_SECS - 60, RevokeReason::Rotated)),
            )]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 3,
            }])
            .into_connection();

        let err = rotate(&db, &tokens, &old.refresh).await.unwrap_err();
        assert!(matches!(err, AppError::Token(TokenError::Revoked)));

        let log = db.into_transaction_log();
        assert_eq!(log.len(), 2);
    }

    #[tokio::test]
    async fn test_recently_rotated_token_gets_grace() {
        let tokens = TokenService::new(&test_config());
        let old = tokens.issue_pair(&test_account()).unwrap();
        let now = now_ts();

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![row(
                1,
                &old.refresh_hash,
                now + 600,
                Some((now - 2, RevokeReason::Rotated)),
            )]])
            .append_query_results([vec![test_account()]])
            .into_connection();

        let rotation = rotate(&db, &tokens, &old.refresh).await.unwrap();
        assert!(matches!(rotation, Rotation::Grace { .. }));
    }

    #[tokio::test]
    async fn test_logged_out_token_gets_no_grace() {
        let tokens = TokenService::new(&test_config());
        let old = tokens.issue_pair(&test_account()).unwrap();
        let now = now_ts();

        for reason in [RevokeReason::Logout, RevokeReason::Password, RevokeReason::Admin] {
            let db = MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![row(1, &old.refresh_hash, now + 600, Some((now - 2, reason)))]])
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                }])
                .into_connection();

            let err = rotate(&db, &tokens, &old.refresh).await.unwrap_err();
            assert!(matches!(err, AppError::Token(TokenError::Revoked)), "{:?}", reason);
            assert_eq!(err.status(), axum::http::StatusCode::UNAUTHORIZED);
        }
    }

    #[tokio::test]
    async fn test_logout_records_reason() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();

        assert_eq!(revoke(&db, "some-refresh").await.unwrap(), 1);

        let log = db.into_transaction_log();
        let sql = log[0].statements()[0].sql.clone();
        assert!(sql.contains(r#""revoke_reason" = $2"#), "{}", sql);
    }

    #[tokio::test]
    async fn test_unknown_refresh_token_rejected() {
        let tokens = TokenService::new(&test_config());
        let old = tokens.issue_pair(&test_account()).unwrap();

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<refresh_token::Model>::new()])
            .into_connection();

        let err = rotate(&db, &tokens, &old.refresh).await.unwrap_err();
        assert!(matches!(err, AppError::Token(TokenError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_access_token_cannot_refresh() {
        let tokens = TokenService::new(&test_config());
        let pair = tokens.issue_pair(&test_account()).unwrap();
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();

        let err = rotate(&db, &tokens, &pair.access).await.unwrap_err();
        assert!(matches!(err, AppError::Token(TokenError::WrongKind)));
    }
}
