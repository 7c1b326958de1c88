//! Refresh token entity - issued refresh tokens, stored as SHA-256 hashes
//!
//! Table: ept_refresh_token

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ept_refresh_token")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub account_id: i64,

    /// Hex-encoded SHA-256 of the token string
    #[sea_orm(column_type = "String(Some(64))", unique)]
    pub token_hash: String,

    pub expires_at: i64,

    /// Set when the token was rotated, logged out or revoked
    pub revoked_at: Option<i64>,

    /// [`RevokeReason`] label, set together with `revoked_at`
    #[sea_orm(column_type = "String(Some(16))", nullable)]
    pub revoke_reason: Option<String>,

    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Why a refresh token stopped being usable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeReason {
    /// Exchanged for a new pair
    Rotated,
    Logout,
    /// Owner changed their password
    Password,
    /// Disabled or reset by an admin
    Admin,
    /// A revoked token was presented again
    Reuse,
}

impl RevokeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevokeReason::Rotated => "rotated",
            RevokeReason::Logout => "logout",
            RevokeReason::Password => "password",
            RevokeReason::Admin => "admin",
            RevokeReason::Reuse => "reuse",
        }
    }
}

impl Model {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    /// Only rotation leaves a token eligible for the concurrency grace window
    pub fn revoked_by_rotation(&self) -> bool {
        self.revoke_reason.as_deref() == Some(RevokeReason::Rotated.as_str())
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}
