//! Account entity - users who can sign in (admins and managers)
//!
//! Table: ept_account

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Account status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStatus {
    Active = 1,
    Disabled = 2,
}

impl From<i32> for AccountStatus {
    fn from(value: i32) -> Self {
        match value {
            2 => AccountStatus::Disabled,
            _ => AccountStatus::Active,
        }
    }
}

impl From<AccountStatus> for i32 {
    fn from(status: AccountStatus) -> Self {
        status as i32
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ept_account")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Login name (unique)
    #[sea_orm(column_type = "String(Some(32))", unique)]
    pub username: String,

    /// bcrypt hash
    #[sea_orm(column_type = "String(Some(128))")]
    #[serde(skip_serializing)]
    pub password: String,

    #[sea_orm(column_type = "String(Some(64))")]
    pub full_name: String,

    #[sea_orm(column_type = "String(Some(128))", nullable)]
    pub email: Option<String>,

    /// "admin" or "manager"
    #[sea_orm(column_type = "String(Some(16))")]
    pub role: String,

    /// 1 = active, 2 = disabled
    pub status: i32,

    /// Unix timestamp of the last successful login (0 = never)
    pub last_login: i64,

    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_active(&self) -> bool {
        AccountStatus::from(self.status) == AccountStatus::Active
    }
}

/// Account profile returned by the API (no password)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccountResponse {
    pub id: i64,
    pub username: String,
    pub full_name: String,
    pub email: Option<String>,
    pub role: String,
    pub status: i32,
    pub last_login: i64,
    pub created_at: i64,
}

impl From<Model> for AccountResponse {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            full_name: model.full_name,
            email: model.email,
            role: model.role,
            status: model.status,
            last_login: model.last_login,
            created_at: model.created_at,
        }
    }
}
