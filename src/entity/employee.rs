//! Employee entity - personal details
//!
//! Table: ept_employee. Rows are soft-deleted through `deleted_at`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ept_employee")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Company-issued identifier (unique)
    #[sea_orm(column_type = "String(Some(32))", unique)]
    pub employee_code: String,

    #[sea_orm(column_type = "String(Some(64))")]
    pub first_name: String,

    #[sea_orm(column_type = "String(Some(64))")]
    pub last_name: String,

    #[sea_orm(column_type = "String(Some(128))", unique)]
    pub email: String,

    #[sea_orm(column_type = "String(Some(32))", nullable)]
    pub phone: Option<String>,

    #[sea_orm(column_type = "String(Some(16))", nullable)]
    pub gender: Option<String>,

    pub date_of_birth: Option<Date>,

    #[sea_orm(column_type = "Text", nullable)]
    pub address: Option<String>,

    pub hire_date: Date,

    pub created_at: i64,

    pub updated_at: i64,

    pub deleted_at: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}
