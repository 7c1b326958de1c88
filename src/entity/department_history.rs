//! Department history entity - time-ranged department/designation/salary rows
//!
//! Table: ept_department_history. At most one row per employee has `is_active = true`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ept_department_history")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub employee_id: i64,

    #[sea_orm(column_type = "String(Some(64))")]
    pub department: String,

    #[sea_orm(column_type = "String(Some(64))")]
    pub designation: String,

    pub salary: f64,

    pub start_date: Date,

    /// Open-ended while the assignment is current
    pub end_date: Option<Date>,

    pub is_active: bool,

    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Current assignment embedded in employee responses
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Assignment {
    pub history_id: i64,
    pub department: String,
    pub designation: String,
    pub salary: f64,
    pub start_date: Date,
}

impl From<Model> for Assignment {
    fn from(model: Model) -> Self {
        Self {
            history_id: model.id,
            department: model.department,
            designation: model.designation,
            salary: model.salary,
            start_date: model.start_date,
        }
    }
}
