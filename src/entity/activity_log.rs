//! Activity log entity - audit trail of account operations
//!
//! Table: ept_activity_log

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Operation type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpType {
    Login,
    Logout,
    ChangePassword,
    CreateAccount,
    UpdateAccount,
    CreateEmployee,
    UpdateEmployee,
    DeleteEmployee,
    RestoreEmployee,
    AssignDepartment,
    UpdateDepartmentHistory,
    DeleteDepartmentHistory,
    CreateReview,
    UpdateReview,
    DeleteReview,
    CreateGoal,
    UpdateGoal,
    DeleteGoal,
    DeleteActivity,
    Setup,
}

impl OpType {
    /// Label stored in `op_type`
    pub fn label(&self) -> &'static str {
        match self {
            OpType::Login => "login",
            OpType::Logout => "logout",
            OpType::ChangePassword => "change password",
            OpType::CreateAccount => "create account",
            OpType::UpdateAccount => "update account",
            OpType::CreateEmployee => "create employee",
            OpType::UpdateEmployee => "update employee",
            OpType::DeleteEmployee => "delete employee",
            OpType::RestoreEmployee => "restore employee",
            OpType::AssignDepartment => "assign department",
            OpType::UpdateDepartmentHistory => "update department history",
            OpType::DeleteDepartmentHistory => "delete department history",
            OpType::CreateReview => "create review",
            OpType::UpdateReview => "update review",
            OpType::DeleteReview => "delete review",
            OpType::CreateGoal => "create goal",
            OpType::UpdateGoal => "update goal",
            OpType::DeleteGoal => "delete goal",
            OpType::DeleteActivity => "delete activity",
            OpType::Setup => "setup",
        }
    }
}

/// Operation result
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpResult {
    Success,
    Failed,
}

impl OpResult {
    pub fn label(&self) -> &'static str {
        match self {
            OpResult::Success => "success",
            OpResult::Failed => "failed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ept_activity_log")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Unix timestamp
    pub op_time: i64,

    #[sea_orm(column_type = "String(Some(32))")]
    pub username: String,

    #[sea_orm(column_type = "String(Some(32))")]
    pub op_type: String,

    #[sea_orm(column_type = "Text")]
    pub op_desc: String,

    #[sea_orm(column_type = "String(Some(16))")]
    pub result: String,

    #[sea_orm(column_type = "String(Some(64))", nullable)]
    pub ip: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
