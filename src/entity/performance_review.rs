//! Performance review entity - manager-authored reviews
//!
//! Table: ept_performance_review. Rows are soft-deleted through `deleted_at`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Inclusive score bounds
pub const MIN_SCORE: f64 = 1.0;
pub const MAX_SCORE: f64 = 5.0;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ept_performance_review")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub employee_id: i64,

    /// Account that authored the review
    pub reviewer_id: i64,

    /// Free-form period label, e.g. "2024-Q3"
    #[sea_orm(column_type = "String(Some(32))")]
    pub review_period: String,

    pub review_date: Date,

    pub score: f64,

    #[sea_orm(column_type = "Text", nullable)]
    pub strengths: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub improvements: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub comments: Option<String>,

    pub created_at: i64,

    pub updated_at: i64,

    #[serde(skip_serializing)]
    pub deleted_at: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
