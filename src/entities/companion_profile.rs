//! Companion profile entity - A guest registered against a companion pass.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Companion profile status
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum CompanionStatus {
    /// Holds a slot on the pass
    #[sea_orm(string_value = "active")]
    Active,
    /// Cancelled; slot released
    #[sea_orm(string_value = "revoked")]
    Revoked,
}

/// Companion profile database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "companion_profiles")]
pub struct Model {
    /// Unique identifier for the profile
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Pass this companion occupies a slot on
    pub pass_id: i64,
    /// Membership of the member who registered the companion
    pub primary_member_id: i64,
    /// Companion's full name
    pub name: String,
    /// Companion's contact email
    pub email: String,
    /// Optional contact phone
    pub phone: Option<String>,
    /// Active or revoked
    pub status: CompanionStatus,
    /// When the companion was registered
    pub created_at: DateTimeUtc,
    /// When the companion was cancelled
    pub revoked_at: Option<DateTimeUtc>,
}

/// Defines relationships between `CompanionProfile` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each profile belongs to one pass
    #[sea_orm(
        belongs_to = "super::companion_pass::Entity",
        from = "Column::PassId",
        to = "super::companion_pass::Column::Id"
    )]
    Pass,
}

impl Related<super::companion_pass::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Pass.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
