//! Membership entity - A user's subscription to a benefit tier.
//!
//! Only `active` memberships receive quarterly allocations. Credits, vouchers and
//! companion passes hang off a membership.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Membership status
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    /// Receiving benefits
    #[sea_orm(string_value = "active")]
    Active,
    /// Temporarily suspended
    #[sea_orm(string_value = "paused")]
    Paused,
    /// Cancelled by the member
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
    /// Lapsed without renewal
    #[sea_orm(string_value = "expired")]
    Expired,
}

impl std::fmt::Display for MembershipStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Paused => write!(f, "paused"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

/// Membership database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "memberships")]
pub struct Model {
    /// Unique identifier for the membership
    #[sea_orm(primary_key)]
    pub id: i64,
    /// User who holds the membership
    pub user_id: String,
    /// Tier name, resolved against the configured tiers
    pub tier: String,
    /// Current status
    pub status: MembershipStatus,
    /// When the membership was activated
    pub created_at: DateTimeUtc,
    /// When the membership was last modified
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between Membership and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One membership has many credits
    #[sea_orm(has_many = "super::credit::Entity")]
    Credits,
    /// One membership has many companion passes
    #[sea_orm(has_many = "super::companion_pass::Entity")]
    CompanionPasses,
}

impl Related<super::credit::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Credits.def()
    }
}

impl Related<super::companion_pass::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CompanionPasses.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
