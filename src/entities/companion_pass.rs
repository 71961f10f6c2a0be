//! Companion pass entity - A membership's allotment of guest slots.
//!
//! `slots_registered` never exceeds `total_slots` and always equals the number of
//! active companion profiles under the pass.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Companion pass database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "companion_passes")]
pub struct Model {
    /// Unique identifier for the pass
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning membership
    pub membership_id: i64,
    /// Allotted guest slots
    pub total_slots: i32,
    /// Slots currently taken by active companions
    pub slots_registered: i32,
    /// When the pass was created
    pub created_at: DateTimeUtc,
}

impl Model {
    /// Slots still available on this pass
    #[must_use]
    pub const fn slots_remaining(&self) -> i32 {
        self.total_slots.saturating_sub(self.slots_registered)
    }
}

/// Defines relationships between `CompanionPass` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each pass belongs to one membership
    #[sea_orm(
        belongs_to = "super::membership::Entity",
        from = "Column::MembershipId",
        to = "super::membership::Column::Id"
    )]
    Membership,
    /// One pass has many companion profiles
    #[sea_orm(has_many = "super::companion_profile::Entity")]
    Profiles,
}

impl Related<super::membership::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Membership.def()
    }
}

impl Related<super::companion_profile::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Profiles.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
