//! Credit entity - A membership ticket-credit grant.
//!
//! `used` and `expired_at` are mutually exclusive end states: a used credit is never
//! expired and an expired credit is never redeemed. `used_at` is set exactly when
//! `used` is true.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Where a credit came from
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum CreditSource {
    /// Granted by the quarterly allocation job
    #[sea_orm(string_value = "quarterly_allocation")]
    QuarterlyAllocation,
    /// Promotional grant
    #[sea_orm(string_value = "promotional")]
    Promotional,
    /// Manual adjustment by an administrator
    #[sea_orm(string_value = "adjustment")]
    Adjustment,
}

impl std::fmt::Display for CreditSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::QuarterlyAllocation => write!(f, "quarterly allocation"),
            Self::Promotional => write!(f, "promotional"),
            Self::Adjustment => write!(f, "adjustment"),
        }
    }
}

/// Credit database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "credits")]
pub struct Model {
    /// Unique identifier for the credit
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning membership
    pub membership_id: i64,
    /// Number of ticket credits in this grant
    pub amount: i64,
    /// When the credit was granted
    pub granted_at: DateTimeUtc,
    /// End of the validity window; `None` never expires
    pub expires_at: Option<DateTimeUtc>,
    /// Whether the credit has been redeemed
    pub used: bool,
    /// When the credit was redeemed
    pub used_at: Option<DateTimeUtc>,
    /// Order that consumed the credit
    pub redeemed_order_id: Option<String>,
    /// When the expiration sweep retired the credit
    pub expired_at: Option<DateTimeUtc>,
    /// Origin of the grant
    pub source: CreditSource,
    /// Allocation period key (`YYYY-Qn`) for scheduled grants
    pub allocation_period: Option<String>,
}

/// Defines relationships between Credit and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each credit belongs to one membership
    #[sea_orm(
        belongs_to = "super::membership::Entity",
        from = "Column::MembershipId",
        to = "super::membership::Column::Id"
    )]
    Membership,
}

impl Related<super::membership::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Membership.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
