//! Voucher entity - A code-redeemable promotional credit bound to a user.
//!
//! Same end-state rules as credits. Vouchers granted by the allocation job carry
//! `(membership_id, allocation_period, allocation_slot)`, which is unique.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Voucher database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "vouchers")]
pub struct Model {
    /// Unique identifier for the voucher
    #[sea_orm(primary_key)]
    pub id: i64,
    /// User the voucher is bound to
    pub user_id: String,
    /// Membership that earned the voucher, if any
    pub membership_id: Option<i64>,
    /// Unique redemption code
    #[sea_orm(unique)]
    pub code: String,
    /// When the voucher was issued
    pub granted_at: DateTimeUtc,
    /// End of the validity window; `None` never expires
    pub expires_at: Option<DateTimeUtc>,
    /// Whether the voucher has been redeemed
    pub used: bool,
    /// When the voucher was redeemed
    pub used_at: Option<DateTimeUtc>,
    /// When the expiration sweep retired the voucher
    pub expired_at: Option<DateTimeUtc>,
    /// Order the voucher was redeemed against
    pub redeemed_order_id: Option<String>,
    /// Allocation period key for scheduled grants
    pub allocation_period: Option<String>,
    /// Position of this voucher within its period's grant
    pub allocation_slot: Option<i32>,
}

/// No relations
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
