//! Payment application entity - Idempotency ledger for payment confirmations.
//!
//! One row per external payment reference. The primary key makes a second
//! application of the same reference impossible.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Payment application database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payment_applications")]
pub struct Model {
    /// External payment reference (idempotency key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub payment_reference: String,
    /// Order the payment was applied to
    pub order_id: String,
    /// Number of tickets activated by this payment
    pub ticket_count: i32,
    /// When the payment was first applied
    pub applied_at: DateTimeUtc,
}

/// No relations
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
