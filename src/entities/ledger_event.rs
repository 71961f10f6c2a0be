//! Ledger event entity - Append-only audit trail of every ledger transition.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Ledger event database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ledger_events")]
pub struct Model {
    /// Unique identifier for the event
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Kind of record the event is about (`ticket`, `credit`, ...)
    pub entity_type: String,
    /// Identifier of that record
    pub entity_id: String,
    /// What happened (`activated`, `checked_in`, `expired`, ...)
    pub action: String,
    /// Free-form context for the event
    pub detail: Option<String>,
    /// When the event was recorded
    pub created_at: DateTimeUtc,
}

/// No relations
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
