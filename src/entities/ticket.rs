//! Ticket entity - One admission unit belonging to an order.
//!
//! A ticket moves `pending -> active -> used`, with `pending -> void` and
//! `active -> refunded` as terminal side exits. `checked_in_at` is set exactly when
//! the status is `used`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a ticket
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// Order placed, payment not yet confirmed
    #[sea_orm(string_value = "pending")]
    Pending,
    /// Paid and carrying a QR token
    #[sea_orm(string_value = "active")]
    Active,
    /// Checked in at the venue; absorbing
    #[sea_orm(string_value = "used")]
    Used,
    /// Cancelled before payment
    #[sea_orm(string_value = "void")]
    Void,
    /// Refunded after payment
    #[sea_orm(string_value = "refunded")]
    Refunded,
}

impl TicketStatus {
    /// Whether the state machine allows moving from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Active | Self::Void) | (Self::Active, Self::Used | Self::Refunded)
        )
    }

    /// Database string for this status
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Used => "used",
            Self::Void => "void",
            Self::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ticket database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tickets")]
pub struct Model {
    /// Unique identifier for the ticket
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Order this ticket belongs to
    pub order_id: String,
    /// Ticket type (admission class for an event)
    pub ticket_type_id: String,
    /// Current lifecycle state
    pub status: TicketStatus,
    /// Signed QR token, set when the ticket becomes active
    pub qr_token: Option<String>,
    /// Payment reference that activated this ticket
    pub payment_reference: Option<String>,
    /// Set exactly once, at the first successful scan
    pub checked_in_at: Option<DateTimeUtc>,
    /// When the ticket was created
    pub created_at: DateTimeUtc,
    /// When the ticket was last modified
    pub updated_at: DateTimeUtc,
}

/// Orders live in another system, so tickets declare no relations
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::Iterable;

    #[test]
    fn test_allowed_transitions() {
        assert!(TicketStatus::Pending.can_transition_to(TicketStatus::Active));
        assert!(TicketStatus::Pending.can_transition_to(TicketStatus::Void));
        assert!(TicketStatus::Active.can_transition_to(TicketStatus::Used));
        assert!(TicketStatus::Active.can_transition_to(TicketStatus::Refunded));
    }

    #[test]
    fn test_no_transition_back_to_pending_or_out_of_used() {
        for status in TicketStatus::iter() {
            assert!(!status.can_transition_to(TicketStatus::Pending));
            assert!(!TicketStatus::Used.can_transition_to(status));
        }
        assert!(!TicketStatus::Pending.can_transition_to(TicketStatus::Refunded));
        assert!(!TicketStatus::Active.can_transition_to(TicketStatus::Void));
    }
}
