//! Ledger audit trail
//!
//! Every state transition appends a `ledger_events` row on the same connection or
//! transaction as the change itself, so the trail commits or rolls back with it.

use crate::{
    entities::{LedgerEvent, ledger_event},
    errors::Result,
};
use chrono::Utc;
use sea_orm::{QueryOrder, Set, prelude::*};

/// Kinds of records that appear in the trail
pub mod entity {
    /// Ticket rows
    pub const TICKET: &str = "ticket";
    /// Payment idempotency rows
    pub const PAYMENT: &str = "payment";
    /// Membership rows
    pub const MEMBERSHIP: &str = "membership";
    /// Credit rows
    pub const CREDIT: &str = "credit";
    /// Voucher rows
    pub const VOUCHER: &str = "voucher";
    /// Companion pass rows
    pub const COMPANION_PASS: &str = "companion_pass";
    /// Companion profile rows
    pub const COMPANION: &str = "companion";
}

/// Appends one event to the trail.
pub async fn record<C>(
    db: &C,
    entity_type: &str,
    entity_id: impl ToString + Send,
    action: &str,
    detail: Option<String>,
) -> Result<ledger_event::Model>
where
    C: ConnectionTrait,
{
    let event = ledger_event::ActiveModel {
        entity_type: Set(entity_type.to_string()),
        entity_id: Set(entity_id.to_string()),
        action: Set(action.to_string()),
        detail: Set(detail),
        created_at: Set(Utc::now()),
        ..Default::default()
    };
    Ok(event.insert(db).await?)
}

/// Returns the trail for one record, oldest first.
pub async fn history<C>(
    db: &C,
    entity_type: &str,
    entity_id: impl ToString + Send,
) -> Result<Vec<ledger_event::Model>>
where
    C: ConnectionTrait,
{
    LedgerEvent::find()
        .filter(ledger_event::Column::EntityType.eq(entity_type))
        .filter(ledger_event::Column::EntityId.eq(entity_id.to_string()))
        .order_by_asc(ledger_event::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::setup_test_db;

    #[tokio::test]
    async fn test_record_and_read_history() -> Result<()> {
        let db = setup_test_db().await?;

        record(&db, entity::TICKET, 7, "activated", Some("pay_1".into())).await?;
        record(&db, entity::TICKET, 7, "checked_in", None).await?;
        record(&db, entity::TICKET, 8, "activated", None).await?;

        let events = history(&db, entity::TICKET, 7).await?;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action, "activated");
        assert_eq!(events[0].detail.as_deref(), Some("pay_1"));
        assert_eq!(events[1].action, "checked_in");

        assert!(history(&db, entity::CREDIT, 7).await?.is_empty());
        Ok(())
    }
}
