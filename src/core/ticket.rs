//! Ticket lifecycle business logic
//!
//! Owns every ticket state transition: issuance as `pending`, activation on payment
//! confirmation, check-in at the venue gate, and the void/refund side exits.
//!
//! All transitions are compare-and-set updates keyed on the current status
//! (`UPDATE tickets SET status = ? WHERE id = ? AND status = ?`), so two concurrent
//! callers can never both move the same ticket. Payment confirmation is made
//! idempotent by the `payment_applications` table: the first insert of a payment
//! reference does the work, every later call replays the stored result.

use crate::{
    core::{
        audit,
        qr::{QrCodec, TokenError},
    },
    entities::{PaymentApplication, Ticket, TicketStatus, payment_application, ticket},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{
    QueryOrder, QuerySelect, Set, TransactionTrait,
    prelude::*,
    sea_query::{Expr, OnConflict},
};
use tracing::{info, instrument, warn};

/// Result of applying a payment confirmation to an order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentConfirmation {
    /// Order the payment belongs to
    pub order_id: String,
    /// Idempotency key of the payment
    pub payment_reference: String,
    /// Tickets activated by this payment, in id order
    pub tickets: Vec<ticket::Model>,
    /// True when the reference had already been applied and nothing changed
    pub replayed: bool,
}

/// Why a scan did not admit the holder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckInRejection {
    /// Token decoded but no such ticket exists
    NotFound,
    /// Ticket was already checked in
    AlreadyUsed {
        /// First successful check-in
        checked_in_at: Option<DateTime<Utc>>,
    },
    /// Ticket exists but payment has not been confirmed
    NotYetActive,
    /// Ticket was voided or refunded
    Cancelled {
        /// Terminal status of the ticket
        status: TicketStatus,
    },
    /// Scanned string is not a valid ticket token
    MalformedToken,
}

impl CheckInRejection {
    /// Stable machine-readable reason code
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::AlreadyUsed { .. } => "already_used",
            Self::NotYetActive => "not_yet_active",
            Self::Cancelled { .. } => "cancelled",
            Self::MalformedToken => "malformed_token",
        }
    }

    /// Message for the scanner display. Never reveals token structure.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound => "ticket not found".to_string(),
            Self::AlreadyUsed {
                checked_in_at: Some(at),
            } => format!("already used at check-in ({})", at.format("%Y-%m-%d %H:%M UTC")),
            Self::AlreadyUsed { checked_in_at: None } => "already used at check-in".to_string(),
            Self::NotYetActive => "ticket is not active yet".to_string(),
            Self::Cancelled { status } => format!("ticket has been {status}"),
            Self::MalformedToken => "invalid ticket code".to_string(),
        }
    }
}

/// Outcome of a check-in scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckInOutcome {
    /// Holder admitted; the ticket is now `used`
    Admitted(ticket::Model),
    /// Holder not admitted
    Rejected(CheckInRejection),
}

impl CheckInOutcome {
    /// True if the scan admitted the holder
    #[must_use]
    pub const fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted(_))
    }
}

/// Ticket counts for a door report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// All tickets
    pub total: u64,
    /// Checked in
    pub used: u64,
    /// Paid, not yet scanned
    pub active: u64,
    /// Awaiting payment
    pub pending: u64,
    /// Voided or refunded
    pub cancelled: u64,
    /// `used / total` in basis points
    pub scan_rate_bps: u64,
}

/// Creates `quantity` pending tickets for an order.
#[instrument(skip(db))]
pub async fn issue_tickets(
    db: &DatabaseConnection,
    order_id: &str,
    ticket_type_id: &str,
    quantity: u32,
) -> Result<Vec<ticket::Model>> {
    if order_id.trim().is_empty() || ticket_type_id.trim().is_empty() {
        return Err(Error::malformed("order and ticket type are required"));
    }
    if quantity == 0 {
        return Err(Error::malformed("quantity must be at least 1"));
    }

    let txn = db.begin().await?;
    let now = Utc::now();
    let mut tickets = Vec::with_capacity(quantity as usize);
    for _ in 0..quantity {
        let model = ticket::ActiveModel {
            order_id: Set(order_id.to_string()),
            ticket_type_id: Set(ticket_type_id.to_string()),
            status: Set(TicketStatus::Pending),
            qr_token: Set(None),
            payment_reference: Set(None),
            checked_in_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        audit::record(&txn, audit::entity::TICKET, model.id, "issued", Some(order_id.to_string()))
            .await?;
        tickets.push(model);
    }
    txn.commit().await?;

    info!(order_id, count = tickets.len(), "Issued pending tickets");
    Ok(tickets)
}

/// Applies a confirmed payment to an order.
///
/// Every `pending` ticket of the order becomes `active` and receives a QR token. The
/// payment reference is recorded in the same transaction; calling again with the same
/// reference returns the tickets activated the first time and changes nothing. An order
/// without pending tickets is a successful no-op.
#[instrument(skip(db, codec))]
pub async fn confirm_payment(
    db: &DatabaseConnection,
    codec: &QrCodec,
    order_id: &str,
    payment_reference: &str,
) -> Result<PaymentConfirmation> {
    if order_id.trim().is_empty() || payment_reference.trim().is_empty() {
        return Err(Error::malformed("order id and payment reference are required"));
    }

    let txn = db.begin().await?;
    let now = Utc::now();

    let claim = payment_application::ActiveModel {
        payment_reference: Set(payment_reference.to_string()),
        order_id: Set(order_id.to_string()),
        ticket_count: Set(0),
        applied_at: Set(now),
    };
    let inserted = PaymentApplication::insert(claim)
        .on_conflict(
            OnConflict::column(payment_application::Column::PaymentReference)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(&txn)
        .await?;

    if inserted == 0 {
        let applied = PaymentApplication::find_by_id(payment_reference.to_string())
            .one(&txn)
            .await?
            .ok_or_else(|| Error::not_found("payment", payment_reference))?;
        if applied.order_id != order_id {
            return Err(Error::malformed(format!(
                "payment reference {payment_reference} belongs to another order"
            )));
        }
        let tickets = tickets_for_payment(&txn, payment_reference).await?;
        txn.commit().await?;
        info!(order_id, payment_reference, "Payment already applied, replaying result");
        return Ok(PaymentConfirmation {
            order_id: order_id.to_string(),
            payment_reference: payment_reference.to_string(),
            tickets,
            replayed: true,
        });
    }

    let pending = Ticket::find()
        .filter(ticket::Column::OrderId.eq(order_id))
        .filter(ticket::Column::Status.eq(TicketStatus::Pending))
        .order_by_asc(ticket::Column::Id)
        .all(&txn)
        .await?;

    let mut activated = 0i32;
    for candidate in pending {
        let token = codec.issue(candidate.id, now);
        let result = Ticket::update_many()
            .set(ticket::ActiveModel {
                status: Set(TicketStatus::Active),
                qr_token: Set(Some(token)),
                payment_reference: Set(Some(payment_reference.to_string())),
                updated_at: Set(now),
                ..Default::default()
            })
            .filter(ticket::Column::Id.eq(candidate.id))
            .filter(ticket::Column::Status.eq(TicketStatus::Pending))
            .exec(&txn)
            .await?;
        if result.rows_affected == 1 {
            activated += 1;
            audit::record(
                &txn,
                audit::entity::TICKET,
                candidate.id,
                "activated",
                Some(payment_reference.to_string()),
            )
            .await?;
        }
    }

    PaymentApplication::update_many()
        .col_expr(payment_application::Column::TicketCount, Expr::value(activated))
        .filter(payment_application::Column::PaymentReference.eq(payment_reference))
        .exec(&txn)
        .await?;
    audit::record(
        &txn,
        audit::entity::PAYMENT,
        payment_reference,
        "applied",
        Some(format!("order {order_id}, {activated} tickets")),
    )
    .await?;

    let tickets = tickets_for_payment(&txn, payment_reference).await?;
    txn.commit().await?;

    info!(order_id, payment_reference, activated, "Payment confirmed");
    Ok(PaymentConfirmation {
        order_id: order_id.to_string(),
        payment_reference: payment_reference.to_string(),
        tickets,
        replayed: false,
    })
}

async fn tickets_for_payment<C>(db: &C, payment_reference: &str) -> Result<Vec<ticket::Model>>
where
    C: ConnectionTrait,
{
    Ticket::find()
        .filter(ticket::Column::PaymentReference.eq(payment_reference))
        .order_by_asc(ticket::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Checks in the holder of a scanned token.
///
/// The token only identifies the ticket; admissibility is decided from the ticket's
/// current row. The transition to `used` is a compare-and-set on `status = active`, so
/// of any number of simultaneous scans exactly one is admitted.
#[instrument(skip(db, codec, token))]
pub async fn check_in(
    db: &DatabaseConnection,
    codec: &QrCodec,
    token: &str,
) -> Result<CheckInOutcome> {
    let claims = match codec.decode(token) {
        Ok(claims) => claims,
        Err(e) => {
            match e {
                TokenError::BadSignature => warn!("Rejected scan with forged or foreign token"),
                TokenError::Malformed | TokenError::UnsupportedVersion(_) => {
                    warn!(error = %e, "Rejected undecodable scan");
                }
            }
            return Ok(CheckInOutcome::Rejected(CheckInRejection::MalformedToken));
        }
    };

    let Some(current) = Ticket::find_by_id(claims.ticket_id).one(db).await? else {
        warn!(ticket_id = claims.ticket_id, "Scan for unknown ticket");
        return Ok(CheckInOutcome::Rejected(CheckInRejection::NotFound));
    };

    if current.status == TicketStatus::Active
        && current.qr_token.as_deref() != Some(token.trim())
    {
        warn!(ticket_id = current.id, "Scan with superseded token");
        return Ok(CheckInOutcome::Rejected(CheckInRejection::MalformedToken));
    }
    if let Some(rejection) = rejection_for(&current) {
        warn!(ticket_id = current.id, reason = rejection.reason(), "Check-in rejected");
        return Ok(CheckInOutcome::Rejected(rejection));
    }

    let txn = db.begin().await?;
    let now = Utc::now();
    let result = Ticket::update_many()
        .set(ticket::ActiveModel {
            status: Set(TicketStatus::Used),
            checked_in_at: Set(Some(now)),
            updated_at: Set(now),
            ..Default::default()
        })
        .filter(ticket::Column::Id.eq(current.id))
        .filter(ticket::Column::Status.eq(TicketStatus::Active))
        .exec(&txn)
        .await?;

    if result.rows_affected == 0 {
        txn.rollback().await?;
        let latest = Ticket::find_by_id(current.id)
            .one(db)
            .await?
            .ok_or_else(|| Error::not_found("ticket", current.id))?;
        let rejection = rejection_for(&latest).unwrap_or(CheckInRejection::AlreadyUsed {
            checked_in_at: latest.checked_in_at,
        });
        warn!(ticket_id = current.id, reason = rejection.reason(), "Lost check-in race");
        return Ok(CheckInOutcome::Rejected(rejection));
    }

    audit::record(&txn, audit::entity::TICKET, current.id, "checked_in", None).await?;
    let admitted = Ticket::find_by_id(current.id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("ticket", current.id))?;
    txn.commit().await?;

    info!(ticket_id = admitted.id, "Ticket checked in");
    Ok(CheckInOutcome::Admitted(admitted))
}

fn rejection_for(ticket: &ticket::Model) -> Option<CheckInRejection> {
    match ticket.status {
        TicketStatus::Active => None,
        TicketStatus::Pending => Some(CheckInRejection::NotYetActive),
        TicketStatus::Used => Some(CheckInRejection::AlreadyUsed {
            checked_in_at: ticket.checked_in_at,
        }),
        status @ (TicketStatus::Void | TicketStatus::Refunded) => {
            Some(CheckInRejection::Cancelled { status })
        }
    }
}

/// Voids a ticket whose order was never paid.
pub async fn void_ticket(db: &DatabaseConnection, ticket_id: i64) -> Result<ticket::Model> {
    transition(db, ticket_id, TicketStatus::Pending, TicketStatus::Void, "void").await
}

/// Refunds a paid ticket that has not been used.
pub async fn refund_ticket(db: &DatabaseConnection, ticket_id: i64) -> Result<ticket::Model> {
    transition(db, ticket_id, TicketStatus::Active, TicketStatus::Refunded, "refund").await
}

/// Moves a ticket from `from` to `to` with a compare-and-set.
///
/// Repeating a transition that already happened returns the ticket unchanged.
#[instrument(skip(db))]
async fn transition(
    db: &DatabaseConnection,
    ticket_id: i64,
    from: TicketStatus,
    to: TicketStatus,
    action: &'static str,
) -> Result<ticket::Model> {
    let txn = db.begin().await?;
    let current = Ticket::find_by_id(ticket_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("ticket", ticket_id))?;

    if current.status == to {
        txn.commit().await?;
        return Ok(current);
    }
    if current.status != from || !from.can_transition_to(to) {
        return Err(invalid_ticket_state(ticket_id, current.status, action));
    }

    let now = Utc::now();
    let result = Ticket::update_many()
        .set(ticket::ActiveModel {
            status: Set(to),
            updated_at: Set(now),
            ..Default::default()
        })
        .filter(ticket::Column::Id.eq(ticket_id))
        .filter(ticket::Column::Status.eq(from))
        .exec(&txn)
        .await?;
    if result.rows_affected == 0 {
        txn.rollback().await?;
        let latest = get_ticket(db, ticket_id).await?;
        return Err(invalid_ticket_state(ticket_id, latest.status, action));
    }

    audit::record(&txn, audit::entity::TICKET, ticket_id, to.as_str(), None).await?;
    let updated = Ticket::find_by_id(ticket_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("ticket", ticket_id))?;
    txn.commit().await?;

    info!(ticket_id, status = %to, "Ticket transitioned");
    Ok(updated)
}

fn invalid_ticket_state(ticket_id: i64, status: TicketStatus, action: &'static str) -> Error {
    Error::InvalidState {
        entity: "ticket",
        id: ticket_id.to_string(),
        status: status.to_string(),
        action,
    }
}

/// Retrieves a ticket by id.
pub async fn get_ticket(db: &DatabaseConnection, ticket_id: i64) -> Result<ticket::Model> {
    Ticket::find_by_id(ticket_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("ticket", ticket_id))
}

/// Retrieves all tickets of an order in id order.
pub async fn tickets_for_order(
    db: &DatabaseConnection,
    order_id: &str,
) -> Result<Vec<ticket::Model>> {
    Ticket::find()
        .filter(ticket::Column::OrderId.eq(order_id))
        .order_by_asc(ticket::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Counts tickets by status, optionally for one ticket type.
pub async fn scan_stats(
    db: &DatabaseConnection,
    ticket_type_id: Option<&str>,
) -> Result<ScanStats> {
    let mut query = Ticket::find()
        .select_only()
        .column(ticket::Column::Status)
        .column_as(Expr::col(ticket::Column::Id).count(), "count")
        .group_by(ticket::Column::Status);
    if let Some(ticket_type_id) = ticket_type_id {
        query = query.filter(ticket::Column::TicketTypeId.eq(ticket_type_id));
    }
    let rows: Vec<(TicketStatus, i64)> = query.into_tuple().all(db).await?;

    let mut stats = ScanStats::default();
    for (status, count) in rows {
        let count = u64::try_from(count).unwrap_or(0);
        stats.total += count;
        match status {
            TicketStatus::Used => stats.used += count,
            TicketStatus::Active => stats.active += count,
            TicketStatus::Pending => stats.pending += count,
            TicketStatus::Void | TicketStatus::Refunded => stats.cancelled += count,
        }
    }
    if stats.total > 0 {
        stats.scan_rate_bps = stats.used * 10_000 / stats.total;
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_issue_tickets_validation() -> Result<()> {
        let db = setup_test_db().await?;
        assert!(matches!(
            issue_tickets(&db, "order_1", "ga", 0).await,
            Err(Error::MalformedInput { .. })
        ));
        assert!(matches!(
            issue_tickets(&db, " ", "ga", 1).await,
            Err(Error::MalformedInput { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_confirm_payment_activates_pending_tickets() -> Result<()> {
        let (db, codec) = setup_with_codec().await?;
        issue_tickets(&db, "order_1", "ga", 2).await?;

        let confirmation = confirm_payment(&db, &codec, "order_1", "pay_1").await?;
        assert!(!confirmation.replayed);
        assert_eq!(confirmation.tickets.len(), 2);
        for t in &confirmation.tickets {
            assert_eq!(t.status, TicketStatus::Active);
            assert!(t.qr_token.is_some());
            assert_eq!(t.payment_reference.as_deref(), Some("pay_1"));
            assert!(t.checked_in_at.is_none());
        }
        assert_ne!(
            confirmation.tickets[0].qr_token,
            confirmation.tickets[1].qr_token
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_confirm_payment_replay_returns_same_tokens() -> Result<()> {
        let (db, codec) = setup_with_codec().await?;
        issue_tickets(&db, "order_1", "ga", 2).await?;

        let first = confirm_payment(&db, &codec, "order_1", "pay_1").await?;
        for _ in 0..3 {
            let again = confirm_payment(&db, &codec, "order_1", "pay_1").await?;
            assert!(again.replayed);
            assert_eq!(again.tickets, first.tickets);
        }

        let events = audit::history(&db, audit::entity::PAYMENT, "pay_1").await?;
        assert_eq!(events.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_confirmations_apply_once() -> Result<()> {
        let (db, codec) = setup_with_codec().await?;
        issue_tickets(&db, "order_1", "ga", 3).await?;

        let (a, b) = tokio::join!(
            confirm_payment(&db, &codec, "order_1", "pay_1"),
            confirm_payment(&db, &codec, "order_1", "pay_1"),
        );
        let (a, b) = (a?, b?);
        assert_eq!(a.tickets, b.tickets);
        assert_eq!(u8::from(a.replayed) + u8::from(b.replayed), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_confirm_payment_without_pending_tickets_is_noop() -> Result<()> {
        let (db, codec) = setup_with_codec().await?;

        let confirmation = confirm_payment(&db, &codec, "empty_order", "pay_x").await?;
        assert!(!confirmation.replayed);
        assert!(confirmation.tickets.is_empty());

        let again = confirm_payment(&db, &codec, "empty_order", "pay_x").await?;
        assert!(again.replayed);
        assert!(again.tickets.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_payment_reference_bound_to_its_order() -> Result<()> {
        let (db, codec) = setup_with_codec().await?;
        issue_tickets(&db, "order_1", "ga", 1).await?;
        issue_tickets(&db, "order_2", "ga", 1).await?;

        confirm_payment(&db, &codec, "order_1", "pay_1").await?;
        let result = confirm_payment(&db, &codec, "order_2", "pay_1").await;
        assert!(matches!(result, Err(Error::MalformedInput { .. })));

        let order_2 = tickets_for_order(&db, "order_2").await?;
        assert_eq!(order_2[0].status, TicketStatus::Pending);
        Ok(())
    }

    #[tokio::test]
    async fn test_second_payment_only_touches_new_pending_tickets() -> Result<()> {
        let (db, codec) = setup_with_codec().await?;
        issue_tickets(&db, "order_1", "ga", 1).await?;
        let first = confirm_payment(&db, &codec, "order_1", "pay_1").await?;

        issue_tickets(&db, "order_1", "vip", 1).await?;
        let second = confirm_payment(&db, &codec, "order_1", "pay_2").await?;
        assert_eq!(second.tickets.len(), 1);
        assert_ne!(second.tickets[0].id, first.tickets[0].id);

        let unchanged = get_ticket(&db, first.tickets[0].id).await?;
        assert_eq!(unchanged, first.tickets[0]);
        Ok(())
    }

    #[tokio::test]
    async fn test_check_in_then_rescan() -> Result<()> {
        let (db, codec) = setup_with_codec().await?;
        let ticket = create_active_ticket(&db, &codec, "order_1").await?;
        let token = ticket.qr_token.clone().unwrap();

        let outcome = check_in(&db, &codec, &token).await?;
        let CheckInOutcome::Admitted(used) = outcome else {
            panic!("expected admission, got {outcome:?}");
        };
        assert_eq!(used.status, TicketStatus::Used);
        assert!(used.checked_in_at.is_some());

        let rescan = check_in(&db, &codec, &token).await?;
        let CheckInOutcome::Rejected(rejection) = rescan else {
            panic!("rescan must be rejected");
        };
        assert_eq!(rejection.reason(), "already_used");
        assert_eq!(
            rejection,
            CheckInRejection::AlreadyUsed {
                checked_in_at: used.checked_in_at
            }
        );
        assert!(rejection.user_message().starts_with("already used at check-in"));
        Ok(())
    }

    #[tokio::test]
    async fn test_simultaneous_scans_admit_exactly_one() -> Result<()> {
        init_test_tracing();
        let (db, codec) = setup_with_codec().await?;
        let ticket = create_active_ticket(&db, &codec, "order_1").await?;
        let token = ticket.qr_token.clone().unwrap();

        let (a, b) = tokio::join!(
            check_in(&db, &codec, &token),
            check_in(&db, &codec, &token),
        );
        let outcomes = [a?, b?];
        let admitted = outcomes.iter().filter(|o| o.is_admitted()).count();
        assert_eq!(admitted, 1);
        assert!(outcomes.iter().any(|o| matches!(
            o,
            CheckInOutcome::Rejected(CheckInRejection::AlreadyUsed { .. })
        )));
        Ok(())
    }

    #[tokio::test]
    async fn test_check_in_rejections() -> Result<()> {
        let (db, codec) = setup_with_codec().await?;

        let garbage = check_in(&db, &codec, "not-a-token").await?;
        assert_eq!(
            garbage,
            CheckInOutcome::Rejected(CheckInRejection::MalformedToken)
        );
        if let CheckInOutcome::Rejected(r) = garbage {
            assert_eq!(r.user_message(), "invalid ticket code");
        }

        let unknown = codec.issue(999, Utc::now());
        assert_eq!(
            check_in(&db, &codec, &unknown).await?,
            CheckInOutcome::Rejected(CheckInRejection::NotFound)
        );

        let pending = issue_tickets(&db, "order_p", "ga", 1).await?;
        let forged_for_pending = codec.issue(pending[0].id, Utc::now());
        assert_eq!(
            check_in(&db, &codec, &forged_for_pending).await?,
            CheckInOutcome::Rejected(CheckInRejection::NotYetActive)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_check_in_requires_the_issued_token() -> Result<()> {
        let (db, codec) = setup_with_codec().await?;
        let ticket = create_active_ticket(&db, &codec, "order_1").await?;

        let other = codec.issue(ticket.id, Utc::now() + chrono::Duration::seconds(5));
        assert_eq!(
            check_in(&db, &codec, &other).await?,
            CheckInOutcome::Rejected(CheckInRejection::MalformedToken)
        );
        assert_eq!(get_ticket(&db, ticket.id).await?.status, TicketStatus::Active);
        Ok(())
    }

    #[tokio::test]
    async fn test_refunded_ticket_cannot_check_in() -> Result<()> {
        let (db, codec) = setup_with_codec().await?;
        let ticket = create_active_ticket(&db, &codec, "order_1").await?;
        refund_ticket(&db, ticket.id).await?;

        let outcome = check_in(&db, &codec, ticket.qr_token.as_deref().unwrap()).await?;
        assert_eq!(
            outcome,
            CheckInOutcome::Rejected(CheckInRejection::Cancelled {
                status: TicketStatus::Refunded
            })
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_void_and_refund_rules() -> Result<()> {
        let (db, codec) = setup_with_codec().await?;
        let pending = issue_tickets(&db, "order_v", "ga", 1).await?.remove(0);
        let active = create_active_ticket(&db, &codec, "order_a").await?;

        assert!(matches!(
            refund_ticket(&db, pending.id).await,
            Err(Error::InvalidState { .. })
        ));
        assert!(matches!(
            void_ticket(&db, active.id).await,
            Err(Error::InvalidState { .. })
        ));

        let voided = void_ticket(&db, pending.id).await?;
        assert_eq!(voided.status, TicketStatus::Void);
        assert_eq!(void_ticket(&db, pending.id).await?.status, TicketStatus::Void);

        let refunded = refund_ticket(&db, active.id).await?;
        assert_eq!(refunded.status, TicketStatus::Refunded);

        assert!(matches!(
            void_ticket(&db, 4242).await,
            Err(Error::NotFound { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_used_is_absorbing() -> Result<()> {
        let (db, codec) = setup_with_codec().await?;
        let ticket = create_active_ticket(&db, &codec, "order_1").await?;
        let token = ticket.qr_token.clone().unwrap();
        check_in(&db, &codec, &token).await?;
        let used = get_ticket(&db, ticket.id).await?;

        let void_err = void_ticket(&db, ticket.id).await.unwrap_err();
        assert_eq!(void_err.user_message(), "already used at check-in");
        assert!(matches!(
            refund_ticket(&db, ticket.id).await,
            Err(Error::InvalidState { .. })
        ));
        assert!(!check_in(&db, &codec, &token).await?.is_admitted());

        assert_eq!(get_ticket(&db, ticket.id).await?, used);
        Ok(())
    }

    #[tokio::test]
    async fn test_void_pending_ticket_is_skipped_by_payment() -> Result<()> {
        let (db, codec) = setup_with_codec().await?;
        let tickets = issue_tickets(&db, "order_1", "ga", 2).await?;
        void_ticket(&db, tickets[0].id).await?;

        let confirmation = confirm_payment(&db, &codec, "order_1", "pay_1").await?;
        assert_eq!(confirmation.tickets.len(), 1);
        assert_eq!(confirmation.tickets[0].id, tickets[1].id);
        assert_eq!(get_ticket(&db, tickets[0].id).await?.status, TicketStatus::Void);
        Ok(())
    }

    #[tokio::test]
    async fn test_scan_stats() -> Result<()> {
        let (db, codec) = setup_with_codec().await?;
        issue_tickets(&db, "order_1", "ga", 3).await?;
        let confirmation = confirm_payment(&db, &codec, "order_1", "pay_1").await?;
        issue_tickets(&db, "order_2", "ga", 1).await?;
        issue_tickets(&db, "order_3", "vip", 1).await?;

        let token = confirmation.tickets[0].qr_token.clone().unwrap();
        check_in(&db, &codec, &token).await?;
        refund_ticket(&db, confirmation.tickets[1].id).await?;

        let ga = scan_stats(&db, Some("ga")).await?;
        assert_eq!(ga.total, 4);
        assert_eq!(ga.used, 1);
        assert_eq!(ga.active, 1);
        assert_eq!(ga.pending, 1);
        assert_eq!(ga.cancelled, 1);
        assert_eq!(ga.scan_rate_bps, 2_500);

        let all = scan_stats(&db, None).await?;
        assert_eq!(all.total, 5);
        Ok(())
    }

    #[tokio::test]
    async fn test_ticket_history_is_recorded() -> Result<()> {
        let (db, codec) = setup_with_codec().await?;
        let ticket = create_active_ticket(&db, &codec, "order_1").await?;
        check_in(&db, &codec, ticket.qr_token.as_deref().unwrap()).await?;

        let actions: Vec<String> = audit::history(&db, audit::entity::TICKET, ticket.id)
            .await?
            .into_iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(actions, vec!["issued", "activated", "checked_in"]);
        Ok(())
    }
}
