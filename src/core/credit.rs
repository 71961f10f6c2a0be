//! Ticket-credit business logic
//!
//! Handles the quarterly allocation run, manual grants, redemption, and balances.
//!
//! Allocation is idempotent per membership per period: every scheduled grant carries an
//! allocation period key (`2026-Q3`) and `(membership_id, allocation_period)` is unique,
//! so inserting with `ON CONFLICT DO NOTHING` grants at most once no matter how often
//! the job runs. Each membership is allocated in its own transaction and a failure is
//! counted, logged, and skipped.

use crate::{
    config::tiers::{TierConfig, find_tier},
    core::{
        audit,
        voucher::{generate_code, insert_with_fresh_code},
    },
    entities::{Credit, CreditSource, Membership, MembershipStatus, credit, membership, voucher},
    errors::{Error, Result},
};
use chrono::{DateTime, Datelike, Duration, Months, Utc};
use sea_orm::{Condition, QueryOrder, Set, TransactionTrait, prelude::*, sea_query::OnConflict};
use tracing::{error, info, instrument, warn};

/// Window reported as "expiring soon" by [`credit_balance`]
pub const EXPIRING_SOON_DAYS: i64 = 30;

/// Outcome of one allocation run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocationReport {
    /// Period key the run allocated for
    pub period: String,
    /// Memberships that received a new credit grant
    pub granted: usize,
    /// Memberships already allocated for the period
    pub already_allocated: usize,
    /// Memberships whose tier carries no quarterly credits
    pub not_entitled: usize,
    /// VIP vouchers issued during the run
    pub vouchers_granted: usize,
    /// Memberships whose allocation failed
    pub failed: usize,
}

/// Available credits of a membership
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreditBalance {
    /// Sum of unused, unexpired credit amounts
    pub available: i64,
    /// Part of `available` expiring within [`EXPIRING_SOON_DAYS`]
    pub expiring_soon: i64,
}

/// Credits consumed by one order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditRedemption {
    /// Order charged
    pub order_id: String,
    /// Credits consumed
    pub quantity: i64,
    /// Rows marked used for this order, in consumption order
    pub consumed: Vec<credit::Model>,
    /// Redeemable balance left afterwards
    pub remaining: i64,
}

const MAX_REDEEM_ATTEMPTS: usize = 3;

/// Returns the allocation period key (`YYYY-Qn`) containing `at`.
#[must_use]
pub fn allocation_period(at: DateTime<Utc>) -> String {
    format!("{}-Q{}", at.year(), at.month0() / 3 + 1)
}

pub(crate) fn add_months(at: DateTime<Utc>, months: u32) -> Result<DateTime<Utc>> {
    at.checked_add_months(Months::new(months))
        .ok_or_else(|| Error::malformed(format!("expiry {months} months out of range")))
}

/// Matches rows whose `expires_at` column is unset or later than `now`.
pub(crate) fn unexpired<C: ColumnTrait>(column: C, now: DateTime<Utc>) -> Condition {
    Condition::any().add(column.is_null()).add(column.gt(now))
}

/// Lifecycle label for a credit or voucher row.
pub(crate) fn benefit_state(
    used: bool,
    expired_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> &'static str {
    if used {
        "redeemed"
    } else if expired_at.is_some() || expires_at.is_some_and(|at| at <= now) {
        "expired"
    } else {
        "available"
    }
}

/// Credit outcome of a single membership in an allocation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum CreditGrant {
    Granted,
    AlreadyAllocated,
    #[default]
    NotEntitled,
}

/// What a single membership received in an allocation run
#[derive(Debug, Clone, Copy, Default)]
struct MembershipAllocation {
    credit: CreditGrant,
    vouchers_granted: usize,
}

/// Grants the current quarter's benefits to every active membership.
///
/// Only escalates when the membership list cannot be read. Per-membership failures,
/// including memberships whose tier is not configured, are logged and counted.
///
/// # Arguments
/// * `db` - Database connection
/// * `tiers` - Configured tiers
/// * `now` - Run time; selects the period and anchors expiry dates
#[instrument(skip(db, tiers))]
pub async fn allocate_quarterly_credits(
    db: &DatabaseConnection,
    tiers: &[TierConfig],
    now: DateTime<Utc>,
) -> Result<AllocationReport> {
    let period = allocation_period(now);
    let memberships = Membership::find()
        .filter(membership::Column::Status.eq(MembershipStatus::Active))
        .order_by_asc(membership::Column::Id)
        .all(db)
        .await?;

    let mut report = AllocationReport {
        period: period.clone(),
        ..Default::default()
    };

    for member in memberships {
        let Some(tier) = find_tier(tiers, &member.tier) else {
            error!(
                membership_id = member.id,
                tier = %member.tier,
                "Membership has unknown tier, skipping"
            );
            report.failed += 1;
            continue;
        };

        match allocate_for_membership(db, tier, &member, &period, now).await {
            Ok(outcome) => {
                match outcome.credit {
                    CreditGrant::Granted => report.granted += 1,
                    CreditGrant::AlreadyAllocated => report.already_allocated += 1,
                    CreditGrant::NotEntitled => report.not_entitled += 1,
                }
                report.vouchers_granted += outcome.vouchers_granted;
            }
            Err(e) => {
                error!(membership_id = member.id, error = %e, "Allocation failed, skipping");
                report.failed += 1;
            }
        }
    }

    info!(
        period = %report.period,
        granted = report.granted,
        already_allocated = report.already_allocated,
        not_entitled = report.not_entitled,
        vouchers = report.vouchers_granted,
        failed = report.failed,
        "Quarterly allocation finished"
    );
    Ok(report)
}

async fn allocate_for_membership(
    db: &DatabaseConnection,
    tier: &TierConfig,
    member: &membership::Model,
    period: &str,
    now: DateTime<Utc>,
) -> Result<MembershipAllocation> {
    let expires_at = add_months(now, tier.credit_expiration_months)?;
    let txn = db.begin().await?;
    let mut outcome = MembershipAllocation::default();

    if tier.quarterly_credits > 0 {
        let grant = credit::ActiveModel {
            membership_id: Set(member.id),
            amount: Set(tier.quarterly_credits),
            granted_at: Set(now),
            expires_at: Set(Some(expires_at)),
            used: Set(false),
            used_at: Set(None),
            redeemed_order_id: Set(None),
            expired_at: Set(None),
            source: Set(CreditSource::QuarterlyAllocation),
            allocation_period: Set(Some(period.to_string())),
            ..Default::default()
        };
        let inserted = Credit::insert(grant)
            .on_conflict(
                OnConflict::columns([
                    credit::Column::MembershipId,
                    credit::Column::AllocationPeriod,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(&txn)
            .await?;
        if inserted == 0 {
            outcome.credit = CreditGrant::AlreadyAllocated;
        } else {
            outcome.credit = CreditGrant::Granted;
            audit::record(
                &txn,
                audit::entity::MEMBERSHIP,
                member.id,
                "credits_allocated",
                Some(format!("{} credits for {period}", tier.quarterly_credits)),
            )
            .await?;
        }
    }

    for slot in 0..tier.vip_vouchers_per_quarter {
        let grant = voucher::ActiveModel {
            user_id: Set(member.user_id.clone()),
            membership_id: Set(Some(member.id)),
            granted_at: Set(now),
            expires_at: Set(Some(expires_at)),
            used: Set(false),
            used_at: Set(None),
            expired_at: Set(None),
            redeemed_order_id: Set(None),
            allocation_period: Set(Some(period.to_string())),
            allocation_slot: Set(Some(slot)),
            ..Default::default()
        };
        if insert_with_fresh_code(&txn, grant, generate_code).await?.is_some() {
            outcome.vouchers_granted += 1;
        }
    }
    if outcome.vouchers_granted > 0 {
        audit::record(
            &txn,
            audit::entity::MEMBERSHIP,
            member.id,
            "vouchers_allocated",
            Some(format!("{} vouchers for {period}", outcome.vouchers_granted)),
        )
        .await?;
    }

    txn.commit().await?;
    Ok(outcome)
}

/// Grants credits outside the quarterly run (promotions, adjustments).
#[instrument(skip(db))]
pub async fn grant_credits(
    db: &DatabaseConnection,
    membership_id: i64,
    amount: i64,
    source: CreditSource,
    expires_in_months: Option<u32>,
) -> Result<credit::Model> {
    if amount <= 0 {
        return Err(Error::malformed("credit amount must be positive"));
    }

    let txn = db.begin().await?;
    Membership::find_by_id(membership_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("membership", membership_id))?;

    let now = Utc::now();
    let expires_at = expires_in_months
        .map(|months| add_months(now, months))
        .transpose()?;
    let granted = credit::ActiveModel {
        membership_id: Set(membership_id),
        amount: Set(amount),
        granted_at: Set(now),
        expires_at: Set(expires_at),
        used: Set(false),
        used_at: Set(None),
        redeemed_order_id: Set(None),
        expired_at: Set(None),
        source: Set(source),
        allocation_period: Set(None),
        ..Default::default()
    }
    .insert(&txn)
    .await?;
    audit::record(
        &txn,
        audit::entity::CREDIT,
        granted.id,
        "granted",
        Some(format!("{amount} ({source})")),
    )
    .await?;
    txn.commit().await?;

    info!(credit_id = granted.id, membership_id, amount, "Credits granted");
    Ok(granted)
}

/// Marks a credit as redeemed.
///
/// Compare-and-set on `used = false` for an unexpired credit; a second redemption or a
/// redemption of an expired credit is `InvalidState`.
#[instrument(skip(db))]
pub async fn redeem_credit(db: &DatabaseConnection, credit_id: i64) -> Result<credit::Model> {
    let txn = db.begin().await?;
    let now = Utc::now();
    let result = Credit::update_many()
        .set(credit::ActiveModel {
            used: Set(true),
            used_at: Set(Some(now)),
            ..Default::default()
        })
        .filter(credit::Column::Id.eq(credit_id))
        .filter(credit::Column::Used.eq(false))
        .filter(credit::Column::ExpiredAt.is_null())
        .filter(unexpired(credit::Column::ExpiresAt, now))
        .exec(&txn)
        .await?;

    if result.rows_affected == 0 {
        txn.rollback().await?;
        let current = Credit::find_by_id(credit_id)
            .one(db)
            .await?
            .ok_or_else(|| Error::not_found("credit", credit_id))?;
        warn!(credit_id, "Credit not redeemable");
        return Err(Error::InvalidState {
            entity: "credit",
            id: credit_id.to_string(),
            status: benefit_state(current.used, current.expired_at, current.expires_at, now)
                .to_string(),
            action: "redeem",
        });
    }

    audit::record(&txn, audit::entity::CREDIT, credit_id, "redeemed", None).await?;
    let redeemed = Credit::find_by_id(credit_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("credit", credit_id))?;
    txn.commit().await?;

    info!(credit_id, "Credit redeemed");
    Ok(redeemed)
}

/// Redeems `quantity` credits of a membership against an order.
///
/// Consumes the earliest-expiring redeemable rows first. A row larger than what is still
/// needed is split: the consumed part is marked used and the rest stays redeemable as a
/// new row with the same expiry. Every row is claimed with a compare-and-set inside one
/// transaction; if another redemption or the expiration sweep touches a row first, the
/// whole attempt is rolled back and retried against fresh rows.
///
/// # Errors
/// * `InsufficientCredits` - The redeemable balance is below `quantity`
/// * `NotFound` - The membership does not exist
/// * `MalformedInput` - `quantity` is not positive or the order id is empty
#[instrument(skip(db))]
pub async fn redeem_credits(
    db: &DatabaseConnection,
    membership_id: i64,
    quantity: i64,
    order_id: &str,
) -> Result<CreditRedemption> {
    if quantity <= 0 {
        return Err(Error::malformed("credit quantity must be positive"));
    }
    if order_id.trim().is_empty() {
        return Err(Error::malformed("order id is required"));
    }

    for attempt in 1..=MAX_REDEEM_ATTEMPTS {
        if let Some(redemption) = try_redeem_credits(db, membership_id, quantity, order_id).await?
        {
            info!(
                membership_id,
                quantity,
                order_id,
                remaining = redemption.remaining,
                "Credits redeemed"
            );
            return Ok(redemption);
        }
        warn!(attempt, membership_id, "Credit rows changed during redemption, retrying");
    }

    Err(Error::Database(DbErr::Custom(format!(
        "credit redemption for membership {membership_id} kept conflicting"
    ))))
}

async fn try_redeem_credits(
    db: &DatabaseConnection,
    membership_id: i64,
    quantity: i64,
    order_id: &str,
) -> Result<Option<CreditRedemption>> {
    let txn = db.begin().await?;
    Membership::find_by_id(membership_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("membership", membership_id))?;

    let now = Utc::now();
    let mut available = Credit::find()
        .filter(credit::Column::MembershipId.eq(membership_id))
        .filter(credit::Column::Used.eq(false))
        .filter(credit::Column::ExpiredAt.is_null())
        .filter(unexpired(credit::Column::ExpiresAt, now))
        .all(&txn)
        .await?;
    available.sort_by_key(|c| (c.expires_at.is_none(), c.expires_at, c.id));

    let balance: i64 = available.iter().map(|c| c.amount).sum();
    if balance < quantity {
        txn.rollback().await?;
        warn!(membership_id, balance, quantity, "Insufficient credits");
        return Err(Error::InsufficientCredits {
            membership_id,
            requested: quantity,
            available: balance,
        });
    }

    let mut outstanding = quantity;
    let mut consumed_ids = Vec::new();
    for row in available {
        if outstanding == 0 {
            break;
        }
        let take = row.amount.min(outstanding);
        let claimed = Credit::update_many()
            .set(credit::ActiveModel {
                amount: Set(take),
                used: Set(true),
                used_at: Set(Some(now)),
                redeemed_order_id: Set(Some(order_id.to_string())),
                ..Default::default()
            })
            .filter(credit::Column::Id.eq(row.id))
            .filter(credit::Column::Amount.eq(row.amount))
            .filter(credit::Column::Used.eq(false))
            .filter(credit::Column::ExpiredAt.is_null())
            .filter(unexpired(credit::Column::ExpiresAt, now))
            .exec(&txn)
            .await?;
        if claimed.rows_affected == 0 {
            txn.rollback().await?;
            return Ok(None);
        }

        if take < row.amount {
            credit::ActiveModel {
                membership_id: Set(membership_id),
                amount: Set(row.amount - take),
                granted_at: Set(row.granted_at),
                expires_at: Set(row.expires_at),
                used: Set(false),
                used_at: Set(None),
                redeemed_order_id: Set(None),
                expired_at: Set(None),
                source: Set(row.source),
                allocation_period: Set(None),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
        }
        audit::record(
            &txn,
            audit::entity::CREDIT,
            row.id,
            "redeemed",
            Some(format!("{take} for order {order_id}")),
        )
        .await?;

        consumed_ids.push(row.id);
        outstanding -= take;
    }

    let mut consumed = Credit::find()
        .filter(credit::Column::Id.is_in(consumed_ids.clone()))
        .all(&txn)
        .await?;
    consumed.sort_by_key(|c| consumed_ids.iter().position(|id| *id == c.id));
    txn.commit().await?;

    Ok(Some(CreditRedemption {
        order_id: order_id.to_string(),
        quantity,
        consumed,
        remaining: balance - quantity,
    }))
}

/// Whether a membership can cover `required` credits right now.
pub async fn has_credits(
    db: &DatabaseConnection,
    membership_id: i64,
    required: i64,
) -> Result<bool> {
    Ok(credit_balance(db, membership_id).await?.available >= required)
}

/// Sums a membership's redeemable credits.
pub async fn credit_balance(db: &DatabaseConnection, membership_id: i64) -> Result<CreditBalance> {
    Membership::find_by_id(membership_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("membership", membership_id))?;

    let now = Utc::now();
    let soon = now + Duration::days(EXPIRING_SOON_DAYS);
    let available = Credit::find()
        .filter(credit::Column::MembershipId.eq(membership_id))
        .filter(credit::Column::Used.eq(false))
        .filter(credit::Column::ExpiredAt.is_null())
        .filter(unexpired(credit::Column::ExpiresAt, now))
        .all(db)
        .await?;

    Ok(available
        .iter()
        .fold(CreditBalance::default(), |mut balance, c| {
            balance.available += c.amount;
            if c.expires_at.is_some_and(|at| at <= soon) {
                balance.expiring_soon += c.amount;
            }
            balance
        }))
}

/// Lists all credits of a membership, oldest grant first.
pub async fn credits_for_membership(
    db: &DatabaseConnection,
    membership_id: i64,
) -> Result<Vec<credit::Model>> {
    Credit::find()
        .filter(credit::Column::MembershipId.eq(membership_id))
        .order_by_asc(credit::Column::GrantedAt)
        .order_by_asc(credit::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}
