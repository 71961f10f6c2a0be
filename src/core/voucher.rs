//! Voucher business logic
//!
//! Vouchers follow the credit lifecycle but are redeemed by entering their code.
//! Codes are `VIP` followed by eight characters from an alphabet without look-alike
//! glyphs (no `0`/`O`, `1`/`I`).

use crate::{
    core::{
        audit,
        credit::{add_months, benefit_state, unexpired},
    },
    entities::{Membership, Voucher, voucher},
    errors::{Error, Result},
};
use chrono::Utc;
use rand::Rng;
use sea_orm::{QueryOrder, Set, SqlErr, TransactionTrait, prelude::*, sea_query::OnConflict};
use tracing::{info, instrument, warn};

const CODE_PREFIX: &str = "VIP";
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_LENGTH: usize = 8;
const MAX_CODE_ATTEMPTS: usize = 10;

/// Generates a random voucher code. Uniqueness is enforced by the store.
#[must_use]
pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect();
    format!("{CODE_PREFIX}{suffix}")
}

/// Per-state voucher counts of a membership
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoucherStats {
    /// Every voucher the membership earned
    pub total: usize,
    /// Redeemable now
    pub active: usize,
    /// Redeemed against an order
    pub redeemed: usize,
    /// Past their validity window
    pub expired: usize,
}

/// Inserts `grant` under a freshly drawn code, retrying when the code is taken.
///
/// Each attempt runs in its own nested transaction, so a collision never aborts the
/// caller's transaction. A grant whose `(membership_id, allocation_period,
/// allocation_slot)` already exists is skipped and yields `None`.
pub(crate) async fn insert_with_fresh_code<C, F>(
    conn: &C,
    grant: voucher::ActiveModel,
    mut next_code: F,
) -> Result<Option<voucher::Model>>
where
    C: TransactionTrait,
    F: FnMut() -> String,
{
    for attempt in 1..=MAX_CODE_ATTEMPTS {
        let code = next_code();
        let mut candidate = grant.clone();
        candidate.code = Set(code.clone());

        let attempt_txn = conn.begin().await?;
        let inserted = Voucher::insert(candidate)
            .on_conflict(
                OnConflict::columns([
                    voucher::Column::MembershipId,
                    voucher::Column::AllocationPeriod,
                    voucher::Column::AllocationSlot,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(&attempt_txn)
            .await;

        match inserted {
            Ok(0) => {
                attempt_txn.commit().await?;
                return Ok(None);
            }
            Ok(_) => {
                let stored = Voucher::find()
                    .filter(voucher::Column::Code.eq(code.as_str()))
                    .one(&attempt_txn)
                    .await?;
                attempt_txn.commit().await?;
                return Ok(stored);
            }
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                attempt_txn.rollback().await?;
                warn!(attempt, "Voucher code collision, retrying");
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(Error::Database(DbErr::Custom(format!(
        "no unique voucher code after {MAX_CODE_ATTEMPTS} attempts"
    ))))
}

/// Issues a voucher to a user, retrying when a generated code is already taken.
///
/// # Arguments
/// * `db` - Database connection
/// * `user_id` - User the voucher is bound to
/// * `membership_id` - Membership that earned it, if any
/// * `expires_in_months` - Validity window; `None` never expires
#[instrument(skip(db))]
pub async fn issue_voucher(
    db: &DatabaseConnection,
    user_id: &str,
    membership_id: Option<i64>,
    expires_in_months: Option<u32>,
) -> Result<voucher::Model> {
    if user_id.trim().is_empty() {
        return Err(Error::malformed("user id is required"));
    }
    if let Some(membership_id) = membership_id {
        Membership::find_by_id(membership_id)
            .one(db)
            .await?
            .ok_or_else(|| Error::not_found("membership", membership_id))?;
    }

    let now = Utc::now();
    let expires_at = expires_in_months
        .map(|months| add_months(now, months))
        .transpose()?;

    let txn = db.begin().await?;
    let grant = voucher::ActiveModel {
        user_id: Set(user_id.to_string()),
        membership_id: Set(membership_id),
        granted_at: Set(now),
        expires_at: Set(expires_at),
        used: Set(false),
        used_at: Set(None),
        expired_at: Set(None),
        redeemed_order_id: Set(None),
        allocation_period: Set(None),
        allocation_slot: Set(None),
        ..Default::default()
    };
    let issued = insert_with_fresh_code(&txn, grant, generate_code)
        .await?
        .ok_or(Error::Database(DbErr::RecordNotInserted))?;
    audit::record(&txn, audit::entity::VOUCHER, issued.id, "issued", None).await?;
    txn.commit().await?;

    info!(voucher_id = issued.id, user_id, "Voucher issued");
    Ok(issued)
}

/// Redeems a voucher code against an order.
///
/// The code is matched case-insensitively. Succeeds once; redeeming a used or expired
/// voucher is `InvalidState`.
#[instrument(skip(db))]
pub async fn redeem_voucher(
    db: &DatabaseConnection,
    code: &str,
    order_id: &str,
) -> Result<voucher::Model> {
    let code = code.trim().to_uppercase();
    if code.is_empty() || order_id.trim().is_empty() {
        return Err(Error::malformed("voucher code and order id are required"));
    }

    let txn = db.begin().await?;
    let current = Voucher::find()
        .filter(voucher::Column::Code.eq(code.as_str()))
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("voucher", &code))?;

    let now = Utc::now();
    let result = Voucher::update_many()
        .set(voucher::ActiveModel {
            used: Set(true),
            used_at: Set(Some(now)),
            redeemed_order_id: Set(Some(order_id.to_string())),
            ..Default::default()
        })
        .filter(voucher::Column::Id.eq(current.id))
        .filter(voucher::Column::Used.eq(false))
        .filter(voucher::Column::ExpiredAt.is_null())
        .filter(unexpired(voucher::Column::ExpiresAt, now))
        .exec(&txn)
        .await?;

    if result.rows_affected == 0 {
        txn.rollback().await?;
        let latest = Voucher::find_by_id(current.id)
            .one(db)
            .await?
            .ok_or_else(|| Error::not_found("voucher", &code))?;
        return Err(Error::InvalidState {
            entity: "voucher",
            id: code,
            status: benefit_state(latest.used, latest.expired_at, latest.expires_at, now)
                .to_string(),
            action: "redeem",
        });
    }

    audit::record(
        &txn,
        audit::entity::VOUCHER,
        current.id,
        "redeemed",
        Some(order_id.to_string()),
    )
    .await?;
    let redeemed = Voucher::find_by_id(current.id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("voucher", &code))?;
    txn.commit().await?;

    info!(voucher_id = redeemed.id, order_id, "Voucher redeemed");
    Ok(redeemed)
}

/// Lists a user's redeemable vouchers, oldest grant first.
pub async fn active_vouchers(
    db: &DatabaseConnection,
    user_id: &str,
) -> Result<Vec<voucher::Model>> {
    Voucher::find()
        .filter(voucher::Column::UserId.eq(user_id))
        .filter(voucher::Column::Used.eq(false))
        .filter(voucher::Column::ExpiredAt.is_null())
        .filter(unexpired(voucher::Column::ExpiresAt, Utc::now()))
        .order_by_asc(voucher::Column::GrantedAt)
        .order_by_asc(voucher::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Counts a membership's vouchers by state.
pub async fn voucher_stats(db: &DatabaseConnection, membership_id: i64) -> Result<VoucherStats> {
    Membership::find_by_id(membership_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("membership", membership_id))?;

    let now = Utc::now();
    let vouchers = Voucher::find()
        .filter(voucher::Column::MembershipId.eq(membership_id))
        .all(db)
        .await?;

    Ok(vouchers.iter().fold(VoucherStats::default(), |mut stats, v| {
        stats.total += 1;
        match benefit_state(v.used, v.expired_at, v.expires_at, now) {
            "redeemed" => stats.redeemed += 1,
            "expired" => stats.expired += 1,
            _ => stats.active += 1,
        }
        stats
    }))
}
