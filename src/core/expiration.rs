//! Credit and voucher expiration sweep
//!
//! Retires unused credits and vouchers whose `expires_at` has passed by stamping
//! `expired_at`. Every row is retired with its own conditional update
//! (`... WHERE id = ? AND used = false AND expired_at IS NULL`), so re-running the sweep,
//! or racing it against a redemption, never counts a row twice and never expires a
//! redeemed row.

use crate::{
    core::audit,
    entities::{Credit, Voucher, credit, voucher},
    errors::Result,
};
use chrono::{DateTime, Utc};
use sea_orm::{QueryOrder, QuerySelect, Set, TransactionTrait, prelude::*};
use tracing::{error, info, instrument};

/// Outcome of an expiration run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpirationReport {
    /// Credits newly expired by this run
    pub credits_expired: u64,
    /// Vouchers newly expired by this run
    pub vouchers_expired: u64,
    /// Rows that could not be updated and were skipped
    pub failed: u64,
}

/// Expires due credits and vouchers.
///
/// # Arguments
/// * `db` - Database connection
/// * `now` - Cutoff; rows with `expires_at <= now` are due
pub async fn expire_due(db: &DatabaseConnection, now: DateTime<Utc>) -> Result<ExpirationReport> {
    let credits = expire_due_credits(db, now).await?;
    let vouchers = expire_due_vouchers(db, now).await?;
    Ok(ExpirationReport {
        credits_expired: credits.credits_expired,
        vouchers_expired: vouchers.vouchers_expired,
        failed: credits.failed + vouchers.failed,
    })
}

/// Expires unused credits whose validity has ended.
#[instrument(skip(db))]
pub async fn expire_due_credits(
    db: &DatabaseConnection,
    now: DateTime<Utc>,
) -> Result<ExpirationReport> {
    let due: Vec<i64> = Credit::find()
        .select_only()
        .column(credit::Column::Id)
        .filter(credit::Column::Used.eq(false))
        .filter(credit::Column::ExpiredAt.is_null())
        .filter(credit::Column::ExpiresAt.is_not_null())
        .filter(credit::Column::ExpiresAt.lte(now))
        .order_by_asc(credit::Column::Id)
        .into_tuple()
        .all(db)
        .await?;

    let mut report = ExpirationReport::default();
    for credit_id in due {
        match expire_credit(db, credit_id, now).await {
            Ok(true) => report.credits_expired += 1,
            Ok(false) => {}
            Err(e) => {
                error!(credit_id, error = %e, "Failed to expire credit, skipping");
                report.failed += 1;
            }
        }
    }

    info!(
        expired = report.credits_expired,
        failed = report.failed,
        "Credit expiration sweep finished"
    );
    Ok(report)
}

async fn expire_credit(
    db: &DatabaseConnection,
    credit_id: i64,
    now: DateTime<Utc>,
) -> Result<bool> {
    let txn = db.begin().await?;
    let result = Credit::update_many()
        .set(credit::ActiveModel {
            expired_at: Set(Some(now)),
            ..Default::default()
        })
        .filter(credit::Column::Id.eq(credit_id))
        .filter(credit::Column::Used.eq(false))
        .filter(credit::Column::ExpiredAt.is_null())
        .exec(&txn)
        .await?;
    if result.rows_affected == 0 {
        return Ok(false);
    }
    audit::record(&txn, audit::entity::CREDIT, credit_id, "expired", None).await?;
    txn.commit().await?;
    Ok(true)
}

/// Expires unused vouchers whose validity has ended.
#[instrument(skip(db))]
pub async fn expire_due_vouchers(
    db: &DatabaseConnection,
    now: DateTime<Utc>,
) -> Result<ExpirationReport> {
    let due: Vec<i64> = Voucher::find()
        .select_only()
        .column(voucher::Column::Id)
        .filter(voucher::Column::Used.eq(false))
        .filter(voucher::Column::ExpiredAt.is_null())
        .filter(voucher::Column::ExpiresAt.is_not_null())
        .filter(voucher::Column::ExpiresAt.lte(now))
        .order_by_asc(voucher::Column::Id)
        .into_tuple()
        .all(db)
        .await?;

    let mut report = ExpirationReport::default();
    for voucher_id in due {
        match expire_voucher(db, voucher_id, now).await {
            Ok(true) => report.vouchers_expired += 1,
            Ok(false) => {}
            Err(e) => {
                error!(voucher_id, error = %e, "Failed to expire voucher, skipping");
                report.failed += 1;
            }
        }
    }

    info!(
        expired = report.vouchers_expired,
        failed = report.failed,
        "Voucher expiration sweep finished"
    );
    Ok(report)
}

async fn expire_voucher(
    db: &DatabaseConnection,
    voucher_id: i64,
    now: DateTime<Utc>,
) -> Result<bool> {
    let txn = db.begin().await?;
    let result = Voucher::update_many()
        .set(voucher::ActiveModel {
            expired_at: Set(Some(now)),
            ..Default::default()
        })
        .filter(voucher::Column::Id.eq(voucher_id))
        .filter(voucher::Column::Used.eq(false))
        .filter(voucher::Column::ExpiredAt.is_null())
        .exec(&txn)
        .await?;
    if result.rows_affected == 0 {
        return Ok(false);
    }
    audit::record(&txn, audit::entity::VOUCHER, voucher_id, "expired", None).await?;
    txn.commit().await?;
    Ok(true)
}
