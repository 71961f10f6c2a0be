//! Companion pass registrar
//!
//! A companion pass holds a fixed number of guest slots. Registration claims a slot with
//! a single conditional increment
//! (`slots_registered = slots_registered + 1 WHERE slots_registered < total_slots`)
//! and inserts the profile in the same transaction. Cancellation revokes the profile
//! with a compare-and-set and releases the slot in the same transaction, so the counter
//! always equals the number of active profiles.

use crate::{
    core::audit,
    entities::{
        CompanionPass, CompanionProfile, CompanionStatus, companion_pass, companion_profile,
    },
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*, sea_query::Expr};
use tracing::{info, instrument, warn};

/// Contact details of a guest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanionDetails {
    /// Full name
    pub name: String,
    /// Contact email
    pub email: String,
    /// Contact phone
    pub phone: Option<String>,
}

impl CompanionDetails {
    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::malformed("companion name is required"));
        }
        let email = self.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(Error::malformed("companion email is invalid"));
        }
        Ok(())
    }
}

/// Registers a guest on a pass owned by `membership_id`.
///
/// # Errors
/// * `NotFound` - The pass does not exist or belongs to another membership
/// * `CapacityExceeded` - Every slot is taken
/// * `MalformedInput` - Contact details are incomplete
#[instrument(skip(db, details))]
pub async fn register_companion(
    db: &DatabaseConnection,
    pass_id: i64,
    membership_id: i64,
    details: CompanionDetails,
) -> Result<companion_profile::Model> {
    details.validate()?;

    let txn = db.begin().await?;
    let claimed = CompanionPass::update_many()
        .col_expr(
            companion_pass::Column::SlotsRegistered,
            Expr::col(companion_pass::Column::SlotsRegistered).add(1),
        )
        .filter(companion_pass::Column::Id.eq(pass_id))
        .filter(companion_pass::Column::MembershipId.eq(membership_id))
        .filter(
            Expr::col(companion_pass::Column::SlotsRegistered)
                .lt(Expr::col(companion_pass::Column::TotalSlots)),
        )
        .exec(&txn)
        .await?;

    if claimed.rows_affected == 0 {
        txn.rollback().await?;
        let pass = CompanionPass::find_by_id(pass_id)
            .one(db)
            .await?
            .filter(|pass| pass.membership_id == membership_id)
            .ok_or_else(|| Error::not_found("companion pass", pass_id))?;
        warn!(pass_id, total_slots = pass.total_slots, "Companion pass is full");
        return Err(Error::CapacityExceeded {
            pass_id,
            total_slots: pass.total_slots,
        });
    }

    let profile = companion_profile::ActiveModel {
        pass_id: Set(pass_id),
        primary_member_id: Set(membership_id),
        name: Set(details.name.trim().to_string()),
        email: Set(details.email.trim().to_string()),
        phone: Set(details
            .phone
            .map(|phone| phone.trim().to_string())
            .filter(|phone| !phone.is_empty())),
        status: Set(CompanionStatus::Active),
        created_at: Set(Utc::now()),
        revoked_at: Set(None),
        ..Default::default()
    }
    .insert(&txn)
    .await?;
    audit::record(
        &txn,
        audit::entity::COMPANION,
        profile.id,
        "registered",
        Some(format!("pass {pass_id}")),
    )
    .await?;
    txn.commit().await?;

    info!(pass_id, companion_id = profile.id, "Companion registered");
    Ok(profile)
}

/// Revokes a companion and releases its slot.
///
/// Returns `false` when the companion was already revoked; nothing changes in that case.
#[instrument(skip(db))]
pub async fn cancel_companion(db: &DatabaseConnection, companion_id: i64) -> Result<bool> {
    let txn = db.begin().await?;
    let profile = CompanionProfile::find_by_id(companion_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("companion", companion_id))?;

    let revoked = CompanionProfile::update_many()
        .set(companion_profile::ActiveModel {
            status: Set(CompanionStatus::Revoked),
            revoked_at: Set(Some(Utc::now())),
            ..Default::default()
        })
        .filter(companion_profile::Column::Id.eq(companion_id))
        .filter(companion_profile::Column::Status.eq(CompanionStatus::Active))
        .exec(&txn)
        .await?;
    if revoked.rows_affected == 0 {
        txn.commit().await?;
        info!(companion_id, "Companion already revoked");
        return Ok(false);
    }

    CompanionPass::update_many()
        .col_expr(
            companion_pass::Column::SlotsRegistered,
            Expr::col(companion_pass::Column::SlotsRegistered).sub(1),
        )
        .filter(companion_pass::Column::Id.eq(profile.pass_id))
        .filter(companion_pass::Column::SlotsRegistered.gt(0))
        .exec(&txn)
        .await?;
    audit::record(&txn, audit::entity::COMPANION, companion_id, "revoked", None).await?;
    txn.commit().await?;

    info!(companion_id, pass_id = profile.pass_id, "Companion cancelled");
    Ok(true)
}

/// Retrieves a companion pass by id.
pub async fn get_pass(db: &DatabaseConnection, pass_id: i64) -> Result<companion_pass::Model> {
    CompanionPass::find_by_id(pass_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("companion pass", pass_id))
}

/// Lists the active companions on a pass in registration order.
pub async fn companions_for_pass(
    db: &DatabaseConnection,
    pass_id: i64,
) -> Result<Vec<companion_profile::Model>> {
    get_pass(db, pass_id).await?;
    CompanionProfile::find()
        .filter(companion_profile::Column::PassId.eq(pass_id))
        .filter(companion_profile::Column::Status.eq(CompanionStatus::Active))
        .order_by_asc(companion_profile::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}
