//! Membership business logic
//!
//! Activates memberships against the configured tiers and manages their status. A tier
//! with companion benefits gets its companion pass at activation time.

use crate::{
    config::tiers::{TierConfig, find_tier},
    core::audit,
    entities::{CompanionPass, Membership, MembershipStatus, companion_pass, membership},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use tracing::{info, instrument};

/// Activates a membership of `tier` for a user.
///
/// # Arguments
/// * `db` - Database connection
/// * `tiers` - Configured tiers
/// * `user_id` - User taking the membership
/// * `tier` - Tier name, must exist in `tiers`
///
/// # Returns
/// The membership and, for tiers with companion slots, its pass
#[instrument(skip(db, tiers))]
pub async fn activate_membership(
    db: &DatabaseConnection,
    tiers: &[TierConfig],
    user_id: &str,
    tier: &str,
) -> Result<(membership::Model, Option<companion_pass::Model>)> {
    if user_id.trim().is_empty() {
        return Err(Error::malformed("user id is required"));
    }
    let tier_config = find_tier(tiers, tier)
        .ok_or_else(|| Error::malformed(format!("unknown membership tier: {tier}")))?;

    let txn = db.begin().await?;
    let now = Utc::now();

    let membership = membership::ActiveModel {
        user_id: Set(user_id.to_string()),
        tier: Set(tier_config.name.clone()),
        status: Set(MembershipStatus::Active),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;
    audit::record(
        &txn,
        audit::entity::MEMBERSHIP,
        membership.id,
        "activated",
        Some(tier_config.name.clone()),
    )
    .await?;

    let pass = if tier_config.companion_slots > 0 {
        let pass = companion_pass::ActiveModel {
            membership_id: Set(membership.id),
            total_slots: Set(tier_config.companion_slots),
            slots_registered: Set(0),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        audit::record(
            &txn,
            audit::entity::COMPANION_PASS,
            pass.id,
            "created",
            Some(format!("{} slots", pass.total_slots)),
        )
        .await?;
        Some(pass)
    } else {
        None
    };

    txn.commit().await?;
    info!(
        membership_id = membership.id,
        tier = %membership.tier,
        "Membership activated"
    );
    Ok((membership, pass))
}

/// Changes a membership's status. Only `active` memberships receive allocations.
#[instrument(skip(db))]
pub async fn set_membership_status(
    db: &DatabaseConnection,
    membership_id: i64,
    status: MembershipStatus,
) -> Result<membership::Model> {
    let txn = db.begin().await?;
    let current = Membership::find_by_id(membership_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("membership", membership_id))?;
    if current.status == status {
        txn.commit().await?;
        return Ok(current);
    }

    let previous = current.status;
    let mut active: membership::ActiveModel = current.into();
    active.status = Set(status);
    active.updated_at = Set(Utc::now());
    let updated = active.update(&txn).await?;
    audit::record(
        &txn,
        audit::entity::MEMBERSHIP,
        membership_id,
        "status_changed",
        Some(format!("{previous} -> {status}")),
    )
    .await?;
    txn.commit().await?;

    info!(membership_id, %status, "Membership status changed");
    Ok(updated)
}

/// Retrieves a membership by id.
pub async fn get_membership(
    db: &DatabaseConnection,
    membership_id: i64,
) -> Result<membership::Model> {
    Membership::find_by_id(membership_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("membership", membership_id))
}

/// Retrieves the companion passes of a membership, oldest first.
pub async fn passes_for_membership(
    db: &DatabaseConnection,
    membership_id: i64,
) -> Result<Vec<companion_pass::Model>> {
    CompanionPass::find()
        .filter(companion_pass::Column::MembershipId.eq(membership_id))
        .order_by_asc(companion_pass::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}
