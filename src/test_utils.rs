//! Shared test utilities for the ledger.
//!
//! This module provides common helper functions for setting up test databases
//! and creating test records with sensible defaults.

use crate::{
    config::TierConfig,
    core::{qr::QrCodec, ticket},
    entities::{self, CreditSource, MembershipStatus},
    errors::{Error, Result},
};
use chrono::{DateTime, Duration, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Codec keyed with a fixed test secret
pub fn test_codec() -> QrCodec {
    QrCodec::new(b"test-signing-key")
}

/// Test database plus codec, for ticket tests.
pub async fn setup_with_codec() -> Result<(DatabaseConnection, QrCodec)> {
    Ok((setup_test_db().await?, test_codec()))
}

/// Tiers used across tests.
///
/// * `insider`: 1 credit per quarter, no companions
/// * `legend`: 4 credits, 6-month expiry, 2 companion slots, 1 VIP voucher
pub fn test_tiers() -> Vec<TierConfig> {
    vec![
        TierConfig {
            name: "insider".to_string(),
            quarterly_credits: 1,
            credit_expiration_months: 12,
            companion_slots: 0,
            vip_vouchers_per_quarter: 0,
        },
        TierConfig {
            name: "legend".to_string(),
            quarterly_credits: 4,
            credit_expiration_months: 6,
            companion_slots: 2,
            vip_vouchers_per_quarter: 1,
        },
    ]
}

/// A point in time `days` days before now.
pub fn days_ago(days: i64) -> DateTime<Utc> {
    Utc::now() - Duration::days(days)
}

/// Creates an active `insider` membership.
pub async fn create_test_membership(
    db: &DatabaseConnection,
    user_id: &str,
) -> Result<entities::membership::Model> {
    create_membership_with_tier(db, user_id, "insider").await
}

/// Inserts an active membership directly, bypassing tier validation.
pub async fn create_membership_with_tier(
    db: &DatabaseConnection,
    user_id: &str,
    tier: &str,
) -> Result<entities::membership::Model> {
    let now = Utc::now();
    entities::membership::ActiveModel {
        user_id: Set(user_id.to_string()),
        tier: Set(tier.to_string()),
        status: Set(MembershipStatus::Active),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Issues one ticket for `order_id` and confirms its payment.
pub async fn create_active_ticket(
    db: &DatabaseConnection,
    codec: &QrCodec,
    order_id: &str,
) -> Result<entities::ticket::Model> {
    ticket::issue_tickets(db, order_id, "ga", 1).await?;
    let confirmation =
        ticket::confirm_payment(db, codec, order_id, &format!("pay_{order_id}")).await?;
    confirmation
        .tickets
        .into_iter()
        .next()
        .ok_or_else(|| Error::not_found("ticket", order_id))
}

/// Inserts an unused promotional credit with the given expiry.
pub async fn create_test_credit(
    db: &DatabaseConnection,
    membership_id: i64,
    amount: i64,
    expires_at: Option<DateTime<Utc>>,
) -> Result<entities::credit::Model> {
    entities::credit::ActiveModel {
        membership_id: Set(membership_id),
        amount: Set(amount),
        granted_at: Set(Utc::now()),
        expires_at: Set(expires_at),
        used: Set(false),
        used_at: Set(None),
        redeemed_order_id: Set(None),
        expired_at: Set(None),
        source: Set(CreditSource::Promotional),
        allocation_period: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Inserts an unused voucher with the given expiry.
pub async fn create_test_voucher(
    db: &DatabaseConnection,
    user_id: &str,
    expires_at: Option<DateTime<Utc>>,
) -> Result<entities::voucher::Model> {
    entities::voucher::ActiveModel {
        user_id: Set(user_id.to_string()),
        membership_id: Set(None),
        code: Set(crate::core::voucher::generate_code()),
        granted_at: Set(Utc::now()),
        expires_at: Set(expires_at),
        used: Set(false),
        used_at: Set(None),
        expired_at: Set(None),
        redeemed_order_id: Set(None),
        allocation_period: Set(None),
        allocation_slot: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Inserts an empty companion pass.
pub async fn create_test_pass(
    db: &DatabaseConnection,
    membership_id: i64,
    total_slots: i32,
) -> Result<entities::companion_pass::Model> {
    entities::companion_pass::ActiveModel {
        membership_id: Set(membership_id),
        total_slots: Set(total_slots),
        slots_registered: Set(0),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Installs a tracing subscriber that writes through the test harness.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
