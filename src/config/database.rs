//! Database configuration module for the ledger store.
//!
//! This module handles the database connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with `Schema::create_table_from_entity`,
//! so the schema always matches the Rust structs. The composite unique indexes that back
//! the allocation idempotency guarantees are created explicitly.

use crate::entities::{
    CompanionPass, CompanionProfile, Credit, LedgerEvent, Membership, PaymentApplication,
    Ticket, Voucher, credit, voucher,
};
use crate::errors::Result;
use sea_orm::sea_query::Index;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};
use tracing::{debug, info, instrument};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/ticket_ledger.sqlite?mode=rwc";

/// Gets the database URL from environment variable or returns default `SQLite` path.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

/// Establishes a connection using `DATABASE_URL` and ensures all tables exist.
#[instrument]
pub async fn create_connection() -> Result<DatabaseConnection> {
    let database_url = get_database_url();
    if database_url == DEFAULT_DATABASE_URL {
        std::fs::create_dir_all("data")?;
    }
    debug!("Connecting to ledger store");
    let db = Database::connect(&database_url).await?;
    create_tables(&db).await?;
    info!("Ledger store ready");
    Ok(db)
}

async fn create_table<E>(db: &DatabaseConnection, schema: &Schema, entity: E) -> Result<()>
where
    E: EntityTrait,
{
    let builder = db.get_database_backend();
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(builder.build(&statement)).await?;
    Ok(())
}

/// Creates all ledger tables and indexes if they do not exist yet.
///
/// Parents are created before children so foreign keys resolve on every backend.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    create_table(db, &schema, Membership).await?;
    create_table(db, &schema, Ticket).await?;
    create_table(db, &schema, PaymentApplication).await?;
    create_table(db, &schema, Credit).await?;
    create_table(db, &schema, Voucher).await?;
    create_table(db, &schema, CompanionPass).await?;
    create_table(db, &schema, CompanionProfile).await?;
    create_table(db, &schema, LedgerEvent).await?;

    // One scheduled grant per membership per period
    let credit_period = Index::create()
        .name("idx_credits_membership_period")
        .table(Credit)
        .col(credit::Column::MembershipId)
        .col(credit::Column::AllocationPeriod)
        .unique()
        .if_not_exists()
        .to_owned();
    db.execute(builder.build(&credit_period)).await?;

    let voucher_slot = Index::create()
        .name("idx_vouchers_membership_period_slot")
        .table(Voucher)
        .col(voucher::Column::MembershipId)
        .col(voucher::Column::AllocationPeriod)
        .col(voucher::Column::AllocationSlot)
        .unique()
        .if_not_exists()
        .to_owned();
    db.execute(builder.build(&voucher_slot)).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{TicketModel, VoucherModel};
    use sea_orm::QuerySelect;

    #[tokio::test]
    async fn test_create_tables() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;

        let _: Vec<TicketModel> = Ticket::find().limit(1).all(&db).await?;
        let _: Vec<VoucherModel> = Voucher::find().limit(1).all(&db).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_create_tables_is_idempotent() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;
        create_tables(&db).await?;
        Ok(())
    }
}
