//! Entity module - Contains all SeaORM entity definitions for the ledger store.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod companion_pass;
pub mod companion_profile;
pub mod credit;
pub mod ledger_event;
pub mod membership;
pub mod payment_application;
pub mod ticket;
pub mod voucher;

// Re-export specific types to avoid conflicts
pub use companion_pass::{
    Column as CompanionPassColumn, Entity as CompanionPass, Model as CompanionPassModel,
};
pub use companion_profile::{
    CompanionStatus, Column as CompanionProfileColumn, Entity as CompanionProfile,
    Model as CompanionProfileModel,
};
pub use credit::{Column as CreditColumn, CreditSource, Entity as Credit, Model as CreditModel};
pub use ledger_event::{
    Column as LedgerEventColumn, Entity as LedgerEvent, Model as LedgerEventModel,
};
pub use membership::{
    Column as MembershipColumn, Entity as Membership, MembershipStatus, Model as MembershipModel,
};
pub use payment_application::{
    Column as PaymentApplicationColumn, Entity as PaymentApplication,
    Model as PaymentApplicationModel,
};
pub use ticket::{Column as TicketColumn, Entity as Ticket, Model as TicketModel, TicketStatus};
pub use voucher::{Column as VoucherColumn, Entity as Voucher, Model as VoucherModel};
