//! Core business logic - framework-agnostic ledger operations.
//!
//! Every function takes a `DatabaseConnection` and coordinates through conditional
//! writes in the store; nothing here keeps shared in-process state.

/// Ledger audit trail
pub mod audit;
/// Companion pass registration and cancellation
pub mod companion;
/// Quarterly allocation, grants, redemption and balances of ticket credits
pub mod credit;
/// Expiration sweep for credits and vouchers
pub mod expiration;
/// Membership activation and status
pub mod membership;
/// QR token signing, verification and rendering
pub mod qr;
/// Ticket lifecycle: issuance, payment confirmation, check-in, void and refund
pub mod ticket;
/// Code-redeemable vouchers
pub mod voucher;
