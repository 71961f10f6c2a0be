//! `ticket-ledger` - Ticket and membership-credit ledger
//!
//! This crate keeps the authoritative state of event tickets, membership ticket-credits,
//! promotional vouchers and companion passes. Tickets move through payment confirmation
//! and QR check-in, credits and vouchers are allocated quarterly and expired daily, and
//! companion passes hand out a bounded number of guest slots.

// Deny the most critical lints that could lead to bugs or security issues
#![deny(
    // Security and correctness
    unsafe_code,
    unsafe_op_in_unsafe_fn,

    // Code quality - things that are almost always bugs
    unreachable_code,
    unreachable_patterns,
    unused_must_use,

    // Documentation - broken links are bugs
    rustdoc::broken_intra_doc_links,
    rustdoc::private_intra_doc_links,
)]
// Warn on things that should be fixed but aren't necessarily bugs
#![warn(
    missing_docs,

    // Clippy categories for overall code quality
    clippy::all,
    clippy::pedantic,
    clippy::nursery,

    // Correctness
    clippy::clone_on_ref_ptr,
    clippy::dbg_macro,
    clippy::exit,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::unwrap_used,

    // Complexity and readability
    clippy::cognitive_complexity,
    clippy::large_enum_variant,
    clippy::too_many_lines,

    // Style consistency
    clippy::enum_glob_use,
    clippy::semicolon_if_nothing_returned,

    // Future compatibility
    future_incompatible,
    rust_2018_idioms,
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
)]

/// Command-line parsing and one-shot actions of the binary
pub mod cli;
/// Configuration management for database and application settings
pub mod config;
/// Core business logic - tickets, credits, vouchers and companion passes
pub mod core;
/// SeaORM entity definitions for database tables
pub mod entities;
/// Unified error types and result handling
pub mod errors;
/// Scheduled batch jobs and the daemon loops that tick them
pub mod jobs;

#[cfg(test)]
pub mod test_utils;
