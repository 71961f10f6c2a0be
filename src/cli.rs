//! Command-line surface of the binary.
//!
//! With no arguments the binary runs the scheduler daemon. Otherwise the first argument
//! names a one-shot action: a scheduler tick, a payment-confirmed event from the payment
//! processor, or a scanned token from a venue scanner.

use crate::{
    config::Settings,
    core::ticket::{self, CheckInOutcome},
    errors::{Error, Result},
    jobs::{self, JobName},
};
use sea_orm::DatabaseConnection;
use std::fmt::Write as _;
use tracing::info;

/// Usage line printed for unrecognised arguments
pub const USAGE: &str = "usage: ticket-ledger [run <allocate-credits|expire-credits> \
                         | confirm-payment <order-id> <payment-reference> | check-in <token>]";

/// What the binary was asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Tick every job on its configured interval until Ctrl-C
    Daemon,
    /// Perform one action and exit
    Once(Action),
}

/// One-shot actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Run a single scheduler tick
    RunJob(JobName),
    /// Apply a payment-confirmed event to an order
    ConfirmPayment {
        /// Order the payment belongs to
        order_id: String,
        /// Processor reference; replays are ignored
        payment_reference: String,
    },
    /// Check in the holder of a scanned token
    CheckIn {
        /// Raw scanner input
        token: String,
    },
}

impl Command {
    /// Parses the arguments that follow the program name.
    pub fn parse(args: &[String]) -> Result<Self> {
        match args {
            [] => Ok(Self::Daemon),
            [command, job] if command == "run" => Ok(Self::Once(Action::RunJob(job.parse()?))),
            [command, order_id, payment_reference] if command == "confirm-payment" => {
                Ok(Self::Once(Action::ConfirmPayment {
                    order_id: order_id.clone(),
                    payment_reference: payment_reference.clone(),
                }))
            }
            [command, token] if command == "check-in" => Ok(Self::Once(Action::CheckIn {
                token: token.clone(),
            })),
            _ => Err(Error::malformed(USAGE)),
        }
    }
}

/// Executes a one-shot action and renders its outcome for the terminal.
///
/// A rejected check-in is an outcome, not an error; the returned text names the reason.
pub async fn execute(
    db: &DatabaseConnection,
    settings: &Settings,
    action: Action,
) -> Result<String> {
    match action {
        Action::RunJob(job) => Ok(jobs::run_job(db, &settings.tiers, job).await?.to_string()),
        Action::ConfirmPayment {
            order_id,
            payment_reference,
        } => {
            let codec = settings.qr_codec();
            let confirmation =
                ticket::confirm_payment(db, &codec, &order_id, &payment_reference).await?;
            info!(
                order_id = %confirmation.order_id,
                replayed = confirmation.replayed,
                "Payment event applied"
            );

            let mut out = format!(
                "order {}: {} tickets active{}",
                confirmation.order_id,
                confirmation.tickets.len(),
                if confirmation.replayed { " (replayed)" } else { "" }
            );
            for t in &confirmation.tickets {
                let _ = write!(out, "\n{} {}", t.id, t.qr_token.as_deref().unwrap_or("-"));
            }
            Ok(out)
        }
        Action::CheckIn { token } => {
            let codec = settings.qr_codec();
            Ok(match ticket::check_in(db, &codec, &token).await? {
                CheckInOutcome::Admitted(t) => format!("admitted: ticket {}", t.id),
                CheckInOutcome::Rejected(rejection) => format!("rejected: {}", rejection.reason()),
            })
        }
    }
}
