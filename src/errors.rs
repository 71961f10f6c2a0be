//! Unified error type for the ledger.
//!
//! Expected outcomes such as a rejected check-in or an idempotent replay are modelled as
//! return values in the `core` modules. The variants here are the cases a caller must
//! treat as a failed request.

use sea_orm::DbErr;
use thiserror::Error;

/// All errors that can surface from ledger operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A referenced ticket, membership, pass or profile does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record that was looked up
        entity: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// The operation is forbidden from the record's current state.
    #[error("cannot {action} {entity} {id} while it is {status}")]
    InvalidState {
        /// Kind of record
        entity: &'static str,
        /// Identifier of the record
        id: String,
        /// Current status that forbids the transition
        status: String,
        /// Attempted action
        action: &'static str,
    },

    /// A companion registration would exceed the pass allotment.
    #[error("companion pass {pass_id} has no free slots (total {total_slots})")]
    CapacityExceeded {
        /// Pass that is full
        pass_id: i64,
        /// Allotted slots on the pass
        total_slots: i32,
    },

    /// A membership holds fewer redeemable credits than requested.
    #[error("membership {membership_id} has {available} credits, {requested} requested")]
    InsufficientCredits {
        /// Membership being charged
        membership_id: i64,
        /// Credits the order needs
        requested: i64,
        /// Credits currently redeemable
        available: i64,
    },

    /// Input failed validation or could not be decoded.
    #[error("malformed input: {message}")]
    MalformedInput {
        /// What was wrong with the input
        message: String,
    },

    /// The ledger store failed; callers may retry with backoff.
    #[error("database error: {0}")]
    Database(#[from] DbErr),

    /// Configuration could not be loaded or is invalid.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration problem
        message: String,
    },

    /// I/O error while reading configuration.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Message safe to show to an end user.
    ///
    /// Never reveals token structure or database details.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound { entity, .. } => format!("{entity} not found"),
            Self::InvalidState { status, .. } if status == "used" => {
                "already used at check-in".to_string()
            }
            Self::InvalidState { action, status, .. } => {
                format!("cannot {action} while {status}")
            }
            Self::CapacityExceeded { .. } => "no companion slots remaining".to_string(),
            Self::InsufficientCredits { .. } => "insufficient credits".to_string(),
            Self::MalformedInput { .. } => "invalid input".to_string(),
            Self::Database(_) | Self::Io(_) => {
                "service temporarily unavailable, please retry".to_string()
            }
            Self::Config { .. } => "service misconfigured".to_string(),
        }
    }

    /// True when the failure is a store outage worth retrying.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(_))
    }

    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedInput {
            message: message.into(),
        }
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages() {
        let used = Error::InvalidState {
            entity: "ticket",
            id: "1".to_string(),
            status: "used".to_string(),
            action: "void",
        };
        assert_eq!(used.user_message(), "already used at check-in");

        let full = Error::CapacityExceeded {
            pass_id: 3,
            total_slots: 1,
        };
        assert_eq!(full.user_message(), "no companion slots remaining");

        let short = Error::InsufficientCredits {
            membership_id: 4,
            requested: 2,
            available: 1,
        };
        assert_eq!(short.user_message(), "insufficient credits");
        assert!(!short.is_retryable());

        let missing = Error::not_found("ticket", 9);
        assert_eq!(missing.user_message(), "ticket not found");
        assert!(!missing.is_retryable());
    }

    #[test]
    fn test_database_errors_are_retryable() {
        let err = Error::from(DbErr::Custom("connection reset".to_string()));
        assert!(err.is_retryable());
        assert!(err.user_message().contains("retry"));
    }
}
