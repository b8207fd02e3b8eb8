use thiserror::Error;

use crate::common::TransactionId;

/// Failures surfaced by the space API. Timeouts and shutdown are not errors;
/// both are reported as a plain "no match" result.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpaceError {
    #[error("invalid tuple: {0}")]
    InvalidTuple(String),

    #[error("invalid template: {0}")]
    InvalidTemplate(String),

    /// A commit or rollback on a transaction that has already finished,
    /// or an operation passed such a transaction.
    #[error("transaction {0} has already finished")]
    TransactionFinished(TransactionId),
}
