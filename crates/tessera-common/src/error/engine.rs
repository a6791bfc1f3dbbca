//! Engine error types.
//!
//! Protocol outcomes (commit, abort and its reason) are not errors: they are
//! terminal transaction states. The variants here describe misuse of the
//! harness contract and oracle limits.

use std::fmt;
use thiserror::Error;

use crate::types::{ObjectId, TxnId};

/// Error codes for categorizing errors.
///
/// These codes can be used for programmatic error handling and
/// are stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    // General errors (0x0000 - 0x00FF)
    /// Internal error (bug).
    Internal = 0x0001,
    /// Invalid argument provided.
    InvalidArgument = 0x0003,

    // Configuration errors (0x0100 - 0x01FF)
    /// Invalid configuration.
    InvalidConfig = 0x0100,
    /// Object not part of the configured object set.
    UnknownObject = 0x0101,
    /// Script exceeds the configured operation count.
    ScriptTooLong = 0x0102,

    // Transaction errors (0x0300 - 0x03FF)
    /// Transaction identity not part of the configured set.
    TransactionNotFound = 0x0304,
    /// Transaction already reached a terminal state.
    TransactionEnded = 0x0305,
    /// Transaction admitted twice.
    DuplicateTransaction = 0x0306,
    /// Admission attempted after execution started.
    AlreadyStarted = 0x0307,
    /// Operation requested for a transaction that was never admitted.
    NotAdmitted = 0x0308,

    // Checker errors (0x0600 - 0x06FF)
    /// Too many committed transactions for the permutation oracle.
    TooManyTransactions = 0x0600,
    /// Store kind does not match the history being checked.
    StoreMismatch = 0x0601,
}

impl ErrorCode {
    /// Returns the numeric code.
    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Returns the error category name.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match (*self as u16) >> 8 {
            0x00 => "General",
            0x01 => "Configuration",
            0x03 => "Transaction",
            0x06 => "Checker",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The main error type for Tessera.
///
/// # Example
///
/// ```rust
/// use tessera_common::error::{TesseraError, TesseraResult};
/// use tessera_common::types::TxnId;
///
/// fn lookup(txn_id: TxnId) -> TesseraResult<()> {
///     Err(TesseraError::UnknownTransaction { txn_id })
/// }
/// assert!(lookup(TxnId::new(9)).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TesseraError {
    // ==========================================================================
    // General Errors
    // ==========================================================================
    /// Internal error - this indicates a bug.
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },

    /// Invalid argument provided.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Error message.
        message: String,
    },

    // ==========================================================================
    // Configuration Errors
    // ==========================================================================
    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Error message.
        message: String,
    },

    /// Object not in the configured object set.
    #[error("object {object} is not configured")]
    UnknownObject {
        /// The unknown object.
        object: ObjectId,
    },

    /// Script longer than the configured maximum.
    #[error("script for {txn_id} has {len} operations, maximum is {max}")]
    ScriptTooLong {
        /// The transaction.
        txn_id: TxnId,
        /// Script length.
        len: usize,
        /// Configured maximum.
        max: usize,
    },

    // ==========================================================================
    // Transaction Errors
    // ==========================================================================
    /// Transaction not in the configured identity set.
    #[error("transaction {txn_id} is not configured")]
    UnknownTransaction {
        /// The missing transaction.
        txn_id: TxnId,
    },

    /// Transaction was already admitted.
    #[error("transaction {txn_id} was already admitted")]
    DuplicateTransaction {
        /// The duplicate transaction.
        txn_id: TxnId,
    },

    /// Transaction was never admitted.
    #[error("transaction {txn_id} was not admitted")]
    NotAdmitted {
        /// The transaction.
        txn_id: TxnId,
    },

    /// Scripts must be supplied before the first step.
    #[error("cannot admit {txn_id}: execution already started")]
    AlreadyStarted {
        /// The late transaction.
        txn_id: TxnId,
    },

    /// Transaction already reached a terminal state.
    #[error("transaction {txn_id} already ended")]
    TransactionEnded {
        /// The ended transaction.
        txn_id: TxnId,
    },

    // ==========================================================================
    // Checker Errors
    // ==========================================================================
    /// Too many committed transactions for a brute-force search.
    #[error("{committed} committed transactions exceed the oracle bound of {max}")]
    TooManyTransactions {
        /// Committed transactions in the history.
        committed: usize,
        /// Configured bound.
        max: usize,
    },

    /// Store kind does not match the history values.
    #[error("store mismatch: {message}")]
    StoreMismatch {
        /// Error message.
        message: String,
    },
}

impl TesseraError {
    /// Returns the error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Internal { .. } => ErrorCode::Internal,
            Self::InvalidArgument { .. } => ErrorCode::InvalidArgument,
            Self::InvalidConfig { .. } => ErrorCode::InvalidConfig,
            Self::UnknownObject { .. } => ErrorCode::UnknownObject,
            Self::ScriptTooLong { .. } => ErrorCode::ScriptTooLong,
            Self::UnknownTransaction { .. } => ErrorCode::TransactionNotFound,
            Self::DuplicateTransaction { .. } => ErrorCode::DuplicateTransaction,
            Self::NotAdmitted { .. } => ErrorCode::NotAdmitted,
            Self::AlreadyStarted { .. } => ErrorCode::AlreadyStarted,
            Self::TransactionEnded { .. } => ErrorCode::TransactionEnded,
            Self::TooManyTransactions { .. } => ErrorCode::TooManyTransactions,
            Self::StoreMismatch { .. } => ErrorCode::StoreMismatch,
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        let err = TesseraError::UnknownObject {
            object: ObjectId::new(4),
        };
        assert_eq!(err.code(), ErrorCode::UnknownObject);
        assert_eq!(err.code().category(), "Configuration");

        let err = TesseraError::TooManyTransactions {
            committed: 12,
            max: 8,
        };
        assert_eq!(err.code().category(), "Checker");
    }

    #[test]
    fn test_error_display() {
        let err = TesseraError::ScriptTooLong {
            txn_id: TxnId::new(2),
            len: 5,
            max: 3,
        };
        assert_eq!(err.to_string(), "script for T2 has 5 operations, maximum is 3");

        let err = TesseraError::TransactionEnded {
            txn_id: TxnId::new(1),
        };
        assert_eq!(err.to_string(), "transaction T1 already ended");
    }

    #[test]
    fn test_constructors() {
        assert_eq!(
            TesseraError::invalid_config("no objects").code(),
            ErrorCode::InvalidConfig
        );
        assert_eq!(TesseraError::internal("bug").code().as_u16(), 0x0001);
    }
}
