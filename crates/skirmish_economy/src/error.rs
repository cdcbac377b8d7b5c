//! # Economy Error Types
//!
//! All errors that can occur in the economy system.
//!
//! Errors fall into four classes, see [`ErrorKind`]. Only infrastructure
//! errors are worth retrying; everything else is a verdict on the request.

use thiserror::Error;

/// Broad error class, used to pick the wire code and retry policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or inconsistent input. Nothing was touched.
    Validation,
    /// A business rule rejected the request. Nothing was touched.
    Rejected,
    /// A store or ledger call failed. No partial economic effect.
    Infrastructure,
    /// The loaded configuration is unusable.
    Configuration,
}

/// Errors that can occur in the economy system.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EconomyError {
    /// Request field failed validation.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The caller has no player identity.
    #[error("no player identity on request")]
    MissingIdentity,

    /// A pet or class id that is not in the catalog.
    #[error("invalid {category} id: {id}")]
    InvalidItemId {
        /// Item category (`pet`, `class`).
        category: &'static str,
        /// The rejected id.
        id: u32,
    },

    /// Experience grant outside the sane bound.
    #[error("experience grant {amount} exceeds maximum {max}")]
    InvalidExperience {
        /// Requested amount.
        amount: u64,
        /// Configured maximum single grant.
        max: u64,
    },

    /// Level curve name not present in the configuration.
    #[error("unknown level curve: {0}")]
    UnknownLevelCurve(String),

    /// Payload could not be parsed.
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// Submission without a registered active match.
    #[error("no active match")]
    NoActiveMatch,

    /// Submission for a different match than the one registered.
    #[error("match id mismatch: active {expected}, claimed {claimed}")]
    MatchMismatch {
        /// Registered match id.
        expected: String,
        /// Match id on the submission.
        claimed: String,
    },

    /// Submitted before the minimum match duration elapsed.
    #[error("match too short: {elapsed_ms} ms < {min_ms} ms")]
    MatchTooShort {
        /// Elapsed time since start.
        elapsed_ms: i64,
        /// Configured floor.
        min_ms: i64,
    },

    /// The active match outlived its ceiling and was cleared.
    #[error("stale active match: {elapsed_ms} ms > {max_ms} ms")]
    StaleMatch {
        /// Elapsed time since start.
        elapsed_ms: i64,
        /// Mode-dependent ceiling.
        max_ms: i64,
    },

    /// Object store read failed.
    #[error("storage read failed: {0}")]
    StorageRead(String),

    /// Object store write failed.
    #[error("storage write failed: {0}")]
    StorageWrite(String),

    /// Write condition did not hold (stale version or existing record).
    #[error("version conflict on {collection}/{key}")]
    VersionConflict {
        /// Collection of the rejected write.
        collection: String,
        /// Key of the rejected write.
        key: String,
    },

    /// A deduction would push a balance below zero.
    #[error("insufficient {currency}: balance {balance}, delta {delta}")]
    InsufficientBalance {
        /// Currency key.
        currency: String,
        /// Balance before the delta.
        balance: i64,
        /// Rejected delta.
        delta: i64,
    },

    /// Atomic multi-update failed. No write or delta was applied.
    #[error("atomic commit failed: {0}")]
    CommitFailed(String),

    /// Stored record could not be encoded or decoded.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Invalid configuration file.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl EconomyError {
    /// Returns the error class.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_)
            | Self::MissingIdentity
            | Self::InvalidItemId { .. }
            | Self::InvalidExperience { .. }
            | Self::UnknownLevelCurve(_)
            | Self::Malformed(_) => ErrorKind::Validation,
            Self::NoActiveMatch
            | Self::MatchMismatch { .. }
            | Self::MatchTooShort { .. }
            | Self::StaleMatch { .. } => ErrorKind::Rejected,
            Self::StorageRead(_)
            | Self::StorageWrite(_)
            | Self::VersionConflict { .. }
            | Self::InsufficientBalance { .. }
            | Self::CommitFailed(_)
            | Self::Serialization(_) => ErrorKind::Infrastructure,
            Self::InvalidConfig(_) => ErrorKind::Configuration,
        }
    }

    /// Returns true if the caller may retry the same request.
    #[inline]
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Infrastructure)
    }

    /// Wire status code: 3 invalid argument, 9 failed precondition, 13 internal.
    #[must_use]
    pub const fn status_code(&self) -> u32 {
        match self.kind() {
            ErrorKind::Validation => 3,
            ErrorKind::Rejected => 9,
            ErrorKind::Infrastructure | ErrorKind::Configuration => 13,
        }
    }
}

impl From<serde_json::Error> for EconomyError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result type for economy operations.
pub type EconomyResult<T> = Result<T, EconomyError>;
