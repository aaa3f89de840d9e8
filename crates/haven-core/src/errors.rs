//! Unified error system for the Haven core.
//!
//! A single error enum covers every failure the quorum core can surface to a
//! caller. Variants carry a human-readable reason but never raw key material
//! or other guardians' identities beyond counts.

use serde::{Deserialize, Serialize};

/// Unified error type for all Haven operations.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error, PartialEq, Eq)]
pub enum HavenError {
    /// Threshold outside `1..=min(|guardians|, MAX_THRESHOLD)`.
    #[error("Invalid threshold: {message}")]
    InvalidThreshold {
        /// Why the threshold was rejected
        message: String,
    },

    /// A session or request was created with no guardians.
    #[error("Empty guardian set: {message}")]
    EmptyGuardianSet {
        /// Context for the empty set
        message: String,
    },

    /// Session or request does not exist.
    #[error("Not found: {message}")]
    NotFound {
        /// What was not found
        message: String,
    },

    /// Submission arrived after the session reached a terminal expiry.
    #[error("Session expired: {message}")]
    SessionExpired {
        /// Which session and when it expired
        message: String,
    },

    /// Recovery request is no longer accepting votes or execution.
    #[error("Request not pending: {message}")]
    RequestNotPending {
        /// Current terminal or non-pending status
        message: String,
    },

    /// Guardian attempted to vote twice on the same request.
    #[error("Duplicate vote: {message}")]
    DuplicateVote {
        /// Which guardian and request
        message: String,
    },

    /// Contribution or vote from a guardian outside the eligible set.
    #[error("Unauthorized guardian: {message}")]
    UnauthorizedGuardian {
        /// Why the guardian was rejected
        message: String,
    },

    /// A share or signature failed cryptographic validation.
    #[error("Verification failed: {message}")]
    VerificationFailed {
        /// Which check failed
        message: String,
    },

    /// Policy requires a hardware factor that was missing or invalid.
    #[error("Hardware factor required: {message}")]
    HardwareFactorRequired {
        /// The policy in effect
        message: String,
    },

    /// Subject is in a recovery cool-down window after repeated attempts.
    #[error("Cool-down active: {message}")]
    CooldownActive {
        /// When the cool-down lifts
        message: String,
    },

    /// Combine produced an artifact that failed independent re-verification.
    #[error("Reconstruction error: {message}")]
    Reconstruction {
        /// What the combiner reported
        message: String,
    },

    /// Serialization/deserialization failure.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Underlying encoder/decoder message
        message: String,
    },

    /// Internal invariant violation.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the violated invariant
        message: String,
    },
}

impl HavenError {
    /// Create an invalid threshold error.
    pub fn invalid_threshold(message: impl Into<String>) -> Self {
        Self::InvalidThreshold {
            message: message.into(),
        }
    }

    /// Create an empty guardian set error.
    pub fn empty_guardian_set(message: impl Into<String>) -> Self {
        Self::EmptyGuardianSet {
            message: message.into(),
        }
    }

    /// Create a not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a session expired error.
    pub fn session_expired(message: impl Into<String>) -> Self {
        Self::SessionExpired {
            message: message.into(),
        }
    }

    /// Create a request-not-pending error.
    pub fn request_not_pending(message: impl Into<String>) -> Self {
        Self::RequestNotPending {
            message: message.into(),
        }
    }

    /// Create a duplicate vote error.
    pub fn duplicate_vote(message: impl Into<String>) -> Self {
        Self::DuplicateVote {
            message: message.into(),
        }
    }

    /// Create an unauthorized guardian error.
    pub fn unauthorized_guardian(message: impl Into<String>) -> Self {
        Self::UnauthorizedGuardian {
            message: message.into(),
        }
    }

    /// Create a verification failed error.
    pub fn verification_failed(message: impl Into<String>) -> Self {
        Self::VerificationFailed {
            message: message.into(),
        }
    }

    /// Create a hardware factor required error.
    pub fn hardware_factor_required(message: impl Into<String>) -> Self {
        Self::HardwareFactorRequired {
            message: message.into(),
        }
    }

    /// Create a cool-down active error.
    pub fn cooldown_active(message: impl Into<String>) -> Self {
        Self::CooldownActive {
            message: message.into(),
        }
    }

    /// Create a reconstruction error.
    pub fn reconstruction(message: impl Into<String>) -> Self {
        Self::Reconstruction {
            message: message.into(),
        }
    }

    /// Create a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this error is fatal to its session (forces `Failed`).
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Reconstruction { .. })
    }
}

/// Standard Result type for Haven operations.
pub type Result<T> = std::result::Result<T, HavenError>;
