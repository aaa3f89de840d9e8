//! # Haven Recovery
//!
//! Guardian-consensus recovery workflow:
//!
//! - [`RecoveryRequest`] and [`RecoveryApproval`] data model, with the
//!   approval count always derived from the recorded votes
//! - [`RecoveryOrchestrator`]: request creation, one-vote-per-guardian
//!   approval intake, threshold transitions, exactly-once execution with
//!   idempotent read-through of the cached outcome, and expiry sweeps
//! - [`AttemptTracker`]: rolling-window attempt counting per subject with a
//!   cool-down that is independent of any individual request's state
//!
//! Rejection is advisory by default: guardians' declines are recorded and
//! auditable but never block approval. A [`RecoveryPolicy`] may configure a
//! blocking rejection threshold instead.

#![forbid(unsafe_code)]

pub mod attempts;
pub mod orchestrator;
pub mod request;

pub use attempts::{AttemptTracker, AttemptVerdict};
pub use orchestrator::{CreateRequestParams, RecoveryOrchestrator, RecoveryPolicy};
pub use request::{
    ApprovalDecision, RecoveryApproval, RecoveryKind, RecoveryMethod, RecoveryOutcome,
    RequestSnapshot, RequestStatus, SubjectRole, Urgency,
};
