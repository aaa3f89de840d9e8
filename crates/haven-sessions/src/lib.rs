//! # Haven Sessions
//!
//! Signing-session lifecycle for the guardian-quorum core:
//!
//! - [`SessionRegistry`]: session creation, lazy and sweep-driven expiry,
//!   terminal-state enforcement, and the submit-contribution surface
//! - Policy engine ([`MfaPolicy`]): hardware-factor requirements evaluated
//!   once at creation and cached on the session
//! - Quorum tracker: per-session, linearizable accounting of distinct
//!   verified contributions against the threshold
//! - Reconstructor: deterministic first-k selection and verify-after-combine
//!   finalization through the pluggable combiner
//!
//! ## Concurrency model
//!
//! Each session lives behind its own mutex; every mutation (submission,
//! expiry, finalization) runs under that lock, so two guardians racing at
//! `count = threshold - 1` cannot both trigger finalization. There is no
//! cross-session shared mutable state.

#![forbid(unsafe_code)]

pub mod events;
pub mod policy;
pub mod quorum;
mod reconstructor;
pub mod registry;
pub mod session;

pub use events::SessionEvent;
pub use policy::MfaPolicy;
pub use quorum::QuorumUpdate;
pub use registry::{CreateSessionParams, SessionRegistry};
pub use session::{SessionSnapshot, SessionStatus};
