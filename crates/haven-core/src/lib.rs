//! # Haven Core
//!
//! Foundation crate for the Haven guardian-quorum signing and recovery core.
//!
//! ## Purpose
//!
//! Provides the shared vocabulary every other Haven crate builds on:
//! - Identifier newtypes for sessions, requests, guardians, and devices
//! - The unified [`HavenError`] type and [`Result`] alias
//! - Epoch-millisecond clock abstraction for testable time
//! - Operation payloads and guardian set wrappers with constructor-enforced
//!   invariants
//!
//! ## What Does NOT Belong Here
//!
//! - Cryptographic verification or share reconstruction (haven-crypto)
//! - Session or request state machines (haven-sessions, haven-recovery)
//! - Audit recording (haven-journal)

#![forbid(unsafe_code)]

pub mod errors;
pub mod guardian;
pub mod identifiers;
pub mod operation;
pub mod time;

pub use errors::{HavenError, Result};
pub use guardian::{GuardianProfile, GuardianSet};
pub use identifiers::{DeviceId, FamilyId, GuardianId, RequestId, SessionId, UserId};
pub use operation::Operation;
pub use time::{Clock, ManualClock, SystemClock};

/// Practical upper bound on signing thresholds.
///
/// Larger guardian sets are allowed, but a session never requires more than
/// this many distinct contributions.
pub const MAX_THRESHOLD: usize = 7;
