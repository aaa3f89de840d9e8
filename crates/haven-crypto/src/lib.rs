//! # Haven Crypto
//!
//! Cryptographic layer of the guardian-quorum core:
//!
//! - GF(256) field arithmetic and Shamir secret sharing
//! - Contribution envelopes binding guardian input to a single session
//! - The pure [`ContributionVerifier`] for individual guardian input
//! - The pluggable [`Combiner`] capability with two variants: secret-share
//!   interpolation and partial-signature aggregation
//!
//! The combiner contract is scheme-agnostic: callers supply verified
//! contributions and a target key, and every combiner re-verifies its own
//! output against that key before returning it. A combine that produces an
//! artifact failing independent re-verification is an error, never a result.

#![forbid(unsafe_code)]

pub mod combiner;
pub mod envelope;
mod gf256;
pub mod shamir;
pub mod verifier;

pub use combiner::{
    AggregateCombiner, AggregateEntry, CombineContext, Combiner, CombinerKind, ShamirCombiner,
    SignedArtifact, TargetKey,
};
pub use envelope::{
    session_binding, ContributionEnvelope, ContributionMaterial, HardwareFactor,
};
pub use shamir::SecretShare;
pub use verifier::{ContributionVerifier, VerificationOutcome, VerifiedContribution};
