//! Quorum accounting over verified contributions.
//!
//! Quorum is counted over distinct guardians, never raw submissions: a
//! guardian resubmitting replaces their earlier contribution and the count
//! is unchanged. When the session requires a hardware factor, only
//! hardware-attested contributions qualify; the rest are held but never
//! counted.

use haven_core::GuardianId;
use haven_crypto::VerifiedContribution;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Outcome of recording one contribution, returned to the submitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumUpdate {
    /// Whether the contribution was accepted (recorded or replaced).
    pub accepted: bool,
    /// Whether this particular contribution qualifies toward quorum.
    pub counted: bool,
    /// Qualified distinct-guardian count after recording.
    pub current_count: usize,
    /// Whether quorum is satisfied after recording.
    pub satisfied: bool,
}

/// Count the distinct guardians whose effective contribution qualifies.
pub(crate) fn qualified_count(
    contributions: &HashMap<GuardianId, VerifiedContribution>,
    hardware_required: bool,
) -> usize {
    contributions
        .values()
        .filter(|c| qualifies(c, hardware_required))
        .count()
}

/// Whether one contribution counts toward quorum under the session policy.
pub(crate) fn qualifies(contribution: &VerifiedContribution, hardware_required: bool) -> bool {
    contribution.hardware_attested || !hardware_required
}

/// Record `contribution` as the guardian's effective contribution and report
/// the resulting quorum arithmetic.
pub(crate) fn record(
    contributions: &mut HashMap<GuardianId, VerifiedContribution>,
    contribution: VerifiedContribution,
    threshold: usize,
    hardware_required: bool,
) -> QuorumUpdate {
    let counted = qualifies(&contribution, hardware_required);
    contributions.insert(contribution.guardian_id, contribution);
    let current_count = qualified_count(contributions, hardware_required);
    QuorumUpdate {
        accepted: true,
        counted,
        current_count,
        satisfied: current_count >= threshold,
    }
}
