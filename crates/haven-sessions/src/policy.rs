//! Hardware-factor policy engine.
//!
//! The policy is evaluated once at session creation and the verdict cached
//! on the session, so a family changing its default mid-session cannot
//! shift the bar for contributions already in flight.

use haven_core::Operation;
use serde::{Deserialize, Serialize};

/// Multi-factor enforcement mode for a signing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MfaPolicy {
    /// Hardware factors are never considered.
    Disabled,
    /// Hardware factors are recorded when present but never block quorum.
    Optional,
    /// Every counted contribution must carry a verified hardware factor.
    Required,
    /// Hardware factor mandatory only above a declared-value threshold.
    RequiredForHighValue {
        /// Operations strictly above this value require the factor.
        threshold_sats: u64,
    },
}

impl MfaPolicy {
    /// Whether contributions to a session over `operation` must carry a
    /// verified hardware factor to count toward quorum.
    pub fn requires_hardware_factor(&self, operation: &Operation) -> bool {
        match self {
            MfaPolicy::Disabled | MfaPolicy::Optional => false,
            MfaPolicy::Required => true,
            MfaPolicy::RequiredForHighValue { threshold_sats } => {
                operation.value_sats > *threshold_sats
            }
        }
    }
}

impl std::fmt::Display for MfaPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MfaPolicy::Disabled => write!(f, "disabled"),
            MfaPolicy::Optional => write!(f, "optional"),
            MfaPolicy::Required => write!(f, "required"),
            MfaPolicy::RequiredForHighValue { threshold_sats } => {
                write!(f, "required-above-{threshold_sats}-sats")
            }
        }
    }
}
