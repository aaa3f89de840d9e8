//! Signing session state and status machine.

use crate::policy::MfaPolicy;
use crate::quorum;
use haven_core::{
    FamilyId, GuardianId, GuardianSet, HavenError, Operation, Result, SessionId, MAX_THRESHOLD,
};
use haven_crypto::{CombinerKind, SignedArtifact, TargetKey, VerifiedContribution};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lifecycle status of a signing session.
///
/// `Pending` is the only non-terminal state; no transition ever leaves a
/// terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// Collecting contributions.
    Pending,
    /// Quorum and policy satisfied; a verified artifact is cached.
    Completed,
    /// Reconstruction failed; the session will never complete.
    Failed,
    /// The ttl elapsed before quorum.
    Expired,
}

impl SessionStatus {
    /// Whether this status admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Pending)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Pending => write!(f, "pending"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Failed => write!(f, "failed"),
            SessionStatus::Expired => write!(f, "expired"),
        }
    }
}

/// Full per-session state. Lives behind the registry's per-session mutex;
/// never handed out directly.
#[derive(Debug)]
pub(crate) struct SessionState {
    pub(crate) session_id: SessionId,
    pub(crate) family_id: FamilyId,
    pub(crate) operation: Operation,
    pub(crate) guardians: GuardianSet,
    pub(crate) threshold: usize,
    pub(crate) status: SessionStatus,
    pub(crate) policy: MfaPolicy,
    /// Policy verdict, computed once at creation.
    pub(crate) hardware_required: bool,
    pub(crate) combiner_kind: CombinerKind,
    pub(crate) target: TargetKey,
    /// Binding digest contributions must be minted against.
    pub(crate) binding: [u8; 32],
    pub(crate) created_at_ms: u64,
    pub(crate) expires_at_ms: u64,
    pub(crate) closed_at_ms: Option<u64>,
    pub(crate) error_detail: Option<String>,
    /// Effective contribution per guardian; resubmission replaces.
    pub(crate) contributions: HashMap<GuardianId, VerifiedContribution>,
    pub(crate) artifact: Option<SignedArtifact>,
}

impl SessionState {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        session_id: SessionId,
        family_id: FamilyId,
        operation: Operation,
        guardians: GuardianSet,
        threshold: usize,
        policy: MfaPolicy,
        combiner_kind: CombinerKind,
        target: TargetKey,
        binding: [u8; 32],
        created_at_ms: u64,
        ttl_ms: u64,
    ) -> Result<Self> {
        if threshold < 1 {
            return Err(HavenError::invalid_threshold("threshold must be at least 1"));
        }
        if threshold > guardians.len() {
            return Err(HavenError::invalid_threshold(format!(
                "threshold {threshold} exceeds guardian count {}",
                guardians.len()
            )));
        }
        if threshold > MAX_THRESHOLD {
            return Err(HavenError::invalid_threshold(format!(
                "threshold {threshold} exceeds the practical cap of {MAX_THRESHOLD}"
            )));
        }

        let hardware_required = policy.requires_hardware_factor(&operation);
        Ok(Self {
            session_id,
            family_id,
            operation,
            guardians,
            threshold,
            status: SessionStatus::Pending,
            policy,
            hardware_required,
            combiner_kind,
            target,
            binding,
            created_at_ms,
            expires_at_ms: created_at_ms.saturating_add(ttl_ms),
            closed_at_ms: None,
            error_detail: None,
            contributions: HashMap::new(),
            artifact: None,
        })
    }

    /// Move to a terminal status. The status machine is monotonic: the only
    /// legal source state is `Pending`.
    pub(crate) fn transition(&mut self, to: SessionStatus, now_ms: u64) -> Result<()> {
        if self.status.is_terminal() {
            return Err(HavenError::internal(format!(
                "illegal transition {} -> {} for session {}",
                self.status, to, self.session_id
            )));
        }
        if to == SessionStatus::Pending {
            return Err(HavenError::internal("cannot transition into pending"));
        }
        tracing::info!(
            session = %self.session_id,
            from = %self.status,
            to = %to,
            "session transition"
        );
        self.status = to;
        self.closed_at_ms = Some(now_ms);
        Ok(())
    }

    /// Distinct verified guardians that qualify under the cached policy.
    pub(crate) fn qualified_count(&self) -> usize {
        quorum::qualified_count(&self.contributions, self.hardware_required)
    }

    /// Whether the qualified count has reached the threshold.
    pub(crate) fn quorum_satisfied(&self) -> bool {
        self.qualified_count() >= self.threshold
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id,
            family_id: self.family_id,
            operation: self.operation.clone(),
            status: self.status,
            threshold: self.threshold,
            guardian_count: self.guardians.len(),
            current_count: self.qualified_count(),
            satisfied: self.quorum_satisfied(),
            policy: self.policy,
            hardware_required: self.hardware_required,
            combiner_kind: self.combiner_kind,
            created_at_ms: self.created_at_ms,
            expires_at_ms: self.expires_at_ms,
            closed_at_ms: self.closed_at_ms,
            error_detail: self.error_detail.clone(),
        }
    }
}

/// Read-only view of a session, safe to hand to any caller.
///
/// Exposes counts but never other guardians' identities or material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Session identifier.
    pub session_id: SessionId,
    /// Owning family.
    pub family_id: FamilyId,
    /// Operation under authorization.
    pub operation: Operation,
    /// Current status.
    pub status: SessionStatus,
    /// Required threshold.
    pub threshold: usize,
    /// Size of the eligible guardian set.
    pub guardian_count: usize,
    /// Distinct qualified contributions so far.
    pub current_count: usize,
    /// Whether quorum is satisfied.
    pub satisfied: bool,
    /// Policy in effect, cached at creation.
    pub policy: MfaPolicy,
    /// Cached policy verdict for this operation.
    pub hardware_required: bool,
    /// Configured combining scheme.
    pub combiner_kind: CombinerKind,
    /// Creation time, epoch milliseconds.
    pub created_at_ms: u64,
    /// Expiry deadline, epoch milliseconds.
    pub expires_at_ms: u64,
    /// When the session reached a terminal state, if it has.
    pub closed_at_ms: Option<u64>,
    /// Failure detail for failed sessions.
    pub error_detail: Option<String>,
}
