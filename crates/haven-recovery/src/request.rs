//! Recovery request data model.

use haven_core::{
    FamilyId, GuardianId, GuardianSet, HavenError, RequestId, Result, UserId,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Why recovery is being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryKind {
    /// The subject lost access to their signing key.
    LostKey,
    /// The subject is locked out of their account or devices.
    Lockout,
    /// Funds or capability needed urgently while the subject is unavailable.
    EmergencyAccess,
}

/// How urgent the guardians should treat the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Urgency {
    /// No time pressure.
    Low,
    /// Default urgency.
    Normal,
    /// Prompt attention requested.
    High,
    /// Immediate attention requested.
    Critical,
}

/// Which mechanism execution will use once approved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryMethod {
    /// Reconstruct the subject's key from guardian-held shares.
    ShareReconstruction,
    /// Issue a fresh credential and retire the lost one.
    CredentialReissue,
}

/// The subject's role in the owning family, carried for guardian context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubjectRole {
    /// Family owner or administrator.
    Owner,
    /// Regular member.
    Member,
}

/// Lifecycle status of a recovery request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    /// Collecting guardian votes.
    Pending,
    /// Approval threshold crossed; awaiting execution.
    Approved,
    /// Blocking rejection threshold crossed.
    Rejected,
    /// Executed exactly once; outcome cached.
    Completed,
    /// The ttl elapsed with insufficient approvals.
    Expired,
}

impl RequestStatus {
    /// Whether this status admits no further votes or transitions besides
    /// `Approved -> Completed`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Rejected | RequestStatus::Completed | RequestStatus::Expired
        )
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestStatus::Pending => write!(f, "pending"),
            RequestStatus::Approved => write!(f, "approved"),
            RequestStatus::Rejected => write!(f, "rejected"),
            RequestStatus::Completed => write!(f, "completed"),
            RequestStatus::Expired => write!(f, "expired"),
        }
    }
}

/// A guardian's vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalDecision {
    /// The guardian approves the recovery.
    Approve,
    /// The guardian declines it.
    Decline,
}

/// One guardian's recorded vote on a request. At most one per
/// (request, guardian).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryApproval {
    /// Voting guardian.
    pub guardian_id: GuardianId,
    /// Approve or decline.
    pub decision: ApprovalDecision,
    /// Optional note for the audit trail.
    pub note: Option<String>,
    /// When the vote was recorded, epoch milliseconds.
    pub voted_at_ms: u64,
}

/// Cached result of the exactly-once execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryOutcome {
    /// Who performed the execution.
    pub executed_by: UserId,
    /// Result payload produced by the recovery action. Never raw key
    /// material.
    pub result: serde_json::Value,
    /// When execution happened, epoch milliseconds.
    pub executed_at_ms: u64,
}

/// Full per-request state. Lives behind the orchestrator's per-request
/// mutex.
#[derive(Debug)]
pub(crate) struct RecoveryRequest {
    pub(crate) request_id: RequestId,
    pub(crate) subject: UserId,
    pub(crate) subject_role: SubjectRole,
    pub(crate) family_id: Option<FamilyId>,
    pub(crate) kind: RecoveryKind,
    pub(crate) urgency: Urgency,
    pub(crate) justification: String,
    pub(crate) method: RecoveryMethod,
    pub(crate) guardians: GuardianSet,
    pub(crate) required_approvals: usize,
    pub(crate) status: RequestStatus,
    pub(crate) created_at_ms: u64,
    pub(crate) expires_at_ms: u64,
    pub(crate) closed_at_ms: Option<u64>,
    /// One vote per guardian; the count of `Approve` decisions is always
    /// derived from this map, never stored.
    pub(crate) votes: HashMap<GuardianId, RecoveryApproval>,
    pub(crate) outcome: Option<RecoveryOutcome>,
}

impl RecoveryRequest {
    /// Distinct guardians that approved. This is the only source of the
    /// approval count.
    pub(crate) fn current_approvals(&self) -> usize {
        self.votes
            .values()
            .filter(|vote| vote.decision == ApprovalDecision::Approve)
            .count()
    }

    /// Distinct guardians that declined.
    pub(crate) fn current_declines(&self) -> usize {
        self.votes
            .values()
            .filter(|vote| vote.decision == ApprovalDecision::Decline)
            .count()
    }

    /// Move to a new status. `Pending` may move anywhere terminal or to
    /// `Approved`; `Approved` may only complete.
    pub(crate) fn transition(&mut self, to: RequestStatus, now_ms: u64) -> Result<()> {
        let legal = matches!(
            (self.status, to),
            (RequestStatus::Pending, RequestStatus::Approved)
                | (RequestStatus::Pending, RequestStatus::Rejected)
                | (RequestStatus::Pending, RequestStatus::Expired)
                | (RequestStatus::Approved, RequestStatus::Completed)
        );
        if !legal {
            return Err(HavenError::internal(format!(
                "illegal transition {} -> {} for request {}",
                self.status, to, self.request_id
            )));
        }
        tracing::info!(
            request = %self.request_id,
            from = %self.status,
            to = %to,
            "recovery request transition"
        );
        self.status = to;
        if to.is_terminal() {
            self.closed_at_ms = Some(now_ms);
        }
        Ok(())
    }

    pub(crate) fn snapshot(&self) -> RequestSnapshot {
        RequestSnapshot {
            request_id: self.request_id,
            subject: self.subject,
            subject_role: self.subject_role,
            family_id: self.family_id,
            kind: self.kind,
            urgency: self.urgency,
            justification: self.justification.clone(),
            method: self.method,
            status: self.status,
            required_approvals: self.required_approvals,
            current_approvals: self.current_approvals(),
            current_declines: self.current_declines(),
            guardian_count: self.guardians.len(),
            created_at_ms: self.created_at_ms,
            expires_at_ms: self.expires_at_ms,
            closed_at_ms: self.closed_at_ms,
            outcome: self.outcome.clone(),
        }
    }
}

/// Read-only view of a recovery request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSnapshot {
    /// Request identifier.
    pub request_id: RequestId,
    /// Whose capability is being recovered.
    pub subject: UserId,
    /// The subject's role in the family.
    pub subject_role: SubjectRole,
    /// Owning family, when the subject belongs to one.
    pub family_id: Option<FamilyId>,
    /// Why recovery was requested.
    pub kind: RecoveryKind,
    /// Requested urgency.
    pub urgency: Urgency,
    /// Human-readable justification for the guardians.
    pub justification: String,
    /// Execution mechanism.
    pub method: RecoveryMethod,
    /// Current status.
    pub status: RequestStatus,
    /// Approvals needed.
    pub required_approvals: usize,
    /// Derived count of distinct approving guardians.
    pub current_approvals: usize,
    /// Derived count of distinct declining guardians.
    pub current_declines: usize,
    /// Size of the eligible guardian set.
    pub guardian_count: usize,
    /// Creation time, epoch milliseconds.
    pub created_at_ms: u64,
    /// Expiry deadline, epoch milliseconds.
    pub expires_at_ms: u64,
    /// When the request reached a terminal state, if it has.
    pub closed_at_ms: Option<u64>,
    /// Cached execution outcome for completed requests.
    pub outcome: Option<RecoveryOutcome>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use haven_core::GuardianProfile;

    fn request() -> RecoveryRequest {
        let guardians = GuardianSet::new(
            (1..=3)
                .map(|seed| GuardianProfile::new(GuardianId::from_seed(seed), "g", [seed; 32]))
                .collect(),
        )
        .unwrap();
        RecoveryRequest {
            request_id: RequestId::new(),
            subject: UserId::from_seed(1),
            subject_role: SubjectRole::Member,
            family_id: None,
            kind: RecoveryKind::LostKey,
            urgency: Urgency::Normal,
            justification: "lost phone".into(),
            method: RecoveryMethod::CredentialReissue,
            guardians,
            required_approvals: 2,
            status: RequestStatus::Pending,
            created_at_ms: 1_000,
            expires_at_ms: 61_000,
            closed_at_ms: None,
            votes: HashMap::new(),
            outcome: None,
        }
    }

    fn vote(seed: u8, decision: ApprovalDecision) -> RecoveryApproval {
        RecoveryApproval {
            guardian_id: GuardianId::from_seed(seed),
            decision,
            note: None,
            voted_at_ms: 1_100,
        }
    }

    #[test]
    fn approval_count_is_derived_from_votes() {
        let mut request = request();
        assert_eq!(request.current_approvals(), 0);
        request
            .votes
            .insert(GuardianId::from_seed(1), vote(1, ApprovalDecision::Approve));
        request
            .votes
            .insert(GuardianId::from_seed(2), vote(2, ApprovalDecision::Decline));
        assert_eq!(request.current_approvals(), 1);
        assert_eq!(request.current_declines(), 1);
    }

    #[test]
    fn approved_may_only_complete() {
        let mut request = request();
        request.transition(RequestStatus::Approved, 2_000).unwrap();
        assert_matches!(
            request.transition(RequestStatus::Expired, 3_000),
            Err(HavenError::Internal { .. })
        );
        request.transition(RequestStatus::Completed, 3_000).unwrap();
        assert_eq!(request.closed_at_ms, Some(3_000));
    }

    #[test]
    fn terminal_statuses_are_frozen() {
        let mut request = request();
        request.transition(RequestStatus::Expired, 2_000).unwrap();
        assert_matches!(
            request.transition(RequestStatus::Approved, 3_000),
            Err(HavenError::Internal { .. })
        );
    }
}
