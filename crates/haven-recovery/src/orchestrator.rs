//! The recovery orchestrator: request intake, guardian voting, and
//! exactly-once execution.

use crate::attempts::{AttemptTracker, AttemptVerdict};
use crate::request::{
    ApprovalDecision, RecoveryApproval, RecoveryKind, RecoveryMethod, RecoveryOutcome,
    RecoveryRequest, RequestSnapshot, RequestStatus, SubjectRole, Urgency,
};
use haven_core::{
    Clock, FamilyId, GuardianId, GuardianProfile, GuardianSet, HavenError, RequestId, Result,
    UserId, MAX_THRESHOLD,
};
use haven_journal::{AuditActor, AuditLog, AuditSeverity, AuditSubject};
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

/// Orchestrator-wide policy knobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveryPolicy {
    /// When set, this many distinct declines terminally reject a pending
    /// request. When unset, declines are advisory: they are recorded and
    /// audited but never block approval.
    pub rejection_threshold: Option<usize>,
}

/// Everything needed to open a recovery request.
#[derive(Debug, Clone)]
pub struct CreateRequestParams {
    /// Whose signing capability is being recovered.
    pub subject: UserId,
    /// The subject's role in the family.
    pub subject_role: SubjectRole,
    /// Owning family, when the subject belongs to one.
    pub family_id: Option<FamilyId>,
    /// Why recovery is requested.
    pub kind: RecoveryKind,
    /// Requested urgency.
    pub urgency: Urgency,
    /// Human-readable justification for the guardians.
    pub justification: String,
    /// Execution mechanism.
    pub method: RecoveryMethod,
    /// Guardians eligible to vote.
    pub guardians: Vec<GuardianProfile>,
    /// Distinct approvals required.
    pub required_approvals: usize,
    /// Time-to-live before the request expires, milliseconds.
    pub ttl_ms: u64,
}

/// In-process orchestrator for recovery requests.
///
/// Mirrors the session registry's locking discipline: each request lives
/// behind its own mutex, votes and execution are linearized per request,
/// and the `Approved -> Completed` transition under that lock is what makes
/// execution exactly-once.
pub struct RecoveryOrchestrator {
    requests: RwLock<HashMap<RequestId, Arc<Mutex<RecoveryRequest>>>>,
    journal: Arc<AuditLog>,
    clock: Arc<dyn Clock>,
    policy: RecoveryPolicy,
    attempts: AttemptTracker,
}

impl RecoveryOrchestrator {
    /// Create an orchestrator with the default (advisory-rejection) policy.
    pub fn new(journal: Arc<AuditLog>, clock: Arc<dyn Clock>) -> Self {
        Self::with_policy(journal, clock, RecoveryPolicy::default())
    }

    /// Create an orchestrator with an explicit policy.
    pub fn with_policy(
        journal: Arc<AuditLog>,
        clock: Arc<dyn Clock>,
        policy: RecoveryPolicy,
    ) -> Self {
        Self {
            requests: RwLock::new(HashMap::new()),
            journal,
            clock,
            policy,
            attempts: AttemptTracker::default(),
        }
    }

    /// Replace the attempt tracker, for tighter windows in tests or
    /// stricter deployments.
    pub fn with_attempt_tracker(mut self, attempts: AttemptTracker) -> Self {
        self.attempts = attempts;
        self
    }

    /// Open a recovery request.
    ///
    /// Counts an attempt against the subject first: a subject in cool-down
    /// is refused regardless of the request's own validity.
    pub fn create_request(&self, params: CreateRequestParams) -> Result<RequestSnapshot> {
        let now_ms = self.clock.now_ms();
        if let AttemptVerdict::CoolingDown { until_ms } =
            self.attempts.note_attempt(params.subject, now_ms)
        {
            return Err(HavenError::cooldown_active(format!(
                "recovery for subject {} refused until {until_ms}",
                params.subject
            )));
        }

        let guardians = GuardianSet::new(params.guardians)?;
        if params.required_approvals < 1 {
            return Err(HavenError::invalid_threshold(
                "at least one approval is required",
            ));
        }
        if params.required_approvals > guardians.len() {
            return Err(HavenError::invalid_threshold(format!(
                "required approvals {} exceed guardian count {}",
                params.required_approvals,
                guardians.len()
            )));
        }
        if params.required_approvals > MAX_THRESHOLD {
            return Err(HavenError::invalid_threshold(format!(
                "required approvals {} exceed the practical cap of {MAX_THRESHOLD}",
                params.required_approvals
            )));
        }

        let request_id = RequestId::new();
        let request = RecoveryRequest {
            request_id,
            subject: params.subject,
            subject_role: params.subject_role,
            family_id: params.family_id,
            kind: params.kind,
            urgency: params.urgency,
            justification: params.justification,
            method: params.method,
            guardians,
            required_approvals: params.required_approvals,
            status: RequestStatus::Pending,
            created_at_ms: now_ms,
            expires_at_ms: now_ms.saturating_add(params.ttl_ms),
            closed_at_ms: None,
            votes: HashMap::new(),
            outcome: None,
        };
        let snapshot = request.snapshot();

        self.requests
            .write()
            .insert(request_id, Arc::new(Mutex::new(request)));

        self.journal.record(
            "recovery.created",
            AuditSubject::Request(request_id),
            AuditActor::User(snapshot.subject),
            json!({
                "kind": format!("{:?}", snapshot.kind),
                "urgency": format!("{:?}", snapshot.urgency),
                "required_approvals": snapshot.required_approvals,
                "guardians": snapshot.guardian_count,
                "expires_at_ms": snapshot.expires_at_ms,
            }),
            AuditSeverity::Info,
            now_ms,
        );
        tracing::info!(
            request = %request_id,
            subject = %snapshot.subject,
            required = snapshot.required_approvals,
            "recovery request created"
        );
        Ok(snapshot)
    }

    /// Current snapshot of a request, after lazy expiry.
    pub fn request(&self, request_id: &RequestId) -> Result<RequestSnapshot> {
        let slot = self.slot(request_id)?;
        let mut request = slot.lock();
        self.expire_if_lapsed(&mut request, self.clock.now_ms())?;
        Ok(request.snapshot())
    }

    /// Record one guardian's vote.
    ///
    /// A guardian votes at most once per request, approve or decline alike.
    /// The approval count is recomputed from the vote rows and the request
    /// transitions to `Approved` exactly when the threshold is first
    /// crossed.
    pub fn submit_approval(
        &self,
        request_id: &RequestId,
        guardian_id: GuardianId,
        decision: ApprovalDecision,
        note: Option<String>,
    ) -> Result<RequestSnapshot> {
        let slot = self.slot(request_id)?;
        let mut request = slot.lock();
        let now_ms = self.clock.now_ms();
        self.expire_if_lapsed(&mut request, now_ms)?;

        if request.status != RequestStatus::Pending {
            return Err(HavenError::request_not_pending(format!(
                "request {request_id} is {}, votes are closed",
                request.status
            )));
        }
        if !request.guardians.contains(&guardian_id) {
            self.journal.record(
                "recovery.vote_unauthorized",
                AuditSubject::Request(*request_id),
                AuditActor::Guardian(guardian_id),
                json!({}),
                AuditSeverity::Warning,
                now_ms,
            );
            return Err(HavenError::unauthorized_guardian(format!(
                "guardian {guardian_id} may not vote on request {request_id}"
            )));
        }
        if request.votes.contains_key(&guardian_id) {
            self.journal.record(
                "recovery.vote_duplicate",
                AuditSubject::Request(*request_id),
                AuditActor::Guardian(guardian_id),
                json!({}),
                AuditSeverity::Warning,
                now_ms,
            );
            return Err(HavenError::duplicate_vote(format!(
                "guardian {guardian_id} already voted on request {request_id}"
            )));
        }

        request.votes.insert(
            guardian_id,
            RecoveryApproval {
                guardian_id,
                decision,
                note,
                voted_at_ms: now_ms,
            },
        );
        self.journal.record(
            "recovery.vote",
            AuditSubject::Request(*request_id),
            AuditActor::Guardian(guardian_id),
            json!({
                "decision": format!("{decision:?}"),
                "approvals": request.current_approvals(),
                "declines": request.current_declines(),
            }),
            AuditSeverity::Info,
            now_ms,
        );

        if request.current_approvals() >= request.required_approvals {
            request.transition(RequestStatus::Approved, now_ms)?;
            self.journal.record(
                "recovery.approved",
                AuditSubject::Request(*request_id),
                AuditActor::System,
                json!({ "approvals": request.current_approvals() }),
                AuditSeverity::Info,
                now_ms,
            );
        } else if let Some(rejection_threshold) = self.policy.rejection_threshold {
            if request.current_declines() >= rejection_threshold {
                request.transition(RequestStatus::Rejected, now_ms)?;
                self.journal.record(
                    "recovery.rejected",
                    AuditSubject::Request(*request_id),
                    AuditActor::System,
                    json!({ "declines": request.current_declines() }),
                    AuditSeverity::Warning,
                    now_ms,
                );
            }
        }
        Ok(request.snapshot())
    }

    /// Execute an approved request, exactly once.
    ///
    /// The first caller to reach an `Approved` request under its lock runs
    /// `action` and records the outcome; every later caller gets the cached
    /// outcome back without `action` running again. A failed action leaves
    /// the request `Approved` so execution can be retried.
    pub fn execute<F>(
        &self,
        request_id: &RequestId,
        executor_id: UserId,
        action: F,
    ) -> Result<RecoveryOutcome>
    where
        F: FnOnce(&RequestSnapshot) -> Result<serde_json::Value>,
    {
        let slot = self.slot(request_id)?;
        let mut request = slot.lock();
        let now_ms = self.clock.now_ms();

        match request.status {
            RequestStatus::Completed => {
                // Idempotent read-through of the recorded outcome.
                return request.outcome.clone().ok_or_else(|| {
                    HavenError::internal(format!(
                        "completed request {request_id} holds no outcome"
                    ))
                });
            }
            RequestStatus::Approved => {}
            status => {
                return Err(HavenError::request_not_pending(format!(
                    "request {request_id} is {status}, not approved"
                )));
            }
        }

        let result = action(&request.snapshot())?;
        let outcome = RecoveryOutcome {
            executed_by: executor_id,
            result,
            executed_at_ms: now_ms,
        };
        request.outcome = Some(outcome.clone());
        request.transition(RequestStatus::Completed, now_ms)?;

        self.journal.record(
            "recovery.executed",
            AuditSubject::Request(*request_id),
            AuditActor::User(executor_id),
            json!({ "method": format!("{:?}", request.method) }),
            AuditSeverity::Info,
            now_ms,
        );
        tracing::info!(
            request = %request_id,
            executor = %executor_id,
            "recovery executed"
        );
        Ok(outcome)
    }

    /// Sweep every pending request past its deadline into `Expired`.
    /// Returns how many requests were expired.
    pub fn expire_stale_requests(&self) -> usize {
        let now_ms = self.clock.now_ms();
        let slots: Vec<Arc<Mutex<RecoveryRequest>>> =
            self.requests.read().values().cloned().collect();
        let mut expired = 0;
        for slot in slots {
            let mut request = slot.lock();
            if request.status == RequestStatus::Pending
                && now_ms >= request.expires_at_ms
                && self.mark_expired(&mut request, now_ms).is_ok()
            {
                expired += 1;
            }
        }
        if expired > 0 {
            tracing::info!(expired, "expiry sweep closed stale recovery requests");
        }
        expired
    }

    /// Snapshots of every request still collecting votes or awaiting
    /// execution.
    pub fn open_requests(&self) -> Vec<RequestSnapshot> {
        let slots: Vec<Arc<Mutex<RecoveryRequest>>> =
            self.requests.read().values().cloned().collect();
        let now_ms = self.clock.now_ms();
        let mut snapshots = Vec::new();
        for slot in slots {
            let mut request = slot.lock();
            let _ = self.expire_if_lapsed(&mut request, now_ms);
            if !request.status.is_terminal() {
                snapshots.push(request.snapshot());
            }
        }
        snapshots.sort_by_key(|s| (s.created_at_ms, s.request_id));
        snapshots
    }

    /// Remove terminal requests that closed before `cutoff_ms`. Pending and
    /// approved requests are never removed, whatever their age. Returns how
    /// many requests were purged.
    pub fn purge_terminal_older_than(&self, cutoff_ms: u64) -> usize {
        let mut requests = self.requests.write();
        let before = requests.len();
        requests.retain(|_, slot| {
            let request = slot.lock();
            match request.closed_at_ms {
                Some(closed_at_ms) if request.status.is_terminal() => closed_at_ms >= cutoff_ms,
                _ => true,
            }
        });
        let purged = before - requests.len();
        if purged > 0 {
            tracing::info!(purged, "purged terminal recovery requests past retention");
        }
        purged
    }

    fn slot(&self, request_id: &RequestId) -> Result<Arc<Mutex<RecoveryRequest>>> {
        self.requests
            .read()
            .get(request_id)
            .cloned()
            .ok_or_else(|| HavenError::not_found(format!("no recovery request {request_id}")))
    }

    fn expire_if_lapsed(&self, request: &mut RecoveryRequest, now_ms: u64) -> Result<()> {
        if request.status == RequestStatus::Pending && now_ms >= request.expires_at_ms {
            self.mark_expired(request, now_ms)?;
        }
        Ok(())
    }

    fn mark_expired(&self, request: &mut RecoveryRequest, now_ms: u64) -> Result<()> {
        let request_id = request.request_id;
        request.transition(RequestStatus::Expired, now_ms)?;
        self.journal.record(
            "recovery.expired",
            AuditSubject::Request(request_id),
            AuditActor::System,
            json!({
                "approvals": request.current_approvals(),
                "required": request.required_approvals,
            }),
            AuditSeverity::Info,
            now_ms,
        );
        Ok(())
    }
}

impl std::fmt::Debug for RecoveryOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryOrchestrator")
            .field("requests", &self.requests.read().len())
            .field("policy", &self.policy)
            .finish()
    }
}
