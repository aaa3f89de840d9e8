//! The session registry: creation, contribution intake, expiry, and
//! finalization of signing sessions.

use crate::events::{EventPublisher, SessionEvent};
use crate::policy::MfaPolicy;
use crate::quorum::{self, QuorumUpdate};
use crate::reconstructor;
use crate::session::{SessionSnapshot, SessionState, SessionStatus};
use haven_core::{
    Clock, FamilyId, GuardianProfile, GuardianSet, HavenError, Operation, Result, SessionId,
};
use haven_crypto::{
    session_binding, CombinerKind, ContributionEnvelope, ContributionVerifier, SignedArtifact,
    TargetKey, VerificationOutcome,
};
use haven_journal::{AuditActor, AuditLog, AuditSeverity, AuditSubject};
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Everything needed to open a signing session.
#[derive(Debug, Clone)]
pub struct CreateSessionParams {
    /// Family that owns the session.
    pub family_id: FamilyId,
    /// Operation the quorum is asked to authorize.
    pub operation: Operation,
    /// Eligible guardians.
    pub guardians: Vec<GuardianProfile>,
    /// Required number of qualified contributions.
    pub threshold: usize,
    /// Hardware-factor policy, evaluated once at creation.
    pub policy: MfaPolicy,
    /// Which combining scheme the session uses.
    pub combiner: CombinerKind,
    /// Key the final artifact must verify against.
    pub target: TargetKey,
    /// Time-to-live before the session expires, milliseconds.
    pub ttl_ms: u64,
}

/// In-process registry of signing sessions.
///
/// Each session lives behind its own mutex inside the map, so submissions to
/// different sessions never contend while submissions to one session are
/// linearized. Finalization runs under the same per-session lock as the
/// contribution that triggered it, which is what makes it exactly-once.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<SessionState>>>>,
    journal: Arc<AuditLog>,
    clock: Arc<dyn Clock>,
    verifier: ContributionVerifier,
    events: EventPublisher,
}

impl SessionRegistry {
    /// Create a registry over the given journal and clock.
    pub fn new(journal: Arc<AuditLog>, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            journal,
            clock,
            verifier: ContributionVerifier,
            events: EventPublisher::new(),
        }
    }

    /// Subscribe to the best-effort session event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Open a new signing session.
    ///
    /// Validates `1 <= threshold <= min(|guardians|, MAX_THRESHOLD)` and that
    /// the guardian set is non-empty and duplicate-free; the binding digest
    /// every contribution must target is fixed here.
    pub fn create_signing_session(&self, params: CreateSessionParams) -> Result<SessionSnapshot> {
        let guardians = GuardianSet::new(params.guardians)?;
        let session_id = SessionId::new();
        let binding = session_binding(&session_id, &params.operation);
        let now_ms = self.clock.now_ms();

        let state = SessionState::new(
            session_id,
            params.family_id,
            params.operation,
            guardians,
            params.threshold,
            params.policy,
            params.combiner,
            params.target,
            binding,
            now_ms,
            params.ttl_ms,
        )?;
        let snapshot = state.snapshot();

        self.sessions
            .write()
            .insert(session_id, Arc::new(Mutex::new(state)));

        self.journal.record(
            "session.created",
            AuditSubject::Session(session_id),
            AuditActor::System,
            json!({
                "threshold": snapshot.threshold,
                "guardians": snapshot.guardian_count,
                "policy": snapshot.policy.to_string(),
                "combiner": snapshot.combiner_kind.to_string(),
                "expires_at_ms": snapshot.expires_at_ms,
            }),
            AuditSeverity::Info,
            now_ms,
        );
        self.events.publish(SessionEvent::Created { session_id });
        tracing::info!(
            session = %session_id,
            threshold = snapshot.threshold,
            guardians = snapshot.guardian_count,
            "signing session created"
        );
        Ok(snapshot)
    }

    /// Current snapshot of a session. Applies lazy expiry first, so a lapsed
    /// session reads as `Expired` even before any sweep runs.
    pub fn session(&self, session_id: &SessionId) -> Result<SessionSnapshot> {
        let slot = self.slot(session_id)?;
        let mut state = slot.lock();
        self.expire_if_lapsed(&mut state, self.clock.now_ms())?;
        Ok(state.snapshot())
    }

    /// Submit one guardian contribution.
    ///
    /// The full intake pipeline runs under the session's lock: lazy expiry,
    /// eligibility, cryptographic verification, policy, quorum accounting,
    /// and, if this contribution crosses the threshold, finalization.
    pub fn submit_contribution(
        &self,
        session_id: &SessionId,
        envelope: &ContributionEnvelope,
    ) -> Result<QuorumUpdate> {
        let slot = self.slot(session_id)?;
        let mut state = slot.lock();
        let now_ms = self.clock.now_ms();
        self.expire_if_lapsed(&mut state, now_ms)?;

        match state.status {
            SessionStatus::Pending => {}
            // A completed session acknowledges a valid late contribution
            // without letting it change the outcome.
            SessionStatus::Completed => return self.acknowledge_late(&state, envelope),
            SessionStatus::Expired => {
                return Err(HavenError::session_expired(format!(
                    "session {session_id} expired at {}",
                    state.expires_at_ms
                )));
            }
            SessionStatus::Failed => {
                return Err(HavenError::request_not_pending(format!(
                    "session {session_id} already failed"
                )));
            }
        }

        let profile = state.guardians.get(&envelope.guardian_id).cloned().ok_or_else(|| {
            self.journal.record(
                "contribution.unauthorized",
                AuditSubject::Session(*session_id),
                AuditActor::Guardian(envelope.guardian_id),
                json!({}),
                AuditSeverity::Warning,
                now_ms,
            );
            HavenError::unauthorized_guardian(format!(
                "guardian {} is not eligible for session {session_id}",
                envelope.guardian_id
            ))
        })?;

        let verified = match self.verifier.verify(envelope, &profile, &state.binding) {
            VerificationOutcome::Verified(verified) => verified,
            VerificationOutcome::Rejected { reason } => {
                self.journal.record(
                    "contribution.rejected",
                    AuditSubject::Session(*session_id),
                    AuditActor::Guardian(envelope.guardian_id),
                    json!({ "reason": reason }),
                    AuditSeverity::Warning,
                    now_ms,
                );
                return Err(HavenError::verification_failed(reason));
            }
        };

        let guardian_id = verified.guardian_id;
        let hardware_attested = verified.hardware_attested;
        let threshold = state.threshold;
        let hardware_required = state.hardware_required;
        let update = quorum::record(
            &mut state.contributions,
            verified,
            threshold,
            hardware_required,
        );

        // A hardware-required session holds an unattested contribution
        // without counting it, so an attested resubmission can upgrade it,
        // and tells the guardian the factor is mandatory.
        if state.hardware_required && !hardware_attested {
            self.journal.record(
                "contribution.factor_missing",
                AuditSubject::Session(*session_id),
                AuditActor::Guardian(guardian_id),
                json!({
                    "policy": state.policy.to_string(),
                    "current_count": update.current_count,
                }),
                AuditSeverity::Warning,
                now_ms,
            );
            return Err(HavenError::hardware_factor_required(format!(
                "session {session_id} policy is {}",
                state.policy
            )));
        }

        self.journal.record(
            "contribution.recorded",
            AuditSubject::Session(*session_id),
            AuditActor::Guardian(guardian_id),
            json!({
                "counted": update.counted,
                "current_count": update.current_count,
                "threshold": state.threshold,
            }),
            AuditSeverity::Info,
            now_ms,
        );
        self.events.publish(SessionEvent::ContributionRecorded {
            session_id: *session_id,
            guardian_id,
            current_count: update.current_count,
        });

        if update.satisfied {
            self.events.publish(SessionEvent::QuorumReached {
                session_id: *session_id,
                current_count: update.current_count,
            });
            self.finalize_locked(&mut state, now_ms)?;
        }
        Ok(update)
    }

    /// The verified artifact of a completed session.
    pub fn artifact(&self, session_id: &SessionId) -> Result<SignedArtifact> {
        let slot = self.slot(session_id)?;
        let state = slot.lock();
        match (&state.status, &state.artifact) {
            (SessionStatus::Completed, Some(artifact)) => Ok(artifact.clone()),
            (SessionStatus::Completed, None) => Err(HavenError::internal(format!(
                "completed session {session_id} holds no artifact"
            ))),
            (status, _) => Err(HavenError::request_not_pending(format!(
                "session {session_id} is {status}, no artifact available"
            ))),
        }
    }

    /// Sweep every pending session past its deadline into `Expired`.
    /// Returns how many sessions were expired.
    pub fn expire_stale_sessions(&self) -> usize {
        let now_ms = self.clock.now_ms();
        let slots: Vec<Arc<Mutex<SessionState>>> =
            self.sessions.read().values().cloned().collect();
        let mut expired = 0;
        for slot in slots {
            let mut state = slot.lock();
            if state.status == SessionStatus::Pending
                && now_ms >= state.expires_at_ms
                && self.mark_expired(&mut state, now_ms).is_ok()
            {
                expired += 1;
            }
        }
        if expired > 0 {
            tracing::info!(expired, "expiry sweep closed stale sessions");
        }
        expired
    }

    /// Snapshots of every session still pending.
    pub fn active_sessions(&self) -> Vec<SessionSnapshot> {
        let slots: Vec<Arc<Mutex<SessionState>>> =
            self.sessions.read().values().cloned().collect();
        let now_ms = self.clock.now_ms();
        let mut snapshots = Vec::new();
        for slot in slots {
            let mut state = slot.lock();
            let _ = self.expire_if_lapsed(&mut state, now_ms);
            if state.status == SessionStatus::Pending {
                snapshots.push(state.snapshot());
            }
        }
        snapshots.sort_by_key(|s| (s.created_at_ms, s.session_id));
        snapshots
    }

    /// Remove terminal sessions that closed before `cutoff_ms`. Pending
    /// sessions are never removed, whatever their age. Returns how many
    /// sessions were purged.
    pub fn purge_terminal_older_than(&self, cutoff_ms: u64) -> usize {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, slot| {
            let state = slot.lock();
            match state.closed_at_ms {
                Some(closed_at_ms) if state.status.is_terminal() => closed_at_ms >= cutoff_ms,
                _ => true,
            }
        });
        before - sessions.len()
    }

    fn slot(&self, session_id: &SessionId) -> Result<Arc<Mutex<SessionState>>> {
        self.sessions
            .read()
            .get(session_id)
            .cloned()
            .ok_or_else(|| HavenError::not_found(format!("no session {session_id}")))
    }

    /// Lazily move a pending session past its deadline to `Expired`.
    /// Callers then see the terminal status and refuse the operation
    /// the same way they would after a sweep.
    fn expire_if_lapsed(&self, state: &mut SessionState, now_ms: u64) -> Result<()> {
        if state.status == SessionStatus::Pending && now_ms >= state.expires_at_ms {
            self.mark_expired(state, now_ms)?;
        }
        Ok(())
    }

    fn mark_expired(&self, state: &mut SessionState, now_ms: u64) -> Result<()> {
        let session_id = state.session_id;
        state.transition(SessionStatus::Expired, now_ms)?;
        self.journal.record(
            "session.expired",
            AuditSubject::Session(session_id),
            AuditActor::System,
            json!({
                "expires_at_ms": state.expires_at_ms,
                "contributions": state.contributions.len(),
            }),
            AuditSeverity::Info,
            now_ms,
        );
        self.events.publish(SessionEvent::Expired { session_id });
        Ok(())
    }

    /// Verify a late envelope against a completed session and acknowledge it
    /// without touching the recorded outcome.
    fn acknowledge_late(
        &self,
        state: &SessionState,
        envelope: &ContributionEnvelope,
    ) -> Result<QuorumUpdate> {
        let profile = state.guardians.get(&envelope.guardian_id).ok_or_else(|| {
            HavenError::unauthorized_guardian(format!(
                "guardian {} is not eligible for session {}",
                envelope.guardian_id, state.session_id
            ))
        })?;
        match self.verifier.verify(envelope, profile, &state.binding) {
            VerificationOutcome::Verified(_) => {
                self.journal.record(
                    "contribution.late",
                    AuditSubject::Session(state.session_id),
                    AuditActor::Guardian(envelope.guardian_id),
                    json!({}),
                    AuditSeverity::Info,
                    self.clock.now_ms(),
                );
                Ok(QuorumUpdate {
                    accepted: true,
                    counted: false,
                    current_count: state.qualified_count(),
                    satisfied: true,
                })
            }
            VerificationOutcome::Rejected { reason } => {
                Err(HavenError::verification_failed(reason))
            }
        }
    }

    /// Finalize a session whose quorum just became satisfied. Runs under the
    /// per-session lock held by the caller.
    fn finalize_locked(&self, state: &mut SessionState, now_ms: u64) -> Result<()> {
        let session_id = state.session_id;
        match reconstructor::finalize(state, now_ms) {
            Ok(artifact) => {
                self.journal.record(
                    "session.completed",
                    AuditSubject::Session(session_id),
                    AuditActor::System,
                    json!({ "contributors": artifact.contributors().len() }),
                    AuditSeverity::Info,
                    now_ms,
                );
                self.events.publish(SessionEvent::Completed { session_id });
                Ok(())
            }
            Err(err) => {
                self.journal.record(
                    "session.failed",
                    AuditSubject::Session(session_id),
                    AuditActor::System,
                    json!({ "reason": err.to_string() }),
                    AuditSeverity::Critical,
                    now_ms,
                );
                self.events.publish(SessionEvent::Failed {
                    session_id,
                    reason: err.to_string(),
                });
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.sessions.read().len())
            .finish()
    }
}
