//! # Haven Journal
//!
//! Append-only audit log consumed by every other Haven component. Each
//! state transition and decision in the quorum core writes one
//! [`AuditEvent`]; events are immutable once recorded and outlive their
//! subject by a configurable retention window (90 days by default).
//!
//! The journal is storage-agnostic at its interface: this crate ships the
//! in-process implementation the registries use directly, and its event
//! shape maps one-to-one onto an append-only table for persistent backends.

#![forbid(unsafe_code)]

use haven_core::{GuardianId, RequestId, SessionId, UserId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Default retention window for audit events: 90 days.
pub const DEFAULT_RETENTION_MS: u64 = 90 * 24 * 60 * 60 * 1000;

/// Severity attached to an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditSeverity {
    /// Routine lifecycle transition.
    Info,
    /// Recorded failure that does not end the session (bad share, policy
    /// miss, duplicate vote).
    Warning,
    /// Fatal failure (reconstruction mismatch).
    Critical,
}

/// The session or request an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditSubject {
    /// A signing session.
    Session(SessionId),
    /// A recovery request.
    Request(RequestId),
}

/// Who caused an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditActor {
    /// A guardian submitting a contribution or vote.
    Guardian(GuardianId),
    /// A user or executor driving the workflow.
    User(UserId),
    /// The core itself (sweeps, finalization).
    System,
}

/// One immutable audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Monotonic sequence number within this journal.
    pub sequence: u64,
    /// Event kind, dotted lowercase (`session.created`, `recovery.executed`).
    pub kind: String,
    /// Session or request the event refers to.
    pub subject: AuditSubject,
    /// Who caused the event.
    pub actor: AuditActor,
    /// Structured detail. Never contains raw key material.
    pub payload: serde_json::Value,
    /// Severity of the event.
    pub severity: AuditSeverity,
    /// When the event was recorded, epoch milliseconds.
    pub recorded_at_ms: u64,
}

#[derive(Debug, Default)]
struct JournalState {
    events: Vec<AuditEvent>,
    next_sequence: u64,
}

/// Append-only, in-process audit log.
#[derive(Debug)]
pub struct AuditLog {
    state: RwLock<JournalState>,
    retention_ms: u64,
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLog {
    /// Create a journal with the default 90-day retention window.
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION_MS)
    }

    /// Create a journal with an explicit retention window.
    pub fn with_retention(retention_ms: u64) -> Self {
        Self {
            state: RwLock::new(JournalState::default()),
            retention_ms,
        }
    }

    /// Append one event and return its sequence number.
    pub fn record(
        &self,
        kind: impl Into<String>,
        subject: AuditSubject,
        actor: AuditActor,
        payload: serde_json::Value,
        severity: AuditSeverity,
        recorded_at_ms: u64,
    ) -> u64 {
        let kind = kind.into();
        let mut state = self.state.write();
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        if severity == AuditSeverity::Critical {
            tracing::error!(kind = %kind, sequence, "critical audit event");
        } else {
            tracing::debug!(kind = %kind, sequence, "audit event");
        }
        state.events.push(AuditEvent {
            sequence,
            kind,
            subject,
            actor,
            payload,
            severity,
            recorded_at_ms,
        });
        sequence
    }

    /// All events for one subject, in recording order.
    pub fn events_for(&self, subject: AuditSubject) -> Vec<AuditEvent> {
        self.state
            .read()
            .events
            .iter()
            .filter(|event| event.subject == subject)
            .cloned()
            .collect()
    }

    /// Snapshot of every retained event.
    pub fn all_events(&self) -> Vec<AuditEvent> {
        self.state.read().events.clone()
    }

    /// Number of retained events.
    pub fn len(&self) -> usize {
        self.state.read().events.len()
    }

    /// Whether the journal holds no events.
    pub fn is_empty(&self) -> bool {
        self.state.read().events.is_empty()
    }

    /// Drop events older than the retention window. Returns how many were
    /// purged. Sequence numbers are never reused.
    pub fn purge_expired(&self, now_ms: u64) -> usize {
        let cutoff = now_ms.saturating_sub(self.retention_ms);
        let mut state = self.state.write();
        let before = state.events.len();
        state.events.retain(|event| event.recorded_at_ms >= cutoff);
        let purged = before - state.events.len();
        if purged > 0 {
            tracing::info!(purged, "purged audit events past retention");
        }
        purged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn session_subject() -> AuditSubject {
        AuditSubject::Session(SessionId::new())
    }

    #[test]
    fn sequences_are_monotonic() {
        let journal = AuditLog::new();
        let subject = session_subject();
        let first = journal.record(
            "session.created",
            subject,
            AuditActor::System,
            json!({}),
            AuditSeverity::Info,
            1_000,
        );
        let second = journal.record(
            "session.completed",
            subject,
            AuditActor::System,
            json!({}),
            AuditSeverity::Info,
            2_000,
        );
        assert_eq!(first, 0);
        assert_eq!(second, 1);
    }

    #[test]
    fn events_filter_by_subject() {
        let journal = AuditLog::new();
        let ours = session_subject();
        let theirs = session_subject();
        journal.record(
            "session.created",
            ours,
            AuditActor::System,
            json!({}),
            AuditSeverity::Info,
            1,
        );
        journal.record(
            "session.created",
            theirs,
            AuditActor::System,
            json!({}),
            AuditSeverity::Info,
            2,
        );
        assert_eq!(journal.events_for(ours).len(), 1);
        assert_eq!(journal.len(), 2);
    }

    #[test]
    fn purge_respects_retention_window() {
        let journal = AuditLog::with_retention(1_000);
        let subject = session_subject();
        journal.record(
            "session.created",
            subject,
            AuditActor::System,
            json!({}),
            AuditSeverity::Info,
            100,
        );
        journal.record(
            "session.completed",
            subject,
            AuditActor::System,
            json!({}),
            AuditSeverity::Info,
            5_000,
        );

        // Retention keeps the recent event, drops the old one
        assert_eq!(journal.purge_expired(5_500), 1);
        let remaining = journal.all_events();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].kind, "session.completed");

        // Sequence numbers continue past purges
        let next = journal.record(
            "session.expired",
            subject,
            AuditActor::System,
            json!({}),
            AuditSeverity::Info,
            6_000,
        );
        assert_eq!(next, 2);
    }

    #[test]
    fn purge_inside_window_is_a_no_op() {
        let journal = AuditLog::with_retention(DEFAULT_RETENTION_MS);
        journal.record(
            "session.created",
            session_subject(),
            AuditActor::System,
            json!({}),
            AuditSeverity::Info,
            1_000,
        );
        assert_eq!(journal.purge_expired(2_000), 0);
        assert_eq!(journal.len(), 1);
    }
}
