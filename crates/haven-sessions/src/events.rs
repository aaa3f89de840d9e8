//! Push notifications for session progress.
//!
//! Callers that would otherwise poll `GetSessionStatus` can subscribe to a
//! broadcast stream instead. Delivery is best-effort: the registry never
//! blocks on slow or absent subscribers.

use haven_core::{GuardianId, SessionId};
use tokio::sync::broadcast;

/// Capacity of the broadcast channel; laggy subscribers miss old events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A session lifecycle notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A session was created and is collecting contributions.
    Created {
        /// The new session.
        session_id: SessionId,
    },
    /// A verified contribution was recorded.
    ContributionRecorded {
        /// The session contributed to.
        session_id: SessionId,
        /// Contributing guardian.
        guardian_id: GuardianId,
        /// Qualified distinct-guardian count after recording.
        current_count: usize,
    },
    /// The qualified count first reached the threshold.
    QuorumReached {
        /// The session that reached quorum.
        session_id: SessionId,
        /// Count at the moment quorum was reached.
        current_count: usize,
    },
    /// Finalization produced a verified artifact.
    Completed {
        /// The completed session.
        session_id: SessionId,
    },
    /// Finalization failed; the session is terminally failed.
    Failed {
        /// The failed session.
        session_id: SessionId,
        /// Human-readable failure detail.
        reason: String,
    },
    /// The session expired before quorum.
    Expired {
        /// The expired session.
        session_id: SessionId,
    },
}

/// Best-effort broadcast publisher used by the registry.
#[derive(Debug)]
pub(crate) struct EventPublisher {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventPublisher {
    pub(crate) fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    pub(crate) fn publish(&self, event: SessionEvent) {
        // A send error only means there are no subscribers right now.
        let _ = self.sender.send(event);
    }
}
