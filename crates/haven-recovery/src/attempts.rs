//! Rolling-window attempt tracking per recovery subject.
//!
//! Counts request attempts independently of any request's own state: a
//! subject spamming individually-valid requests trips a cool-down even
//! though each request on its own would be accepted.

use haven_core::UserId;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

/// Default rolling window: 1 hour.
pub const DEFAULT_WINDOW_MS: u64 = 60 * 60 * 1000;
/// Default attempts allowed inside the window before the cool-down trips.
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;
/// Default cool-down once tripped: 24 hours.
pub const DEFAULT_COOLDOWN_MS: u64 = 24 * 60 * 60 * 1000;

/// Verdict for one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptVerdict {
    /// The attempt is allowed; `attempts_in_window` includes it.
    Allowed {
        /// Attempts recorded inside the current window, this one included.
        attempts_in_window: usize,
    },
    /// The subject is cooling down; the attempt was not recorded.
    CoolingDown {
        /// When the cool-down lifts, epoch milliseconds.
        until_ms: u64,
    },
}

impl AttemptVerdict {
    /// Whether the attempt may proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, AttemptVerdict::Allowed { .. })
    }
}

#[derive(Debug, Default)]
struct SubjectAttempts {
    /// Attempt timestamps inside the rolling window, oldest first.
    timestamps: VecDeque<u64>,
    cooldown_until_ms: Option<u64>,
}

/// Per-subject attempt counter with a rolling window and cool-down.
#[derive(Debug)]
pub struct AttemptTracker {
    window_ms: u64,
    max_attempts: usize,
    cooldown_ms: u64,
    subjects: Mutex<HashMap<UserId, SubjectAttempts>>,
}

impl Default for AttemptTracker {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_MS, DEFAULT_MAX_ATTEMPTS, DEFAULT_COOLDOWN_MS)
    }
}

impl AttemptTracker {
    /// Create a tracker with explicit window, attempt cap, and cool-down.
    pub fn new(window_ms: u64, max_attempts: usize, cooldown_ms: u64) -> Self {
        Self {
            window_ms,
            max_attempts,
            cooldown_ms,
            subjects: Mutex::new(HashMap::new()),
        }
    }

    /// Record one attempt for `subject` at `now_ms` and report whether it
    /// may proceed. Crossing the cap records the attempt and starts the
    /// cool-down; attempts during a cool-down are refused without being
    /// recorded.
    pub fn note_attempt(&self, subject: UserId, now_ms: u64) -> AttemptVerdict {
        let mut subjects = self.subjects.lock();
        let entry = subjects.entry(subject).or_default();

        if let Some(until_ms) = entry.cooldown_until_ms {
            if now_ms < until_ms {
                return AttemptVerdict::CoolingDown { until_ms };
            }
            entry.cooldown_until_ms = None;
            entry.timestamps.clear();
        }

        let cutoff = now_ms.saturating_sub(self.window_ms);
        while entry.timestamps.front().is_some_and(|&t| t < cutoff) {
            entry.timestamps.pop_front();
        }

        entry.timestamps.push_back(now_ms);
        let attempts_in_window = entry.timestamps.len();
        if attempts_in_window > self.max_attempts {
            let until_ms = now_ms.saturating_add(self.cooldown_ms);
            entry.cooldown_until_ms = Some(until_ms);
            tracing::warn!(
                subject = %subject,
                attempts = attempts_in_window,
                until_ms,
                "recovery attempt cap exceeded, cool-down started"
            );
            return AttemptVerdict::CoolingDown { until_ms };
        }
        AttemptVerdict::Allowed { attempts_in_window }
    }

    /// Attempts currently inside the window for `subject`, without
    /// recording one.
    pub fn attempts_in_window(&self, subject: &UserId, now_ms: u64) -> usize {
        let subjects = self.subjects.lock();
        let Some(entry) = subjects.get(subject) else {
            return 0;
        };
        let cutoff = now_ms.saturating_sub(self.window_ms);
        entry.timestamps.iter().filter(|&&t| t >= cutoff).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn tracker() -> AttemptTracker {
        AttemptTracker::new(1_000, 2, 10_000)
    }

    #[test]
    fn attempts_under_the_cap_are_allowed() {
        let tracker = tracker();
        let subject = UserId::from_seed(1);
        assert_matches!(
            tracker.note_attempt(subject, 100),
            AttemptVerdict::Allowed {
                attempts_in_window: 1
            }
        );
        assert_matches!(
            tracker.note_attempt(subject, 200),
            AttemptVerdict::Allowed {
                attempts_in_window: 2
            }
        );
    }

    #[test]
    fn exceeding_the_cap_starts_a_cooldown() {
        let tracker = tracker();
        let subject = UserId::from_seed(1);
        tracker.note_attempt(subject, 100);
        tracker.note_attempt(subject, 200);
        assert_matches!(
            tracker.note_attempt(subject, 300),
            AttemptVerdict::CoolingDown { until_ms: 10_300 }
        );
        // Still refused mid-cool-down, even though the window has rolled.
        assert_matches!(
            tracker.note_attempt(subject, 5_000),
            AttemptVerdict::CoolingDown { until_ms: 10_300 }
        );
        // Fresh start once the cool-down lifts.
        assert_matches!(
            tracker.note_attempt(subject, 10_300),
            AttemptVerdict::Allowed {
                attempts_in_window: 1
            }
        );
    }

    #[test]
    fn window_rolls_old_attempts_out() {
        let tracker = tracker();
        let subject = UserId::from_seed(1);
        tracker.note_attempt(subject, 100);
        tracker.note_attempt(subject, 200);
        // Both earlier attempts are outside the window by now.
        assert_matches!(
            tracker.note_attempt(subject, 1_500),
            AttemptVerdict::Allowed {
                attempts_in_window: 1
            }
        );
    }

    #[test]
    fn subjects_are_tracked_independently() {
        let tracker = tracker();
        tracker.note_attempt(UserId::from_seed(1), 100);
        tracker.note_attempt(UserId::from_seed(1), 150);
        tracker.note_attempt(UserId::from_seed(1), 200);
        assert!(tracker.note_attempt(UserId::from_seed(2), 250).is_allowed());
        assert_eq!(tracker.attempts_in_window(&UserId::from_seed(2), 300), 1);
    }
}
