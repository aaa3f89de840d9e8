//! Operation payloads for signing sessions.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The operation a signing session produces a signature over.
///
/// The message bytes are opaque to the core (an event template, a PSBT, a
/// bare challenge). The declared value drives the `RequiredForHighValue`
/// hardware-factor policy and is fixed at session creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Human-readable label for operator UX and audit payloads.
    pub label: String,
    /// Opaque message bytes to be signed.
    pub message: Vec<u8>,
    /// Declared value of the operation in satoshis.
    pub value_sats: u64,
}

impl Operation {
    /// Create a new operation payload.
    pub fn new(label: impl Into<String>, message: Vec<u8>, value_sats: u64) -> Self {
        Self {
            label: label.into(),
            message,
            value_sats,
        }
    }

    /// SHA-256 digest binding label, message, and declared value.
    ///
    /// Contributions sign over this digest, so a contribution minted for one
    /// operation cannot be replayed against another.
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update((self.label.len() as u64).to_le_bytes());
        hasher.update(self.label.as_bytes());
        hasher.update((self.message.len() as u64).to_le_bytes());
        hasher.update(&self.message);
        hasher.update(self.value_sats.to_le_bytes());
        hasher.finalize().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic() {
        let op = Operation::new("send", b"payload".to_vec(), 5_000);
        assert_eq!(op.digest(), op.digest());
    }

    #[test]
    fn digest_binds_every_field() {
        let base = Operation::new("send", b"payload".to_vec(), 5_000);
        let relabeled = Operation::new("spend", b"payload".to_vec(), 5_000);
        let revalued = Operation::new("send", b"payload".to_vec(), 5_001);
        let rewritten = Operation::new("send", b"payloae".to_vec(), 5_000);
        assert_ne!(base.digest(), relabeled.digest());
        assert_ne!(base.digest(), revalued.digest());
        assert_ne!(base.digest(), rewritten.digest());
    }

    #[test]
    fn digest_resists_field_boundary_shifts() {
        // "ab" + "c" must not collide with "a" + "bc"
        let left = Operation::new("ab", b"c".to_vec(), 0);
        let right = Operation::new("a", b"bc".to_vec(), 0);
        assert_ne!(left.digest(), right.digest());
    }
}
