//! Share/signature verification for individual guardian contributions.
//!
//! The verifier is a pure function over the envelope, the guardian's
//! registered profile, and the expected session binding. It never touches
//! quorum state; callers record the outcome with the quorum tracker.

use crate::envelope::{signature_from_bytes, ContributionEnvelope, ContributionMaterial};
use ed25519_dalek::{Verifier, VerifyingKey};
use haven_core::{GuardianId, GuardianProfile};
use serde::{Deserialize, Serialize};

/// A contribution that passed verification, ready for quorum accounting
/// and eventual combining.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedContribution {
    /// Contributing guardian.
    pub guardian_id: GuardianId,
    /// The verified material.
    pub material: ContributionMaterial,
    /// Submission time, epoch milliseconds. Drives deterministic first-k
    /// selection at finalization.
    pub submitted_at_ms: u64,
    /// Whether a valid, enrolled hardware factor accompanied the material.
    pub hardware_attested: bool,
}

/// Result of verifying one contribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// The contribution validates and may count toward quorum.
    Verified(VerifiedContribution),
    /// The contribution is rejected and must not count.
    Rejected {
        /// Human-readable reason, safe to return to the submitting guardian.
        reason: String,
    },
}

impl VerificationOutcome {
    fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    /// Whether the contribution was accepted.
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified(_))
    }
}

/// Stateless verifier for guardian contributions.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContributionVerifier;

impl ContributionVerifier {
    /// Verify one envelope against the guardian's registered profile and the
    /// binding of the session it claims to target.
    ///
    /// Checks, in order:
    /// 1. the envelope names the guardian whose profile was supplied
    /// 2. the binding matches this session (replayed envelopes from other
    ///    sessions fail here)
    /// 3. the guardian signature validates against the registered key
    /// 4. partial-signature material validates against the binding
    /// 5. an attached hardware factor validates and matches the enrolled
    ///    hardware key
    pub fn verify(
        &self,
        envelope: &ContributionEnvelope,
        profile: &GuardianProfile,
        expected_binding: &[u8; 32],
    ) -> VerificationOutcome {
        if envelope.guardian_id != profile.guardian_id {
            return VerificationOutcome::rejected("envelope names a different guardian");
        }

        if &envelope.session_binding != expected_binding {
            return VerificationOutcome::rejected(
                "contribution is bound to a different session or operation",
            );
        }

        if let Err(err) = envelope.verify_guardian_signature(&profile.verifying_key) {
            return VerificationOutcome::rejected(err.to_string());
        }

        if let ContributionMaterial::PartialSignature { signature } = &envelope.material {
            if !partial_signature_verifies(signature, &profile.verifying_key, expected_binding) {
                return VerificationOutcome::rejected(
                    "partial signature does not verify against the registered key",
                );
            }
        }

        let hardware_attested = match &envelope.hardware_factor {
            None => false,
            Some(factor) => {
                if let Err(err) = envelope.verify_hardware_factor() {
                    return VerificationOutcome::rejected(err.to_string());
                }
                match profile.hardware_key {
                    Some(enrolled) if enrolled == factor.verifying_key => true,
                    Some(_) => {
                        return VerificationOutcome::rejected(
                            "hardware factor key does not match the enrolled device",
                        );
                    }
                    // A factor from an unenrolled device verifies but never
                    // qualifies toward a hardware-required quorum.
                    None => false,
                }
            }
        };

        VerificationOutcome::Verified(VerifiedContribution {
            guardian_id: envelope.guardian_id,
            material: envelope.material.clone(),
            submitted_at_ms: envelope.submitted_at_ms,
            hardware_attested,
        })
    }
}

fn partial_signature_verifies(
    signature: &[u8],
    verifying_key: &[u8; 32],
    message: &[u8; 32],
) -> bool {
    let Ok(key) = VerifyingKey::from_bytes(verifying_key) else {
        return false;
    };
    let Ok(signature) = signature_from_bytes(signature) else {
        return false;
    };
    key.verify(message, &signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::session_binding;
    use assert_matches::assert_matches;
    use ed25519_dalek::{Signer, SigningKey};
    use haven_core::{DeviceId, Operation, SessionId};

    fn signing_key(seed: u8) -> SigningKey {
        SigningKey::from_bytes(&[seed; 32])
    }

    fn profile(seed: u8) -> GuardianProfile {
        GuardianProfile::new(
            GuardianId::from_seed(seed),
            format!("guardian-{seed}"),
            signing_key(seed).verifying_key().to_bytes(),
        )
    }

    fn binding_for(session_id: &SessionId) -> [u8; 32] {
        session_binding(session_id, &Operation::new("op", b"msg".to_vec(), 10))
    }

    fn partial_envelope(seed: u8, binding: [u8; 32]) -> ContributionEnvelope {
        let key = signing_key(seed);
        ContributionEnvelope::new_signed(
            binding,
            GuardianId::from_seed(seed),
            ContributionMaterial::PartialSignature {
                signature: key.sign(&binding).to_bytes().to_vec(),
            },
            500,
            &key,
        )
        .unwrap()
    }

    #[test]
    fn valid_contribution_verifies() {
        let binding = binding_for(&SessionId::new());
        let outcome =
            ContributionVerifier.verify(&partial_envelope(1, binding), &profile(1), &binding);
        assert_matches!(
            outcome,
            VerificationOutcome::Verified(VerifiedContribution {
                hardware_attested: false,
                ..
            })
        );
    }

    #[test]
    fn replayed_envelope_from_other_session_is_rejected() {
        let original = binding_for(&SessionId::new());
        let current = binding_for(&SessionId::new());
        let outcome =
            ContributionVerifier.verify(&partial_envelope(1, original), &profile(1), &current);
        assert_matches!(outcome, VerificationOutcome::Rejected { .. });
    }

    #[test]
    fn wrong_guardian_profile_is_rejected() {
        let binding = binding_for(&SessionId::new());
        let outcome =
            ContributionVerifier.verify(&partial_envelope(1, binding), &profile(2), &binding);
        assert_matches!(outcome, VerificationOutcome::Rejected { .. });
    }

    #[test]
    fn partial_signature_by_unregistered_key_is_rejected() {
        let binding = binding_for(&SessionId::new());
        let impostor = signing_key(9);
        let envelope = ContributionEnvelope::new_signed(
            binding,
            GuardianId::from_seed(1),
            ContributionMaterial::PartialSignature {
                signature: impostor.sign(&binding).to_bytes().to_vec(),
            },
            500,
            &signing_key(1),
        )
        .unwrap();
        let outcome = ContributionVerifier.verify(&envelope, &profile(1), &binding);
        assert_matches!(outcome, VerificationOutcome::Rejected { .. });
    }

    #[test]
    fn enrolled_hardware_factor_attests() {
        let binding = binding_for(&SessionId::new());
        let device_key = signing_key(41);
        let profile = profile(1).with_hardware_key(device_key.verifying_key().to_bytes());
        let envelope = partial_envelope(1, binding)
            .with_hardware_factor(DeviceId::new(), &device_key, 501)
            .unwrap();
        let outcome = ContributionVerifier.verify(&envelope, &profile, &binding);
        assert_matches!(
            outcome,
            VerificationOutcome::Verified(VerifiedContribution {
                hardware_attested: true,
                ..
            })
        );
    }

    #[test]
    fn mismatched_hardware_key_is_rejected() {
        let binding = binding_for(&SessionId::new());
        let enrolled = signing_key(41);
        let rogue = signing_key(42);
        let profile = profile(1).with_hardware_key(enrolled.verifying_key().to_bytes());
        let envelope = partial_envelope(1, binding)
            .with_hardware_factor(DeviceId::new(), &rogue, 501)
            .unwrap();
        let outcome = ContributionVerifier.verify(&envelope, &profile, &binding);
        assert_matches!(outcome, VerificationOutcome::Rejected { .. });
    }

    #[test]
    fn unenrolled_hardware_factor_does_not_attest() {
        let binding = binding_for(&SessionId::new());
        let envelope = partial_envelope(1, binding)
            .with_hardware_factor(DeviceId::new(), &signing_key(43), 501)
            .unwrap();
        let outcome = ContributionVerifier.verify(&envelope, &profile(1), &binding);
        assert_matches!(
            outcome,
            VerificationOutcome::Verified(VerifiedContribution {
                hardware_attested: false,
                ..
            })
        );
    }
}
