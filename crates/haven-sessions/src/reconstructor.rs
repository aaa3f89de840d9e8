//! Session finalization through the configured combiner.
//!
//! Runs under the session's mutex, so exactly one finalization attempt is
//! ever made per session: it either completes the session with a verified
//! artifact or fails it terminally.

use crate::quorum;
use crate::session::{SessionState, SessionStatus};
use haven_core::{HavenError, Result};
use haven_crypto::{
    AggregateCombiner, CombineContext, Combiner, CombinerKind, ShamirCombiner, SignedArtifact,
    VerifiedContribution,
};

/// Select the first `threshold` qualified contributions in deterministic
/// order: submission time, then guardian id as the tiebreaker.
pub(crate) fn select_first_k(state: &SessionState) -> Vec<VerifiedContribution> {
    let mut qualified: Vec<VerifiedContribution> = state
        .contributions
        .values()
        .filter(|c| quorum::qualifies(c, state.hardware_required))
        .cloned()
        .collect();
    qualified.sort_by_key(|c| (c.submitted_at_ms, c.guardian_id));
    qualified.truncate(state.threshold);
    qualified
}

/// Combine the session's qualified contributions and move it to a terminal
/// state. On success the verified artifact is cached on the session; on any
/// combine error the session is failed and the error propagated.
pub(crate) fn finalize(state: &mut SessionState, now_ms: u64) -> Result<SignedArtifact> {
    if state.status != SessionStatus::Pending {
        return Err(HavenError::internal(format!(
            "finalize called on {} session {}",
            state.status, state.session_id
        )));
    }
    if !state.quorum_satisfied() {
        return Err(HavenError::internal(format!(
            "finalize called below threshold on session {}",
            state.session_id
        )));
    }

    let selected = select_first_k(state);
    let ctx = CombineContext {
        binding: state.binding,
        threshold: state.threshold,
        guardians: &state.guardians,
        target: &state.target,
    };
    let outcome = match state.combiner_kind {
        CombinerKind::SecretShares => ShamirCombiner.combine(&ctx, &selected),
        CombinerKind::SignatureAggregation => AggregateCombiner.combine(&ctx, &selected),
    };

    match outcome {
        Ok(artifact) => {
            state.artifact = Some(artifact.clone());
            state.transition(SessionStatus::Completed, now_ms)?;
            Ok(artifact)
        }
        Err(err) => {
            tracing::warn!(
                session = %state.session_id,
                error = %err,
                "reconstruction failed, session terminally failed"
            );
            state.error_detail = Some(err.to_string());
            state.transition(SessionStatus::Failed, now_ms)?;
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::MfaPolicy;
    use ed25519_dalek::{Signer, SigningKey};
    use haven_core::{
        FamilyId, GuardianId, GuardianProfile, GuardianSet, Operation, SessionId,
    };
    use haven_crypto::{session_binding, ContributionMaterial, TargetKey};

    fn signing_key(seed: u8) -> SigningKey {
        SigningKey::from_bytes(&[seed; 32])
    }

    fn aggregate_state(threshold: usize, guardian_count: u8) -> SessionState {
        let guardians = GuardianSet::new(
            (1..=guardian_count)
                .map(|seed| {
                    GuardianProfile::new(
                        GuardianId::from_seed(seed),
                        format!("guardian-{seed}"),
                        signing_key(seed).verifying_key().to_bytes(),
                    )
                })
                .collect(),
        )
        .unwrap();
        let session_id = SessionId::new();
        let operation = Operation::new("op", b"msg".to_vec(), 10);
        let binding = session_binding(&session_id, &operation);
        let target = TargetKey::for_aggregate(threshold, &guardians);
        SessionState::new(
            session_id,
            FamilyId::new(),
            operation,
            guardians,
            threshold,
            MfaPolicy::Optional,
            CombinerKind::SignatureAggregation,
            target,
            binding,
            1_000,
            60_000,
        )
        .unwrap()
    }

    fn contribute(state: &mut SessionState, seed: u8, submitted_at_ms: u64) {
        let signature = signing_key(seed).sign(&state.binding).to_bytes().to_vec();
        state.contributions.insert(
            GuardianId::from_seed(seed),
            VerifiedContribution {
                guardian_id: GuardianId::from_seed(seed),
                material: ContributionMaterial::PartialSignature { signature },
                submitted_at_ms,
                hardware_attested: false,
            },
        );
    }

    #[test]
    fn selection_orders_by_time_then_guardian() {
        let mut state = aggregate_state(2, 4);
        contribute(&mut state, 3, 300);
        contribute(&mut state, 1, 100);
        contribute(&mut state, 2, 100);
        let selected = select_first_k(&state);
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].guardian_id, GuardianId::from_seed(1));
        assert_eq!(selected[1].guardian_id, GuardianId::from_seed(2));
    }

    #[test]
    fn finalize_completes_with_verified_artifact() {
        let mut state = aggregate_state(2, 3);
        contribute(&mut state, 1, 100);
        contribute(&mut state, 2, 200);
        let artifact = finalize(&mut state, 2_000).unwrap();
        assert_eq!(state.status, SessionStatus::Completed);
        assert_eq!(state.artifact.as_ref(), Some(&artifact));
        assert_eq!(artifact.contributors().len(), 2);
    }

    #[test]
    fn finalize_below_threshold_is_an_internal_error() {
        let mut state = aggregate_state(2, 3);
        contribute(&mut state, 1, 100);
        let err = finalize(&mut state, 2_000).unwrap_err();
        assert!(matches!(err, HavenError::Internal { .. }));
        assert_eq!(state.status, SessionStatus::Pending);
    }

    #[test]
    fn combine_failure_fails_the_session_terminally() {
        let mut state = aggregate_state(2, 3);
        contribute(&mut state, 1, 100);
        contribute(&mut state, 2, 200);
        // Corrupt one signature after verification already happened.
        if let Some(c) = state.contributions.get_mut(&GuardianId::from_seed(2)) {
            c.material = ContributionMaterial::PartialSignature {
                signature: vec![0u8; 64],
            };
        }
        let err = finalize(&mut state, 2_000).unwrap_err();
        assert!(matches!(err, HavenError::Reconstruction { .. }));
        assert_eq!(state.status, SessionStatus::Failed);
        assert!(state.error_detail.is_some());
        assert!(state.artifact.is_none());
    }
}
