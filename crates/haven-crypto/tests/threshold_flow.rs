//! End-to-end crypto-layer flow: guardians envelope their contributions,
//! the verifier screens them, and the combiner produces a verified artifact.

use ed25519_dalek::{Signer, SigningKey};
use haven_core::{GuardianId, GuardianProfile, GuardianSet, Operation, SessionId};
use haven_crypto::{
    session_binding, AggregateCombiner, CombineContext, Combiner, ContributionEnvelope,
    ContributionMaterial, ContributionVerifier, ShamirCombiner, TargetKey, VerificationOutcome,
    VerifiedContribution,
};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

fn signing_key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

fn guardian_set(count: u8) -> GuardianSet {
    GuardianSet::new(
        (1..=count)
            .map(|seed| {
                GuardianProfile::new(
                    GuardianId::from_seed(seed),
                    format!("guardian-{seed}"),
                    signing_key(seed).verifying_key().to_bytes(),
                )
            })
            .collect(),
    )
    .unwrap()
}

fn verify_all(
    envelopes: &[ContributionEnvelope],
    guardians: &GuardianSet,
    binding: &[u8; 32],
) -> Vec<VerifiedContribution> {
    envelopes
        .iter()
        .map(|envelope| {
            let profile = guardians.get(&envelope.guardian_id).unwrap();
            match ContributionVerifier.verify(envelope, profile, binding) {
                VerificationOutcome::Verified(contribution) => contribution,
                VerificationOutcome::Rejected { reason } => {
                    panic!("contribution unexpectedly rejected: {reason}")
                }
            }
        })
        .collect()
}

#[test]
fn shamir_path_from_envelopes_to_artifact() {
    let group_seed = [50u8; 32];
    let group_key = SigningKey::from_bytes(&group_seed);
    let guardians = guardian_set(5);
    let operation = Operation::new("payout", b"pay bob 5000 sats".to_vec(), 5_000);
    let session_id = SessionId::new();
    let binding = session_binding(&session_id, &operation);

    let mut rng = ChaCha20Rng::seed_from_u64(99);
    let shares = haven_crypto::shamir::split(&group_seed, 3, 5, &mut rng).unwrap();

    let envelopes: Vec<ContributionEnvelope> = shares
        .iter()
        .take(3)
        .enumerate()
        .map(|(i, share)| {
            let seed = i as u8 + 1;
            ContributionEnvelope::new_signed(
                binding,
                GuardianId::from_seed(seed),
                ContributionMaterial::SecretShare(share.clone()),
                1_000 + i as u64,
                &signing_key(seed),
            )
            .unwrap()
        })
        .collect();

    let contributions = verify_all(&envelopes, &guardians, &binding);

    let target = TargetKey::Ed25519 {
        verifying_key: group_key.verifying_key().to_bytes(),
    };
    let ctx = CombineContext {
        binding,
        threshold: 3,
        guardians: &guardians,
        target: &target,
    };
    let artifact = ShamirCombiner.combine(&ctx, &contributions).unwrap();

    artifact.verify(&target, &binding, &guardians).unwrap();
    assert_eq!(artifact.key_material().unwrap(), group_seed);
}

#[test]
fn aggregation_path_from_envelopes_to_artifact() {
    let guardians = guardian_set(4);
    let operation = Operation::new("rotate", b"rotate delegation key".to_vec(), 0);
    let session_id = SessionId::new();
    let binding = session_binding(&session_id, &operation);

    let envelopes: Vec<ContributionEnvelope> = (1..=3u8)
        .map(|seed| {
            let key = signing_key(seed);
            ContributionEnvelope::new_signed(
                binding,
                GuardianId::from_seed(seed),
                ContributionMaterial::PartialSignature {
                    signature: key.sign(&binding).to_bytes().to_vec(),
                },
                2_000 + seed as u64,
                &key,
            )
            .unwrap()
        })
        .collect();

    let contributions = verify_all(&envelopes, &guardians, &binding);

    let target = TargetKey::for_aggregate(3, &guardians);
    let ctx = CombineContext {
        binding,
        threshold: 3,
        guardians: &guardians,
        target: &target,
    };
    let artifact = AggregateCombiner.combine(&ctx, &contributions).unwrap();
    artifact.verify(&target, &binding, &guardians).unwrap();
    assert_eq!(artifact.key_material(), None);
}
