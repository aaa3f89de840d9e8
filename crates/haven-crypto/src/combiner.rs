//! The pluggable combiner capability.
//!
//! A [`Combiner`] turns `threshold` verified contributions into one final
//! artifact: a signature over the session binding, or recovered key
//! material. Two variants are provided and selected by session
//! configuration, never by runtime type inspection:
//!
//! - [`ShamirCombiner`]: contributions are Shamir shares of a 32-byte
//!   Ed25519 seed; interpolation recovers the seed, the seed signs the
//!   binding, and the result must verify against the session's target
//!   verifying key.
//! - [`AggregateCombiner`]: contributions are per-guardian signatures over
//!   the binding; the first `threshold` are assembled under an aggregate-key
//!   commitment derived from the guardian set.
//!
//! Both variants verify their own output before returning it. A combine
//! whose artifact fails independent re-verification returns a
//! reconstruction error and never a silent artifact.

use crate::envelope::{signature_from_bytes, ContributionMaterial};
use crate::shamir::{self, SecretShare};
use crate::verifier::VerifiedContribution;
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use haven_core::{GuardianId, GuardianSet, HavenError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use zeroize::Zeroizing;

const AGGREGATE_DOMAIN: &[u8] = b"haven-aggregate-key-v1";

/// Which combiner a session is configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CombinerKind {
    /// Shamir secret-share interpolation.
    SecretShares,
    /// Partial-signature aggregation.
    SignatureAggregation,
}

impl std::fmt::Display for CombinerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CombinerKind::SecretShares => write!(f, "secret-shares"),
            CombinerKind::SignatureAggregation => write!(f, "signature-aggregation"),
        }
    }
}

/// The key a session's final artifact must verify against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetKey {
    /// Ed25519 verifying key of the split signing seed.
    Ed25519 {
        /// 32-byte verifying key.
        verifying_key: [u8; 32],
    },
    /// Commitment to a k-of-n aggregate of guardian keys.
    Aggregate {
        /// SHA-256 commitment over threshold and sorted member keys.
        commitment: [u8; 32],
    },
}

impl TargetKey {
    /// Commitment target for a k-of-n aggregate over the given guardians.
    pub fn for_aggregate(threshold: usize, guardians: &GuardianSet) -> Self {
        Self::Aggregate {
            commitment: aggregate_commitment(threshold, guardians),
        }
    }
}

/// Compute the aggregate-key commitment: SHA-256 over the domain tag, the
/// threshold, and the members' verifying keys in sorted order.
pub fn aggregate_commitment(threshold: usize, guardians: &GuardianSet) -> [u8; 32] {
    let mut keys: Vec<[u8; 32]> = guardians.iter().map(|g| g.verifying_key).collect();
    keys.sort_unstable();
    let mut hasher = Sha256::new();
    hasher.update(AGGREGATE_DOMAIN);
    hasher.update((threshold as u64).to_le_bytes());
    for key in keys {
        hasher.update(key);
    }
    hasher.finalize().into()
}

/// One guardian's entry in an aggregated artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateEntry {
    /// Contributing guardian.
    pub guardian_id: GuardianId,
    /// Signature over the session binding by that guardian's key.
    pub signature: Vec<u8>,
}

/// The final artifact a completed session carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignedArtifact {
    /// Output of the Shamir path: a signature under the reconstructed key,
    /// plus the recovered seed for recovery flows.
    Reconstructed {
        /// Ed25519 signature over the session binding.
        signature: Vec<u8>,
        /// The reconstructed 32-byte signing seed. Sensitive; recovery flows
        /// consume it, signing flows may discard it.
        key_material: Vec<u8>,
        /// Guardians whose shares were interpolated.
        contributors: Vec<GuardianId>,
    },
    /// Output of the aggregation path: the first-k guardian signatures bound
    /// to the aggregate-key commitment.
    Aggregated {
        /// Commitment this aggregate was formed under.
        aggregate_key: [u8; 32],
        /// Exactly `threshold` distinct guardian signatures.
        entries: Vec<AggregateEntry>,
    },
}

impl SignedArtifact {
    /// Guardians whose contributions formed this artifact.
    pub fn contributors(&self) -> Vec<GuardianId> {
        match self {
            SignedArtifact::Reconstructed { contributors, .. } => contributors.clone(),
            SignedArtifact::Aggregated { entries, .. } => {
                entries.iter().map(|e| e.guardian_id).collect()
            }
        }
    }

    /// Recovered key material, present only on the Shamir path.
    pub fn key_material(&self) -> Option<&[u8]> {
        match self {
            SignedArtifact::Reconstructed { key_material, .. } => Some(key_material),
            SignedArtifact::Aggregated { .. } => None,
        }
    }

    /// Independently verify this artifact against the session's target key.
    pub fn verify(
        &self,
        target: &TargetKey,
        binding: &[u8; 32],
        guardians: &GuardianSet,
    ) -> Result<()> {
        match (self, target) {
            (
                SignedArtifact::Reconstructed { signature, .. },
                TargetKey::Ed25519 { verifying_key },
            ) => {
                let key = VerifyingKey::from_bytes(verifying_key).map_err(|e| {
                    HavenError::reconstruction(format!("target key is malformed: {e}"))
                })?;
                let signature = signature_from_bytes(signature)
                    .map_err(|e| HavenError::reconstruction(e.to_string()))?;
                key.verify(binding, &signature).map_err(|_| {
                    HavenError::reconstruction(
                        "combined signature does not verify against the target key",
                    )
                })
            }
            (
                SignedArtifact::Aggregated {
                    aggregate_key,
                    entries,
                },
                TargetKey::Aggregate { commitment },
            ) => {
                if aggregate_key != commitment
                    || aggregate_commitment(entries.len(), guardians) != *commitment
                {
                    return Err(HavenError::reconstruction(
                        "aggregate does not match the session's key commitment",
                    ));
                }
                let mut seen = HashSet::new();
                for entry in entries {
                    if !seen.insert(entry.guardian_id) {
                        return Err(HavenError::reconstruction(
                            "aggregate contains duplicate guardians",
                        ));
                    }
                    let profile = guardians.get(&entry.guardian_id).ok_or_else(|| {
                        HavenError::reconstruction("aggregate names an unknown guardian")
                    })?;
                    let key = VerifyingKey::from_bytes(&profile.verifying_key).map_err(|e| {
                        HavenError::reconstruction(format!("guardian key is malformed: {e}"))
                    })?;
                    let signature = signature_from_bytes(&entry.signature)
                        .map_err(|e| HavenError::reconstruction(e.to_string()))?;
                    key.verify(binding, &signature).map_err(|_| {
                        HavenError::reconstruction("an aggregated signature does not verify")
                    })?;
                }
                Ok(())
            }
            _ => Err(HavenError::reconstruction(
                "artifact scheme does not match the session's target key",
            )),
        }
    }
}

/// Everything a combiner needs besides the contributions themselves.
#[derive(Debug, Clone, Copy)]
pub struct CombineContext<'a> {
    /// Session binding digest; the message the final artifact signs.
    pub binding: [u8; 32],
    /// Required threshold.
    pub threshold: usize,
    /// Eligible guardians for this session.
    pub guardians: &'a GuardianSet,
    /// Key the artifact must verify against.
    pub target: &'a TargetKey,
}

/// Scheme-agnostic combining capability.
pub trait Combiner: Send + Sync {
    /// Which scheme this combiner implements.
    fn kind(&self) -> CombinerKind;

    /// Combine the first `threshold` contributions into a verified artifact.
    ///
    /// Callers supply contributions already ordered by submission time.
    /// Implementations must verify the artifact against `ctx.target` before
    /// returning it and fail closed otherwise.
    fn combine(
        &self,
        ctx: &CombineContext<'_>,
        contributions: &[VerifiedContribution],
    ) -> Result<SignedArtifact>;
}

fn require_threshold(ctx: &CombineContext<'_>, supplied: usize) -> Result<()> {
    if supplied < ctx.threshold {
        return Err(HavenError::reconstruction(format!(
            "{supplied} contributions supplied, {} required",
            ctx.threshold
        )));
    }
    Ok(())
}

/// Combiner that interpolates Shamir shares of an Ed25519 signing seed.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShamirCombiner;

impl Combiner for ShamirCombiner {
    fn kind(&self) -> CombinerKind {
        CombinerKind::SecretShares
    }

    fn combine(
        &self,
        ctx: &CombineContext<'_>,
        contributions: &[VerifiedContribution],
    ) -> Result<SignedArtifact> {
        require_threshold(ctx, contributions.len())?;
        let selected = &contributions[..ctx.threshold];

        let mut shares: Vec<SecretShare> = Vec::with_capacity(selected.len());
        for contribution in selected {
            match &contribution.material {
                ContributionMaterial::SecretShare(share) => shares.push(share.clone()),
                ContributionMaterial::PartialSignature { .. } => {
                    return Err(HavenError::reconstruction(format!(
                        "guardian {} submitted a partial signature to a secret-share session",
                        contribution.guardian_id
                    )));
                }
            }
        }

        let secret = Zeroizing::new(shamir::interpolate(&shares)?);
        let seed: [u8; 32] = secret.as_slice().try_into().map_err(|_| {
            HavenError::reconstruction("reconstructed secret is not a 32-byte signing seed")
        })?;
        let signing_key = SigningKey::from_bytes(&seed);
        let signature = signing_key.sign(&ctx.binding).to_bytes().to_vec();

        let artifact = SignedArtifact::Reconstructed {
            signature,
            key_material: secret.to_vec(),
            contributors: selected.iter().map(|c| c.guardian_id).collect(),
        };

        // Verify-after-combine: a numerically successful interpolation that
        // yields the wrong key must fail closed here.
        artifact.verify(ctx.target, &ctx.binding, ctx.guardians)?;

        tracing::info!(
            kind = %self.kind(),
            contributors = selected.len(),
            "combined contributions into verified artifact"
        );
        Ok(artifact)
    }
}

/// Combiner that assembles per-guardian signatures under an aggregate-key
/// commitment.
#[derive(Debug, Default, Clone, Copy)]
pub struct AggregateCombiner;

impl Combiner for AggregateCombiner {
    fn kind(&self) -> CombinerKind {
        CombinerKind::SignatureAggregation
    }

    fn combine(
        &self,
        ctx: &CombineContext<'_>,
        contributions: &[VerifiedContribution],
    ) -> Result<SignedArtifact> {
        require_threshold(ctx, contributions.len())?;
        let selected = &contributions[..ctx.threshold];

        let mut entries = Vec::with_capacity(selected.len());
        for contribution in selected {
            match &contribution.material {
                ContributionMaterial::PartialSignature { signature } => {
                    entries.push(AggregateEntry {
                        guardian_id: contribution.guardian_id,
                        signature: signature.clone(),
                    });
                }
                ContributionMaterial::SecretShare(_) => {
                    return Err(HavenError::reconstruction(format!(
                        "guardian {} submitted a secret share to an aggregation session",
                        contribution.guardian_id
                    )));
                }
            }
        }

        let artifact = SignedArtifact::Aggregated {
            aggregate_key: aggregate_commitment(ctx.threshold, ctx.guardians),
            entries,
        };

        // Verify-after-combine: every entry must verify and the commitment
        // must match the session's target.
        artifact.verify(ctx.target, &ctx.binding, ctx.guardians)?;

        tracing::info!(
            kind = %self.kind(),
            contributors = selected.len(),
            "combined contributions into verified artifact"
        );
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use haven_core::GuardianProfile;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn signing_key(seed: u8) -> SigningKey {
        SigningKey::from_bytes(&[seed; 32])
    }

    fn guardians(count: u8) -> GuardianSet {
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

    fn share_contributions(
        group_seed: [u8; 32],
        threshold: u8,
        count: u8,
    ) -> Vec<VerifiedContribution> {
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let shares = shamir::split(&group_seed, threshold, count, &mut rng).unwrap();
        shares
            .into_iter()
            .enumerate()
            .map(|(i, share)| VerifiedContribution {
                guardian_id: GuardianId::from_seed(i as u8 + 1),
                material: ContributionMaterial::SecretShare(share),
                submitted_at_ms: 100 + i as u64,
                hardware_attested: false,
            })
            .collect()
    }

    fn partial_contributions(binding: [u8; 32], count: u8) -> Vec<VerifiedContribution> {
        (1..=count)
            .map(|seed| VerifiedContribution {
                guardian_id: GuardianId::from_seed(seed),
                material: ContributionMaterial::PartialSignature {
                    signature: signing_key(seed).sign(&binding).to_bytes().to_vec(),
                },
                submitted_at_ms: 100 + seed as u64,
                hardware_attested: false,
            })
            .collect()
    }

    #[test]
    fn shamir_combine_produces_verifying_signature() {
        let group_seed = [77u8; 32];
        let target = TargetKey::Ed25519 {
            verifying_key: SigningKey::from_bytes(&group_seed)
                .verifying_key()
                .to_bytes(),
        };
        let set = guardians(5);
        let binding = [3u8; 32];
        let ctx = CombineContext {
            binding,
            threshold: 3,
            guardians: &set,
            target: &target,
        };

        let contributions = share_contributions(group_seed, 3, 5);
        let artifact = ShamirCombiner.combine(&ctx, &contributions[..3]).unwrap();

        artifact.verify(&target, &binding, &set).unwrap();
        assert_eq!(artifact.key_material().unwrap(), group_seed);
        assert_eq!(artifact.contributors().len(), 3);
    }

    #[test]
    fn shamir_combine_fails_closed_on_wrong_target() {
        let group_seed = [77u8; 32];
        // Target key belongs to a different seed: interpolation succeeds
        // numerically but re-verification must reject the artifact.
        let target = TargetKey::Ed25519 {
            verifying_key: SigningKey::from_bytes(&[78u8; 32])
                .verifying_key()
                .to_bytes(),
        };
        let set = guardians(5);
        let ctx = CombineContext {
            binding: [3u8; 32],
            threshold: 3,
            guardians: &set,
            target: &target,
        };

        let contributions = share_contributions(group_seed, 3, 5);
        assert_matches!(
            ShamirCombiner.combine(&ctx, &contributions[..3]),
            Err(HavenError::Reconstruction { .. })
        );
    }

    #[test]
    fn combine_below_threshold_never_reaches_the_math() {
        let set = guardians(5);
        let target = TargetKey::for_aggregate(3, &set);
        let binding = [4u8; 32];
        let ctx = CombineContext {
            binding,
            threshold: 3,
            guardians: &set,
            target: &target,
        };
        let contributions = partial_contributions(binding, 2);
        assert_matches!(
            AggregateCombiner.combine(&ctx, &contributions),
            Err(HavenError::Reconstruction { .. })
        );
    }

    #[test]
    fn aggregate_combine_verifies_each_entry() {
        let set = guardians(5);
        let target = TargetKey::for_aggregate(3, &set);
        let binding = [4u8; 32];
        let ctx = CombineContext {
            binding,
            threshold: 3,
            guardians: &set,
            target: &target,
        };

        let contributions = partial_contributions(binding, 4);
        let artifact = AggregateCombiner.combine(&ctx, &contributions).unwrap();
        artifact.verify(&target, &binding, &set).unwrap();
        // Deterministic first-k selection
        assert_eq!(
            artifact.contributors(),
            vec![
                GuardianId::from_seed(1),
                GuardianId::from_seed(2),
                GuardianId::from_seed(3)
            ]
        );
    }

    #[test]
    fn aggregate_combine_rejects_forged_entry() {
        let set = guardians(5);
        let target = TargetKey::for_aggregate(3, &set);
        let binding = [4u8; 32];
        let ctx = CombineContext {
            binding,
            threshold: 3,
            guardians: &set,
            target: &target,
        };

        let mut contributions = partial_contributions(binding, 3);
        // Signature by a key that is not the guardian's registered key
        contributions[1].material = ContributionMaterial::PartialSignature {
            signature: signing_key(9).sign(&binding).to_bytes().to_vec(),
        };
        assert_matches!(
            AggregateCombiner.combine(&ctx, &contributions),
            Err(HavenError::Reconstruction { .. })
        );
    }

    #[test]
    fn mismatched_scheme_fails_closed() {
        let set = guardians(5);
        let binding = [4u8; 32];
        let aggregate_target = TargetKey::for_aggregate(3, &set);
        let ctx = CombineContext {
            binding,
            threshold: 3,
            guardians: &set,
            target: &aggregate_target,
        };
        let contributions = share_contributions([77u8; 32], 3, 5);
        assert_matches!(
            ShamirCombiner.combine(&ctx, &contributions[..3]),
            Err(HavenError::Reconstruction { .. })
        );
    }
}
