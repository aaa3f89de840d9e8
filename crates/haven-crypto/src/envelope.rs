//! Contribution envelopes.
//!
//! A guardian's input travels inside an envelope that binds the material to
//! one session, one guardian, and one submission time, under the guardian's
//! own signature. An optional hardware factor carries a second, independent
//! signature from a physical authenticator over the same contribution.
//!
//! The binding digest is what makes replay detection work: an envelope
//! minted for session A cannot validate in session B because the binding
//! covers the session identifier and the operation digest.

use crate::shamir::SecretShare;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use haven_core::{DeviceId, GuardianId, HavenError, Operation, Result, SessionId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const BINDING_DOMAIN: &[u8] = b"haven-session-binding-v1";
const CONTRIBUTION_DOMAIN: &[u8] = b"haven-contribution-v1";
const HARDWARE_DOMAIN: &[u8] = b"haven-hardware-factor-v1";

/// Digest binding a contribution to one session and one operation.
pub fn session_binding(session_id: &SessionId, operation: &Operation) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(BINDING_DOMAIN);
    hasher.update(session_id.0.as_bytes());
    hasher.update(operation.digest());
    hasher.finalize().into()
}

/// The cryptographic material a guardian contributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContributionMaterial {
    /// A Shamir share of the session's signing seed.
    SecretShare(SecretShare),
    /// An Ed25519 signature by the guardian's registered key over the
    /// session binding.
    PartialSignature {
        /// 64-byte signature bytes.
        signature: Vec<u8>,
    },
}

impl ContributionMaterial {
    fn digest(&self) -> Result<[u8; 32]> {
        let bytes = bincode::serialize(self)
            .map_err(|e| HavenError::serialization(format!("contribution material: {e}")))?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(hasher.finalize().into())
    }
}

/// Second-factor signature from a hardware authenticator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareFactor {
    /// Physical device that produced the signature.
    pub device_id: DeviceId,
    /// The device's Ed25519 verifying key.
    pub verifying_key: [u8; 32],
    /// Signature over the contribution payload under the hardware domain.
    pub signature: Vec<u8>,
    /// When the device signed, epoch milliseconds.
    pub signed_at_ms: u64,
}

/// One guardian's signed contribution to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionEnvelope {
    /// Binding digest of the target session and operation.
    pub session_binding: [u8; 32],
    /// Contributing guardian.
    pub guardian_id: GuardianId,
    /// Share or partial signature.
    pub material: ContributionMaterial,
    /// Submission time, epoch milliseconds.
    pub submitted_at_ms: u64,
    /// Guardian signature over the contribution payload.
    pub guardian_signature: Vec<u8>,
    /// Optional hardware-backed second factor.
    pub hardware_factor: Option<HardwareFactor>,
}

impl ContributionEnvelope {
    /// Build and sign an envelope with the guardian's key.
    pub fn new_signed(
        session_binding: [u8; 32],
        guardian_id: GuardianId,
        material: ContributionMaterial,
        submitted_at_ms: u64,
        guardian_key: &SigningKey,
    ) -> Result<Self> {
        let payload = contribution_payload(
            &session_binding,
            &guardian_id,
            &material,
            submitted_at_ms,
        )?;
        let guardian_signature = guardian_key.sign(&payload).to_bytes().to_vec();
        Ok(Self {
            session_binding,
            guardian_id,
            material,
            submitted_at_ms,
            guardian_signature,
            hardware_factor: None,
        })
    }

    /// Attach a hardware factor signed by the device key.
    pub fn with_hardware_factor(
        mut self,
        device_id: DeviceId,
        device_key: &SigningKey,
        signed_at_ms: u64,
    ) -> Result<Self> {
        let payload = self.payload()?;
        let mut hasher = Sha256::new();
        hasher.update(HARDWARE_DOMAIN);
        hasher.update(&payload);
        let message: [u8; 32] = hasher.finalize().into();
        let signature = device_key.sign(&message).to_bytes().to_vec();
        self.hardware_factor = Some(HardwareFactor {
            device_id,
            verifying_key: device_key.verifying_key().to_bytes(),
            signature,
            signed_at_ms,
        });
        Ok(self)
    }

    /// The byte string the guardian signature covers.
    pub fn payload(&self) -> Result<Vec<u8>> {
        contribution_payload(
            &self.session_binding,
            &self.guardian_id,
            &self.material,
            self.submitted_at_ms,
        )
    }

    /// Verify the guardian signature against a verifying key.
    pub fn verify_guardian_signature(&self, verifying_key: &[u8; 32]) -> Result<()> {
        let key = VerifyingKey::from_bytes(verifying_key)
            .map_err(|e| HavenError::verification_failed(format!("guardian key: {e}")))?;
        let signature = signature_from_bytes(&self.guardian_signature)?;
        key.verify(&self.payload()?, &signature)
            .map_err(|_| HavenError::verification_failed("guardian signature does not verify"))
    }

    /// Verify the hardware factor, if present, against its declared key.
    pub fn verify_hardware_factor(&self) -> Result<()> {
        let factor = self.hardware_factor.as_ref().ok_or_else(|| {
            HavenError::hardware_factor_required("no hardware factor attached")
        })?;
        let key = VerifyingKey::from_bytes(&factor.verifying_key)
            .map_err(|e| HavenError::verification_failed(format!("hardware key: {e}")))?;
        let mut hasher = Sha256::new();
        hasher.update(HARDWARE_DOMAIN);
        hasher.update(&self.payload()?);
        let message: [u8; 32] = hasher.finalize().into();
        let signature = signature_from_bytes(&factor.signature)?;
        key.verify(&message, &signature)
            .map_err(|_| HavenError::verification_failed("hardware factor signature does not verify"))
    }
}

fn contribution_payload(
    session_binding: &[u8; 32],
    guardian_id: &GuardianId,
    material: &ContributionMaterial,
    submitted_at_ms: u64,
) -> Result<Vec<u8>> {
    let mut payload = Vec::with_capacity(CONTRIBUTION_DOMAIN.len() + 32 + 16 + 32 + 8);
    payload.extend_from_slice(CONTRIBUTION_DOMAIN);
    payload.extend_from_slice(session_binding);
    payload.extend_from_slice(guardian_id.0.as_bytes());
    payload.extend_from_slice(&material.digest()?);
    payload.extend_from_slice(&submitted_at_ms.to_le_bytes());
    Ok(payload)
}

pub(crate) fn signature_from_bytes(bytes: &[u8]) -> Result<Signature> {
    let array: [u8; 64] = bytes
        .try_into()
        .map_err(|_| HavenError::verification_failed("signature must be 64 bytes"))?;
    Ok(Signature::from_bytes(&array))
}
