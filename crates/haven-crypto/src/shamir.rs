//! Shamir secret sharing over GF(256).
//!
//! A secret is split byte-wise: each byte gets its own random polynomial of
//! degree `threshold - 1` with the secret byte as constant term, and each
//! share is the polynomial's evaluation at the share's non-zero index. Any
//! `threshold` distinct shares reconstruct the secret via Lagrange
//! interpolation at zero; fewer reveal nothing.
//!
//! This module provides threshold secrecy only. Authenticating who produced
//! a share is the envelope/verifier layer's job.

use crate::gf256::Gf256;
use haven_core::{HavenError, Result};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// One guardian's share of a split secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretShare {
    /// Share index (x-coordinate). Non-zero and unique per secret.
    pub index: u8,
    /// Threshold the secret was split with.
    pub threshold: u8,
    /// Per-byte polynomial evaluations; same length as the secret.
    pub data: Vec<u8>,
}

/// Split `secret` into `share_count` shares requiring `threshold` to
/// reconstruct.
///
/// The caller supplies the RNG so key ceremonies can be made deterministic
/// under test.
pub fn split(
    secret: &[u8],
    threshold: u8,
    share_count: u8,
    rng: &mut impl RngCore,
) -> Result<Vec<SecretShare>> {
    if secret.is_empty() {
        return Err(HavenError::internal("cannot split an empty secret"));
    }
    if threshold == 0 || threshold > share_count {
        return Err(HavenError::invalid_threshold(format!(
            "cannot split {threshold}-of-{share_count}"
        )));
    }

    let mut shares: Vec<SecretShare> = (1..=share_count)
        .map(|index| SecretShare {
            index,
            threshold,
            data: vec![0u8; secret.len()],
        })
        .collect();

    let mut coefficients = vec![Gf256::ZERO; threshold as usize];
    for (byte_index, &secret_byte) in secret.iter().enumerate() {
        coefficients[0] = Gf256::new(secret_byte);
        for coefficient in coefficients.iter_mut().skip(1) {
            let mut byte = [0u8; 1];
            rng.fill_bytes(&mut byte);
            *coefficient = Gf256::new(byte[0]);
        }
        for share in &mut shares {
            let x = Gf256::new(share.index);
            share.data[byte_index] = Gf256::eval_polynomial(&coefficients, x).value();
        }
    }

    Ok(shares)
}

/// Reconstruct the secret from at least `threshold` shares.
///
/// Exactly the first `threshold` shares (in the order supplied) are used;
/// deterministic selection is the caller's responsibility.
pub fn interpolate(shares: &[SecretShare]) -> Result<Vec<u8>> {
    let first = shares
        .first()
        .ok_or_else(|| HavenError::reconstruction("no shares supplied"))?;
    let threshold = first.threshold as usize;
    let secret_len = first.data.len();

    if threshold == 0 {
        return Err(HavenError::reconstruction("share claims threshold zero"));
    }
    if shares.len() < threshold {
        return Err(HavenError::reconstruction(format!(
            "{} shares supplied, {} required",
            shares.len(),
            threshold
        )));
    }

    let selected = &shares[..threshold];
    let mut seen = [false; 256];
    for share in selected {
        if share.index == 0 {
            return Err(HavenError::reconstruction("share index zero is invalid"));
        }
        if seen[share.index as usize] {
            return Err(HavenError::reconstruction(format!(
                "duplicate share index {}",
                share.index
            )));
        }
        seen[share.index as usize] = true;
        if share.threshold as usize != threshold || share.data.len() != secret_len {
            return Err(HavenError::reconstruction(
                "shares disagree on threshold or secret length",
            ));
        }
    }

    let mut secret = vec![0u8; secret_len];
    let mut points = Vec::with_capacity(threshold);
    for (byte_index, secret_byte) in secret.iter_mut().enumerate() {
        points.clear();
        for share in selected {
            points.push((Gf256::new(share.index), Gf256::new(share.data[byte_index])));
        }
        *secret_byte = Gf256::lagrange_at_zero(&points).value();
    }

    Ok(secret)
}
