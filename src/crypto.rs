//! secp256k1 helpers for checking keep signatures.
//!
//! Keeps never hold key material. All they do is check that a signature
//! handed to them was produced by the group key, the same way an
//! `ecrecover`-style verifier would: recover the signer from
//! `(digest, r, s, v)` and compare it to the agreed public key.
use digest::Digest as _;
use ecdsa::hazmat::DigestPrimitive;
use elliptic_curve::{scalar::IsHigh, PrimeField};
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use k256::{FieldBytes, Scalar, Secp256k1};
use subtle::ConstantTimeEq;

use crate::primitives::{Digest, PublicKeyBytes, PUBLIC_KEY_LEN};

/// Hash a fraud-proof preimage the way digests handed to `sign` are formed.
pub fn sha256(preimage: &[u8]) -> Digest {
    let hash = <Secp256k1 as DigestPrimitive>::Digest::digest(preimage);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hash);
    out
}

fn scalar_from_bytes(bytes: &[u8; 32]) -> Option<Scalar> {
    Scalar::from_repr(FieldBytes::clone_from_slice(bytes)).into()
}

/// Check that `s` is a scalar in the lower half of the curve order.
///
/// Both `s` and `n - s` verify for the same message, so only the low one is
/// accepted from members.
pub fn is_low_s(s: &[u8; 32]) -> bool {
    match scalar_from_bytes(s) {
        Some(s) => !bool::from(s.is_high()),
        None => false,
    }
}

/// Map a high `s` to its low twin, flipping the parity bit of `recovery_id`.
///
/// The pair keeps recovering the same key.
pub fn normalize_s(s: &[u8; 32], recovery_id: u8) -> Option<([u8; 32], u8)> {
    let scalar = scalar_from_bytes(s)?;
    if !bool::from(scalar.is_high()) {
        return Some((*s, recovery_id));
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&(-scalar).to_bytes());
    Some((out, recovery_id ^ 1))
}

/// Encode a key as `x || y`.
pub fn encode_public_key(key: &VerifyingKey) -> PublicKeyBytes {
    let point = key.to_encoded_point(false);
    let mut out = [0u8; PUBLIC_KEY_LEN];
    // Skip the SEC1 tag byte.
    out.copy_from_slice(&point.as_bytes()[1..]);
    PublicKeyBytes(out)
}

/// Recover the key that signed `digest`, if the signature is well formed.
pub fn recover_public_key(
    digest: &Digest,
    r: &[u8; 32],
    s: &[u8; 32],
    recovery_id: u8,
) -> Option<PublicKeyBytes> {
    let recovery_id = RecoveryId::from_byte(recovery_id)?;
    let mut bytes = [0u8; 64];
    bytes[..32].copy_from_slice(r);
    bytes[32..].copy_from_slice(s);
    let signature = Signature::from_slice(&bytes).ok()?;
    let key = VerifyingKey::recover_from_prehash(digest, &signature, recovery_id).ok()?;
    Some(encode_public_key(&key))
}

/// Check whether `(r, s, recovery_id)` over `digest` recovers to `expected`.
#[must_use]
pub fn signed_by(
    expected: &PublicKeyBytes,
    digest: &Digest,
    r: &[u8; 32],
    s: &[u8; 32],
    recovery_id: u8,
) -> bool {
    match recover_public_key(digest, r, s, recovery_id) {
        Some(recovered) => recovered.0[..].ct_eq(&expected.0[..]).into(),
        None => false,
    }
}
