//! Signing requests, signature submission, and fraud proofs.
//!
//! The keep has at most one request in flight. It stays pending until some
//! member submits a valid signature for it or the signing timeout runs out.
//! Every requested digest is remembered, so that a valid signature over a
//! digest that was never requested proves the members used the key on their
//! own.
use tracing::{debug, info, warn};

use super::{Keep, KeepEvent, SigningRequest};
use crate::collaborators::SlashPenalty;
use crate::config::KeepVariant;
use crate::crypto::{is_low_s, normalize_s, sha256, signed_by};
use crate::error::KeepError;
use crate::primitives::{Address, Digest, Timestamp};

/// Recovery IDs members may submit.
const MAX_RECOVERY_ID: u8 = 3;

/// Offset of Ethereum-style `v` values over plain recovery IDs.
const ETHEREUM_V_OFFSET: u8 = 27;

impl Keep {
    /// Ask the members to sign `digest`.
    pub fn sign(&mut self, caller: Address, digest: Digest) -> Result<(), KeepError> {
        let state = self.require_owner(caller)?;
        if state.public_key.is_none() {
            return Err(KeepError::PublicKeyNotSet);
        }
        if self.is_signing_in_progress()? && !self.has_signing_timed_out()? {
            return Err(KeepError::SignerIsBusy);
        }

        let now = self.clock.now();
        let address = self.address;
        let state = self.state_mut()?;
        state.pending = Some(SigningRequest {
            digest,
            requested_at: now,
        });
        state.requested_digests.insert(digest, now);
        state.events.push(KeepEvent::SignatureRequested { digest });
        info!(keep = %address, "signature requested");
        Ok(())
    }

    /// Submit the signature for the pending request.
    pub fn submit_signature(
        &mut self,
        caller: Address,
        r: [u8; 32],
        s: [u8; 32],
        recovery_id: u8,
    ) -> Result<(), KeepError> {
        let state = self.require_member(caller)?;
        let request = state.pending.ok_or(KeepError::NotAwaitingSignature)?;
        if self.has_signing_timed_out()? {
            return Err(KeepError::SigningTimeoutElapsed);
        }
        if recovery_id > MAX_RECOVERY_ID {
            return Err(KeepError::RecoveryIdOutOfRange(recovery_id));
        }
        if !is_low_s(&s) {
            return Err(KeepError::MalleableSignature);
        }
        let public_key = state.public_key.ok_or(KeepError::PublicKeyNotSet)?;
        if !signed_by(&public_key, &request.digest, &r, &s, recovery_id) {
            warn!(keep = %self.address, member = %caller, "invalid signature submitted");
            return Err(KeepError::InvalidSignature);
        }

        let address = self.address;
        let state = self.state_mut()?;
        state.pending = None;
        state.events.push(KeepEvent::SignatureSubmitted {
            digest: request.digest,
            r,
            s,
            recovery_id,
        });
        info!(keep = %address, member = %caller, "signature submitted");
        Ok(())
    }

    /// Whether `digest` is the pending request, still without a valid signature.
    pub fn is_awaiting_signature(&self, digest: &Digest) -> bool {
        self.state
            .as_ref()
            .and_then(|s| s.pending)
            .map_or(false, |request| request.digest == *digest)
    }

    pub fn is_signing_in_progress(&self) -> Result<bool, KeepError> {
        Ok(self.state()?.pending.is_some())
    }

    /// Whether the pending request, if any, has outlived the signing timeout.
    pub fn has_signing_timed_out(&self) -> Result<bool, KeepError> {
        let timeout = self.config.signing_timeout;
        let now = self.clock.now();
        Ok(self
            .state()?
            .pending
            .map_or(false, |request| now > request.requested_at.saturating_add(timeout)))
    }

    /// When `digest` was requested through [`Keep::sign`], if ever.
    pub fn digest_requested_at(&self, digest: &Digest) -> Result<Option<Timestamp>, KeepError> {
        Ok(self.state()?.requested_digests.get(digest).copied())
    }

    /// Check whether a signature proves the key was used without the owner
    /// asking for it.
    ///
    /// `v` is either a recovery ID or an Ethereum-style `27 + id`. High-`s`
    /// signatures are accepted here, since they are just as much a proof.
    pub fn check_signature_fraud(
        &self,
        v: u8,
        r: [u8; 32],
        s: [u8; 32],
        digest: Digest,
        preimage: &[u8],
    ) -> Result<bool, KeepError> {
        let state = self.state()?;
        let public_key = state.public_key.ok_or(KeepError::PublicKeyNotSet)?;
        if sha256(preimage) != digest {
            return Err(KeepError::PreimageMismatch);
        }

        let recovery_id = if v >= ETHEREUM_V_OFFSET {
            v - ETHEREUM_V_OFFSET
        } else {
            v
        };
        let valid = match normalize_s(&s, recovery_id) {
            Some((s, recovery_id)) => signed_by(&public_key, &digest, &r, &s, recovery_id),
            None => false,
        };
        Ok(valid && !state.requested_digests.contains_key(&digest))
    }

    /// Prove fraud and slash the members.
    ///
    /// A preimage only ever slashes once; resubmitting it still returns true.
    pub fn submit_signature_fraud(
        &mut self,
        v: u8,
        r: [u8; 32],
        s: [u8; 32],
        digest: Digest,
        preimage: &[u8],
    ) -> Result<bool, KeepError> {
        self.require_active()?;
        if !self.check_signature_fraud(v, r, s, digest, preimage)? {
            return Err(KeepError::NotFraudulent);
        }

        let state = self.state()?;
        if state.fraudulent_preimages.contains(preimage) {
            debug!(keep = %self.address, "fraud already proven for this preimage");
            return Ok(true);
        }
        let members = state.members.as_slice().to_vec();
        let penalty = match self.config.variant {
            KeepVariant::DelegatedStake => SlashPenalty::Amount(state.member_stake),
            KeepVariant::FullyBacked => SlashPenalty::All,
        };

        warn!(keep = %self.address, members = members.len(), "signature fraud proven");
        let slashed = self.slasher.slash(self.address, &members, penalty);
        let address = self.address;
        let state = self.state_mut()?;
        if let Err(e) = slashed {
            warn!(keep = %address, error = %e, "slashing for signature fraud failed");
            state
                .events
                .push(KeepEvent::SlashingFailed { reason: e.to_string() });
        }
        state.fraudulent_preimages.insert(preimage.to_vec());
        Ok(true)
    }
}

#[cfg(test)]
mod test {
    use super::super::fixture::*;
    use super::*;
    use crate::config::KeepConfig;
    use crate::testing::sign_digest;

    #[test]
    fn test_sign_requires_owner_and_key() {
        let mut fx = open(3, 10, KeepConfig::default());
        let digest = sha256(b"tx");
        assert_eq!(
            fx.keep.sign(addr(OWNER), digest).unwrap_err(),
            KeepError::PublicKeyNotSet
        );
        fx.agree_on_key();
        assert_eq!(
            fx.keep.sign(member(0), digest).unwrap_err(),
            KeepError::NotOwner
        );
        fx.keep.sign(addr(OWNER), digest).unwrap();
        assert!(fx.keep.is_awaiting_signature(&digest));
        assert!(fx.keep.digest_requested_at(&digest).unwrap().is_some());
    }

    #[test]
    fn test_signer_is_busy_until_timeout() {
        let mut fx = open(2, 10, KeepConfig::default());
        fx.agree_on_key();
        let first = sha256(b"first");
        let second = sha256(b"second");
        fx.keep.sign(addr(OWNER), first).unwrap();
        assert_eq!(
            fx.keep.sign(addr(OWNER), second).unwrap_err(),
            KeepError::SignerIsBusy
        );

        fx.clock.advance(fx.keep.config().signing_timeout + 1);
        assert!(fx.keep.has_signing_timed_out().unwrap());
        fx.keep.sign(addr(OWNER), second).unwrap();
        assert!(fx.keep.is_awaiting_signature(&second));
        assert!(!fx.keep.is_awaiting_signature(&first));
    }

    #[test]
    fn test_submit_signature() {
        let mut fx = open(3, 10, KeepConfig::default());
        fx.agree_on_key();
        let digest = sha256(b"pay 1 BTC");
        let sig = sign_digest(&fx.signing_key, &digest).unwrap();

        assert_eq!(
            fx.keep
                .submit_signature(member(0), sig.r, sig.s, sig.recovery_id)
                .unwrap_err(),
            KeepError::NotAwaitingSignature
        );
        fx.keep.sign(addr(OWNER), digest).unwrap();

        assert_eq!(
            fx.keep
                .submit_signature(addr(OWNER), sig.r, sig.s, sig.recovery_id)
                .unwrap_err(),
            KeepError::NotMember(addr(OWNER))
        );
        assert_eq!(
            fx.keep.submit_signature(member(0), sig.r, sig.s, 4).unwrap_err(),
            KeepError::RecoveryIdOutOfRange(4)
        );
        let (high_s, high_v) = sig.malleated();
        assert_eq!(
            fx.keep
                .submit_signature(member(0), sig.r, high_s, high_v)
                .unwrap_err(),
            KeepError::MalleableSignature
        );
        assert_eq!(
            fx.keep
                .submit_signature(member(0), sig.r, sig.s, sig.recovery_id ^ 1)
                .unwrap_err(),
            KeepError::InvalidSignature
        );
        // Invalid submissions leave the request pending.
        assert!(fx.keep.is_awaiting_signature(&digest));

        fx.keep
            .submit_signature(member(1), sig.r, sig.s, sig.recovery_id)
            .unwrap();
        assert!(!fx.keep.is_awaiting_signature(&digest));
        assert!(!fx.keep.is_signing_in_progress().unwrap());
        assert!(matches!(
            fx.keep.events().last(),
            Some(KeepEvent::SignatureSubmitted { .. })
        ));
    }

    #[test]
    fn test_submit_signature_after_timeout() {
        let mut fx = open(2, 10, KeepConfig::default());
        fx.agree_on_key();
        let digest = sha256(b"late");
        let sig = sign_digest(&fx.signing_key, &digest).unwrap();
        fx.keep.sign(addr(OWNER), digest).unwrap();
        fx.clock.advance(fx.keep.config().signing_timeout + 1);
        assert_eq!(
            fx.keep
                .submit_signature(member(0), sig.r, sig.s, sig.recovery_id)
                .unwrap_err(),
            KeepError::SigningTimeoutElapsed
        );
    }

    #[test]
    fn test_fraud_check() {
        let mut fx = open(3, 10, KeepConfig::default());
        let preimage = b"unrequested transaction".to_vec();
        let digest = sha256(&preimage);
        let sig = sign_digest(&fx.signing_key, &digest).unwrap();

        assert_eq!(
            fx.keep
                .check_signature_fraud(sig.recovery_id, sig.r, sig.s, digest, &preimage)
                .unwrap_err(),
            KeepError::PublicKeyNotSet
        );
        fx.agree_on_key();
        assert_eq!(
            fx.keep
                .check_signature_fraud(sig.recovery_id, sig.r, sig.s, digest, b"other")
                .unwrap_err(),
            KeepError::PreimageMismatch
        );

        assert!(fx
            .keep
            .check_signature_fraud(sig.recovery_id, sig.r, sig.s, digest, &preimage)
            .unwrap());
        assert!(fx
            .keep
            .check_signature_fraud(sig.recovery_id + 27, sig.r, sig.s, digest, &preimage)
            .unwrap());
        let (high_s, high_v) = sig.malleated();
        assert!(fx
            .keep
            .check_signature_fraud(high_v, sig.r, high_s, digest, &preimage)
            .unwrap());
        assert!(!fx
            .keep
            .check_signature_fraud(sig.recovery_id ^ 1, sig.r, sig.s, digest, &preimage)
            .unwrap());

        // Once requested, the same signature is honest work.
        fx.keep.sign(addr(OWNER), digest).unwrap();
        assert!(!fx
            .keep
            .check_signature_fraud(sig.recovery_id, sig.r, sig.s, digest, &preimage)
            .unwrap());
    }

    #[test]
    fn test_fraud_slashes_once() {
        let mut fx = open(3, 10, KeepConfig::default());
        fx.agree_on_key();
        let preimage = b"rogue".to_vec();
        let digest = sha256(&preimage);
        let sig = sign_digest(&fx.signing_key, &digest).unwrap();

        assert!(fx
            .keep
            .submit_signature_fraud(sig.recovery_id, sig.r, sig.s, digest, &preimage)
            .unwrap());
        assert_eq!(fx.staking.slash_count(), 1);
        assert!(fx
            .keep
            .submit_signature_fraud(sig.recovery_id, sig.r, sig.s, digest, &preimage)
            .unwrap());
        assert_eq!(fx.staking.slash_count(), 1);
    }

    #[test]
    fn test_fraud_penalty_depends_on_variant() {
        for (config, penalty) in [
            (KeepConfig::delegated_stake(), SlashPenalty::Amount(500)),
            (KeepConfig::fully_backed(), SlashPenalty::All),
        ] {
            let mut fx = open(2, 10, config);
            fx.agree_on_key();
            let preimage = b"rogue".to_vec();
            let digest = sha256(&preimage);
            let sig = sign_digest(&fx.signing_key, &digest).unwrap();

            fx.keep
                .submit_signature_fraud(sig.recovery_id, sig.r, sig.s, digest, &preimage)
                .unwrap();
            assert_eq!(fx.staking.penalties(), vec![penalty]);
        }
    }

    #[test]
    fn test_failed_slashing_keeps_the_proof() {
        let mut fx = open(2, 10, KeepConfig::default());
        fx.agree_on_key();
        fx.staking.set_fail_slashing(true);
        let preimage = b"rogue".to_vec();
        let digest = sha256(&preimage);
        let sig = sign_digest(&fx.signing_key, &digest).unwrap();

        assert!(fx
            .keep
            .submit_signature_fraud(sig.recovery_id, sig.r, sig.s, digest, &preimage)
            .unwrap());
        assert!(matches!(
            fx.keep.events().last(),
            Some(KeepEvent::SlashingFailed { .. })
        ));
        assert_eq!(fx.staking.slash_count(), 0);
    }

    #[test]
    fn test_honest_signature_is_not_fraud() {
        let mut fx = open(2, 10, KeepConfig::default());
        fx.agree_on_key();
        let preimage = b"requested".to_vec();
        let digest = sha256(&preimage);
        fx.keep.sign(addr(OWNER), digest).unwrap();
        let sig = sign_digest(&fx.signing_key, &digest).unwrap();
        assert_eq!(
            fx.keep
                .submit_signature_fraud(sig.recovery_id, sig.r, sig.s, digest, &preimage)
                .unwrap_err(),
            KeepError::NotFraudulent
        );
    }
}
