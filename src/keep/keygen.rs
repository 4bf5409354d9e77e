//! Agreeing on the keep's public key.
//!
//! Members run distributed key generation off-chain and each submit the
//! public key they ended up with. The keep adopts the key only if every
//! member submitted the same bytes before the timeout. There are no retries:
//! one mismatching or missing submission leaves the keep without a key.
use tracing::{debug, info, warn};

use super::{Keep, KeepEvent};
use crate::error::KeepError;
use crate::primitives::{Address, PublicKeyBytes};

impl Keep {
    /// Record the public key `caller` computed.
    pub fn submit_public_key(&mut self, caller: Address, key: &[u8]) -> Result<(), KeepError> {
        let state = self.require_member(caller)?;
        if state.key_candidates.contains(&state.members, caller) {
            return Err(KeepError::AlreadySubmitted(caller));
        }
        let key = PublicKeyBytes::from_slice(key).ok_or(KeepError::KeyLengthInvalid(key.len()))?;
        if self.has_key_generation_timed_out()? {
            warn!(keep = %self.address, member = %caller, "public key submitted after timeout");
            return Err(KeepError::KeygenTimeoutElapsed);
        }

        // One signal per distinct value we disagree with, not per member.
        let mut conflicts: Vec<PublicKeyBytes> = Vec::new();
        for prior in state.key_candidates.values() {
            if *prior != key && !conflicts.contains(prior) {
                conflicts.push(*prior);
            }
        }

        let address = self.address;
        let state = self.state_mut()?;
        state.key_candidates.put(&state.members, caller, key);
        for conflicting_key in conflicts {
            warn!(keep = %address, member = %caller, "conflicting public key submitted");
            state.events.push(KeepEvent::ConflictingPublicKeySubmitted {
                submitter: caller,
                conflicting_key,
            });
        }
        debug!(keep = %address, member = %caller, "public key submitted");

        if !state.key_candidates.full() {
            return Ok(());
        }
        let mut values = state.key_candidates.values();
        let first = match values.next() {
            Some(first) => *first,
            None => return Ok(()),
        };
        if values.all(|v| *v == first) {
            state.public_key = Some(first);
            state
                .events
                .push(KeepEvent::PublicKeyPublished { public_key: first });
            info!(keep = %address, "public key published");
        } else {
            warn!(keep = %address, "members disagree on the public key");
        }
        Ok(())
    }

    /// The agreed group key, once every member has submitted the same one.
    pub fn public_key(&self) -> Result<Option<PublicKeyBytes>, KeepError> {
        Ok(self.state()?.public_key)
    }

    /// The key a given member submitted, if any.
    pub fn submitted_public_key(&self, member: Address) -> Result<Option<PublicKeyBytes>, KeepError> {
        let state = self.state()?;
        Ok(state.key_candidates.get(&state.members, member).copied())
    }

    pub fn has_key_generation_timed_out(&self) -> Result<bool, KeepError> {
        let state = self.state()?;
        let deadline = state
            .created_at
            .saturating_add(self.config.key_generation_timeout);
        Ok(self.clock.now() > deadline)
    }
}
