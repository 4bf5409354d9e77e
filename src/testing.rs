//! In-memory collaborators, for tests and local simulations.
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use k256::ecdsa::SigningKey;
use k256::{FieldBytes, Scalar};

use crate::collaborators::{
    GrantResolver, OperatorDirectory, SlashPenalty, Slasher, StakeLock, ValueSink,
};
use crate::error::{SlashingError, TransferError};
use crate::ledger::BondingLedger;
use crate::primitives::{Address, Amount, Asset, Digest};

/// The principals standing behind one operator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperatorRoles {
    pub owner: Option<Address>,
    pub beneficiary: Option<Address>,
    pub authorizer: Option<Address>,
}

/// A fixed table of operator roles.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    operators: HashMap<Address, OperatorRoles>,
}

impl StaticDirectory {
    pub fn with_operator(mut self, operator: Address, roles: OperatorRoles) -> Self {
        self.operators.insert(operator, roles);
        self
    }
}

impl OperatorDirectory for StaticDirectory {
    fn beneficiary_of(&self, operator: Address) -> Option<Address> {
        self.operators.get(&operator).and_then(|r| r.beneficiary)
    }

    fn owner_of(&self, operator: Address) -> Option<Address> {
        self.operators.get(&operator).and_then(|r| r.owner)
    }

    fn authorizer_of(&self, operator: Address) -> Option<Address> {
        self.operators.get(&operator).and_then(|r| r.authorizer)
    }
}

/// A fixed set of `(grantee, grant, operator)` relationships.
#[derive(Debug, Clone, Default)]
pub struct StaticGrants {
    grants: HashSet<(Address, Address, Address)>,
}

impl StaticGrants {
    pub fn with_grant(mut self, grantee: Address, grant: Address, operator: Address) -> Self {
        self.grants.insert((grantee, grant, operator));
        self
    }
}

impl GrantResolver for StaticGrants {
    fn is_grantee_of(&self, caller: Address, grant: Address, operator: Address) -> bool {
        self.grants.contains(&(caller, grant, operator))
    }
}

/// One delivered transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub asset: Asset,
    pub to: Address,
    pub amount: Amount,
    /// What the ledger held at the moment the transfer went out.
    pub ledger_total: Option<Amount>,
}

/// A sink that records every transfer, refusing those to blocked recipients.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    transfers: Vec<Transfer>,
    rejected: HashSet<Address>,
}

impl RecordingSink {
    /// Refuse every transfer to `to`.
    pub fn rejecting(mut self, to: Address) -> Self {
        self.rejected.insert(to);
        self
    }

    pub fn accept(&mut self, to: Address) {
        self.rejected.remove(&to);
    }

    pub fn transfers(&self) -> &[Transfer] {
        &self.transfers
    }

    pub fn total_to(&self, to: Address) -> Amount {
        self.transfers
            .iter()
            .filter(|t| t.to == to)
            .map(|t| t.amount)
            .sum()
    }

    pub fn total_sent(&self) -> Amount {
        self.transfers.iter().map(|t| t.amount).sum()
    }
}

impl ValueSink for RecordingSink {
    fn send(
        &mut self,
        asset: Asset,
        to: Address,
        amount: Amount,
        ledger: &BondingLedger,
    ) -> Result<(), TransferError> {
        if self.rejected.contains(&to) {
            return Err(TransferError {
                to,
                reason: "recipient rejected the transfer".to_string(),
            });
        }
        self.transfers.push(Transfer {
            asset,
            to,
            amount,
            ledger_total: ledger.total_held(),
        });
        Ok(())
    }
}

/// Records stake locks and slashing calls.
#[derive(Debug, Default)]
pub struct RecordingStaking {
    locked: Mutex<HashMap<Address, Vec<Address>>>,
    slashed: Mutex<Vec<(Address, Vec<Address>, SlashPenalty)>>,
    fail_slashing: AtomicBool,
}

impl RecordingStaking {
    /// Make every following slashing call fail, or succeed again.
    pub fn set_fail_slashing(&self, fail: bool) {
        self.fail_slashing.store(fail, Ordering::SeqCst);
    }

    /// Members whose stake is currently locked by `keep`.
    pub fn locked_members(&self, keep: Address) -> Vec<Address> {
        self.locked
            .lock()
            .map(|locked| locked.get(&keep).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    /// How many slashing calls went through.
    pub fn slash_count(&self) -> usize {
        self.slashed.lock().map(|s| s.len()).unwrap_or_default()
    }

    /// The penalties of the slashing calls that went through, in order.
    pub fn penalties(&self) -> Vec<SlashPenalty> {
        self.slashed
            .lock()
            .map(|s| s.iter().map(|(_, _, penalty)| *penalty).collect())
            .unwrap_or_default()
    }
}

impl StakeLock for RecordingStaking {
    fn lock(&self, keep: Address, members: &[Address], _duration: u64) {
        if let Ok(mut locked) = self.locked.lock() {
            locked.insert(keep, members.to_vec());
        }
    }

    fn release(&self, keep: Address, _members: &[Address]) {
        if let Ok(mut locked) = self.locked.lock() {
            locked.remove(&keep);
        }
    }
}

impl Slasher for RecordingStaking {
    fn slash(
        &self,
        keep: Address,
        members: &[Address],
        penalty: SlashPenalty,
    ) -> Result<(), SlashingError> {
        if self.fail_slashing.load(Ordering::SeqCst) {
            return Err(SlashingError("staking contract reverted".to_string()));
        }
        let mut slashed = self
            .slashed
            .lock()
            .map_err(|_| SlashingError("slashing log poisoned".to_string()))?;
        slashed.push((keep, members.to_vec(), penalty));
        Ok(())
    }
}

/// The `(r, s, v)` triple members submit for a signing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureParts {
    pub r: [u8; 32],
    pub s: [u8; 32],
    pub recovery_id: u8,
}

impl SignatureParts {
    /// The high-`s` twin of this signature, with its matching recovery ID.
    pub fn malleated(&self) -> ([u8; 32], u8) {
        let s: Option<Scalar> =
            <Scalar as elliptic_curve::PrimeField>::from_repr(FieldBytes::clone_from_slice(&self.s)).into();
        let mut out = [0u8; 32];
        if let Some(s) = s {
            out.copy_from_slice(&(-s).to_bytes());
        }
        (out, self.recovery_id ^ 1)
    }
}

/// Sign a 32 byte digest as a keep's signing group would, producing a low-`s`
/// signature with its recovery ID.
pub fn sign_digest(key: &SigningKey, digest: &Digest) -> Result<SignatureParts, ecdsa::Error> {
    let (signature, recovery_id) = key.sign_prehash_recoverable(digest)?;
    let (signature, recovery_id) = match signature.normalize_s() {
        Some(low) => (low, recovery_id.to_byte() ^ 1),
        None => (signature, recovery_id.to_byte()),
    };
    let (r, s) = signature.split_bytes();
    let mut parts = SignatureParts {
        r: [0u8; 32],
        s: [0u8; 32],
        recovery_id,
    };
    parts.r.copy_from_slice(&r);
    parts.s.copy_from_slice(&s);
    Ok(parts)
}
