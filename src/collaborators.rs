//! The boundary with everything this crate does not own.
//!
//! Staking, slashing, grants, and value transfer all live in the surrounding
//! environment. They are injected as trait objects so the ledger and the
//! keeps can run against real backends or the in-memory ones in
//! [`crate::testing`].
use crate::error::{SlashingError, TransferError};
use crate::ledger::BondingLedger;
use crate::primitives::{Address, Amount, Asset};

/// Resolves the principals tied to an operator by the staking contract.
pub trait OperatorDirectory: Send + Sync {
    /// Where withdrawn collateral and rewards for this operator go.
    fn beneficiary_of(&self, operator: Address) -> Option<Address>;

    /// The stake owner, who may withdraw on the operator's behalf.
    fn owner_of(&self, operator: Address) -> Option<Address>;

    /// The principal allowed to manage bonding authorizations.
    fn authorizer_of(&self, operator: Address) -> Option<Address>;
}

/// Answers whether a caller is the grantee of a managed token grant that
/// stakes through `operator`.
pub trait GrantResolver: Send + Sync {
    fn is_grantee_of(&self, caller: Address, grant: Address, operator: Address) -> bool;
}

/// Locks member stakes for the lifetime of a keep.
///
/// Locking and releasing are best effort: the keep does not check results.
pub trait StakeLock: Send + Sync {
    fn lock(&self, keep: Address, members: &[Address], duration: u64);

    fn release(&self, keep: Address, members: &[Address]);
}

/// How much stake a slashing call should take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlashPenalty {
    /// The stake each member committed when the keep was opened.
    Amount(Amount),
    /// Everything the member has staked.
    All,
}

/// Penalizes member stakes after proven misbehavior.
pub trait Slasher: Send + Sync {
    fn slash(
        &self,
        keep: Address,
        members: &[Address],
        penalty: SlashPenalty,
    ) -> Result<(), SlashingError>;
}

/// Delivers value out of the system.
///
/// The recipient gets a read-only view of the ledger, which has already
/// applied the accounting for this transfer. Returning an error undoes the
/// whole operation that asked for the transfer.
pub trait ValueSink {
    fn send(
        &mut self,
        asset: Asset,
        to: Address,
        amount: Amount,
        ledger: &BondingLedger,
    ) -> Result<(), TransferError>;
}
