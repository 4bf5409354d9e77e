//! Ending a keep, and moving bond value in and out of it.
use tracing::{info, warn};

use super::{Keep, KeepEvent, KeepStatus};
use crate::collaborators::ValueSink;
use crate::config::KeepVariant;
use crate::error::KeepError;
use crate::ledger::BondingLedger;
use crate::primitives::{Address, Amount};

impl Keep {
    /// Fail if a signing request is still live.
    fn require_signing_settled(&self) -> Result<(), KeepError> {
        if self.is_signing_in_progress()? && !self.has_signing_timed_out()? {
            return Err(KeepError::SigningInProgress);
        }
        Ok(())
    }

    /// Close the keep, returning every member's bond to their unbonded value.
    pub fn close_keep(&mut self, caller: Address, ledger: &mut BondingLedger) -> Result<(), KeepError> {
        self.require_owner(caller)?;
        self.require_signing_settled()?;

        self.atomically(ledger, |keep, ledger| {
            let state = keep.state()?;
            let members = state.members.as_slice().to_vec();
            let reference = state.bond_reference;
            for member in members {
                if ledger.bond_amount(member, keep.address, reference) > 0 {
                    ledger.free_bond(keep.address, member, reference)?;
                }
            }
            keep.state_mut()?.status = KeepStatus::Closed;
            keep.emit(KeepEvent::KeepClosed)
        })?;

        let state = self.state()?;
        self.stake_lock.release(self.address, state.members.as_slice());
        info!(keep = %self.address, "keep closed");
        Ok(())
    }

    /// Seize every member's bond for the owner, terminating the keep.
    ///
    /// Delegated-stake keeps wait for a live signing request to settle first;
    /// fully-backed keeps can be terminated at any time.
    pub fn seize_signer_bonds(
        &mut self,
        caller: Address,
        ledger: &mut BondingLedger,
        sink: &mut dyn ValueSink,
    ) -> Result<(), KeepError> {
        let owner = self.require_owner(caller)?.owner;
        if self.config.variant == KeepVariant::DelegatedStake {
            self.require_signing_settled()?;
        }

        let seized = self.atomically(ledger, |keep, ledger| {
            keep.state_mut()?.status = KeepStatus::Terminated;
            let state = keep.state()?;
            let members = state.members.as_slice().to_vec();
            let reference = state.bond_reference;
            let mut seized: Amount = 0;
            for member in members {
                let amount = ledger.bond_amount(member, keep.address, reference);
                if amount == 0 {
                    continue;
                }
                ledger.seize_bond(keep.address, member, reference, amount, owner, sink)?;
                seized = seized.saturating_add(amount);
            }
            keep.emit(KeepEvent::KeepTerminated)?;
            Ok(seized)
        });
        let seized = match seized {
            Ok(seized) => seized,
            Err(e) => {
                warn!(keep = %self.address, error = %e, "seizing signer bonds failed");
                return Err(e);
            }
        };

        let state = self.state()?;
        self.stake_lock.release(self.address, state.members.as_slice());
        info!(keep = %self.address, %owner, seized, "keep terminated");
        Ok(())
    }

    /// Put `value` back into the members' unbonded value, split evenly with
    /// the remainder going to the last member.
    ///
    /// Either every member is credited or none is.
    pub fn return_partial_signer_bonds(
        &mut self,
        value: Amount,
        ledger: &mut BondingLedger,
    ) -> Result<(), KeepError> {
        let shares: Vec<(Address, Amount)> = self
            .state()?
            .members
            .split(value)
            .ok_or(KeepError::MustBeNonzero)?
            .collect();

        ledger.atomically(|ledger| {
            for (member, share) in shares {
                ledger.deposit(member, share)?;
            }
            Ok::<_, KeepError>(())
        })?;
        info!(keep = %self.address, value, "partial signer bonds returned");
        Ok(())
    }

    /// The total value the members have bonded to this keep.
    pub fn check_bond_amount(&self, ledger: &BondingLedger) -> Result<Amount, KeepError> {
        let state = self.state()?;
        state
            .members
            .iter()
            .map(|member| ledger.bond_amount(member, self.address, state.bond_reference))
            .try_fold(0, |total: Amount, amount| total.checked_add(amount))
            .ok_or(KeepError::Overflow)
    }
}
