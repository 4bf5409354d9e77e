//! The bonding ledger.
//!
//! Operators deposit collateral as *unbonded value*. An authorized bond
//! creator can then lock part of it into a bond, identified by
//! `(operator, holder, reference)`. The holder later frees the bond (the
//! value returns to the operator), seizes some or all of it (the value
//! leaves the system), or hands it over to another holder.
//!
//! For every operator, `unbonded + sum(bonds)` only moves with deposits,
//! withdrawals, and seizures.
//!
//! Each public method is one atomic step. Value leaving the ledger goes out
//! through a [`ValueSink`] *after* the accounting for it has been applied, and
//! if the sink refuses the transfer the entire step is undone.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::collaborators::{GrantResolver, OperatorDirectory, ValueSink};
use crate::config::BondingConfig;
use crate::error::BondingError;
use crate::primitives::{Address, Amount, Asset, BondKey, ReferenceId};
use crate::registry::BondRegistry;

/// Something the ledger did, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum LedgerEvent {
    UnbondedValueDeposited {
        operator: Address,
        beneficiary: Address,
        amount: Amount,
    },
    UnbondedValueWithdrawn {
        operator: Address,
        beneficiary: Address,
        amount: Amount,
    },
    BondCreated {
        operator: Address,
        holder: Address,
        sortition_pool: Address,
        reference: ReferenceId,
        amount: Amount,
    },
    BondReassigned {
        operator: Address,
        reference: ReferenceId,
        new_holder: Address,
        new_reference: ReferenceId,
    },
    BondReleased {
        operator: Address,
        reference: ReferenceId,
    },
    BondSeized {
        operator: Address,
        reference: ReferenceId,
        destination: Address,
        amount: Amount,
    },
}

/// Everything that has to roll back together.
#[derive(Debug, Clone, Default)]
struct LedgerState {
    unbonded: HashMap<Address, Amount>,
    /// Only nonzero bonds are stored.
    bonds: HashMap<BondKey, Amount>,
    registry: BondRegistry,
    events: Vec<LedgerEvent>,
}

pub struct BondingLedger {
    state: LedgerState,
    config: BondingConfig,
    directory: Arc<dyn OperatorDirectory>,
    grants: Option<Arc<dyn GrantResolver>>,
    clock: Arc<dyn Clock>,
}

impl BondingLedger {
    pub fn new(
        config: BondingConfig,
        directory: Arc<dyn OperatorDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            state: LedgerState::default(),
            config,
            directory,
            grants: None,
            clock,
        }
    }

    /// Enable `withdraw_as_managed_grantee`, using `grants` to check callers.
    pub fn with_grant_resolver(mut self, grants: Arc<dyn GrantResolver>) -> Self {
        self.grants = Some(grants);
        self
    }

    pub fn config(&self) -> &BondingConfig {
        &self.config
    }

    /// Run `f` as one step: if it fails, nothing it did to the ledger remains.
    ///
    /// Nested calls are fine; an inner failure that the outer closure
    /// swallows only undoes the inner work.
    pub fn atomically<T, E>(
        &mut self,
        f: impl FnOnce(&mut BondingLedger) -> Result<T, E>,
    ) -> Result<T, E> {
        let snapshot = self.state.clone();
        let out = f(self);
        if out.is_err() {
            self.state = snapshot;
        }
        out
    }

    // Queries

    pub fn unbonded_value(&self, operator: Address) -> Amount {
        self.state.unbonded.get(&operator).copied().unwrap_or(0)
    }

    pub fn bond_amount(&self, operator: Address, holder: Address, reference: ReferenceId) -> Amount {
        self.bond(&BondKey::new(operator, holder, reference))
    }

    /// All collateral the ledger holds, bonded or not.
    ///
    /// Returns None if the sum across operators does not fit in an [`Amount`].
    pub fn total_held(&self) -> Option<Amount> {
        self.state
            .unbonded
            .values()
            .chain(self.state.bonds.values())
            .try_fold(0, |total: Amount, amount| total.checked_add(*amount))
    }

    /// The operator's unbonded value plus all its bonds.
    ///
    /// Deposits keep this within an [`Amount`], so it is always Some for
    /// operators the ledger has accepted value from.
    pub fn total_collateral(&self, operator: Address) -> Option<Amount> {
        self.state
            .bonds
            .iter()
            .filter(|(key, _)| key.operator == operator)
            .map(|(_, amount)| *amount)
            .try_fold(self.unbonded_value(operator), |total, amount| {
                total.checked_add(amount)
            })
    }

    pub fn beneficiary_of(&self, operator: Address) -> Option<Address> {
        self.directory.beneficiary_of(operator)
    }

    pub fn has_secondary_authorization(&self, operator: Address, pool: Address) -> bool {
        self.state.registry.is_pool_authorized(operator, pool)
    }

    pub fn is_bond_creator(&self, operator: Address, creator: Address) -> bool {
        self.state.registry.is_bond_creator(operator, creator)
    }

    /// Whether `creator` is authorized and past its initialization period.
    pub fn is_bond_creator_ready(&self, operator: Address, creator: Address) -> bool {
        match self.state.registry.bond_creator_authorized_at(operator, creator) {
            Some(at) => self.clock.now() >= at.saturating_add(self.config.initialization_period),
            None => false,
        }
    }

    /// How much of the operator's collateral `creator` may bond through `pool`.
    ///
    /// This is zero unless the creator is ready and the pool is authorized.
    pub fn available_unbonded_value(
        &self,
        operator: Address,
        creator: Address,
        pool: Address,
    ) -> Amount {
        if !self.is_bond_creator_ready(operator, creator) {
            return 0;
        }
        if !self.has_secondary_authorization(operator, pool) {
            return 0;
        }
        self.unbonded_value(operator)
    }

    pub fn events(&self) -> &[LedgerEvent] {
        &self.state.events
    }

    pub fn drain_events(&mut self) -> Vec<LedgerEvent> {
        std::mem::take(&mut self.state.events)
    }

    // Authorizations

    fn require_authorizer(&self, caller: Address, operator: Address) -> Result<(), BondingError> {
        if self.directory.authorizer_of(operator) == Some(caller) {
            Ok(())
        } else {
            warn!(%caller, %operator, "caller is not the operator's authorizer");
            Err(BondingError::NotAuthorized { caller, operator })
        }
    }

    pub fn authorize_bond_creator(
        &mut self,
        caller: Address,
        operator: Address,
        creator: Address,
    ) -> Result<(), BondingError> {
        self.require_authorizer(caller, operator)?;
        let now = self.clock.now();
        if self.state.registry.authorize_bond_creator(operator, creator, now) {
            info!(%operator, %creator, "bond creator authorized");
        }
        Ok(())
    }

    pub fn authorize_sortition_pool(
        &mut self,
        caller: Address,
        operator: Address,
        pool: Address,
    ) -> Result<(), BondingError> {
        self.require_authorizer(caller, operator)?;
        self.state.registry.authorize_pool(operator, pool);
        debug!(%operator, %pool, "sortition pool authorized");
        Ok(())
    }

    pub fn deauthorize_sortition_pool(
        &mut self,
        caller: Address,
        operator: Address,
        pool: Address,
    ) -> Result<(), BondingError> {
        self.require_authorizer(caller, operator)?;
        self.state.registry.deauthorize_pool(operator, pool);
        debug!(%operator, %pool, "sortition pool deauthorized");
        Ok(())
    }

    // Collateral

    /// Add `amount` to the operator's unbonded value.
    ///
    /// The operator's unbonded value plus its bonds must stay within an
    /// [`Amount`], so that freeing a bond can never overflow.
    pub fn deposit(&mut self, operator: Address, amount: Amount) -> Result<(), BondingError> {
        if amount == 0 {
            return Err(BondingError::AmountMustBePositive);
        }
        let beneficiary = self
            .directory
            .beneficiary_of(operator)
            .ok_or(BondingError::NoBeneficiary(operator))?;
        if self
            .total_collateral(operator)
            .and_then(|total| total.checked_add(amount))
            .is_none()
        {
            warn!(%operator, amount, "deposit would overflow the operator's collateral");
            return Err(BondingError::Overflow);
        }
        let unbonded = self
            .unbonded_value(operator)
            .checked_add(amount)
            .ok_or(BondingError::Overflow)?;
        self.state.unbonded.insert(operator, unbonded);
        self.state.events.push(LedgerEvent::UnbondedValueDeposited {
            operator,
            beneficiary,
            amount,
        });
        debug!(%operator, amount, unbonded, "unbonded value deposited");
        Ok(())
    }

    /// Withdraw unbonded value to the operator's beneficiary.
    ///
    /// Only the operator itself or its stake owner may do this.
    pub fn withdraw(
        &mut self,
        caller: Address,
        amount: Amount,
        operator: Address,
        sink: &mut dyn ValueSink,
    ) -> Result<(), BondingError> {
        if caller != operator && self.directory.owner_of(operator) != Some(caller) {
            warn!(%caller, %operator, "withdrawal by neither operator nor owner");
            return Err(BondingError::NotAuthorized { caller, operator });
        }
        self.withdraw_bond(amount, operator, sink)
    }

    /// Withdraw unbonded value on behalf of the grantee of a managed grant.
    pub fn withdraw_as_managed_grantee(
        &mut self,
        caller: Address,
        amount: Amount,
        operator: Address,
        grant: Address,
        sink: &mut dyn ValueSink,
    ) -> Result<(), BondingError> {
        let is_grantee = self
            .grants
            .as_ref()
            .map_or(false, |grants| grants.is_grantee_of(caller, grant, operator));
        if !is_grantee {
            warn!(%caller, %operator, %grant, "caller is not a grantee of the grant");
            return Err(BondingError::NotAuthorized { caller, operator });
        }
        self.withdraw_bond(amount, operator, sink)
    }

    fn withdraw_bond(
        &mut self,
        amount: Amount,
        operator: Address,
        sink: &mut dyn ValueSink,
    ) -> Result<(), BondingError> {
        if amount == 0 {
            return Err(BondingError::AmountMustBePositive);
        }
        let available = self.unbonded_value(operator);
        if amount > available {
            return Err(BondingError::InsufficientUnbonded {
                requested: amount,
                available,
            });
        }
        let beneficiary = self
            .directory
            .beneficiary_of(operator)
            .ok_or(BondingError::NoBeneficiary(operator))?;

        self.atomically(|ledger| {
            ledger.state.unbonded.insert(operator, available - amount);
            ledger.state.events.push(LedgerEvent::UnbondedValueWithdrawn {
                operator,
                beneficiary,
                amount,
            });
            sink.send(Asset::Native, beneficiary, amount, ledger)
                .map_err(|e| {
                    warn!(%operator, %beneficiary, amount, "withdrawal transfer failed");
                    BondingError::from(e)
                })
        })?;
        info!(%operator, %beneficiary, amount, "unbonded value withdrawn");
        Ok(())
    }

    // Bonds

    fn bond(&self, key: &BondKey) -> Amount {
        self.state.bonds.get(key).copied().unwrap_or(0)
    }

    fn set_bond(&mut self, key: BondKey, amount: Amount) {
        if amount == 0 {
            self.state.bonds.remove(&key);
        } else {
            self.state.bonds.insert(key, amount);
        }
    }

    /// Lock `amount` of the operator's collateral into a new bond.
    ///
    /// The caller is the bond creator; it must be authorized by the operator,
    /// ready, and bonding through a pool the operator authorized.
    pub fn create_bond(
        &mut self,
        caller: Address,
        operator: Address,
        holder: Address,
        reference: ReferenceId,
        amount: Amount,
        pool: Address,
    ) -> Result<(), BondingError> {
        if amount == 0 {
            return Err(BondingError::AmountMustBePositive);
        }
        let available = self.available_unbonded_value(operator, caller, pool);
        if available < amount {
            warn!(%operator, %caller, requested = amount, available, "insufficient unbonded value");
            return Err(BondingError::InsufficientUnbonded {
                requested: amount,
                available,
            });
        }
        let key = BondKey::new(operator, holder, reference);
        if self.bond(&key) > 0 {
            return Err(BondingError::DuplicateReference);
        }

        let unbonded = self.unbonded_value(operator) - amount;
        self.state.unbonded.insert(operator, unbonded);
        self.set_bond(key, amount);
        self.state.events.push(LedgerEvent::BondCreated {
            operator,
            holder,
            sortition_pool: pool,
            reference,
            amount,
        });
        info!(%operator, %holder, %reference, amount, "bond created");
        Ok(())
    }

    /// Hand a bond held by the caller over to `new_holder` under `new_reference`.
    pub fn reassign_bond(
        &mut self,
        caller: Address,
        operator: Address,
        reference: ReferenceId,
        new_holder: Address,
        new_reference: ReferenceId,
    ) -> Result<(), BondingError> {
        let from = BondKey::new(operator, caller, reference);
        let amount = self.bond(&from);
        if amount == 0 {
            return Err(BondingError::BondNotFound);
        }
        // Also rejects reassigning a bond onto itself.
        let to = BondKey::new(operator, new_holder, new_reference);
        if self.bond(&to) > 0 {
            return Err(BondingError::DuplicateReference);
        }

        self.set_bond(from, 0);
        self.set_bond(to, amount);
        self.state.events.push(LedgerEvent::BondReassigned {
            operator,
            reference,
            new_holder,
            new_reference,
        });
        info!(%operator, %reference, %new_holder, %new_reference, "bond reassigned");
        Ok(())
    }

    /// Release a bond held by the caller back into the operator's unbonded value.
    pub fn free_bond(
        &mut self,
        caller: Address,
        operator: Address,
        reference: ReferenceId,
    ) -> Result<(), BondingError> {
        let key = BondKey::new(operator, caller, reference);
        let amount = self.bond(&key);
        if amount == 0 {
            return Err(BondingError::BondNotFound);
        }
        let unbonded = self
            .unbonded_value(operator)
            .checked_add(amount)
            .ok_or(BondingError::Overflow)?;

        self.set_bond(key, 0);
        self.state.unbonded.insert(operator, unbonded);
        self.state
            .events
            .push(LedgerEvent::BondReleased { operator, reference });
        info!(%operator, holder = %caller, %reference, amount, "bond released");
        Ok(())
    }

    /// Take `amount` out of a bond held by the caller and send it to `destination`.
    pub fn seize_bond(
        &mut self,
        caller: Address,
        operator: Address,
        reference: ReferenceId,
        amount: Amount,
        destination: Address,
        sink: &mut dyn ValueSink,
    ) -> Result<(), BondingError> {
        if amount == 0 {
            return Err(BondingError::AmountMustBePositive);
        }
        let key = BondKey::new(operator, caller, reference);
        let bond = self.bond(&key);
        if bond == 0 {
            return Err(BondingError::BondNotFound);
        }
        if amount > bond {
            return Err(BondingError::AmountExceedsBond {
                requested: amount,
                bond,
            });
        }

        self.atomically(|ledger| {
            ledger.set_bond(key, bond - amount);
            ledger.state.events.push(LedgerEvent::BondSeized {
                operator,
                reference,
                destination,
                amount,
            });
            sink.send(Asset::Native, destination, amount, ledger)
                .map_err(|e| {
                    warn!(%operator, %destination, amount, "seizure transfer failed");
                    BondingError::from(e)
                })
        })?;
        info!(%operator, holder = %caller, %reference, %destination, amount, "bond seized");
        Ok(())
    }
}

/// A ledger shared between threads.
///
/// Every [`SharedLedger::with`] call holds the lock for its whole duration and
/// runs atomically, so callers never see each other's partial work.
#[derive(Clone)]
pub struct SharedLedger(Arc<Mutex<BondingLedger>>);

impl SharedLedger {
    pub fn new(ledger: BondingLedger) -> Self {
        Self(Arc::new(Mutex::new(ledger)))
    }

    pub fn with<T, E: From<BondingError>>(
        &self,
        f: impl FnOnce(&mut BondingLedger) -> Result<T, E>,
    ) -> Result<T, E> {
        let mut ledger = self.0.lock().map_err(|_| BondingError::LockPoisoned)?;
        ledger.atomically(f)
    }
}
