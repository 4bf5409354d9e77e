//! Per-operator authorizations consulted by the ledger.
//!
//! An operator's authorizer grants two kinds of permission. A bond creator
//! may lock the operator's collateral into bonds, and a sortition pool must be
//! authorized for the operator's collateral to count as available there.
//! Creators are only ever added. Pools can be toggled.
use std::collections::{HashMap, HashSet};

use crate::primitives::{Address, Timestamp};

#[derive(Debug, Clone, Default)]
struct Authorizations {
    /// Each creator, with the time it was first authorized.
    creators: HashMap<Address, Timestamp>,
    pools: HashSet<Address>,
}

/// The authorization table for every operator.
///
/// The registry records whatever it is told; checking that the caller is the
/// operator's authorizer is up to the ledger.
#[derive(Debug, Clone, Default)]
pub struct BondRegistry {
    operators: HashMap<Address, Authorizations>,
}

impl BondRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Authorize `creator` for `operator`.
    ///
    /// Returns false if it already was, in which case the original
    /// authorization time is kept.
    pub fn authorize_bond_creator(
        &mut self,
        operator: Address,
        creator: Address,
        now: Timestamp,
    ) -> bool {
        let entry = self.operators.entry(operator).or_default();
        if entry.creators.contains_key(&creator) {
            return false;
        }
        entry.creators.insert(creator, now);
        true
    }

    pub fn authorize_pool(&mut self, operator: Address, pool: Address) -> bool {
        self.operators.entry(operator).or_default().pools.insert(pool)
    }

    pub fn deauthorize_pool(&mut self, operator: Address, pool: Address) -> bool {
        match self.operators.get_mut(&operator) {
            Some(auth) => auth.pools.remove(&pool),
            None => false,
        }
    }

    pub fn is_bond_creator(&self, operator: Address, creator: Address) -> bool {
        self.bond_creator_authorized_at(operator, creator).is_some()
    }

    pub fn bond_creator_authorized_at(
        &self,
        operator: Address,
        creator: Address,
    ) -> Option<Timestamp> {
        self.operators
            .get(&operator)
            .and_then(|auth| auth.creators.get(&creator))
            .copied()
    }

    pub fn is_pool_authorized(&self, operator: Address, pool: Address) -> bool {
        self.operators
            .get(&operator)
            .map_or(false, |auth| auth.pools.contains(&pool))
    }
}
