//! The lifecycle of a keep: a group of operators jointly holding one
//! threshold ECDSA key on behalf of an owner.
//!
//! A keep is created empty and initialized exactly once by its factory, with
//! its members' bonds already locked in the [`BondingLedger`] under
//! `(member, keep address, bond reference)`. From there:
//!
//! - Members each submit the group public key they computed off-chain. If
//!   every member submits the same key before the key generation timeout, it
//!   becomes the keep's key.
//! - The owner requests signatures, one at a time, and any member submits the
//!   finished signature.
//! - Anybody can prove that the key signed something the owner never asked
//!   for, which slashes the members.
//! - The owner eventually closes the keep, returning the bonds to the
//!   members, or seizes the bonds, terminating it.
//!
//! Rewards can be paid to the members at any point after initialization.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::info;

use crate::clock::Clock;
use crate::collaborators::{Slasher, StakeLock};
use crate::config::KeepConfig;
use crate::error::KeepError;
use crate::ledger::BondingLedger;
use crate::members::{MemberList, MemberMap, MAX_MEMBERS};
use crate::primitives::{Address, Amount, Digest, PublicKeyBytes, ReferenceId, Timestamp};

mod keygen;
mod rewards;
mod signing;
mod termination;

/// Where a keep is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepStatus {
    Active,
    /// Closed by the owner; bonds went back to the members.
    Closed,
    /// Terminated by the owner; bonds were seized.
    Terminated,
}

/// What the factory hands to a keep when opening it.
#[derive(Debug, Clone)]
pub struct KeepParams {
    pub owner: Address,
    pub members: Vec<Address>,
    pub honest_threshold: usize,
    /// The reference the members' bonds were created under.
    pub bond_reference: ReferenceId,
    /// The stake each member committed; this is what fraud slashes.
    pub member_stake: Amount,
}

/// Something the keep did, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeepEvent {
    PublicKeyPublished {
        public_key: PublicKeyBytes,
    },
    ConflictingPublicKeySubmitted {
        submitter: Address,
        conflicting_key: PublicKeyBytes,
    },
    SignatureRequested {
        digest: Digest,
    },
    SignatureSubmitted {
        digest: Digest,
        r: [u8; 32],
        s: [u8; 32],
        recovery_id: u8,
    },
    SlashingFailed {
        reason: String,
    },
    KeepClosed,
    KeepTerminated,
    EthRewardDistributed {
        amount: Amount,
    },
    Erc20RewardDistributed {
        token: Address,
        amount: Amount,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SigningRequest {
    digest: Digest,
    requested_at: Timestamp,
}

#[derive(Debug, Clone)]
struct KeepState {
    owner: Address,
    factory: Address,
    members: MemberList,
    honest_threshold: usize,
    bond_reference: ReferenceId,
    member_stake: Amount,
    created_at: Timestamp,
    status: KeepStatus,
    key_candidates: MemberMap<PublicKeyBytes>,
    public_key: Option<PublicKeyBytes>,
    pending: Option<SigningRequest>,
    requested_digests: HashMap<Digest, Timestamp>,
    fraudulent_preimages: HashSet<Vec<u8>>,
    eth_balances: HashMap<Address, Amount>,
    token_balances: HashMap<(Address, Address), Amount>,
    events: Vec<KeepEvent>,
}

pub struct Keep {
    address: Address,
    config: KeepConfig,
    clock: Arc<dyn Clock>,
    stake_lock: Arc<dyn StakeLock>,
    slasher: Arc<dyn Slasher>,
    state: Option<KeepState>,
}

impl Keep {
    /// Create an uninitialized keep living at `address`.
    pub fn new(
        address: Address,
        config: KeepConfig,
        clock: Arc<dyn Clock>,
        stake_lock: Arc<dyn StakeLock>,
        slasher: Arc<dyn Slasher>,
    ) -> Self {
        Self {
            address,
            config,
            clock,
            stake_lock,
            slasher,
            state: None,
        }
    }

    /// Open the keep. Called once, by the factory.
    pub fn initialize(&mut self, caller: Address, params: KeepParams) -> Result<(), KeepError> {
        if self.state.is_some() {
            return Err(KeepError::AlreadyInitialized);
        }
        let members = MemberList::new(&params.members).ok_or_else(|| {
            KeepError::InvalidMembers(format!(
                "expected 1 to {} distinct members, got {}",
                MAX_MEMBERS,
                params.members.len()
            ))
        })?;
        if params.honest_threshold == 0 || params.honest_threshold > members.len() {
            return Err(KeepError::InvalidThreshold {
                threshold: params.honest_threshold,
                members: members.len(),
            });
        }

        let key_candidates = MemberMap::new(&members);
        self.stake_lock.lock(
            self.address,
            members.as_slice(),
            self.config.stake_lock_duration,
        );
        info!(
            keep = %self.address,
            owner = %params.owner,
            members = members.len(),
            honest_threshold = params.honest_threshold,
            "keep opened"
        );
        self.state = Some(KeepState {
            owner: params.owner,
            factory: caller,
            members,
            honest_threshold: params.honest_threshold,
            bond_reference: params.bond_reference,
            member_stake: params.member_stake,
            created_at: self.clock.now(),
            status: KeepStatus::Active,
            key_candidates,
            public_key: None,
            pending: None,
            requested_digests: HashMap::new(),
            fraudulent_preimages: HashSet::new(),
            eth_balances: HashMap::new(),
            token_balances: HashMap::new(),
            events: Vec::new(),
        });
        Ok(())
    }

    fn state(&self) -> Result<&KeepState, KeepError> {
        self.state.as_ref().ok_or(KeepError::NotInitialized)
    }

    fn state_mut(&mut self) -> Result<&mut KeepState, KeepError> {
        self.state.as_mut().ok_or(KeepError::NotInitialized)
    }

    fn require_active(&self) -> Result<&KeepState, KeepError> {
        let state = self.state()?;
        if state.status != KeepStatus::Active {
            return Err(KeepError::NotActive);
        }
        Ok(state)
    }

    fn require_owner(&self, caller: Address) -> Result<&KeepState, KeepError> {
        let state = self.require_active()?;
        if state.owner != caller {
            return Err(KeepError::NotOwner);
        }
        Ok(state)
    }

    fn require_member(&self, caller: Address) -> Result<&KeepState, KeepError> {
        let state = self.require_active()?;
        if !state.members.contains(caller) {
            return Err(KeepError::NotMember(caller));
        }
        Ok(state)
    }

    /// Run `f` against both the keep and the ledger as one step.
    ///
    /// If it fails, the keep's state is restored along with the ledger's.
    fn atomically<T>(
        &mut self,
        ledger: &mut BondingLedger,
        f: impl FnOnce(&mut Keep, &mut BondingLedger) -> Result<T, KeepError>,
    ) -> Result<T, KeepError> {
        let snapshot = self.state.clone();
        let out = ledger.atomically(|ledger| f(self, ledger));
        if out.is_err() {
            self.state = snapshot;
        }
        out
    }

    // Queries

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn config(&self) -> &KeepConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    pub fn owner(&self) -> Result<Address, KeepError> {
        Ok(self.state()?.owner)
    }

    /// The factory that initialized this keep.
    pub fn factory(&self) -> Result<Address, KeepError> {
        Ok(self.state()?.factory)
    }

    pub fn members(&self) -> Result<&[Address], KeepError> {
        Ok(self.state()?.members.as_slice())
    }

    pub fn honest_threshold(&self) -> Result<usize, KeepError> {
        Ok(self.state()?.honest_threshold)
    }

    pub fn bond_reference(&self) -> Result<ReferenceId, KeepError> {
        Ok(self.state()?.bond_reference)
    }

    pub fn member_stake(&self) -> Result<Amount, KeepError> {
        Ok(self.state()?.member_stake)
    }

    pub fn opened_at(&self) -> Result<Timestamp, KeepError> {
        Ok(self.state()?.created_at)
    }

    pub fn status(&self) -> Result<KeepStatus, KeepError> {
        Ok(self.state()?.status)
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status(), Ok(KeepStatus::Active))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.status(), Ok(KeepStatus::Closed))
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self.status(), Ok(KeepStatus::Terminated))
    }

    pub fn events(&self) -> &[KeepEvent] {
        match &self.state {
            Some(state) => &state.events,
            None => &[],
        }
    }

    pub fn drain_events(&mut self) -> Vec<KeepEvent> {
        self.state
            .as_mut()
            .map(|s| std::mem::take(&mut s.events))
            .unwrap_or_default()
    }

    fn emit(&mut self, event: KeepEvent) -> Result<(), KeepError> {
        self.state_mut()?.events.push(event);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fixture {
    //! A keep wired to in-memory collaborators, shared by the keep tests.
    use std::sync::Arc;

    use k256::ecdsa::SigningKey;
    use rand_core::OsRng;

    use super::*;
    use crate::clock::ManualClock;
    use crate::config::BondingConfig;
    use crate::crypto::encode_public_key;
    use crate::testing::{OperatorRoles, RecordingStaking, StaticDirectory};

    pub const OWNER: u64 = 1000;
    pub const FACTORY: u64 = 1001;
    pub const POOL: u64 = 1002;
    pub const KEEP: u64 = 1003;
    pub const REFERENCE: ReferenceId = ReferenceId(1003);

    pub fn addr(id: u64) -> Address {
        Address::from_low_u64(id)
    }

    pub fn member(i: u64) -> Address {
        addr(10 + i)
    }

    pub fn beneficiary(i: u64) -> Address {
        addr(100 + i)
    }

    fn authorizer(i: u64) -> Address {
        addr(200 + i)
    }

    pub struct Fixture {
        pub keep: Keep,
        pub ledger: BondingLedger,
        pub clock: Arc<ManualClock>,
        pub staking: Arc<RecordingStaking>,
        pub signing_key: SigningKey,
        pub public_key: PublicKeyBytes,
    }

    /// Open a keep of `n` members, each bonding `bond` of a `2 * bond` deposit.
    pub fn open(n: u64, bond: Amount, config: KeepConfig) -> Fixture {
        let mut directory = StaticDirectory::default();
        for i in 0..n {
            directory = directory.with_operator(
                member(i),
                OperatorRoles {
                    owner: Some(member(i)),
                    beneficiary: Some(beneficiary(i)),
                    authorizer: Some(authorizer(i)),
                },
            );
        }
        let clock = Arc::new(ManualClock::new(1_000_000));
        let staking = Arc::new(RecordingStaking::default());
        let mut ledger =
            BondingLedger::new(BondingConfig::keep_bonding(), Arc::new(directory), clock.clone());

        let members: Vec<Address> = (0..n).map(member).collect();
        for (i, m) in members.iter().enumerate() {
            let i = i as u64;
            ledger.deposit(*m, 2 * bond).unwrap();
            ledger
                .authorize_bond_creator(authorizer(i), *m, addr(FACTORY))
                .unwrap();
            ledger
                .authorize_sortition_pool(authorizer(i), *m, addr(POOL))
                .unwrap();
            ledger
                .create_bond(addr(FACTORY), *m, addr(KEEP), REFERENCE, bond, addr(POOL))
                .unwrap();
        }

        let mut keep = Keep::new(addr(KEEP), config, clock.clone(), staking.clone(), staking.clone());
        keep.initialize(
            addr(FACTORY),
            KeepParams {
                owner: addr(OWNER),
                members,
                honest_threshold: 1,
                bond_reference: REFERENCE,
                member_stake: 500,
            },
        )
        .unwrap();

        let signing_key = SigningKey::random(&mut OsRng);
        let public_key = encode_public_key(signing_key.verifying_key());
        Fixture {
            keep,
            ledger,
            clock,
            staking,
            signing_key,
            public_key,
        }
    }

    impl Fixture {
        /// Have every member submit the real group key.
        pub fn agree_on_key(&mut self) {
            let members = self.keep.members().unwrap().to_vec();
            for m in members {
                self.keep
                    .submit_public_key(m, self.public_key.as_bytes())
                    .unwrap();
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::fixture::*;
    use super::*;
    use crate::clock::ManualClock;
    use crate::testing::RecordingStaking;

    fn blank_keep() -> Keep {
        let staking = Arc::new(RecordingStaking::default());
        Keep::new(
            addr(KEEP),
            KeepConfig::default(),
            Arc::new(ManualClock::new(0)),
            staking.clone(),
            staking,
        )
    }

    fn params(members: Vec<Address>, honest_threshold: usize) -> KeepParams {
        KeepParams {
            owner: addr(OWNER),
            members,
            honest_threshold,
            bond_reference: REFERENCE,
            member_stake: 1,
        }
    }

    #[test]
    fn test_initialize_once() {
        let mut fx = open(3, 10, KeepConfig::default());
        assert!(fx.keep.is_active());
        assert_eq!(fx.keep.factory().unwrap(), addr(FACTORY));
        assert_eq!(fx.staking.locked_members(addr(KEEP)).len(), 3);

        let err = fx
            .keep
            .initialize(addr(FACTORY), params(vec![member(0)], 1))
            .unwrap_err();
        assert_eq!(err, KeepError::AlreadyInitialized);
        assert_eq!(fx.keep.members().unwrap().len(), 3);
    }

    #[test]
    fn test_initialize_validates_group() {
        let mut keep = blank_keep();
        assert_eq!(
            keep.initialize(addr(FACTORY), params(vec![], 1)).unwrap_err().code(),
            "InvalidMembers"
        );
        assert_eq!(
            keep.initialize(addr(FACTORY), params(vec![member(0), member(0)], 1))
                .unwrap_err()
                .code(),
            "InvalidMembers"
        );
        assert_eq!(
            keep.initialize(addr(FACTORY), params(vec![member(0), member(1)], 3))
                .unwrap_err()
                .code(),
            "InvalidThreshold"
        );
        assert_eq!(
            keep.initialize(addr(FACTORY), params(vec![member(0)], 0))
                .unwrap_err()
                .code(),
            "InvalidThreshold"
        );
        assert!(!keep.is_initialized());
        keep.initialize(addr(FACTORY), params(vec![member(0), member(1)], 2))
            .unwrap();
        assert_eq!(keep.honest_threshold().unwrap(), 2);
    }

    #[test]
    fn test_uninitialized_keep_rejects_operations() {
        let mut keep = blank_keep();
        assert_eq!(keep.owner().unwrap_err(), KeepError::NotInitialized);
        assert_eq!(
            keep.sign(addr(OWNER), [0u8; 32]).unwrap_err(),
            KeepError::NotInitialized
        );
        assert!(!keep.is_active());
        assert!(keep.events().is_empty());
    }
}
