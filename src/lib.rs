//! Bonded-keep is an accounting core for threshold ECDSA custody, where
//! the operators holding shares of a key have put up collateral that can be
//! taken from them if they misbehave.
//!
//! There are two halves.
//!
//! The [`BondingLedger`] tracks collateral. Operators deposit value, which
//! sits *unbonded* until a bond creator they authorized locks part of it into
//! a bond for some holder. The holder later frees the bond, seizes it, or
//! hands it to somebody else.
//!
//! A [`Keep`] is one signing group. It is opened by a factory with bonds
//! already created for its members, and then:
//!
//! - The members agree on a public key, which they computed off-chain.
//! - The owner requests signatures over 32 byte digests, one at a time.
//! - Anyone can prove fraud, by showing a valid signature over a digest the
//!   owner never asked for, which slashes every member.
//! - The owner either closes the keep, giving the bonds back, or seizes the
//!   bonds and terminates it.
//!
//! # Design
//!
//! Nothing in this crate holds key material or moves real value. Signatures
//! are only *checked*, by public key recovery on secp256k1. Everything the
//! crate does not own (staking, slashing, token transfers, operator roles) is
//! injected through the traits in [`collaborators`], with in-memory versions
//! in [`testing`].
//!
//! Every mutating operation is a single atomic step. Accounting is applied
//! before any value is handed to a [`ValueSink`], and the sink gets to look at
//! the ledger as it stands after that accounting. If the sink refuses the
//! transfer, the whole step is undone:
//! ```ignore
//! ledger.seize_bond(holder, operator, reference, amount, destination, &mut sink)?;
//! ```
//!
//! Time is read through a [`Clock`], so timeouts never sleep and tests can
//! move time forward by hand with [`ManualClock`].
//!
//! # Variants
//!
//! Keeps run either as [`KeepVariant::DelegatedStake`], backed by stake and
//! bonds, or as [`KeepVariant::FullyBacked`], backed by bonds alone. The only
//! behavioral difference is that a fully-backed keep's bonds can be seized
//! even while a signing request is pending. Fully-backed ledgers usually pair
//! with [`BondingConfig::fully_backed`], which makes new bond creators wait
//! out an initialization period.
mod clock;
pub mod collaborators;
mod config;
pub mod crypto;
mod error;
mod keep;
mod ledger;
mod members;
mod primitives;
mod registry;
pub mod testing;

pub use clock::{Clock, ManualClock};
pub use collaborators::{
    GrantResolver, OperatorDirectory, SlashPenalty, Slasher, StakeLock, ValueSink,
};
pub use config::{
    BondingConfig, KeepConfig, KeepVariant, DEFAULT_KEY_GENERATION_TIMEOUT,
    DEFAULT_SIGNING_TIMEOUT,
};
pub use error::{BondingError, KeepError, SlashingError, TransferError};
pub use keep::{Keep, KeepEvent, KeepParams, KeepStatus};
pub use ledger::{BondingLedger, LedgerEvent, SharedLedger};
pub use members::{MemberList, MAX_MEMBERS};
pub use primitives::{
    Address, Amount, Asset, BondKey, Digest, PublicKeyBytes, ReferenceId, Timestamp,
    PUBLIC_KEY_LEN,
};
pub use registry::BondRegistry;
