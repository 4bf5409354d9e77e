//! Error types for the bonding ledger and keeps.
//!
//! Every variant maps to a stable code via `code()`, so that callers and
//! monitors can branch on the cause without parsing messages.
use thiserror::Error;

use crate::primitives::{Address, Amount};

/// Reported by a [`crate::ValueSink`] when value could not be delivered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transfer to {to} rejected: {reason}")]
pub struct TransferError {
    pub to: Address,
    pub reason: String,
}

/// Reported by a [`crate::Slasher`] when a penalty could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("slashing failed: {0}")]
pub struct SlashingError(pub String);

/// Errors raised by the bonding ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BondingError {
    #[error("caller {caller} is not authorized for operator {operator}")]
    NotAuthorized { caller: Address, operator: Address },

    #[error("bond not found")]
    BondNotFound,

    #[error("beneficiary not defined for operator {0}")]
    NoBeneficiary(Address),

    #[error("insufficient unbonded value: requested {requested}, available {available}")]
    InsufficientUnbonded { requested: Amount, available: Amount },

    #[error("reference ID not unique for holder and operator")]
    DuplicateReference,

    #[error("amount must be greater than zero")]
    AmountMustBePositive,

    #[error("requested amount {requested} is greater than the bond {bond}")]
    AmountExceedsBond { requested: Amount, bond: Amount },

    #[error("arithmetic overflow")]
    Overflow,

    #[error(transparent)]
    TransferFailed(#[from] TransferError),

    #[error("ledger lock poisoned")]
    LockPoisoned,
}

impl BondingError {
    /// The stable reason code of this error.
    pub fn code(&self) -> &'static str {
        match self {
            BondingError::NotAuthorized { .. } => "NotAuthorized",
            BondingError::BondNotFound => "BondNotFound",
            BondingError::NoBeneficiary(_) => "NoBeneficiary",
            BondingError::InsufficientUnbonded { .. } => "InsufficientUnbonded",
            BondingError::DuplicateReference => "DuplicateReference",
            BondingError::AmountMustBePositive => "AmountMustBePositive",
            BondingError::AmountExceedsBond { .. } => "AmountExceedsBond",
            BondingError::Overflow => "Overflow",
            BondingError::TransferFailed(_) => "TransferFailed",
            BondingError::LockPoisoned => "LockPoisoned",
        }
    }
}

/// Errors raised by a keep.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeepError {
    #[error("keep already initialized")]
    AlreadyInitialized,

    #[error("keep not initialized")]
    NotInitialized,

    #[error("keep is not active")]
    NotActive,

    #[error("bad member list: {0}")]
    InvalidMembers(String),

    #[error("honest threshold {threshold} out of range for {members} members")]
    InvalidThreshold { threshold: usize, members: usize },

    #[error("caller is not the keep owner")]
    NotOwner,

    #[error("caller {0} is not a keep member")]
    NotMember(Address),

    #[error("member {0} already submitted a public key")]
    AlreadySubmitted(Address),

    #[error("public key must be 64 bytes long, got {0}")]
    KeyLengthInvalid(usize),

    #[error("key generation timeout elapsed")]
    KeygenTimeoutElapsed,

    #[error("public key was not set yet")]
    PublicKeyNotSet,

    #[error("signer is busy")]
    SignerIsBusy,

    #[error("not awaiting a signature")]
    NotAwaitingSignature,

    #[error("signing timeout elapsed")]
    SigningTimeoutElapsed,

    #[error("recovery ID must be one of {{0, 1, 2, 3}}, got {0}")]
    RecoveryIdOutOfRange(u8),

    #[error("malleable signature: s value is in the upper half of the curve order")]
    MalleableSignature,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("signed digest does not match sha256 hash of the preimage")]
    PreimageMismatch,

    #[error("signature is not fraudulent")]
    NotFraudulent,

    #[error("requested signing has not timed out yet")]
    SigningInProgress,

    #[error("dividend value must be non-zero")]
    DividendMustBeNonzero,

    #[error("partial signer bond must be non-zero")]
    MustBeNonzero,

    #[error("no funds to withdraw")]
    NoFundsToWithdraw,

    #[error("arithmetic overflow")]
    Overflow,

    #[error(transparent)]
    Bonding(#[from] BondingError),
}

impl KeepError {
    /// The stable reason code of this error.
    ///
    /// Ledger failures surfaced through a keep report the ledger code.
    pub fn code(&self) -> &'static str {
        match self {
            KeepError::AlreadyInitialized => "AlreadyInitialized",
            KeepError::NotInitialized => "NotInitialized",
            KeepError::NotActive => "NotActive",
            KeepError::InvalidMembers(_) => "InvalidMembers",
            KeepError::InvalidThreshold { .. } => "InvalidThreshold",
            KeepError::NotOwner => "NotOwner",
            KeepError::NotMember(_) => "NotMember",
            KeepError::AlreadySubmitted(_) => "AlreadySubmitted",
            KeepError::KeyLengthInvalid(_) => "KeyLengthInvalid",
            KeepError::KeygenTimeoutElapsed => "KeygenTimeoutElapsed",
            KeepError::PublicKeyNotSet => "PublicKeyNotSet",
            KeepError::SignerIsBusy => "SignerIsBusy",
            KeepError::NotAwaitingSignature => "NotAwaitingSignature",
            KeepError::SigningTimeoutElapsed => "SigningTimeoutElapsed",
            KeepError::RecoveryIdOutOfRange(_) => "RecoveryIDOutOfRange",
            KeepError::MalleableSignature => "MalleableSignature",
            KeepError::InvalidSignature => "InvalidSignature",
            KeepError::PreimageMismatch => "PreimageMismatch",
            KeepError::NotFraudulent => "NotFraudulent",
            KeepError::SigningInProgress => "SigningInProgress",
            KeepError::DividendMustBeNonzero => "DividendMustBeNonzero",
            KeepError::MustBeNonzero => "MustBeNonzero",
            KeepError::NoFundsToWithdraw => "NoFundsToWithdraw",
            KeepError::Overflow => "Overflow",
            KeepError::Bonding(e) => e.code(),
        }
    }
}
