//! Tunables for the ledger and the keeps.
//!
//! Both configs deserialize from JSON with every field optional, falling back
//! to the defaults below.
use serde::{Deserialize, Serialize};

/// How long members have to agree on a public key: 150 minutes.
pub const DEFAULT_KEY_GENERATION_TIMEOUT: u64 = 150 * 60;

/// How long members have to answer a signing request: 90 minutes.
pub const DEFAULT_SIGNING_TIMEOUT: u64 = 90 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BondingConfig {
    /// Seconds a newly authorized bond creator waits before it can bond the
    /// operator's collateral. Zero disables the waiting period.
    pub initialization_period: u64,
}

impl BondingConfig {
    /// The plain ledger, where authorization takes effect immediately.
    pub fn keep_bonding() -> Self {
        Self {
            initialization_period: 0,
        }
    }

    /// A ledger whose bond creators become ready `period` seconds after
    /// authorization.
    pub fn fully_backed(period: u64) -> Self {
        Self {
            initialization_period: period,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Which risk model a keep runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeepVariant {
    /// Members back the keep with delegated stake and bonds; bonds cannot be
    /// seized while a signing request is still live.
    #[default]
    DelegatedStake,
    /// Members back the keep with bonds only; the owner may seize at any time.
    FullyBacked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepConfig {
    pub key_generation_timeout: u64,
    pub signing_timeout: u64,
    /// How long member stakes stay locked once the keep opens.
    pub stake_lock_duration: u64,
    pub variant: KeepVariant,
}

impl Default for KeepConfig {
    fn default() -> Self {
        Self::delegated_stake()
    }
}

impl KeepConfig {
    pub fn delegated_stake() -> Self {
        Self {
            key_generation_timeout: DEFAULT_KEY_GENERATION_TIMEOUT,
            signing_timeout: DEFAULT_SIGNING_TIMEOUT,
            stake_lock_duration: 0,
            variant: KeepVariant::DelegatedStake,
        }
    }

    pub fn fully_backed() -> Self {
        Self {
            variant: KeepVariant::FullyBacked,
            ..Self::delegated_stake()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
