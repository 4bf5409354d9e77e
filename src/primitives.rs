//! Identifiers and value types shared by the ledger and the keeps.
//!
//! Everything that can call into or receive value from the system is an
//! [`Address`]. Operators, bond holders, bond creators, pools, owners,
//! beneficiaries, keeps, and reward tokens all share this one type, since the
//! execution environment does not distinguish between them either.
use core::fmt;

use serde::{Deserialize, Serialize};

/// A quantity of collateral or reward value.
pub type Amount = u128;

/// A reading of the environment's monotonic clock, in seconds.
pub type Timestamp = u64;

/// A 32 byte message digest, as passed to `sign`.
pub type Digest = [u8; 32];

/// The length of an uncompressed secp256k1 key without its SEC1 tag.
pub const PUBLIC_KEY_LEN: usize = 64;

/// Represents a principal in the execution environment.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Address([u8; 20]);

impl Address {
    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Build an address whose last eight bytes hold `id`.
    ///
    /// Handy for tests and simulations, where principals are just numbered.
    pub fn from_low_u64(id: u64) -> Self {
        let mut out = [0u8; 20];
        out[12..].copy_from_slice(&id.to_be_bytes());
        Self(out)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

/// A reference chosen by a bond holder to tell its bonds apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReferenceId(pub u64);

impl From<u64> for ReferenceId {
    fn from(x: u64) -> Self {
        ReferenceId(x)
    }
}

impl fmt::Display for ReferenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies a single bond.
///
/// At most one bond with a nonzero amount exists per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BondKey {
    pub operator: Address,
    pub holder: Address,
    pub reference: ReferenceId,
}

impl BondKey {
    pub fn new(operator: Address, holder: Address, reference: ReferenceId) -> Self {
        Self {
            operator,
            holder,
            reference,
        }
    }
}

/// The kind of value moved by a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Asset {
    /// The environment's native currency, the one bonds are denominated in.
    Native,
    /// A token living at the given address.
    Token(Address),
}

/// An uncompressed secp256k1 public key, `x || y`, without the `0x04` tag.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKeyBytes(pub [u8; PUBLIC_KEY_LEN]);

impl PublicKeyBytes {
    /// Parse a key from a slice, returning `None` unless it is exactly 64 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; PUBLIC_KEY_LEN] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for PublicKeyBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKeyBytes(0x{}..)", hex::encode(&self.0[..4]))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_address_display() {
        let a = Address::from_low_u64(0xabcd);
        assert_eq!(
            a.to_string(),
            "0x000000000000000000000000000000000000abcd"
        );
    }

    #[test]
    fn test_public_key_debug_is_abbreviated() {
        let mut bytes = [0u8; 64];
        bytes[..4].copy_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(
            format!("{:?}", PublicKeyBytes(bytes)),
            "PublicKeyBytes(0xdeadbeef..)"
        );
    }

    #[test]
    fn test_public_key_from_slice_requires_64_bytes() {
        assert!(PublicKeyBytes::from_slice(&[1u8; 64]).is_some());
        assert!(PublicKeyBytes::from_slice(&[1u8; 63]).is_none());
        assert!(PublicKeyBytes::from_slice(&[1u8; 65]).is_none());
    }
}
