//! # Core Identifiers
//!
//! Defines the primitive identifier types shared by every Veilnet subsystem.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 32-byte hash (SHA-256).
pub type Hash = [u8; 32];

/// Identifier of a tunnel on its gateway router.
pub type TunnelId = u32;

/// Wire code selecting a signature algorithm.
pub type SigTypeCode = u16;

/// Wire code selecting a public-key encryption algorithm.
pub type EncTypeCode = u16;

/// Wire code selecting a reachability-record sub-format.
pub type StoreTypeCode = u8;

/// Truncated-hash identity of a router or destination.
///
/// This is the key under which records are looked up in the network
/// database, and the gateway reference carried by every lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct IdentHash(pub Hash);

impl IdentHash {
    /// Wire size in bytes.
    pub const SIZE: usize = 32;

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &Hash {
        &self.0
    }
}

impl From<Hash> for IdentHash {
    fn from(h: Hash) -> Self {
        Self(h)
    }
}

impl AsRef<[u8]> for IdentHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for IdentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test: IdentHash displays as lowercase hex
    #[test]
    fn test_ident_hash_display() {
        let h = IdentHash([0xAB; 32]);
        assert_eq!(h.to_string(), "ab".repeat(32));
    }

    /// Test: IdentHash ordering follows byte ordering
    #[test]
    fn test_ident_hash_ordering() {
        let a = IdentHash([1; 32]);
        let b = IdentHash([2; 32]);
        assert!(a < b);
    }
}
