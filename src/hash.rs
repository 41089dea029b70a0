// src/hash.rs

//! Hashing for repository checksums and match cache keys
//!
//! Two algorithms are in use:
//! - **SHA-256**: repository content checksums, compared across processes
//!   and persisted next to cached match results
//! - **XXH128**: match cache keys and masking fingerprints, computed on
//!   every lookup
//!
//! | Consumer | Algorithm |
//! |----------|-----------|
//! | `SqliteRepository::checksum` | SHA-256 |
//! | `MatchCache` keys | XXH128 |
//! | `MaskingPolicy::digest` | XXH128 |
//! | treeupdates digest | SHA-256 |

use sha2::{Digest, Sha256};
use std::fmt;
use xxhash_rust::xxh3::xxh3_128;

/// Hash algorithm selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HashAlgorithm {
    /// SHA-256 (256-bit cryptographic hash)
    #[default]
    Sha256,

    /// XXH128 (128-bit non-cryptographic hash)
    Xxh128,
}

/// A hash value with its algorithm
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Hash {
    pub algorithm: HashAlgorithm,
    /// Lowercase hex digest
    pub value: String,
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// Incremental SHA-256 hasher, fed one record at a time
#[derive(Default)]
pub struct Hasher {
    state: Sha256,
}

impl Hasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.state.update(data);
    }

    /// Feed a text field followed by a separator byte so that adjacent
    /// fields cannot run into each other.
    pub fn update_field(&mut self, field: &str) {
        self.update(field.as_bytes());
        self.update(&[0x1f]);
    }

    pub fn finalize(self) -> Hash {
        Hash {
            algorithm: HashAlgorithm::Sha256,
            value: format!("{:x}", self.state.finalize()),
        }
    }
}

/// Compute hash of a byte slice
pub fn hash_bytes(algorithm: HashAlgorithm, data: &[u8]) -> Hash {
    let value = match algorithm {
        HashAlgorithm::Sha256 => format!("{:x}", Sha256::digest(data)),
        HashAlgorithm::Xxh128 => format!("{:032x}", xxh3_128(data)),
    };
    Hash { algorithm, value }
}

#[inline]
pub fn xxh128(data: &[u8]) -> String {
    hash_bytes(HashAlgorithm::Xxh128, data).value
}
