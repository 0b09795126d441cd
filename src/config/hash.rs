//! Configuration hashing for change detection.
//!
//! A saved plan records the hash of the configuration it was computed from;
//! applying it later refuses to run if the configuration on disk no longer
//! hashes the same.

use sha2::{Digest, Sha256};

use super::spec::ConfigFile;

/// Hasher for computing configuration hashes.
#[derive(Debug, Default)]
pub struct ConfigHasher;

impl ConfigHasher {
    /// Creates a new configuration hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes a hash of a whole configuration.
    ///
    /// `config` should be normalized first; every loaded
    /// [`Configuration`](super::Configuration) keeps a normalized copy.
    #[must_use]
    pub fn hash_config(&self, config: &ConfigFile) -> String {
        hash_canonical(config)
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }

    /// Compares two hashes to determine if they are equal.
    #[must_use]
    pub fn hashes_match(hash1: &str, hash2: &str) -> bool {
        if hash1.len() != hash2.len() {
            return false;
        }

        hash1
            .bytes()
            .zip(hash2.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

/// SHA-256 over the canonical JSON form of `value`.
///
/// Falls back to the YAML form for values JSON cannot represent (mappings
/// with non-string keys).
fn hash_canonical<T: serde::Serialize>(value: &T) -> String {
    let bytes = serde_json::to_vec(value)
        .or_else(|_| serde_yaml::to_string(value).map(String::into_bytes))
        .unwrap_or_default();
    hex::encode(Sha256::digest(&bytes))
}
