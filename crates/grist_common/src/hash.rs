//! Content hashing for cache fingerprints and content-addressed storage.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// A 256-bit SHA-256 content hash.
///
/// Two items with the same `ContentHash` are assumed to have identical content.
/// The canonical text form is the lowercase hex encoding of the raw digest
/// bytes, which is also how the hash is serialized and how it names blobs in
/// the cache store.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Length of the hex text form.
    pub const HEX_LEN: usize = 64;

    /// Computes a content hash from a byte slice.
    pub fn from_bytes(data: &[u8]) -> Self {
        let digest: [u8; 32] = Sha256::digest(data).into();
        Self(digest)
    }

    /// Wraps an already computed raw digest.
    pub fn from_digest(digest: [u8; 32]) -> Self {
        Self(digest)
    }

    /// Returns the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns the lowercase hex form of the digest.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Returns the two-character shard prefix used to bound directory fan-out.
    pub fn shard(&self) -> String {
        hex::encode(&self.0[..1])
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

/// Error returned when a string is not a valid hex-encoded [`ContentHash`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid content hash '{input}': expected 64 lowercase hex characters")]
pub struct ParseHashError {
    /// The rejected input.
    pub input: String,
}

impl FromStr for ContentHash {
    type Err = ParseHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut digest = [0u8; 32];
        if s.len() != Self::HEX_LEN || s.bytes().any(|b| b.is_ascii_uppercase()) {
            return Err(ParseHashError {
                input: s.to_string(),
            });
        }
        hex::decode_to_slice(s, &mut digest).map_err(|_| ParseHashError {
            input: s.to_string(),
        })?;
        Ok(Self(digest))
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}

/// Incremental builder for composite hashes (fingerprints).
///
/// Every field is written with a length prefix so that `["ab", "c"]` and
/// `["a", "bc"]` never produce the same digest.
pub struct HashBuilder {
    hasher: Sha256,
}

impl HashBuilder {
    /// Starts a new composite hash, tagged with a domain separator.
    pub fn new(domain: &str) -> Self {
        let mut builder = Self {
            hasher: Sha256::new(),
        };
        builder.field(domain.as_bytes());
        builder
    }

    /// Appends a length-prefixed byte field.
    pub fn field(&mut self, bytes: &[u8]) -> &mut Self {
        self.hasher.update((bytes.len() as u64).to_le_bytes());
        self.hasher.update(bytes);
        self
    }

    /// Appends a length-prefixed string field.
    pub fn str_field(&mut self, value: &str) -> &mut Self {
        self.field(value.as_bytes())
    }

    /// Appends another hash as a field.
    pub fn hash_field(&mut self, hash: &ContentHash) -> &mut Self {
        self.field(hash.as_bytes())
    }

    /// Consumes the builder and returns the digest.
    pub fn finish(self) -> ContentHash {
        ContentHash(self.hasher.finalize().into())
    }
}
