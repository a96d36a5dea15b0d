//! The hash type used by Blossom (sha256, 32 bytes)

use std::{borrow::Borrow, fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// Hash type used by Blossom (sha256, 32 bytes)
#[derive(Clone, Copy, Hash, PartialEq, Eq)]
pub struct Sha256Hash([u8; 32]);

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ParseHashError {
    #[error("expected 64-character hex hash, got {0} characters")]
    Length(usize),
    #[error("invalid hex in hash: {0}")]
    Hex(#[from] hex::FromHexError),
}

impl fmt::Debug for Sha256Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Sha256Hash").field(&self.to_hex()).finish()
    }
}

impl Sha256Hash {
    /// The hash for the empty byte range (`b""`).
    pub const EMPTY: Sha256Hash = Sha256Hash([
        0xe3, 0xb0, 0xc4, 0x42, 0x98, 0xfc, 0x1c, 0x14, 0x9a, 0xfb, 0xf4, 0xc8, 0x99, 0x6f, 0xb9,
        0x24, 0x27, 0xae, 0x41, 0xe4, 0x64, 0x9b, 0x93, 0x4c, 0xa4, 0x95, 0x99, 0x1b, 0x78, 0x52,
        0xb8, 0x55,
    ]);

    /// The size of the hash in bytes.
    pub const SIZE: usize = 32;

    /// Calculate the hash of the provided bytes.
    pub fn new(buf: impl AsRef<[u8]>) -> Self {
        Sha256Hash(Sha256::digest(buf.as_ref()).into())
    }

    /// Bytes of the hash.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Create a `Sha256Hash` from its raw bytes representation.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse a lowercase or uppercase hex string of exactly 64 characters.
    pub fn from_hex(s: &str) -> Result<Self, ParseHashError> {
        let s = s.trim();
        if s.len() != 64 {
            return Err(ParseHashError::Length(s.len()));
        }
        let mut arr = [0u8; 32];
        hex::decode_to_slice(s, &mut arr)?;
        Ok(Self(arr))
    }

    /// Convert the hash to a lowercase hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Convert to a hex string limited to the first 5 bytes for a friendly string
    /// representation of the hash.
    pub fn fmt_short(&self) -> String {
        hex::encode(&self.0[..5])
    }
}

impl AsRef<[u8]> for Sha256Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Borrow<[u8; 32]> for Sha256Hash {
    fn borrow(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for Sha256Hash {
    fn from(value: [u8; 32]) -> Self {
        Sha256Hash(value)
    }
}

impl From<Sha256Hash> for [u8; 32] {
    fn from(value: Sha256Hash) -> Self {
        value.0
    }
}

impl FromStr for Sha256Hash {
    type Err = ParseHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl PartialOrd for Sha256Hash {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Sha256Hash {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl fmt::Display for Sha256Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Sha256Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Sha256Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Sha256Hash::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
