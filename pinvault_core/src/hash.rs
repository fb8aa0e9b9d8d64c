//! The hash type behind every content identifier (BLAKE3, 32 bytes).

use std::{cmp::Ordering, fmt};

/// 32-byte BLAKE3 digest of a blob.
#[derive(Clone, Copy, Hash, PartialEq, Eq)]
pub struct Hash(blake3::Hash);

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Hash").field(&self.to_hex()).finish()
    }
}

impl Hash {
    /// Length of the digest in bytes.
    pub const SIZE: usize = 32;

    /// Hashes `buf` in one pass.
    pub fn new(buf: impl AsRef<[u8]>) -> Self {
        Hash(blake3::hash(buf.as_ref()))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(blake3::Hash::from_bytes(bytes))
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex().to_string()
    }

    /// First five bytes as hex, for log lines.
    pub fn fmt_short(&self) -> String {
        data_encoding::HEXLOWER.encode(&self.as_bytes()[..5])
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl From<[u8; 32]> for Hash {
    fn from(value: [u8; 32]) -> Self {
        Self::from_bytes(value)
    }
}

impl PartialOrd for Hash {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Hash {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_bytes().cmp(other.as_bytes())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_known_value() {
        let hash = Hash::new(b"hello");
        let expected_hex = "ea8f163db38682925e4491c5e58d4bb3506ef8c14eb78a86e908c5624a67200f";
        assert_eq!(hash.to_hex(), expected_hex);
    }

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(Hash::new(b"cat.png bytes"), Hash::new(b"cat.png bytes"));
        assert_ne!(Hash::new(b"cat"), Hash::new(b"dog"));
    }

    #[test]
    fn test_ordering_follows_bytes() {
        let low = Hash::from_bytes([0; 32]);
        let high = Hash::from([0xff; 32]);
        assert!(low < high);
    }

    #[test]
    fn test_hash_fmt_short() {
        let hash = Hash::new(b"hello");
        let short = hash.fmt_short();
        assert_eq!(short.len(), 10);
        assert!(hash.to_hex().starts_with(&short));
    }
}
