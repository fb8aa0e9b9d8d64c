//! Content identifiers.
//!
//! A `ContentId` is a CIDv1 using the `raw` codec and a BLAKE3 multihash:
//!
//! ```text
//! 0x01 (version) | 0x55 (raw) | 0x1e (blake3) | 0x20 (digest length) | digest[32]
//! ```
//!
//! The canonical string form is multibase base32-lower (leading `b`), which
//! is what pinning services and gateways expect. Every multibase encoding is
//! accepted when parsing.

use crate::Hash;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const CID_VERSION: u8 = 0x01;
const CODEC_RAW: u8 = 0x55;
const MULTIHASH_BLAKE3: u8 = 0x1e;
const DIGEST_LEN: u8 = 0x20;
const ENCODED_LEN: usize = 4 + Hash::SIZE;

#[derive(thiserror::Error, Debug)]
pub enum ContentIdError {
    #[error("invalid multibase string: {0}")]
    Multibase(#[from] multibase::Error),
    #[error("invalid length: expected {ENCODED_LEN} bytes, got {0}")]
    InvalidLength(usize),
    #[error("unsupported cid version {0:#x}")]
    UnsupportedVersion(u8),
    #[error("unsupported codec: expected {0:#x}, got {1:#x}")]
    UnsupportedCodec(u8, u8),
    #[error("unsupported multihash: expected {0:#x}, got {1:#x}")]
    UnsupportedMultihash(u8, u8),
    #[error("invalid digest length: expected {0}, got {1}")]
    InvalidDigestLength(u8, u8),
}

/// Deterministic identifier derived from an asset's bytes.
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ContentId {
    hash: Hash,
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ContentId").field(&self.to_string()).finish()
    }
}

impl ContentId {
    pub fn new(hash: Hash) -> Self {
        Self { hash }
    }

    /// Identifier for `bytes`, without storing anything.
    pub fn for_bytes(bytes: impl AsRef<[u8]>) -> Self {
        Self::new(Hash::new(bytes))
    }

    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn parse(s: &str) -> Result<Self, ContentIdError> {
        let (_, bytes) = multibase::decode(s)?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ContentIdError> {
        if bytes.len() != ENCODED_LEN {
            return Err(ContentIdError::InvalidLength(bytes.len()));
        }
        if bytes[0] != CID_VERSION {
            return Err(ContentIdError::UnsupportedVersion(bytes[0]));
        }
        if bytes[1] != CODEC_RAW {
            return Err(ContentIdError::UnsupportedCodec(CODEC_RAW, bytes[1]));
        }
        if bytes[2] != MULTIHASH_BLAKE3 {
            return Err(ContentIdError::UnsupportedMultihash(
                MULTIHASH_BLAKE3,
                bytes[2],
            ));
        }
        if bytes[3] != DIGEST_LEN {
            return Err(ContentIdError::InvalidDigestLength(DIGEST_LEN, bytes[3]));
        }

        let digest: [u8; 32] = bytes[4..]
            .try_into()
            .map_err(|_| ContentIdError::InvalidLength(bytes.len()))?;
        Ok(Self::new(digest.into()))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ENCODED_LEN);
        out.extend_from_slice(&[CID_VERSION, CODEC_RAW, MULTIHASH_BLAKE3, DIGEST_LEN]);
        out.extend_from_slice(self.hash.as_bytes());
        out
    }

    pub fn to_base32(&self) -> String {
        multibase::encode(multibase::Base::Base32Lower, self.to_bytes())
    }

    pub fn to_base58(&self) -> String {
        multibase::encode(multibase::Base::Base58Btc, self.to_bytes())
    }
}

impl From<Hash> for ContentId {
    fn from(hash: Hash) -> Self {
        Self::new(hash)
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base32())
    }
}

impl FromStr for ContentId {
    type Err = ContentIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentId::parse(s)
    }
}

impl Serialize for ContentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base32())
    }
}

impl<'de> Deserialize<'de> for ContentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ContentId::parse(&s).map_err(serde::de::Error::custom)
    }
}
