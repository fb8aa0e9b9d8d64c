//! Asset URIs (`<scheme>://<cid>`).

use crate::{ContentId, ContentIdError};
use std::fmt;

pub const DEFAULT_SCHEME: &str = "ipfs";

/// A content identifier wrapped in a scheme prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetUri {
    scheme: String,
    cid: ContentId,
}

impl AssetUri {
    pub fn new(scheme: impl Into<String>, cid: ContentId) -> Self {
        Self {
            scheme: scheme.into(),
            cid,
        }
    }

    pub fn cid(&self) -> ContentId {
        self.cid
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Returns the identifier part of `input`.
    ///
    /// A leading `<scheme>://` is removed when present. The scheme is
    /// matched case-insensitively. Anything else is returned unchanged
    /// (trimmed) and treated as a bare identifier.
    pub fn strip_scheme<'a>(input: &'a str, scheme: &str) -> &'a str {
        let input = input.trim();
        input
            .get(..scheme.len())
            .filter(|prefix| prefix.eq_ignore_ascii_case(scheme))
            .and_then(|_| input[scheme.len()..].strip_prefix("://"))
            .unwrap_or(input)
    }

    /// Parses either a full URI with `scheme` or a bare identifier.
    pub fn resolve(input: &str, scheme: &str) -> Result<ContentId, ContentIdError> {
        ContentId::parse(Self::strip_scheme(input, scheme))
    }
}

impl fmt::Display for AssetUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.cid)
    }
}
