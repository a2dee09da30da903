use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

/// Object id of the empty tree in SHA-1 repositories; the diff base of root commits.
pub const EMPTY_TREE: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid object name `{0}`")]
pub struct InvalidHash(pub String);

/// A full, 40 character hexadecimal object name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[serde(try_from = "String", into = "String")]
#[ts(type = "string")]
pub struct GitHash(String);

impl GitHash {
    pub const LEN: usize = 40;

    pub fn parse(value: &str) -> Result<Self, InvalidHash> {
        if value.len() == Self::LEN && value.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(Self(value.to_ascii_lowercase()))
        } else {
            Err(InvalidHash(value.to_string()))
        }
    }

    /// Parse git's rendering of an optional object, where all zeros means absent.
    pub fn parse_optional(value: &str) -> Result<Option<Self>, InvalidHash> {
        let hash = Self::parse(value)?;
        Ok((!hash.is_zero()).then_some(hash))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.bytes().all(|b| b == b'0')
    }
}

impl fmt::Display for GitHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for GitHash {
    type Err = InvalidHash;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for GitHash {
    type Error = InvalidHash;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<GitHash> for String {
    fn from(hash: GitHash) -> Self {
        hash.0
    }
}

impl AsRef<std::ffi::OsStr> for GitHash {
    fn as_ref(&self) -> &std::ffi::OsStr {
        self.0.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_only_full_hex_names() {
        let full = "0123456789abcdef0123456789ABCDEF01234567";
        assert_eq!(
            GitHash::parse(full).unwrap().as_str(),
            "0123456789abcdef0123456789abcdef01234567"
        );
        assert!(GitHash::parse("0123456").is_err());
        assert!(GitHash::parse(&"g".repeat(40)).is_err());
        assert!(GitHash::parse(&"a".repeat(41)).is_err());
    }

    #[test]
    fn zero_hash_reads_as_absent() {
        assert_eq!(GitHash::parse_optional(&"0".repeat(40)).unwrap(), None);
        assert!(GitHash::parse_optional(EMPTY_TREE).unwrap().is_some());
    }

    #[test]
    fn deserialization_validates() {
        assert!(serde_json::from_str::<GitHash>("\"abc\"").is_err());
        let hash: GitHash = serde_json::from_str(&format!("\"{EMPTY_TREE}\"")).unwrap();
        assert_eq!(hash.as_str(), EMPTY_TREE);
    }
}
