//! Content fingerprints.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::request::NormalizedRequest;
use crate::{Error, Result};

/// Hex digits kept from the digest unless configured otherwise.
pub const DEFAULT_HASH_LENGTH: usize = 12;

const MIN_HASH_LENGTH: usize = 8;
const MAX_HASH_LENGTH: usize = 64;

/// Short content hash identifying a build request.
/// Identical normalized requests always map to the same fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[serde(try_from = "String", into = "String")]
#[display("{_0}")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Hash the canonical text of a request, truncated to `length` hex digits.
    pub fn compute(request: &NormalizedRequest, length: usize) -> Result<Self> {
        check_length(length)?;
        let digest = Sha256::digest(request.canonical_text().as_bytes());
        let mut hash = hex::encode(digest);
        hash.truncate(length);
        Ok(Self(hash))
    }

    /// Wrap an existing hash, e.g. one read back from the store or given on the command line.
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        check_length(value.len())
            .map_err(|_| Error::InvalidFingerprint(format!("bad length: {:?}", value)))?;
        if !value
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        {
            return Err(Error::InvalidFingerprint(format!(
                "not lowercase hex: {:?}",
                value
            )));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Reject truncation lengths outside the supported range.
pub fn check_length(length: usize) -> Result<()> {
    if (MIN_HASH_LENGTH..=MAX_HASH_LENGTH).contains(&length) {
        Ok(())
    } else {
        Err(Error::InvalidFingerprint(format!(
            "hash length must be between {} and {}, got {}",
            MIN_HASH_LENGTH, MAX_HASH_LENGTH, length
        )))
    }
}

impl std::str::FromStr for Fingerprint {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Fingerprint> for String {
    fn from(fingerprint: Fingerprint) -> Self {
        fingerprint.0
    }
}
