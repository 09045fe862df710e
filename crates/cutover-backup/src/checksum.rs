//! SHA-256 content checksums
//!
//! The same algorithm is used when a snapshot is written and when it is
//! verified, so re-verifying an untouched snapshot always agrees.

use sha2::{Digest, Sha256};
use std::fmt::{self, Display, Formatter};
use std::path::Path;
use std::str::FromStr;

/// A 32-byte SHA-256 digest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Checksum([u8; 32]);

impl Checksum {
    /// Digest of a byte slice
    #[inline]
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        let mut out = [0u8; 32];
        out.copy_from_slice(&Sha256::digest(data));
        Self(out)
    }

    /// Digest of a file's bytes
    ///
    /// # Errors
    /// Propagates read errors
    pub fn of_file(path: &Path) -> std::io::Result<Self> {
        Ok(Self::compute(&std::fs::read(path)?))
    }

    /// Raw bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex, as stored in backup metadata
    #[inline]
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Display for Checksum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Error parsing a hex checksum
#[derive(Debug, thiserror::Error)]
pub enum ChecksumParseError {
    /// Not valid hex
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    /// Wrong digest length
    #[error("expected 32 bytes, got {0}")]
    Length(usize),
}

impl FromStr for Checksum {
    type Err = ChecksumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim())?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| ChecksumParseError::Length(bytes.len()))?;
        Ok(Self(arr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digest() {
        assert_eq!(
            Checksum::compute(b"abc").to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn hex_parse_accepts_uppercase() {
        let sum = Checksum::compute(b"crons");
        let parsed: Checksum = sum.to_hex().to_uppercase().parse().unwrap();
        assert_eq!(parsed, sum);
        assert!("abcd".parse::<Checksum>().is_err());
        assert!("zz".parse::<Checksum>().is_err());
    }
}
