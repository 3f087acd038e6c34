//! SHA-256 certificate fingerprints.
//!
//! A fingerprint is the stable identity of a certificate node: two encodings
//! of the same DER bytes collapse to one node in a pool, and trust metadata
//! refers to roots by fingerprint.

use digest::Digest;
use serde::{Serialize, Serializer};
use std::fmt;

/// SHA-256 digest of a DER-encoded certificate.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Compute the fingerprint of DER-encoded certificate bytes.
    pub fn of(der_bytes: &[u8]) -> Self {
        let digest = sha2::Sha256::digest(der_bytes);
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        Fingerprint(out)
    }

    /// Parse a hex fingerprint. Colons, spaces and case are ignored.
    pub fn from_hex(input: &str) -> Option<Self> {
        let cleaned: String = input
            .chars()
            .filter(|c| *c != ':' && !c.is_whitespace())
            .collect();
        let bytes = hex::decode(cleaned).ok()?;
        <[u8; 32]>::try_from(bytes.as_slice()).ok().map(Fingerprint)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex without separators; the form used for tie-break ordering.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Colon-separated uppercase hex (e.g., "AB:CD:EF:...").
    pub fn to_colon_hex(&self) -> String {
        crate::util::hex_colon_upper(&self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_colon_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_colon_hex())
    }
}
