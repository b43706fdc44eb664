//! SHA-256 digest value type.

use std::fmt;

use sha2::{Digest, Sha256};

/// A 32-byte SHA-256 digest. The zero value stands in for "no digest"
/// (notably the code-integrity digest of a package without a catalog).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Sha256Hash(pub [u8; 32]);

impl Sha256Hash {
    pub const LEN: usize = 32;

    /// Hashes the input bytes, returning the digest.
    #[must_use]
    pub fn digest_bytes(bytes: &[u8]) -> Self {
        Sha256Hash(Sha256::digest(bytes).into())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Default for Sha256Hash {
    fn default() -> Self {
        Sha256Hash([0u8; 32])
    }
}

impl fmt::Debug for Sha256Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sha256Hash(")?;
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}
