//! Type-safe wrappers using the new-type pattern.
//!
//! Validated at construction so the packaging pipeline never sees an
//! out-of-range compression level or an empty PIN.

use std::fmt;

use crate::infra::error::{PackagingError, PackagingResult};

/// ZIP compression level in `0..=9`. Level 0 stores entries uncompressed;
/// any other level selects the DEFLATE path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionLevel(u32);

impl CompressionLevel {
    /// No compression (store).
    pub const STORE: CompressionLevel = CompressionLevel(0);
    /// Best compression.
    pub const BEST: CompressionLevel = CompressionLevel(9);

    pub fn new(level: u32) -> PackagingResult<Self> {
        if level > 9 {
            return Err(PackagingError::InvalidInput(format!(
                "compression level must be 0..=9, got {level}"
            )));
        }
        Ok(CompressionLevel(level))
    }

    #[must_use]
    pub fn value(self) -> u32 {
        self.0
    }

    /// True when entries should be stored rather than deflated.
    #[must_use]
    pub fn is_store(self) -> bool {
        self.0 == 0
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        CompressionLevel::STORE
    }
}

impl fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// PIV PIN used to unlock a PKCS#11 token's private key.
#[derive(Clone)]
pub struct PivPin(String);

impl PivPin {
    pub fn new(pin: impl AsRef<str>) -> PackagingResult<Self> {
        let pin = pin.as_ref();
        if pin.is_empty() {
            return Err(PackagingError::InvalidInput(
                "PIV PIN must not be empty".to_string(),
            ));
        }
        if pin.len() > 64 || pin.contains('\0') {
            return Err(PackagingError::InvalidInput(
                "PIV PIN is not a valid passphrase".to_string(),
            ));
        }
        Ok(PivPin(pin.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PivPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PivPin(***)")
    }
}
