//! APPX packer library
//!
//! Builds Microsoft APPX and APPXBUNDLE packages: ZIP64 archives carrying
//! the application payload, a synthesised `AppxBlockMap.xml` and
//! `[Content_Types].xml`, and an optional Authenticode PKCS#7 signature
//! (`AppxSignature.p7x`). Archives are deterministic: identical inputs and
//! identical signer output produce byte-identical files.

pub mod domain;
pub mod infra;
pub mod services;
pub mod types;

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

pub use infra::error::{PackagingError, PackagingResult};
pub use infra::inputs::FileMapping;
pub use services::packaging::write_appx;
pub use services::signing::SigningCredentials;
pub use types::{CompressionLevel, PivPin};

/// Packaging configuration.
#[derive(Debug, Clone)]
pub struct PackagingConfig {
    /// ZIP compression level; 0 stores every entry.
    pub compression_level: CompressionLevel,
    /// Produce an APPXBUNDLE instead of an APPX.
    pub bundle: bool,
    /// Signing credentials; omit to leave the package unsigned.
    pub credentials: Option<SigningCredentials>,
}

impl Default for PackagingConfig {
    fn default() -> Self {
        PackagingConfig {
            compression_level: CompressionLevel::STORE,
            bundle: false,
            credentials: None,
        }
    }
}

/// Packages `file_names` into an archive at `output_path`.
///
/// The output file is created (or truncated) first; on error the partial
/// file is closed and left for the caller to discard.
pub fn pack_appx(
    output_path: &Path,
    file_names: &FileMapping,
    config: &PackagingConfig,
) -> PackagingResult<()> {
    log::info!(
        "packaging {} inputs into {}",
        file_names.len(),
        output_path.display()
    );
    let file = File::create(output_path)
        .map_err(|e| PackagingError::Io(format!("{}: {e}", output_path.display())))?;
    let writer = BufWriter::new(file);
    write_appx(
        writer,
        file_names,
        config.credentials.as_ref(),
        config.compression_level,
        config.bundle,
    )
}
