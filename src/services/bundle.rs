//! Bundle-manifest offset patching.
//!
//! `AppxBundleManifest.xml` names each nested package's archive offset,
//! which is unknown until the package has been written. The caller's
//! manifest therefore carries `<name>-offset` placeholders, replaced here
//! with the decimal byte offset at which that entry's data begins.

use std::fs;
use std::path::Path;

use crate::domain::sink::Sink;
use crate::domain::zip::ZipFileEntry;
use crate::infra::error::{PackagingError, PackagingResult};
use crate::services::entry_writer::write_zip_file_entry;
use crate::types::CompressionLevel;

/// Archive names ending in this are the bundle manifest.
pub const BUNDLE_MANIFEST_SUFFIX: &str = "AppxBundleManifest.xml";

/// Replaces every `<file name>-offset` placeholder with the offset at
/// which that entry's data starts (header offset plus header size).
#[must_use]
pub fn populate_manifest_offsets(manifest_text: &str, entries: &[ZipFileEntry]) -> String {
    let mut text = manifest_text.to_string();
    for entry in entries {
        let placeholder = format!("{}-offset", entry.file_name);
        let data_offset = entry.file_record_header_offset + entry.file_record_header_size();
        text = text.replace(&placeholder, &data_offset.to_string());
    }
    text
}

/// Reads the manifest from disk, patches offsets for the already-written
/// entries, and writes it as a normal ZIP entry.
pub fn write_bundle_manifest_entry<S: Sink>(
    sink: &mut S,
    offset: u64,
    input_path: &Path,
    archive_file_name: &str,
    compression_level: CompressionLevel,
    written_entries: &[ZipFileEntry],
) -> PackagingResult<ZipFileEntry> {
    let manifest_text = fs::read_to_string(input_path).map_err(|e| {
        PackagingError::Content(format!(
            "cannot read bundle manifest {}: {e}",
            input_path.display()
        ))
    })?;
    let patched = populate_manifest_offsets(&manifest_text, written_entries);
    write_zip_file_entry(sink, offset, archive_file_name, compression_level, |sink| {
        sink.write(patched.as_bytes())
    })
}
