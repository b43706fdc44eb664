//! The packaging pipeline.
//!
//! Writes payload entries (hashing every archive byte as it goes), then
//! the synthesised block map and content types, then digests the would-be
//! central directory, then signs and appends the signature entry, and
//! finally writes the real directory and ZIP64 trailer. Strictly
//! sequential; the first error aborts the archive.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;

use crate::domain::constants::P7X_MAGIC;
use crate::domain::deflate::DeflateSink;
use crate::domain::digests::AppxDigests;
use crate::domain::sink::{Crc32Sink, FileSink, OffsetSink, Sha256Sink, Sink, VectorSink};
use crate::domain::zip::{
    write_end_of_central_directory, ZipCompressionType, ZipFileEntry,
};
use crate::infra::error::{PackagingError, PackagingResult};
use crate::services::blockmap::write_block_map_entry;
use crate::services::bundle::{write_bundle_manifest_entry, BUNDLE_MANIFEST_SUFFIX};
use crate::services::content_types::write_content_types_entry;
use crate::services::entry_writer::{
    copy_file_into, write_zip_file_entry, write_zip_file_entry_from_path,
};
use crate::services::signing::{sign_digests, SigningCredentials};
use crate::types::CompressionLevel;

/// Archive name of the optional code-integrity catalog.
const CODE_INTEGRITY_CAT: &str = "AppxMetadata/CodeIntegrity.cat";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PackagingStage {
    WritingPayload,
    WritingSynth,
    DigestingDirectory,
    Signing,
    WritingDirectory,
}

impl PackagingStage {
    fn as_str(self) -> &'static str {
        match self {
            PackagingStage::WritingPayload => "writing payload",
            PackagingStage::WritingSynth => "writing synthesised entries",
            PackagingStage::DigestingDirectory => "digesting directory",
            PackagingStage::Signing => "signing",
            PackagingStage::WritingDirectory => "writing directory",
        }
    }
}

fn enter(stage: PackagingStage) {
    log::debug!("stage: {}", stage.as_str());
}

/// Creates and optionally signs an APPX (or APPXBUNDLE) archive.
///
/// `file_names` maps archive names to local filesystem paths; iteration
/// order (sorted by archive name) is the payload order. `credentials`, if
/// present, select the signing key. `compression_level` 0 stores entries,
/// anything higher deflates them.
pub fn write_appx<W: Write>(
    output: W,
    file_names: &BTreeMap<String, PathBuf>,
    credentials: Option<&SigningCredentials>,
    compression_level: CompressionLevel,
    is_bundle: bool,
) -> PackagingResult<()> {
    // Checked before any byte is written.
    if is_bundle
        && !file_names
            .keys()
            .any(|name| name.ends_with(BUNDLE_MANIFEST_SUFFIX))
    {
        return Err(PackagingError::InvalidInput(
            "bundle requires an AppxBundleManifest.xml input".to_string(),
        ));
    }

    let mut raw_sink = FileSink::new(output);
    let mut zip_offset = OffsetSink::new();
    let mut entries: Vec<ZipFileEntry> = Vec::new();
    let mut digests = AppxDigests::default();
    let mut bundle_manifest: Option<(String, PathBuf)> = None;

    // Write and hash the archive content. Every byte that lands in the
    // archive before the signature also lands in the payload digest.
    {
        let mut axpc = Sha256Sink::new();

        enter(PackagingStage::WritingPayload);
        for (archive_name, input_path) in file_names {
            if is_bundle && archive_name.ends_with(BUNDLE_MANIFEST_SUFFIX) {
                bundle_manifest = Some((archive_name.clone(), input_path.clone()));
                continue;
            }

            let offset = zip_offset.offset();
            let mut sink = (&mut raw_sink, &mut zip_offset, &mut axpc);
            let entry = if archive_name == CODE_INTEGRITY_CAT {
                let mut catalog_hash = Sha256Sink::new();
                let entry = write_zip_file_entry(
                    &mut sink,
                    offset,
                    archive_name,
                    compression_level,
                    |sink| {
                        let mut tee = (sink, &mut catalog_hash);
                        copy_file_into(input_path, &mut tee)
                    },
                )?;
                digests.axci = catalog_hash.digest();
                entry
            } else {
                write_zip_file_entry_from_path(
                    &mut sink,
                    offset,
                    input_path,
                    archive_name,
                    compression_level,
                )?
            };
            log::debug!(
                "wrote {} ({} -> {} bytes)",
                entry.file_name,
                entry.uncompressed_size,
                entry.compressed_size
            );
            entries.push(entry);
        }

        if is_bundle {
            // Known present by the check above.
            let (archive_name, input_path) = bundle_manifest.ok_or_else(|| {
                PackagingError::InvalidInput(
                    "bundle requires an AppxBundleManifest.xml input".to_string(),
                )
            })?;
            let offset = zip_offset.offset();
            let mut sink = (&mut raw_sink, &mut zip_offset, &mut axpc);
            let entry = write_bundle_manifest_entry(
                &mut sink,
                offset,
                &input_path,
                &archive_name,
                compression_level,
                &entries,
            )?;
            entries.push(entry);
        }

        enter(PackagingStage::WritingSynth);
        let caller_entry_count = entries.len();

        let offset = zip_offset.offset();
        let block_map = {
            let mut sink = (&mut raw_sink, &mut zip_offset, &mut axpc);
            write_block_map_entry(&mut sink, offset, &entries, is_bundle)?
        };
        digests.axbm = block_map.sha256.unwrap_or_default();
        entries.push(block_map);

        let offset = zip_offset.offset();
        let content_types = {
            let mut sink = (&mut raw_sink, &mut zip_offset, &mut axpc);
            write_content_types_entry(&mut sink, offset, is_bundle, &entries[..caller_entry_count])?
        };
        digests.axct = content_types.sha256.unwrap_or_default();
        entries.push(content_types);

        digests.axpc = axpc.digest();
    }

    // Hash (but do not write) the directory, pre-signature.
    enter(PackagingStage::DigestingDirectory);
    {
        let mut axcd = Sha256Sink::new();
        let mut simulated_offset = zip_offset;
        {
            let mut sink = (&mut axcd, &mut simulated_offset);
            for entry in &entries {
                entry.write_directory_entry(&mut sink)?;
            }
        }
        let directory_end = simulated_offset.offset();
        let mut sink = (&mut axcd, &mut simulated_offset);
        write_end_of_central_directory(&mut sink, directory_end, &entries)?;
        digests.axcd = axcd.digest();
    }

    // Sign and write the signature entry.
    if let Some(credentials) = credentials {
        enter(PackagingStage::Signing);
        let offset = zip_offset.offset();
        let mut sink = (&mut raw_sink, &mut zip_offset);
        let entry = write_signature_entry(&mut sink, credentials, &digests, offset)?;
        entries.push(entry);
    }

    // Write the real directory.
    enter(PackagingStage::WritingDirectory);
    {
        let mut sink = (&mut raw_sink, &mut zip_offset);
        for entry in &entries {
            entry.write_directory_entry(&mut sink)?;
        }
    }
    let directory_end = zip_offset.offset();
    {
        let mut sink = (&mut raw_sink, &mut zip_offset);
        write_end_of_central_directory(&mut sink, directory_end, &entries)?;
    }
    raw_sink.flush()?;

    log::info!(
        "archive complete: {} entries, {} bytes",
        entries.len(),
        zip_offset.offset()
    );
    Ok(())
}

/// Creates the `AppxSignature.p7x` entry. The entry is always deflated,
/// and its uncompressed body is the `PKCX` magic followed by the PKCS#7
/// DER.
fn write_signature_entry<S: Sink>(
    sink: &mut S,
    credentials: &SigningCredentials,
    digests: &AppxDigests,
    offset: u64,
) -> PackagingResult<ZipFileEntry> {
    let signature_der = sign_digests(credentials, digests)?;

    let mut compressed_body = VectorSink::new();
    let mut crc = Crc32Sink::new();
    let mut uncompressed_size = OffsetSink::new();
    {
        let mut deflate = DeflateSink::new(&mut compressed_body);
        {
            let mut body = (&mut deflate, &mut crc, &mut uncompressed_size);
            body.write(P7X_MAGIC)?;
            body.write(&signature_der)?;
        }
        deflate.finish()?;
    }

    let entry = ZipFileEntry::new(
        "AppxSignature.p7x",
        compressed_body.len() as u64,
        uncompressed_size.offset(),
        ZipCompressionType::Deflate,
        offset,
        crc.value(),
        Vec::new(),
        None,
    );
    entry.write_file_record_header(sink)?;
    sink.write(compressed_body.as_slice())?;
    Ok(entry)
}
