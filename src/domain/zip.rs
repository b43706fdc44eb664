//! ZIP entry metadata and record serialisation.
//!
//! Record layouts follow the PKZIP application note: 30-byte local file
//! headers, 46-byte central-directory entries, and the ZIP64
//! end-of-central-directory record / locator / classic end record triple.
//! Timestamps are hard-coded so archiving is deterministic.

use std::fmt::Write as _;

use crate::domain::hash::Sha256Hash;
use crate::domain::sink::Sink;
use crate::infra::error::{PackagingError, PackagingResult};

/// Fixed MS-DOS timestamp for every entry.
pub const FILE_TIME: u16 = 0x8706;
pub const FILE_DATE: u16 = 0x4722;

const ARCHIVER_VERSION: u16 = 45;
const FILE_EXTRACT_VERSION: u16 = 20;
const ARCHIVE_EXTRACT_VERSION: u16 = 45;

const LOCAL_FILE_HEADER_SIGNATURE: u32 = 0x04034B50;
const DIRECTORY_ENTRY_SIGNATURE: u32 = 0x02014B50;
const ZIP64_END_OF_DIRECTORY_SIGNATURE: u32 = 0x06064B50;
const ZIP64_DIRECTORY_LOCATOR_SIGNATURE: u32 = 0x07064B50;
const END_OF_DIRECTORY_SIGNATURE: u32 = 0x06054B50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZipCompressionType {
    Store = 0,
    Deflate = 8,
}

impl ZipCompressionType {
    #[must_use]
    pub fn method(self) -> u16 {
        self as u16
    }
}

/// Metadata for one 64 KiB window of an entry's uncompressed content, as
/// listed in `AppxBlockMap.xml`.
#[derive(Debug, Clone)]
pub struct ZipBlock {
    /// Hash of the uncompressed window.
    pub sha256: Sha256Hash,
    /// Bytes this window occupies in the compressed stream; `None` for
    /// stored entries.
    pub compressed_size: Option<u64>,
}

impl ZipBlock {
    /// Window size in uncompressed bytes.
    pub const SIZE: u64 = 65536;

    #[must_use]
    pub fn new(sha256: Sha256Hash, compressed_size: Option<u64>) -> Self {
        ZipBlock { sha256, compressed_size }
    }

    #[must_use]
    pub fn stored(sha256: Sha256Hash) -> Self {
        ZipBlock { sha256, compressed_size: None }
    }
}

/// One archive member: sizes, CRC, archive offset, and block metadata.
#[derive(Debug, Clone)]
pub struct ZipFileEntry {
    /// Logical archive name with the caller's forward slashes.
    pub file_name: String,
    /// The ZIP-stored, percent-encoded name.
    pub sanitized_file_name: String,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub compression_type: ZipCompressionType,
    /// Archive byte offset of the local file record header.
    pub file_record_header_offset: u64,
    pub crc32: u32,
    /// Block metadata for normal files.
    pub blocks: Vec<ZipBlock>,
    /// Whole-content digest, populated only for `[Content_Types].xml` and
    /// `AppxBlockMap.xml`.
    pub sha256: Option<Sha256Hash>,
}

impl ZipFileEntry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        file_name: impl Into<String>,
        compressed_size: u64,
        uncompressed_size: u64,
        compression_type: ZipCompressionType,
        file_record_header_offset: u64,
        crc32: u32,
        blocks: Vec<ZipBlock>,
        sha256: Option<Sha256Hash>,
    ) -> Self {
        let file_name = file_name.into();
        let sanitized_file_name = sanitized_file_name(&file_name);
        ZipFileEntry {
            file_name,
            sanitized_file_name,
            compressed_size,
            uncompressed_size,
            compression_type,
            file_record_header_offset,
            crc32,
            blocks,
            sha256,
        }
    }

    /// A stored entry, whose compressed and uncompressed sizes coincide.
    pub fn stored(
        file_name: impl Into<String>,
        size: u64,
        file_record_header_offset: u64,
        crc32: u32,
        blocks: Vec<ZipBlock>,
        sha256: Option<Sha256Hash>,
    ) -> Self {
        ZipFileEntry::new(
            file_name,
            size,
            size,
            ZipCompressionType::Store,
            file_record_header_offset,
            crc32,
            blocks,
            sha256,
        )
    }

    #[must_use]
    pub fn file_record_header_size(&self) -> u64 {
        30 + self.sanitized_file_name.len() as u64
    }

    #[must_use]
    pub fn file_record_size(&self) -> u64 {
        self.file_record_header_size() + self.compressed_size
    }

    #[must_use]
    pub fn directory_entry_size(&self) -> u64 {
        46 + self.sanitized_file_name.len() as u64
    }

    pub fn write_file_record_header<S: Sink>(&self, sink: &mut S) -> PackagingResult<()> {
        let name_length = u16_field(self.sanitized_file_name.len() as u64, "file name length")?;
        let mut header = Vec::with_capacity(30);
        header.extend_from_slice(&LOCAL_FILE_HEADER_SIGNATURE.to_le_bytes());
        header.extend_from_slice(&FILE_EXTRACT_VERSION.to_le_bytes());
        header.extend_from_slice(&0u16.to_le_bytes()); // Flags.
        header.extend_from_slice(&self.compression_type.method().to_le_bytes());
        header.extend_from_slice(&FILE_TIME.to_le_bytes());
        header.extend_from_slice(&FILE_DATE.to_le_bytes());
        header.extend_from_slice(&self.crc32.to_le_bytes());
        header.extend_from_slice(&u32_field(self.compressed_size, "compressed size")?.to_le_bytes());
        header
            .extend_from_slice(&u32_field(self.uncompressed_size, "uncompressed size")?.to_le_bytes());
        header.extend_from_slice(&name_length.to_le_bytes());
        header.extend_from_slice(&0u16.to_le_bytes()); // Extra field length.
        sink.write(&header)?;
        sink.write(self.sanitized_file_name.as_bytes())
    }

    pub fn write_directory_entry<S: Sink>(&self, sink: &mut S) -> PackagingResult<()> {
        let name_length = u16_field(self.sanitized_file_name.len() as u64, "file name length")?;
        let mut entry = Vec::with_capacity(46);
        entry.extend_from_slice(&DIRECTORY_ENTRY_SIGNATURE.to_le_bytes());
        entry.extend_from_slice(&ARCHIVER_VERSION.to_le_bytes());
        entry.extend_from_slice(&FILE_EXTRACT_VERSION.to_le_bytes());
        entry.extend_from_slice(&0u16.to_le_bytes()); // Flags.
        entry.extend_from_slice(&self.compression_type.method().to_le_bytes());
        entry.extend_from_slice(&FILE_TIME.to_le_bytes());
        entry.extend_from_slice(&FILE_DATE.to_le_bytes());
        entry.extend_from_slice(&self.crc32.to_le_bytes());
        entry.extend_from_slice(&u32_field(self.compressed_size, "compressed size")?.to_le_bytes());
        entry
            .extend_from_slice(&u32_field(self.uncompressed_size, "uncompressed size")?.to_le_bytes());
        entry.extend_from_slice(&name_length.to_le_bytes());
        entry.extend_from_slice(&0u16.to_le_bytes()); // Extra field length.
        entry.extend_from_slice(&0u16.to_le_bytes()); // File comment length.
        entry.extend_from_slice(&0u16.to_le_bytes()); // Disk number start.
        entry.extend_from_slice(&0u16.to_le_bytes()); // Internal file attributes.
        entry.extend_from_slice(&0u32.to_le_bytes()); // External file attributes.
        entry.extend_from_slice(
            &u32_field(self.file_record_header_offset, "local header offset")?.to_le_bytes(),
        );
        sink.write(&entry)?;
        sink.write(self.sanitized_file_name.as_bytes())
    }
}

/// Percent-encodes every byte outside `[A-Za-z0-9-._~/]`, uppercase hex.
/// `[Content_Types].xml` is a special case: the brackets must not be
/// escaped or the package is rejected.
#[must_use]
pub fn sanitized_file_name(file_name: &str) -> String {
    const CONTENT_TYPES_FILE: &str = "[Content_Types].xml";
    if file_name == CONTENT_TYPES_FILE {
        return file_name.to_string();
    }
    let mut sanitized = String::with_capacity(file_name.len());
    for &byte in file_name.as_bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b'/' => {
                sanitized.push(byte as char);
            }
            _ => {
                // Infallible for String.
                let _ = write!(sanitized, "%{byte:02X}");
            }
        }
    }
    sanitized
}

/// Writes the ZIP64 end-of-central-directory record, the ZIP64 locator,
/// and the classic end record with its ZIP64 sentinel values.
/// `central_directory_end_offset` is the archive offset at which this
/// trailer begins (one past the last directory entry).
pub fn write_end_of_central_directory<S: Sink>(
    sink: &mut S,
    central_directory_end_offset: u64,
    entries: &[ZipFileEntry],
) -> PackagingResult<()> {
    let mut directory_entries_size: u64 = 0;
    let mut file_records_size: u64 = 0;
    for entry in entries {
        directory_entries_size += entry.directory_entry_size();
        file_records_size += entry.file_record_size();
    }

    let mut data = Vec::with_capacity(56 + 20 + 22);
    // ZIP64 end of central directory record.
    data.extend_from_slice(&ZIP64_END_OF_DIRECTORY_SIGNATURE.to_le_bytes());
    data.extend_from_slice(&(56u64 - 12).to_le_bytes()); // Size of this record after this field.
    data.extend_from_slice(&ARCHIVER_VERSION.to_le_bytes());
    data.extend_from_slice(&ARCHIVE_EXTRACT_VERSION.to_le_bytes());
    data.extend_from_slice(&0u32.to_le_bytes()); // Index of this disk.
    data.extend_from_slice(&0u32.to_le_bytes()); // Index of disk with directory start.
    data.extend_from_slice(&(entries.len() as u64).to_le_bytes()); // Entries on this disk.
    data.extend_from_slice(&(entries.len() as u64).to_le_bytes()); // Entries in directory.
    data.extend_from_slice(&directory_entries_size.to_le_bytes());
    data.extend_from_slice(&file_records_size.to_le_bytes()); // Offset of directory start.
    // ZIP64 end of central directory locator.
    data.extend_from_slice(&ZIP64_DIRECTORY_LOCATOR_SIGNATURE.to_le_bytes());
    data.extend_from_slice(&0u32.to_le_bytes()); // Index of disk with directory end.
    data.extend_from_slice(&central_directory_end_offset.to_le_bytes());
    data.extend_from_slice(&1u32.to_le_bytes()); // Number of disks.
    // Classic end of central directory record, deferring to the ZIP64 one.
    data.extend_from_slice(&END_OF_DIRECTORY_SIGNATURE.to_le_bytes());
    data.extend_from_slice(&0u16.to_le_bytes()); // Index of this disk.
    data.extend_from_slice(&0u16.to_le_bytes()); // Index of disk with directory start.
    data.extend_from_slice(&0xFFFFu16.to_le_bytes()); // Entries on this disk.
    data.extend_from_slice(&0xFFFFu16.to_le_bytes()); // Entries in directory.
    data.extend_from_slice(&0xFFFFFFFFu32.to_le_bytes()); // Directory size.
    data.extend_from_slice(&0xFFFFFFFFu32.to_le_bytes()); // Directory start offset.
    data.extend_from_slice(&0u16.to_le_bytes()); // Comment length.
    sink.write(&data)
}

fn u16_field(value: u64, field: &'static str) -> PackagingResult<u16> {
    u16::try_from(value).map_err(|_| PackagingError::Range { field, value })
}

fn u32_field(value: u64, field: &'static str) -> PackagingResult<u32> {
    u32::try_from(value).map_err(|_| PackagingError::Range { field, value })
}
