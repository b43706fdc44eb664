//! Minimal ZIP reading helpers for integration tests.
//!
//! Walks local file records from offset zero (the writer emits no data
//! descriptors, so sizes are in the headers), then the central directory
//! and the ZIP64 trailer triple.

#![allow(dead_code)]

use std::io::Read;

pub const LOCAL_FILE_HEADER_SIGNATURE: u32 = 0x04034B50;
pub const DIRECTORY_ENTRY_SIGNATURE: u32 = 0x02014B50;
pub const ZIP64_END_OF_DIRECTORY_SIGNATURE: u32 = 0x06064B50;
pub const ZIP64_DIRECTORY_LOCATOR_SIGNATURE: u32 = 0x07064B50;
pub const END_OF_DIRECTORY_SIGNATURE: u32 = 0x06054B50;

#[derive(Debug, Clone)]
pub struct LocalEntry {
    pub name: String,
    pub method: u16,
    pub time: u16,
    pub date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub header_offset: u64,
    pub data: Vec<u8>,
}

impl LocalEntry {
    /// Uncompressed content, inflating if the entry is deflated.
    pub fn unpacked_data(&self) -> Vec<u8> {
        match self.method {
            0 => self.data.clone(),
            8 => inflate(&self.data),
            other => panic!("unexpected compression method {other}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CentralEntry {
    pub name: String,
    pub method: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub local_header_offset: u32,
}

#[derive(Debug)]
pub struct ParsedArchive {
    pub local_entries: Vec<LocalEntry>,
    pub central_entries: Vec<CentralEntry>,
    /// Offset of the first central directory entry.
    pub central_directory_offset: u64,
    /// Offset of the ZIP64 end-of-central-directory record.
    pub trailer_offset: u64,
    /// Entry count recorded in the ZIP64 record.
    pub zip64_entry_count: u64,
}

pub fn u16_at(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

pub fn u32_at(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

pub fn u64_at(bytes: &[u8], offset: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(raw)
}

pub fn inflate(compressed: &[u8]) -> Vec<u8> {
    let mut decoder = flate2::read::DeflateDecoder::new(compressed);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).expect("valid deflate stream");
    out
}

pub fn parse_archive(bytes: &[u8]) -> ParsedArchive {
    let mut position = 0usize;
    let mut local_entries = Vec::new();
    while u32_at(bytes, position) == LOCAL_FILE_HEADER_SIGNATURE {
        let method = u16_at(bytes, position + 8);
        let time = u16_at(bytes, position + 10);
        let date = u16_at(bytes, position + 12);
        let crc32 = u32_at(bytes, position + 14);
        let compressed_size = u32_at(bytes, position + 18);
        let uncompressed_size = u32_at(bytes, position + 22);
        let name_length = u16_at(bytes, position + 26) as usize;
        let extra_length = u16_at(bytes, position + 28) as usize;
        let name =
            String::from_utf8(bytes[position + 30..position + 30 + name_length].to_vec())
                .expect("entry names are ASCII");
        let data_start = position + 30 + name_length + extra_length;
        let data = bytes[data_start..data_start + compressed_size as usize].to_vec();
        local_entries.push(LocalEntry {
            name,
            method,
            time,
            date,
            crc32,
            compressed_size,
            uncompressed_size,
            header_offset: position as u64,
            data,
        });
        position = data_start + compressed_size as usize;
    }

    let central_directory_offset = position as u64;
    let mut central_entries = Vec::new();
    while u32_at(bytes, position) == DIRECTORY_ENTRY_SIGNATURE {
        let method = u16_at(bytes, position + 10);
        let crc32 = u32_at(bytes, position + 16);
        let compressed_size = u32_at(bytes, position + 20);
        let uncompressed_size = u32_at(bytes, position + 24);
        let name_length = u16_at(bytes, position + 28) as usize;
        let extra_length = u16_at(bytes, position + 30) as usize;
        let comment_length = u16_at(bytes, position + 32) as usize;
        let local_header_offset = u32_at(bytes, position + 42);
        let name =
            String::from_utf8(bytes[position + 46..position + 46 + name_length].to_vec())
                .expect("entry names are ASCII");
        central_entries.push(CentralEntry {
            name,
            method,
            crc32,
            compressed_size,
            uncompressed_size,
            local_header_offset,
        });
        position += 46 + name_length + extra_length + comment_length;
    }

    // ZIP64 end-of-central-directory record.
    let trailer_offset = position as u64;
    assert_eq!(
        u32_at(bytes, position),
        ZIP64_END_OF_DIRECTORY_SIGNATURE,
        "expected the ZIP64 end record after the directory"
    );
    assert_eq!(u64_at(bytes, position + 4), 44);
    let zip64_entry_count = u64_at(bytes, position + 24);
    assert_eq!(u64_at(bytes, position + 32), zip64_entry_count);
    let recorded_directory_offset = u64_at(bytes, position + 48);
    assert_eq!(recorded_directory_offset, central_directory_offset);

    // Locator.
    let locator = position + 56;
    assert_eq!(u32_at(bytes, locator), ZIP64_DIRECTORY_LOCATOR_SIGNATURE);
    assert_eq!(u64_at(bytes, locator + 8), trailer_offset);
    assert_eq!(u32_at(bytes, locator + 16), 1);

    // Classic end record with ZIP64 sentinels.
    let end = locator + 20;
    assert_eq!(u32_at(bytes, end), END_OF_DIRECTORY_SIGNATURE);
    assert_eq!(u16_at(bytes, end + 8), 0xFFFF);
    assert_eq!(u16_at(bytes, end + 10), 0xFFFF);
    assert_eq!(u32_at(bytes, end + 12), 0xFFFFFFFF);
    assert_eq!(u32_at(bytes, end + 16), 0xFFFFFFFF);
    assert_eq!(end + 22, bytes.len(), "trailing garbage after end record");

    ParsedArchive {
        local_entries,
        central_entries,
        central_directory_offset,
        trailer_offset,
        zip64_entry_count,
    }
}

impl ParsedArchive {
    pub fn local(&self, name: &str) -> &LocalEntry {
        self.local_entries
            .iter()
            .find(|entry| entry.name == name)
            .unwrap_or_else(|| panic!("no local entry named {name}"))
    }

    pub fn central(&self, name: &str) -> &CentralEntry {
        self.central_entries
            .iter()
            .find(|entry| entry.name == name)
            .unwrap_or_else(|| panic!("no central entry named {name}"))
    }
}

/// Deterministic pseudo-random bytes for payload fixtures.
pub fn deterministic_bytes(len: usize) -> Vec<u8> {
    let mut state: u32 = 0x2545F491;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(1664525).wrapping_add(1013904223);
            (state >> 24) as u8
        })
        .collect()
}
