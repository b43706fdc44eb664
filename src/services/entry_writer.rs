//! ZIP entry writing.
//!
//! One streaming pass per entry: the data callback's bytes fan out to the
//! CRC, size counters, block hasher, and (for deflated entries) the
//! compressor; the local file record header is emitted afterwards, once the
//! CRC and sizes are known, followed by the buffered body.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::domain::deflate::DeflateSink;
use crate::domain::sink::{ChunkSink, Crc32Sink, OffsetSink, Sha256Sink, Sink, VectorSink};
use crate::domain::zip::{ZipBlock, ZipCompressionType, ZipFileEntry};
use crate::infra::error::{PackagingError, PackagingResult};
use crate::types::CompressionLevel;

const COPY_BUFFER_SIZE: usize = 65536;

/// True for names ending in `.appx`; such members are nested packages and
/// must be stored, never deflated.
#[must_use]
pub fn is_appx_file(file_name: &str) -> bool {
    file_name.len() > ".appx".len() && file_name.ends_with(".appx")
}

/// Compresses 64 KiB windows through a single raw-deflate stream, hashing
/// each window and measuring its compressed span by issuing a full flush at
/// every window boundary.
struct WindowCompressor {
    deflate: DeflateSink<VectorSink>,
    window_hash: Sha256Sink,
    window_len: u64,
    window_start: u64,
    blocks: Vec<ZipBlock>,
}

impl WindowCompressor {
    fn new() -> Self {
        WindowCompressor {
            deflate: DeflateSink::new(VectorSink::new()),
            window_hash: Sha256Sink::new(),
            window_len: 0,
            window_start: 0,
            blocks: Vec::new(),
        }
    }

    fn end_window(&mut self) -> PackagingResult<()> {
        if self.window_len == 0 {
            return Ok(());
        }
        self.deflate.flush_full()?;
        let window_end = self.deflate.total_out();
        self.blocks.push(ZipBlock::new(
            self.window_hash.digest(),
            Some(window_end - self.window_start),
        ));
        self.window_hash = Sha256Sink::new();
        self.window_len = 0;
        self.window_start = window_end;
        Ok(())
    }

    /// Ends the trailing window and the deflate stream. The final-block
    /// epilogue counts toward the compressed size but belongs to no window.
    fn finish(mut self) -> PackagingResult<(Vec<u8>, Vec<ZipBlock>, u64)> {
        self.end_window()?;
        self.deflate.finish()?;
        let compressed_size = self.deflate.total_out();
        Ok((
            self.deflate.into_inner().into_bytes(),
            self.blocks,
            compressed_size,
        ))
    }
}

impl Sink for WindowCompressor {
    fn write(&mut self, mut bytes: &[u8]) -> PackagingResult<()> {
        while !bytes.is_empty() {
            let room = (ZipBlock::SIZE - self.window_len) as usize;
            let take = room.min(bytes.len());
            self.window_hash.write(&bytes[..take])?;
            self.deflate.write(&bytes[..take])?;
            self.window_len += take as u64;
            bytes = &bytes[take..];
            if self.window_len == ZipBlock::SIZE {
                self.end_window()?;
            }
        }
        Ok(())
    }
}

/// Writes one ZIP file record (header and data) to `sink`, reading the
/// uncompressed data from `data`. `offset` is the archive offset at which
/// the record lands. The callback is invoked at most once.
pub fn write_zip_file_entry<S: Sink>(
    sink: &mut S,
    offset: u64,
    archive_file_name: &str,
    compression_level: CompressionLevel,
    data: impl FnOnce(&mut dyn Sink) -> PackagingResult<()>,
) -> PackagingResult<ZipFileEntry> {
    let compression_level = if is_appx_file(archive_file_name) {
        CompressionLevel::STORE
    } else {
        compression_level
    };

    let entry = if compression_level.is_store() {
        let mut crc = Crc32Sink::new();
        let mut size = OffsetSink::new();
        let mut body = VectorSink::new();
        let mut chunks = ChunkSink::new(ZipBlock::SIZE, Sha256Sink::new);
        {
            let mut fan_out = (&mut crc, &mut size, &mut body, &mut chunks);
            data(&mut fan_out)?;
        }
        chunks.close()?;
        let blocks = chunks
            .chunks()
            .iter()
            .map(|chunk| ZipBlock::stored(chunk.digest()))
            .collect();
        let entry = ZipFileEntry::stored(
            archive_file_name,
            size.offset(),
            offset,
            crc.value(),
            blocks,
            None,
        );
        entry.write_file_record_header(sink)?;
        sink.write(body.as_slice())?;
        entry
    } else {
        // The deflate stream always runs at the best level; a non-zero
        // caller level only selects this path.
        let mut crc = Crc32Sink::new();
        let mut size = OffsetSink::new();
        let mut compressor = WindowCompressor::new();
        {
            let mut fan_out = (&mut compressor, &mut size, &mut crc);
            data(&mut fan_out)?;
        }
        let (body, blocks, compressed_size) = compressor.finish()?;
        let entry = ZipFileEntry::new(
            archive_file_name,
            compressed_size,
            size.offset(),
            ZipCompressionType::Deflate,
            offset,
            crc.value(),
            blocks,
            None,
        );
        entry.write_file_record_header(sink)?;
        sink.write(&body)?;
        entry
    };
    Ok(entry)
}

/// Streams a local file into a sink in fixed-size reads.
pub fn copy_file_into(path: &Path, sink: &mut dyn Sink) -> PackagingResult<()> {
    let mut file = File::open(path)
        .map_err(|e| PackagingError::Io(format!("{}: {e}", path.display())))?;
    let mut buffer = [0u8; COPY_BUFFER_SIZE];
    loop {
        let read = file
            .read(&mut buffer)
            .map_err(|e| PackagingError::Io(format!("{}: {e}", path.display())))?;
        if read == 0 {
            return Ok(());
        }
        sink.write(&buffer[..read])?;
    }
}

/// Writes one ZIP file record whose data comes from a local file.
pub fn write_zip_file_entry_from_path<S: Sink>(
    sink: &mut S,
    offset: u64,
    input_path: &Path,
    archive_file_name: &str,
    compression_level: CompressionLevel,
) -> PackagingResult<ZipFileEntry> {
    write_zip_file_entry(sink, offset, archive_file_name, compression_level, |sink| {
        copy_file_into(input_path, sink)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::hash::Sha256Hash;
    use std::io::Read as _;

    fn deterministic_bytes(len: usize) -> Vec<u8> {
        // Simple LCG; the content only needs to be fixed and incompressible
        // enough to span several deflate blocks.
        let mut state: u32 = 0x12345678;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1664525).wrapping_add(1013904223);
                (state >> 24) as u8
            })
            .collect()
    }

    fn inflate(compressed: &[u8]) -> Vec<u8> {
        let mut decoder = flate2::read::DeflateDecoder::new(compressed);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn detects_appx_members() {
        assert!(is_appx_file("inner.appx"));
        assert!(is_appx_file("nested/pkg.appx"));
        assert!(!is_appx_file(".appx"));
        assert!(!is_appx_file("file.txt"));
    }

    #[test]
    fn stored_entry_metadata() {
        let mut out = VectorSink::new();
        let entry = write_zip_file_entry(&mut out, 0, "a.txt", CompressionLevel::STORE, |s| {
            s.write(b"hello")
        })
        .unwrap();

        assert_eq!(entry.compression_type, ZipCompressionType::Store);
        assert_eq!(entry.uncompressed_size, 5);
        assert_eq!(entry.compressed_size, 5);
        assert_eq!(entry.crc32, 0x3610a686);
        assert_eq!(entry.blocks.len(), 1);
        assert_eq!(entry.blocks[0].sha256, Sha256Hash::digest_bytes(b"hello"));
        assert!(entry.blocks[0].compressed_size.is_none());
        // Header then body.
        assert_eq!(out.len(), 30 + "a.txt".len() + 5);
        assert_eq!(&out.as_slice()[out.len() - 5..], b"hello");
    }

    #[test]
    fn empty_entry_has_no_blocks() {
        let mut out = VectorSink::new();
        let entry =
            write_zip_file_entry(&mut out, 0, "empty", CompressionLevel::STORE, |_| Ok(()))
                .unwrap();
        assert_eq!(entry.uncompressed_size, 0);
        assert_eq!(entry.compressed_size, 0);
        assert_eq!(entry.crc32, 0);
        assert!(entry.blocks.is_empty());
    }

    #[test]
    fn block_boundaries_at_64k() {
        for (len, expected_blocks) in [(65536usize, 1usize), (65537, 2)] {
            let data = deterministic_bytes(len);
            let mut out = VectorSink::new();
            let entry =
                write_zip_file_entry(&mut out, 0, "big.bin", CompressionLevel::STORE, |s| {
                    s.write(&data)
                })
                .unwrap();
            assert_eq!(entry.blocks.len(), expected_blocks, "len {len}");
            assert_eq!(
                entry.blocks[0].sha256,
                Sha256Hash::digest_bytes(&data[..65536])
            );
            if expected_blocks == 2 {
                assert_eq!(
                    entry.blocks[1].sha256,
                    Sha256Hash::digest_bytes(&data[65536..])
                );
            }
        }
    }

    #[test]
    fn deflated_entry_round_trips_and_measures_blocks() {
        let data = deterministic_bytes(200_000);
        let mut out = VectorSink::new();
        let entry = write_zip_file_entry(&mut out, 0, "big.bin", CompressionLevel::BEST, |s| {
            s.write(&data)
        })
        .unwrap();

        assert_eq!(entry.compression_type, ZipCompressionType::Deflate);
        assert_eq!(entry.uncompressed_size, 200_000);
        assert_eq!(entry.blocks.len(), 4);

        // Every block hashes its uncompressed window.
        for (index, block) in entry.blocks.iter().enumerate() {
            let start = index * ZipBlock::SIZE as usize;
            let end = (start + ZipBlock::SIZE as usize).min(data.len());
            assert_eq!(block.sha256, Sha256Hash::digest_bytes(&data[start..end]));
        }

        // Block spans partition the compressed stream up to the last flush;
        // only the deflate final-block epilogue is unaccounted for.
        let spans: u64 = entry.blocks.iter().map(|b| b.compressed_size.unwrap()).sum();
        assert!(spans <= entry.compressed_size);
        assert!(entry.compressed_size - spans <= 8);

        // The archive body inflates back to the input.
        let header_size = entry.file_record_header_size() as usize;
        let body = &out.as_slice()[header_size..];
        assert_eq!(body.len() as u64, entry.compressed_size);
        assert_eq!(inflate(body), data);
    }

    #[test]
    fn appx_members_are_stored_even_when_compressing() {
        let mut out = VectorSink::new();
        let entry = write_zip_file_entry(&mut out, 0, "inner.appx", CompressionLevel::BEST, |s| {
            s.write(b"pretend package")
        })
        .unwrap();
        assert_eq!(entry.compression_type, ZipCompressionType::Store);
        assert_eq!(entry.compressed_size, entry.uncompressed_size);
    }

    #[test]
    fn crc_covers_uncompressed_bytes_on_deflate_path() {
        let mut out = VectorSink::new();
        let entry = write_zip_file_entry(&mut out, 0, "x.txt", CompressionLevel::BEST, |s| {
            s.write(b"hello")
        })
        .unwrap();
        assert_eq!(entry.crc32, 0x3610a686);
    }
}
