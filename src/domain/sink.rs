//! Byte-consumer composition.
//!
//! A sink is an object to which bytes can be written. Every transform the
//! packager needs (counting, CRC, SHA-256, buffering, chunking, base64)
//! is a sink, and multi-pass behaviour falls out of composing them: tuples
//! of sinks fan a write out to each member in order, so one streaming pass
//! over a file can feed the archive writer, the digests, and the block
//! hasher at once.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use sha2::{Digest, Sha256};

use crate::domain::hash::Sha256Hash;
use crate::infra::error::{PackagingError, PackagingResult};

pub trait Sink {
    fn write(&mut self, bytes: &[u8]) -> PackagingResult<()>;

    /// Flushes and finalises buffered state. A no-op for sinks that do not
    /// buffer.
    fn close(&mut self) -> PackagingResult<()> {
        Ok(())
    }
}

impl<S: Sink + ?Sized> Sink for &mut S {
    fn write(&mut self, bytes: &[u8]) -> PackagingResult<()> {
        (**self).write(bytes)
    }

    fn close(&mut self) -> PackagingResult<()> {
        (**self).close()
    }
}

// Fan-out: each write is forwarded to every member, in order. Members are
// closed individually by their owners.
macro_rules! impl_sink_for_tuple {
    ($($member:ident),+) => {
        impl<$($member: Sink),+> Sink for ($($member,)+) {
            fn write(&mut self, bytes: &[u8]) -> PackagingResult<()> {
                #[allow(non_snake_case)]
                let ($($member,)+) = self;
                $($member.write(bytes)?;)+
                Ok(())
            }
        }
    };
}

impl_sink_for_tuple!(A, B);
impl_sink_for_tuple!(A, B, C);
impl_sink_for_tuple!(A, B, C, D);

/// A sink which forwards to an underlying writer (usually the output file).
pub struct FileSink<W> {
    inner: W,
}

impl<W: std::io::Write> FileSink<W> {
    pub fn new(inner: W) -> Self {
        FileSink { inner }
    }

    pub fn flush(&mut self) -> PackagingResult<()> {
        self.inner.flush()?;
        Ok(())
    }
}

impl<W: std::io::Write> Sink for FileSink<W> {
    fn write(&mut self, bytes: &[u8]) -> PackagingResult<()> {
        self.inner.write_all(bytes)?;
        Ok(())
    }
}

/// A sink which counts the bytes written, discarding the data.
#[derive(Debug, Clone, Copy, Default)]
pub struct OffsetSink {
    offset: u64,
}

impl OffsetSink {
    #[must_use]
    pub fn new() -> Self {
        OffsetSink::default()
    }

    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl Sink for OffsetSink {
    fn write(&mut self, bytes: &[u8]) -> PackagingResult<()> {
        self.offset += bytes.len() as u64;
        Ok(())
    }
}

/// A sink which accumulates a PKZIP CRC-32.
#[derive(Default)]
pub struct Crc32Sink {
    hasher: crc32fast::Hasher,
}

impl Crc32Sink {
    #[must_use]
    pub fn new() -> Self {
        Crc32Sink::default()
    }

    /// The CRC of everything written so far. Writing may continue after.
    #[must_use]
    pub fn value(&self) -> u32 {
        self.hasher.clone().finalize()
    }
}

impl Sink for Crc32Sink {
    fn write(&mut self, bytes: &[u8]) -> PackagingResult<()> {
        self.hasher.update(bytes);
        Ok(())
    }
}

/// A sink which accumulates a SHA-256 digest.
#[derive(Default)]
pub struct Sha256Sink {
    hasher: Sha256,
}

impl Sha256Sink {
    #[must_use]
    pub fn new() -> Self {
        Sha256Sink::default()
    }

    /// The digest of everything written so far, without invalidating the
    /// running state: a subsequent write continues the same hash.
    #[must_use]
    pub fn digest(&self) -> Sha256Hash {
        Sha256Hash(self.hasher.clone().finalize().into())
    }
}

impl Sink for Sha256Sink {
    fn write(&mut self, bytes: &[u8]) -> PackagingResult<()> {
        self.hasher.update(bytes);
        Ok(())
    }
}

/// A sink which appends to an owned byte buffer.
#[derive(Default)]
pub struct VectorSink {
    bytes: Vec<u8>,
}

impl VectorSink {
    #[must_use]
    pub fn new() -> Self {
        VectorSink::default()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl Sink for VectorSink {
    fn write(&mut self, bytes: &[u8]) -> PackagingResult<()> {
        self.bytes.extend_from_slice(bytes);
        Ok(())
    }
}

/// A sink which base64-encodes its input (standard alphabet, no line
/// breaks). The encoded string is available after `close`.
#[derive(Default)]
pub struct Base64Sink {
    raw: Vec<u8>,
    encoded: Option<String>,
}

impl Base64Sink {
    #[must_use]
    pub fn new() -> Self {
        Base64Sink::default()
    }

    /// The encoded string. Empty until `close` has been called.
    #[must_use]
    pub fn encoded(&self) -> &str {
        self.encoded.as_deref().unwrap_or("")
    }
}

impl Sink for Base64Sink {
    fn write(&mut self, bytes: &[u8]) -> PackagingResult<()> {
        if self.encoded.is_some() {
            return Err(PackagingError::Content(
                "write to a closed base64 sink".to_string(),
            ));
        }
        self.raw.extend_from_slice(bytes);
        Ok(())
    }

    fn close(&mut self) -> PackagingResult<()> {
        if self.encoded.is_none() {
            self.encoded = Some(BASE64_STANDARD.encode(&self.raw));
        }
        Ok(())
    }
}

/// A sink which feeds data to factory-produced inner sinks in equal-sized
/// chunks. Each complete chunk (and a trailing partial chunk, if any) gets
/// a fresh inner sink which is closed and retained; the ordered list of
/// completed sinks is available after `close`. All-empty input produces no
/// inner sinks.
pub struct ChunkSink<S, F> {
    chunk_size: u64,
    written: u64,
    factory: F,
    current: S,
    chunks: Vec<S>,
}

impl<S: Sink, F: FnMut() -> S> ChunkSink<S, F> {
    pub fn new(chunk_size: u64, mut factory: F) -> Self {
        debug_assert!(chunk_size > 0);
        let current = factory();
        ChunkSink {
            chunk_size,
            written: 0,
            factory,
            current,
            chunks: Vec::new(),
        }
    }

    #[must_use]
    pub fn chunks(&self) -> &[S] {
        &self.chunks
    }

    fn end_chunk(&mut self) -> PackagingResult<()> {
        if self.written == 0 {
            return Ok(());
        }
        self.current.close()?;
        let finished = std::mem::replace(&mut self.current, (self.factory)());
        self.chunks.push(finished);
        self.written = 0;
        Ok(())
    }
}

impl<S: Sink, F: FnMut() -> S> Sink for ChunkSink<S, F> {
    fn write(&mut self, mut bytes: &[u8]) -> PackagingResult<()> {
        while !bytes.is_empty() {
            let room = (self.chunk_size - self.written) as usize;
            let take = room.min(bytes.len());
            self.current.write(&bytes[..take])?;
            self.written += take as u64;
            bytes = &bytes[take..];
            if self.written == self.chunk_size {
                self.end_chunk()?;
            }
        }
        Ok(())
    }

    fn close(&mut self) -> PackagingResult<()> {
        self.end_chunk()
    }
}
