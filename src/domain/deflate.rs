//! Raw-DEFLATE compression sink.
//!
//! Wraps `flate2`'s streaming compressor (no zlib header, matching a
//! negative-window-bits zlib stream) and forwards compressed bytes to an
//! inner sink. `flush_full` emits a full-flush point so the compressed
//! stream is split at a known byte boundary; `close` emits the final block.

use flate2::{Compress, Compression, FlushCompress, Status};

use crate::domain::sink::Sink;
use crate::infra::error::{PackagingError, PackagingResult};

const OUT_BUFFER_SIZE: usize = 1024;

pub struct DeflateSink<S> {
    compress: Compress,
    inner: S,
    seen_input: bool,
}

impl<S: Sink> DeflateSink<S> {
    /// A compressor at the best level, which is what the packager uses for
    /// every deflated entry.
    pub fn new(inner: S) -> Self {
        Self::with_level(Compression::best(), inner)
    }

    pub fn with_level(level: Compression, inner: S) -> Self {
        DeflateSink {
            compress: Compress::new(level, false),
            inner,
            seen_input: false,
        }
    }

    /// Total compressed bytes produced so far.
    #[must_use]
    pub fn total_out(&self) -> u64 {
        self.compress.total_out()
    }

    #[must_use]
    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Emits a full-flush point. Compressed output up to the bytes written
    /// so far becomes materialised and the stream can be resynchronised at
    /// this boundary. A no-op before any input has been seen.
    pub fn flush_full(&mut self) -> PackagingResult<()> {
        if !self.seen_input {
            return Ok(());
        }
        self.run(&[], FlushCompress::Full)
    }

    /// Emits the final block. No writes may follow.
    pub fn finish(&mut self) -> PackagingResult<()> {
        self.run(&[], FlushCompress::Finish)
    }

    fn run(&mut self, mut input: &[u8], flush: FlushCompress) -> PackagingResult<()> {
        let mut buffer = [0u8; OUT_BUFFER_SIZE];
        loop {
            let before_in = self.compress.total_in();
            let before_out = self.compress.total_out();
            let status = self
                .compress
                .compress(input, &mut buffer, flush)
                .map_err(|e| PackagingError::Compression(e.to_string()))?;
            let consumed = (self.compress.total_in() - before_in) as usize;
            let produced = (self.compress.total_out() - before_out) as usize;
            if produced > 0 {
                self.inner.write(&buffer[..produced])?;
            }
            input = &input[consumed..];
            match status {
                Status::StreamEnd => break,
                Status::Ok => {
                    if input.is_empty() && produced < buffer.len() {
                        if matches!(flush, FlushCompress::Finish) {
                            // Not at stream end yet; keep draining.
                            continue;
                        }
                        break;
                    }
                }
                Status::BufError => {
                    // No progress possible: everything pending is drained.
                    if consumed == 0 && produced == 0 {
                        if matches!(flush, FlushCompress::Finish) {
                            return Err(PackagingError::Compression(
                                "deflate stream made no progress".to_string(),
                            ));
                        }
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}

impl<S: Sink> Sink for DeflateSink<S> {
    fn write(&mut self, bytes: &[u8]) -> PackagingResult<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.seen_input = true;
        self.run(bytes, FlushCompress::None)
    }

    fn close(&mut self) -> PackagingResult<()> {
        self.finish()
    }
}
