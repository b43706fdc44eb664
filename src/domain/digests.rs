//! The five-digest bundle bound into an APPX signature.

use crate::domain::hash::Sha256Hash;
use crate::domain::sink::Sink;
use crate::infra::error::PackagingResult;

/// The digests required when signing an APPX file. All are SHA-256.
#[derive(Debug, Clone, Default)]
pub struct AppxDigests {
    /// Local file records, in archive order, pre-signature.
    pub axpc: Sha256Hash,
    /// The would-be central directory plus end records, pre-signature.
    pub axcd: Sha256Hash,
    /// `[Content_Types].xml`, uncompressed.
    pub axct: Sha256Hash,
    /// `AppxBlockMap.xml`, uncompressed.
    pub axbm: Sha256Hash,
    /// `AppxMetadata/CodeIntegrity.cat`, uncompressed; zero-filled when the
    /// catalog is absent.
    pub axci: Sha256Hash,
}

impl AppxDigests {
    /// Serialised size: the `APPX` magic plus five tagged digests.
    pub const ENCODED_LEN: usize = 4 + 5 * (4 + Sha256Hash::LEN);

    pub fn write<S: Sink>(&self, sink: &mut S) -> PackagingResult<()> {
        sink.write(b"APPX")?;
        sink.write(b"AXPC")?;
        sink.write(self.axpc.as_bytes())?;
        sink.write(b"AXCD")?;
        sink.write(self.axcd.as_bytes())?;
        sink.write(b"AXCT")?;
        sink.write(self.axct.as_bytes())?;
        sink.write(b"AXBM")?;
        sink.write(self.axbm.as_bytes())?;
        sink.write(b"AXCI")?;
        sink.write(self.axci.as_bytes())
    }

    /// The serialised blob handed to the signer.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut blob = Vec::with_capacity(Self::ENCODED_LEN);
        blob.extend_from_slice(b"APPX");
        for (tag, digest) in [
            (b"AXPC", &self.axpc),
            (b"AXCD", &self.axcd),
            (b"AXCT", &self.axct),
            (b"AXBM", &self.axbm),
            (b"AXCI", &self.axci),
        ] {
            blob.extend_from_slice(tag);
            blob.extend_from_slice(digest.as_bytes());
        }
        blob
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sink::VectorSink;

    #[test]
    fn blob_layout() {
        let digests = AppxDigests {
            axpc: Sha256Hash([0x01; 32]),
            axcd: Sha256Hash([0x02; 32]),
            axct: Sha256Hash([0x03; 32]),
            axbm: Sha256Hash([0x04; 32]),
            axci: Sha256Hash::default(),
        };
        let blob = digests.to_bytes();
        assert_eq!(blob.len(), AppxDigests::ENCODED_LEN);
        assert_eq!(blob.len(), 184);
        assert_eq!(&blob[0..4], b"APPX");
        assert_eq!(&blob[4..8], b"AXPC");
        assert_eq!(&blob[8..40], &[0x01; 32]);
        assert_eq!(&blob[40..44], b"AXCD");
        assert_eq!(&blob[76..80], b"AXCT");
        assert_eq!(&blob[112..116], b"AXBM");
        assert_eq!(&blob[148..152], b"AXCI");
        assert_eq!(&blob[152..184], &[0u8; 32]);
    }

    #[test]
    fn write_matches_to_bytes() {
        let digests = AppxDigests {
            axpc: Sha256Hash([0xAA; 32]),
            ..AppxDigests::default()
        };
        let mut sink = VectorSink::new();
        digests.write(&mut sink).unwrap();
        assert_eq!(sink.as_slice(), digests.to_bytes().as_slice());
    }
}
