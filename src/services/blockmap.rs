//! `AppxBlockMap.xml` synthesis.
//!
//! Lists, for every caller-supplied entry, the SHA-256 of each 64 KiB
//! uncompressed window, plus the window's compressed span for deflated
//! entries. The block map itself, `[Content_Types].xml`, and the signature
//! are not listed.

use crate::domain::sink::{Base64Sink, Crc32Sink, Sha256Sink, Sink};
use crate::domain::xml::escape_attribute;
use crate::domain::zip::ZipFileEntry;
use crate::infra::error::PackagingResult;
use crate::services::entry_writer::is_appx_file;

pub const BLOCK_MAP_FILE_NAME: &str = "AppxBlockMap.xml";

pub fn block_map_xml(entries: &[ZipFileEntry], is_bundle: bool) -> PackagingResult<String> {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"no\"?>\r\n",
    );
    xml.push_str(
        "<BlockMap xmlns=\"http://schemas.microsoft.com/appx/2010/blockmap\" \
         HashMethod=\"http://www.w3.org/2001/04/xmlenc#sha256\">",
    );
    for entry in entries {
        // Nested packages of a bundle carry their own block maps.
        if is_bundle && is_appx_file(&entry.file_name) {
            continue;
        }
        let windows_name = entry.file_name.replace('/', "\\");
        xml.push_str(&format!(
            "<File Name=\"{}\" Size=\"{}\" LfhSize=\"{}\">",
            escape_attribute(&windows_name),
            entry.uncompressed_size,
            entry.file_record_header_size()
        ));
        for block in &entry.blocks {
            let mut base64 = Base64Sink::new();
            base64.write(block.sha256.as_bytes())?;
            base64.close()?;
            xml.push_str(&format!("<Block Hash=\"{}\"", base64.encoded()));
            if let Some(compressed_size) = block.compressed_size {
                xml.push_str(&format!(" Size=\"{compressed_size}\""));
            }
            xml.push_str("/>");
        }
        xml.push_str("</File>");
    }
    xml.push_str("</BlockMap>");
    Ok(xml)
}

/// Synthesises the block map and writes it as an uncompressed ZIP entry.
pub fn write_block_map_entry<S: Sink>(
    sink: &mut S,
    offset: u64,
    entries: &[ZipFileEntry],
    is_bundle: bool,
) -> PackagingResult<ZipFileEntry> {
    let xml = block_map_xml(entries, is_bundle)?;
    let bytes = xml.as_bytes();

    let mut crc = Crc32Sink::new();
    let mut sha256 = Sha256Sink::new();
    {
        let mut fan_out = (&mut crc, &mut sha256);
        fan_out.write(bytes)?;
    }

    let entry = ZipFileEntry::stored(
        BLOCK_MAP_FILE_NAME,
        bytes.len() as u64,
        offset,
        crc.value(),
        Vec::new(),
        Some(sha256.digest()),
    );
    entry.write_file_record_header(sink)?;
    sink.write(bytes)?;
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::hash::Sha256Hash;
    use crate::domain::sink::VectorSink;
    use crate::domain::zip::{ZipBlock, ZipCompressionType};
    use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
    use base64::Engine as _;

    fn entry_with_blocks(name: &str, blocks: Vec<ZipBlock>) -> ZipFileEntry {
        ZipFileEntry::new(
            name,
            100,
            200,
            ZipCompressionType::Deflate,
            0,
            0,
            blocks,
            None,
        )
    }

    #[test]
    fn lists_blocks_with_hashes_and_sizes() {
        let first = Sha256Hash::digest_bytes(b"window one");
        let second = Sha256Hash::digest_bytes(b"window two");
        let entry = entry_with_blocks(
            "dir/data.bin",
            vec![
                ZipBlock::new(first, Some(70)),
                ZipBlock::new(second, Some(30)),
            ],
        );
        let xml = block_map_xml(std::slice::from_ref(&entry), false).unwrap();

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"no\"?>\r\n"));
        assert!(xml.contains("<File Name=\"dir\\data.bin\" Size=\"200\""));
        let expected_lfh = 30 + "dir/data.bin".len();
        assert!(xml.contains(&format!("LfhSize=\"{expected_lfh}\"")));
        assert!(xml.contains(&format!(
            "<Block Hash=\"{}\" Size=\"70\"/>",
            BASE64_STANDARD.encode(first.as_bytes())
        )));
        assert!(xml.contains(&format!(
            "<Block Hash=\"{}\" Size=\"30\"/>",
            BASE64_STANDARD.encode(second.as_bytes())
        )));
    }

    #[test]
    fn stored_blocks_have_no_size_attribute() {
        let hash = Sha256Hash::digest_bytes(b"stored window");
        let entry = ZipFileEntry::stored("plain.txt", 10, 0, 0, vec![ZipBlock::stored(hash)], None);
        let xml = block_map_xml(std::slice::from_ref(&entry), false).unwrap();
        assert!(xml.contains(&format!(
            "<Block Hash=\"{}\"/>",
            BASE64_STANDARD.encode(hash.as_bytes())
        )));
    }

    #[test]
    fn bundles_exclude_nested_packages() {
        let nested = ZipFileEntry::stored("inner.appx", 10, 0, 0, Vec::new(), None);
        let manifest = ZipFileEntry::stored(
            "AppxMetadata/AppxBundleManifest.xml",
            10,
            0,
            0,
            Vec::new(),
            None,
        );
        let entries = vec![nested, manifest];
        let xml = block_map_xml(&entries, true).unwrap();
        assert!(!xml.contains("inner.appx"));
        assert!(xml.contains("AppxMetadata\\AppxBundleManifest.xml"));

        // Outside bundle mode the same name is listed.
        let xml = block_map_xml(&entries, false).unwrap();
        assert!(xml.contains("inner.appx"));
    }

    #[test]
    fn entry_records_content_digest() {
        let mut sink = VectorSink::new();
        let entry = write_block_map_entry(&mut sink, 42, &[], false).unwrap();
        assert_eq!(entry.file_name, "AppxBlockMap.xml");
        assert_eq!(entry.compression_type, ZipCompressionType::Store);
        assert_eq!(entry.file_record_header_offset, 42);
        assert!(entry.blocks.is_empty());

        let xml = block_map_xml(&[], false).unwrap();
        assert_eq!(
            entry.sha256,
            Some(Sha256Hash::digest_bytes(xml.as_bytes()))
        );
        assert_eq!(entry.uncompressed_size, xml.len() as u64);
        // Header then the XML body.
        let header_size = entry.file_record_header_size() as usize;
        assert_eq!(&sink.as_slice()[header_size..], xml.as_bytes());
    }
}
