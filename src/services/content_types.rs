//! `[Content_Types].xml` synthesis.
//!
//! One `<Default>` per distinct extension among the caller-supplied
//! entries (in first-seen order), an `<Override>` for every extensionless
//! entry, and the three fixed overrides for the block map, the signature,
//! and the code-integrity catalog.

use crate::domain::sink::{Crc32Sink, Sha256Sink, Sink};
use crate::domain::xml::escape_attribute;
use crate::domain::zip::ZipFileEntry;
use crate::infra::error::PackagingResult;

pub const CONTENT_TYPES_FILE_NAME: &str = "[Content_Types].xml";

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

const KNOWN_CONTENT_TYPES: &[(&str, &str)] = &[
    ("appx", "application/vnd.ms-appx"),
    ("dll", "application/x-msdownload"),
    ("exe", "application/x-msdownload"),
    ("png", "image/png"),
];

fn content_type_for(extension: &str, is_bundle: bool) -> &'static str {
    if extension == "xml" {
        return if is_bundle {
            "application/vnd.ms-appx.bundlemanifest+xml"
        } else {
            "application/vnd.ms-appx.manifest+xml"
        };
    }
    KNOWN_CONTENT_TYPES
        .iter()
        .find(|(known, _)| *known == extension)
        .map_or(DEFAULT_CONTENT_TYPE, |(_, content_type)| content_type)
}

pub fn content_types_xml(is_bundle: bool, entries: &[ZipFileEntry]) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\r\n",
    );
    xml.push_str(
        "<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">",
    );

    let mut written_extensions: Vec<String> = Vec::new();
    for entry in entries {
        // Extensions come from the ZIP-escaped name, so an escaped space is
        // part of the extension.
        let name = &entry.sanitized_file_name;
        let base_name_pos = name.rfind('/').map_or(0, |pos| pos + 1);
        let extension_pos = name.rfind('.').map(|pos| pos + 1);
        match extension_pos {
            Some(pos) if pos > base_name_pos => {
                let extension = &name[pos..];
                if !written_extensions.iter().any(|seen| seen == extension) {
                    xml.push_str(&format!(
                        "<Default Extension=\"{}\" ContentType=\"{}\"/>",
                        escape_attribute(extension),
                        escape_attribute(content_type_for(extension, is_bundle))
                    ));
                    written_extensions.push(extension.to_string());
                }
            }
            _ => {
                xml.push_str(&format!(
                    "<Override PartName=\"/{}\" ContentType=\"{}\"/>",
                    escape_attribute(name),
                    escape_attribute(DEFAULT_CONTENT_TYPE)
                ));
            }
        }
    }

    xml.push_str(
        "<Override PartName=\"/AppxBlockMap.xml\" \
         ContentType=\"application/vnd.ms-appx.blockmap+xml\"/>",
    );
    xml.push_str(
        "<Override PartName=\"/AppxSignature.p7x\" \
         ContentType=\"application/vnd.ms-appx.signature\"/>",
    );
    xml.push_str(
        "<Override PartName=\"/AppxMetadata/CodeIntegrity.cat\" \
         ContentType=\"application/vnd.ms-pkiseccat\"/>",
    );
    xml.push_str("</Types>");
    xml
}

/// Synthesises the content-types manifest and writes it as an uncompressed
/// ZIP entry. `caller_entries` must not include synthesised entries.
pub fn write_content_types_entry<S: Sink>(
    sink: &mut S,
    offset: u64,
    is_bundle: bool,
    caller_entries: &[ZipFileEntry],
) -> PackagingResult<ZipFileEntry> {
    let xml = content_types_xml(is_bundle, caller_entries);
    let bytes = xml.as_bytes();

    let mut crc = Crc32Sink::new();
    let mut sha256 = Sha256Sink::new();
    {
        let mut fan_out = (&mut crc, &mut sha256);
        fan_out.write(bytes)?;
    }

    let entry = ZipFileEntry::stored(
        CONTENT_TYPES_FILE_NAME,
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
