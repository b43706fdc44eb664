//! Input collection: directory recursion, `archive=local` pairs, and
//! mapping files.
//!
//! A mapping file has the form
//!
//! ```text
//! [Files]
//! "/path/to/local/file.exe" "appx_file.exe"
//! ```
//!
//! Blank lines are skipped; leading and trailing whitespace is trimmed.
//! The first entry for an archive name wins.

use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::infra::error::{PackagingError, PackagingResult};

/// Mapping from archive name to local filesystem path.
pub type FileMapping = BTreeMap<String, PathBuf>;

/// Adds a local file or directory to the mapping. A directory contributes
/// every file below it, named by its path relative to the directory; a
/// plain file lands at the archive root under its file name.
pub fn add_path_inputs(path: &Path, file_names: &mut FileMapping) -> PackagingResult<()> {
    for entry in WalkDir::new(path).follow_links(false) {
        let entry =
            entry.map_err(|e| PackagingError::Io(format!("{}: {e}", path.display())))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(path)
            .unwrap_or(entry.path());
        let archive_name = if relative.as_os_str().is_empty() {
            // The input itself is a file.
            entry
                .path()
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    PackagingError::InvalidInput(format!(
                        "cannot derive archive name for {}",
                        entry.path().display()
                    ))
                })?
        } else {
            relative
                .components()
                .map(|component| component.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/")
        };
        file_names
            .entry(archive_name)
            .or_insert_with(|| entry.path().to_path_buf());
    }
    Ok(())
}

/// Adds an `archive=local` positional argument, or recurses a plain path.
pub fn add_input_argument(argument: &str, file_names: &mut FileMapping) -> PackagingResult<()> {
    if let Some((archive_name, local_path)) = argument.split_once('=') {
        if archive_name.is_empty() || local_path.is_empty() {
            return Err(PackagingError::InvalidInput(format!(
                "malformed input argument: {argument}"
            )));
        }
        file_names
            .entry(archive_name.to_string())
            .or_insert_with(|| PathBuf::from(local_path));
        Ok(())
    } else {
        add_path_inputs(Path::new(argument), file_names)
    }
}

fn malformed(source_name: &str, line_number: usize) -> PackagingError {
    PackagingError::InvalidInput(format!(
        "malformed mapping file: {source_name}:{line_number}"
    ))
}

/// Parses a mapping file into the archive-name mapping.
pub fn parse_mapping_file<R: BufRead>(
    reader: R,
    source_name: &str,
    file_names: &mut FileMapping,
) -> PackagingResult<()> {
    let mut did_read_header = false;
    for (index, line) in reader.lines().enumerate() {
        let line_number = index + 1;
        let line = line.map_err(|e| {
            PackagingError::Io(format!("{source_name}: {e}"))
        })?;
        let line = line.trim_matches([' ', '\t']);
        if line.is_empty() {
            continue;
        }

        if !did_read_header {
            if line != "[Files]" {
                return Err(malformed(source_name, line_number));
            }
            did_read_header = true;
            continue;
        }

        // "localPath" "archiveName"
        let rest = line
            .strip_prefix('"')
            .ok_or_else(|| malformed(source_name, line_number))?;
        let (local_path, rest) = rest
            .split_once('"')
            .ok_or_else(|| malformed(source_name, line_number))?;
        if local_path.is_empty() {
            return Err(malformed(source_name, line_number));
        }
        let rest = rest.trim_start_matches([' ', '\t']);
        let rest = rest
            .strip_prefix('"')
            .ok_or_else(|| malformed(source_name, line_number))?;
        let (archive_name, rest) = rest
            .split_once('"')
            .ok_or_else(|| malformed(source_name, line_number))?;
        if archive_name.is_empty() || !rest.is_empty() {
            return Err(malformed(source_name, line_number));
        }

        file_names
            .entry(archive_name.to_string())
            .or_insert_with(|| PathBuf::from(local_path));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Cursor;

    #[test]
    fn parses_quoted_pairs() {
        let mut mapping = FileMapping::new();
        let file = "[Files]\n\"/tmp/local.exe\" \"app.exe\"\n\n  \"/tmp/b\"\t\"data/b.bin\"  \n";
        parse_mapping_file(Cursor::new(file), "test.map", &mut mapping).unwrap();
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping["app.exe"], PathBuf::from("/tmp/local.exe"));
        assert_eq!(mapping["data/b.bin"], PathBuf::from("/tmp/b"));
    }

    #[test]
    fn first_mapping_for_a_name_wins() {
        let mut mapping = FileMapping::new();
        let file = "[Files]\n\"/one\" \"a\"\n\"/two\" \"a\"\n";
        parse_mapping_file(Cursor::new(file), "test.map", &mut mapping).unwrap();
        assert_eq!(mapping["a"], PathBuf::from("/one"));
    }

    #[test]
    fn rejects_missing_header() {
        let mut mapping = FileMapping::new();
        let result =
            parse_mapping_file(Cursor::new("\"/a\" \"b\"\n"), "test.map", &mut mapping);
        assert!(matches!(result, Err(PackagingError::InvalidInput(_))));
    }

    #[test]
    fn rejects_malformed_lines() {
        for bad in [
            "[Files]\ngarbage\n",
            "[Files]\n\"\" \"b\"\n",
            "[Files]\n\"/a\" \"\"\n",
            "[Files]\n\"/a\" \"b\" trailing\n",
            "[Files]\n\"/a\" x \"b\"\n",
            "[Files]\n\"/a\"\n",
        ] {
            let mut mapping = FileMapping::new();
            let result = parse_mapping_file(Cursor::new(bad), "test.map", &mut mapping);
            assert!(result.is_err(), "accepted: {bad}");
        }
    }

    #[test]
    fn error_names_file_and_line() {
        let mut mapping = FileMapping::new();
        let result =
            parse_mapping_file(Cursor::new("[Files]\nbad\n"), "my.map", &mut mapping);
        match result {
            Err(PackagingError::InvalidInput(message)) => {
                assert!(message.contains("my.map:2"), "{message}");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn walks_directories_relative_to_the_root() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("top.txt"), b"top").unwrap();
        fs::write(dir.path().join("sub/nested.txt"), b"nested").unwrap();

        let mut mapping = FileMapping::new();
        add_path_inputs(dir.path(), &mut mapping).unwrap();
        assert_eq!(mapping.len(), 2);
        assert!(mapping.contains_key("top.txt"));
        assert!(mapping.contains_key("sub/nested.txt"));
    }

    #[test]
    fn a_plain_file_lands_at_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("alone.bin");
        fs::write(&file, b"x").unwrap();

        let mut mapping = FileMapping::new();
        add_path_inputs(&file, &mut mapping).unwrap();
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping["alone.bin"], file);
    }

    #[test]
    fn equals_arguments_map_directly() {
        let mut mapping = FileMapping::new();
        add_input_argument("assets/logo.png=/tmp/logo.png", &mut mapping).unwrap();
        assert_eq!(mapping["assets/logo.png"], PathBuf::from("/tmp/logo.png"));

        assert!(add_input_argument("=x", &mut mapping).is_err());
        assert!(add_input_argument("x=", &mut mapping).is_err());
    }
}
