//! Zip extraction into a staging directory.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use zip::ZipArchive;

use crate::error::IngestError;

/// Counters from one extraction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExtractStats {
    /// Regular files written.
    pub files: usize,
    /// Files that replaced an existing file at the same path.
    pub overwritten: usize,
    /// Entries skipped because their name escapes the destination.
    pub skipped: usize,
}

/// Extract every entry of `archive_path` under `dest`.
///
/// Existing files are overwritten. Entries with absolute or `..` names are
/// skipped.
pub fn extract_zip(archive_path: &Path, dest: &Path) -> Result<ExtractStats, IngestError> {
    let archive_err = |source: zip::result::ZipError| IngestError::Archive {
        path: archive_path.to_path_buf(),
        source,
    };

    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file).map_err(archive_err)?;
    let mut stats = ExtractStats::default();

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(archive_err)?;
        let Some(rel) = entry.enclosed_name() else {
            tracing::warn!(entry = entry.name(), "skipping archive entry with unsafe path");
            stats.skipped += 1;
            continue;
        };

        let out_path = dest.join(rel);
        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        if out_path.is_file() {
            stats.overwritten += 1;
        }

        let mut writer = File::create(&out_path)?;
        io::copy(&mut entry, &mut writer)?;
        stats.files += 1;
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;

    fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, content) in entries {
            writer.start_file(*name, options).expect("start zip entry");
            writer.write_all(content).expect("write zip entry");
        }
        writer.finish().expect("finish zip").into_inner()
    }

    #[test]
    fn extracts_nested_entries_and_counts_overwrites() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let archive_path = temp.path().join("data.zip");
        fs::write(
            &archive_path,
            zip_bytes(&[("images/a.jpg", b"new"), ("labels/a.txt", b"0 0.5 0.5 0.5 0.5\n")]),
        )
        .expect("write zip");

        let dest = temp.path().join("out");
        fs::create_dir_all(dest.join("images")).expect("create dest");
        fs::write(dest.join("images/a.jpg"), b"old").expect("write existing");

        let stats = extract_zip(&archive_path, &dest).expect("extract");
        assert_eq!(stats.files, 2);
        assert_eq!(stats.overwritten, 1);
        assert_eq!(stats.skipped, 0);
        assert_eq!(fs::read(dest.join("images/a.jpg")).expect("read"), b"new");
    }

    #[test]
    fn skips_entries_escaping_destination() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let archive_path = temp.path().join("evil.zip");
        fs::write(
            &archive_path,
            zip_bytes(&[("../escape.txt", b"x"), ("ok.jpg", b"y")]),
        )
        .expect("write zip");

        let dest = temp.path().join("out");
        let stats = extract_zip(&archive_path, &dest).expect("extract");
        assert_eq!(stats.files, 1);
        assert_eq!(stats.skipped, 1);
        assert!(!temp.path().join("escape.txt").exists());
    }

    #[test]
    fn corrupt_archive_is_an_archive_error() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let archive_path = temp.path().join("broken.zip");
        fs::write(&archive_path, b"not a zip").expect("write");

        let err = extract_zip(&archive_path, temp.path()).unwrap_err();
        assert!(matches!(err, IngestError::Archive { .. }));
    }
}
