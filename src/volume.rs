//! Recursive scan of the source volume

use crate::error::{Error, Result};
use crate::tables::RawFileRecord;
use chrono::{DateTime, SecondsFormat, Utc};
use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// List files under `root` whose names match `glob`, sorted by path
pub fn find_matching_files(root: &Path, glob: &str) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(Error::InvalidPath(format!(
            "{} is not a readable directory",
            root.display()
        )));
    }

    let mut overrides = OverrideBuilder::new(root);
    overrides
        .add(glob)
        .map_err(|e| Error::Config(format!("Invalid source glob `{}`: {}", glob, e)))?;
    let overrides = overrides
        .build()
        .map_err(|e| Error::Config(format!("Invalid source glob `{}`: {}", glob, e)))?;

    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .hidden(true)
        .follow_links(true)
        .overrides(overrides)
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| Error::Other(format!("Volume scan failed: {}", e)))?;
        if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            files.push(entry.into_path());
        }
    }

    files.sort();
    Ok(files)
}

/// Read one file into a bronze record
pub fn read_file_record(path: &Path) -> Result<RawFileRecord> {
    let metadata = std::fs::metadata(path)?;
    let content = std::fs::read(path)?;
    let modified: DateTime<Utc> = metadata.modified()?.into();

    Ok(RawFileRecord {
        document_uri: path.display().to_string(),
        modification_time: modified.to_rfc3339_opts(SecondsFormat::Millis, true),
        length: content.len() as i64,
        content,
    })
}

/// Scan the volume and load every matching file with its metadata
pub fn scan(root: &Path, glob: &str) -> Result<Vec<RawFileRecord>> {
    let files = find_matching_files(root, glob)?;
    info!("Found {} files matching `{}` under {}", files.len(), glob, root.display());

    files
        .iter()
        .map(|path| {
            debug!("Reading {}", path.display());
            read_file_record(path)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, relative: &str, bytes: &[u8]) {
        let path = dir.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_scan_is_recursive_and_filtered() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a.pdf", b"%PDF-a");
        write(tmp.path(), "nested/deeper/b.pdf", b"%PDF-bb");
        write(tmp.path(), "nested/notes.txt", b"ignored");
        write(tmp.path(), "report.pdf.bak", b"ignored");

        let records = scan(tmp.path(), "*.pdf").unwrap();

        assert_eq!(records.len(), 2);
        assert!(records[0].document_uri.ends_with("a.pdf"));
        assert!(records[1].document_uri.ends_with("b.pdf"));
        assert_eq!(records[1].length, 7);
        assert_eq!(records[1].content, b"%PDF-bb");
        assert!(records[0].modification_time.ends_with('Z'));
    }

    #[test]
    fn test_scan_count_matches_files_found() {
        let tmp = TempDir::new().unwrap();
        for i in 0..7 {
            write(tmp.path(), &format!("dir{}/file{}.pdf", i % 3, i), b"x");
        }

        let files = find_matching_files(tmp.path(), "*.pdf").unwrap();
        let records = scan(tmp.path(), "*.pdf").unwrap();
        assert_eq!(files.len(), 7);
        assert_eq!(records.len(), files.len());
    }

    #[test]
    fn test_scan_skips_hidden_files() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), ".hidden.pdf", b"x");
        write(tmp.path(), "visible.pdf", b"x");

        let records = scan(tmp.path(), "*.pdf").unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_scan_empty_directory() {
        let tmp = TempDir::new().unwrap();
        assert!(scan(tmp.path(), "*.pdf").unwrap().is_empty());
    }

    #[test]
    fn test_scan_missing_root_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("missing");
        assert!(matches!(
            scan(&missing, "*.pdf"),
            Err(Error::InvalidPath(_))
        ));
    }
}
