//! Export: replace the destination's documents with the assembled ones

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use glob::{glob_with, MatchOptions, Pattern};
use serde::Serialize;
use tracing::{info, warn};

use crate::assemble::ExportedDocument;
use crate::error::{Error, Result};
use crate::report::{BatchReport, Failure};

/// Files the destination is cleared of before an export
pub const EXPORT_PATTERN: &str = "*.pdf";

/// Outcome of one export run
#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    pub exported_at: DateTime<Local>,
    /// Prior destination files removed before writing
    pub cleared: Vec<String>,
    /// Exported filenames, and the items that did not make it
    #[serde(flatten)]
    pub files: BatchReport<String>,
}

impl ExportReport {
    fn new() -> Self {
        Self {
            exported_at: Local::now(),
            cleared: Vec::new(),
            files: BatchReport::default(),
        }
    }

    pub fn exported(&self) -> &[String] {
        &self.files.succeeded
    }

    pub fn failed(&self) -> &[Failure] {
        &self.files.failed
    }
}

/// Files in `dir` matching `pattern` (case-insensitive), sorted
pub fn matching_files(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let dir_str = dir
        .to_str()
        .ok_or_else(|| Error::InvalidGlob(dir.display().to_string()))?;
    let full_pattern = format!("{}/{}", Pattern::escape(dir_str), pattern);
    let options = MatchOptions {
        case_sensitive: false,
        ..MatchOptions::new()
    };

    let mut files = Vec::new();
    for entry in glob_with(&full_pattern, options).map_err(|e| Error::InvalidGlob(e.to_string()))? {
        match entry {
            Ok(path) if path.is_file() => files.push(path),
            Ok(_) => {}
            Err(e) => warn!("Skipping unreadable entry: {}", e),
        }
    }
    files.sort();
    Ok(files)
}

/// Remove every file in `dir` matching `pattern`; returns what was removed
pub fn clear_matching(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let files = matching_files(dir, pattern)?;
    for file in &files {
        fs::remove_file(file)?;
    }
    Ok(files)
}

/// Rename, falling back to copy and delete across filesystems
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) if from.is_file() => {
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
        Err(e) => Err(e),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Moves finished documents into the destination store
pub struct ExportStage<'a> {
    destination: &'a Path,
}

impl<'a> ExportStage<'a> {
    pub fn new(destination: &'a Path) -> Self {
        Self { destination }
    }

    /// Clear the destination's PDFs, then move `documents` in.
    ///
    /// Clearing finishes before the first file is written. Files that
    /// cannot be moved are reported; files already moved stay in place.
    pub fn export(&self, documents: &[ExportedDocument]) -> Result<ExportReport> {
        fs::create_dir_all(self.destination)?;
        let mut report = ExportReport::new();

        for removed in clear_matching(self.destination, EXPORT_PATTERN)? {
            report.cleared.push(file_name(&removed));
        }

        for document in documents {
            let target = self.destination.join(&document.filename);
            match move_file(&document.path, &target) {
                Ok(()) => report.files.push_ok(document.filename.clone()),
                Err(e) => {
                    let error = Error::MoveFailure {
                        file: document.filename.clone(),
                        reason: e.to_string(),
                    };
                    report.files.push_err(Failure::new(&document.filename, error));
                }
            }
        }

        info!(
            "Exported {} files to {} ({} cleared, {} failed)",
            report.files.succeeded.len(),
            self.destination.display(),
            report.cleared.len(),
            report.files.failed.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::AssemblyKind;
    use tempfile::TempDir;

    fn document(dir: &Path, name: &str) -> ExportedDocument {
        let path = dir.join(name);
        fs::write(&path, b"%PDF-1.5").unwrap();
        ExportedDocument {
            filename: name.to_string(),
            path,
            pages: vec![1],
            kind: AssemblyKind::Passthrough,
        }
    }

    #[test]
    fn test_export_replaces_prior_pdfs() {
        let dir = TempDir::new().unwrap();
        let working = dir.path().join("work");
        let destination = dir.path().join("dest");
        fs::create_dir_all(&working).unwrap();
        fs::create_dir_all(&destination).unwrap();
        fs::write(destination.join("old.pdf"), b"old").unwrap();
        fs::write(destination.join("OLD2.PDF"), b"old").unwrap();
        fs::write(destination.join("keep.csv"), b"a,b").unwrap();

        let docs = vec![document(&working, "new_page_1.pdf")];
        let report = ExportStage::new(&destination).export(&docs).unwrap();

        assert_eq!(report.cleared, vec!["OLD2.PDF", "old.pdf"]);
        assert_eq!(report.exported(), ["new_page_1.pdf".to_string()]);
        assert!(destination.join("new_page_1.pdf").exists());
        assert!(!working.join("new_page_1.pdf").exists());
        assert!(!destination.join("old.pdf").exists());
        assert!(destination.join("keep.csv").exists());
    }

    #[test]
    fn test_unmovable_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let working = dir.path().join("work");
        let destination = dir.path().join("dest");
        fs::create_dir_all(&working).unwrap();

        let mut docs = vec![document(&working, "a.pdf"), document(&working, "b.pdf")];
        docs[0].path = working.join("vanished.pdf");

        let report = ExportStage::new(&destination).export(&docs).unwrap();

        assert_eq!(report.exported(), ["b.pdf".to_string()]);
        assert_eq!(report.failed().len(), 1);
        assert_eq!(report.failed()[0].item, "a.pdf");
        assert!(destination.join("b.pdf").exists());
    }

    #[test]
    fn test_matching_files_in_missing_dir() {
        let dir = TempDir::new().unwrap();
        assert!(matching_files(&dir.path().join("absent"), "*.pdf").unwrap().is_empty());
    }
}
