//! Page splitting: one standalone PDF per page of the inventory

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use lopdf::Document;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::inventory::{PageInventory, PageRef, SourceKind};
use crate::pdf::{extract_page, image_page_document};
use crate::report::{BatchReport, Failure};

/// `{base}_page_{n}.pdf`
pub fn page_filename(base_name: &str, page_number: u32) -> String {
    format!("{}_page_{}.pdf", base_name, page_number)
}

/// A single page materialized as its own PDF in the working area
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SinglePageArtifact {
    /// Global 1-based page number
    pub page_number: u32,
    pub source_filename: String,
    pub path: PathBuf,
}

impl SinglePageArtifact {
    pub fn filename(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Artifacts of a previous split that are still in the working area
    pub fn locate(working_dir: &Path, base_name: &str, inventory: &PageInventory) -> Vec<Self> {
        inventory
            .pages()
            .iter()
            .filter_map(|page| {
                let path = working_dir.join(page_filename(base_name, page.number));
                path.is_file().then(|| Self {
                    page_number: page.number,
                    source_filename: inventory.source_of(page).filename.clone(),
                    path,
                })
            })
            .collect()
    }
}

pub type SplitReport = BatchReport<SinglePageArtifact>;

/// Loads each source document once and hands out single-page documents
pub struct PageLoader<'a> {
    inventory: &'a PageInventory,
    image_dpi: f64,
    loaded: HashMap<usize, std::result::Result<Document, String>>,
}

impl<'a> PageLoader<'a> {
    pub fn new(inventory: &'a PageInventory, image_dpi: f64) -> Self {
        Self {
            inventory,
            image_dpi,
            loaded: HashMap::new(),
        }
    }

    /// Standalone one-page document for `page`
    pub fn single_page(&mut self, page: &PageRef) -> Result<Document> {
        let inventory = self.inventory;
        let source = inventory.source_of(page);
        let extraction_error = |reason: String| Error::PageExtraction {
            page: page.number,
            reason,
        };

        match source.kind {
            SourceKind::Image => image_page_document(&source.path, self.image_dpi)
                .map_err(|e| extraction_error(e.to_string())),
            SourceKind::Pdf => {
                let document = self
                    .loaded
                    .entry(page.source)
                    .or_insert_with(|| Document::load(&source.path).map_err(|e| e.to_string()));
                match document {
                    Ok(document) => extract_page(document, page.page_index)
                        .map_err(|e| extraction_error(e.to_string())),
                    Err(reason) => Err(extraction_error(reason.clone())),
                }
            }
        }
    }

    /// Page by global number
    pub fn single_page_by_number(&mut self, number: u32) -> Result<Document> {
        let page = self
            .inventory
            .page(number)
            .ok_or(Error::InvalidPageNumber {
                page: number,
                page_count: self.inventory.page_count(),
            })?
            .clone();
        self.single_page(&page)
    }
}

/// Writes single-page artifacts into the working area
pub struct PageSplitter<'a> {
    working_dir: &'a Path,
    base_name: &'a str,
    image_dpi: f64,
}

impl<'a> PageSplitter<'a> {
    pub fn new(working_dir: &'a Path, base_name: &'a str, image_dpi: f64) -> Self {
        Self {
            working_dir,
            base_name,
            image_dpi,
        }
    }

    fn write_page(
        &self,
        loader: &mut PageLoader<'_>,
        inventory: &PageInventory,
        page: &PageRef,
    ) -> Result<SinglePageArtifact> {
        let path = self.working_dir.join(page_filename(self.base_name, page.number));
        let mut doc = loader.single_page(page)?;
        doc.save(&path)?;
        debug!("page {} -> {}", page.number, path.display());
        Ok(SinglePageArtifact {
            page_number: page.number,
            source_filename: inventory.source_of(page).filename.clone(),
            path,
        })
    }

    fn write_pages<'p>(
        &self,
        inventory: &PageInventory,
        pages: impl Iterator<Item = &'p PageRef>,
    ) -> Result<SplitReport> {
        std::fs::create_dir_all(self.working_dir)?;

        let mut loader = PageLoader::new(inventory, self.image_dpi);
        let mut report = SplitReport::default();
        for page in pages {
            match self.write_page(&mut loader, inventory, page) {
                Ok(artifact) => report.push_ok(artifact),
                Err(e) => report.push_err(Failure::new(format!("page {}", page.number), e)),
            }
        }
        Ok(report)
    }

    /// Materialize every page of `inventory`. A page that cannot be
    /// extracted is reported and the remaining pages still get split.
    pub fn split(&self, inventory: &PageInventory) -> Result<SplitReport> {
        let report = self.write_pages(inventory, inventory.pages().iter())?;
        info!(
            "Split {} of {} pages into {}",
            report.succeeded.len(),
            inventory.page_count(),
            self.working_dir.display()
        );
        Ok(report)
    }

    /// Write the pages whose artifact is no longer in the working area,
    /// such as pages an earlier export consumed. Existing artifacts are
    /// left as they are.
    pub fn restore_missing(&self, inventory: &PageInventory) -> Result<SplitReport> {
        let missing = inventory.pages().iter().filter(|page| {
            !self
                .working_dir
                .join(page_filename(self.base_name, page.number))
                .is_file()
        });
        let report = self.write_pages(inventory, missing)?;
        if !report.succeeded.is_empty() || !report.failed.is_empty() {
            info!(
                "Restored {} missing pages ({} failed)",
                report.succeeded.len(),
                report.failed.len()
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::SourceDoc;
    use crate::test_helpers::{page_labels, write_labeled_pdf};
    use tempfile::TempDir;

    fn two_document_inventory(dir: &Path) -> PageInventory {
        let docs = vec![
            SourceDoc::from_path(write_labeled_pdf(dir, "a.pdf", 3)).unwrap(),
            SourceDoc::from_path(write_labeled_pdf(dir, "b.pdf", 2)).unwrap(),
        ];
        PageInventory::enumerate(&docs).unwrap()
    }

    #[test]
    fn test_page_filename() {
        assert_eq!(page_filename("invoice", 12), "invoice_page_12.pdf");
    }

    #[test]
    fn test_split_numbers_pages_globally() {
        let dir = TempDir::new().unwrap();
        let inventory = two_document_inventory(dir.path());
        let working = dir.path().join("work");

        let report = PageSplitter::new(&working, "doc", 150.0).split(&inventory).unwrap();

        assert!(report.is_complete());
        assert_eq!(report.succeeded.len(), 5);
        let expected = ["a.pdf#1", "a.pdf#2", "a.pdf#3", "b.pdf#1", "b.pdf#2"];
        for (artifact, label) in report.succeeded.iter().zip(expected) {
            assert_eq!(artifact.filename(), format!("doc_page_{}.pdf", artifact.page_number));
            assert_eq!(page_labels(&artifact.path), vec![label.to_string()]);
        }
        assert_eq!(report.succeeded[3].source_filename, "b.pdf");
    }

    #[test]
    fn test_split_is_repeatable() {
        let dir = TempDir::new().unwrap();
        let inventory = two_document_inventory(dir.path());
        let working = dir.path().join("work");
        let splitter = PageSplitter::new(&working, "doc", 150.0);

        let first = splitter.split(&inventory).unwrap();
        std::fs::remove_dir_all(&working).unwrap();
        let second = splitter.split(&inventory).unwrap();

        assert_eq!(first.succeeded, second.succeeded);
        for artifact in &second.succeeded {
            assert_eq!(page_labels(&artifact.path).len(), 1);
        }
    }

    #[test]
    fn test_vanished_source_fails_only_its_pages() {
        let dir = TempDir::new().unwrap();
        let inventory = two_document_inventory(dir.path());
        std::fs::remove_file(dir.path().join("a.pdf")).unwrap();
        let working = dir.path().join("work");

        let report = PageSplitter::new(&working, "doc", 150.0).split(&inventory).unwrap();

        let ok: Vec<u32> = report.succeeded.iter().map(|a| a.page_number).collect();
        assert_eq!(ok, vec![4, 5]);
        let failed: Vec<&str> = report.failed.iter().map(|f| f.item.as_str()).collect();
        assert_eq!(failed, vec!["page 1", "page 2", "page 3"]);
    }

    #[test]
    fn test_locate_finds_remaining_artifacts() {
        let dir = TempDir::new().unwrap();
        let inventory = two_document_inventory(dir.path());
        let working = dir.path().join("work");
        PageSplitter::new(&working, "doc", 150.0).split(&inventory).unwrap();
        std::fs::remove_file(working.join("doc_page_2.pdf")).unwrap();

        let found = SinglePageArtifact::locate(&working, "doc", &inventory);
        let numbers: Vec<u32> = found.iter().map(|a| a.page_number).collect();
        assert_eq!(numbers, vec![1, 3, 4, 5]);
    }

    #[test]
    fn test_restore_missing_rewrites_only_absent_pages() {
        let dir = TempDir::new().unwrap();
        let inventory = two_document_inventory(dir.path());
        let working = dir.path().join("work");
        let splitter = PageSplitter::new(&working, "doc", 150.0);
        splitter.split(&inventory).unwrap();
        std::fs::remove_file(working.join("doc_page_2.pdf")).unwrap();
        std::fs::remove_file(working.join("doc_page_5.pdf")).unwrap();
        std::fs::write(working.join("doc_page_1.pdf"), b"kept as is").unwrap();

        let report = splitter.restore_missing(&inventory).unwrap();

        let restored: Vec<u32> = report.succeeded.iter().map(|a| a.page_number).collect();
        assert_eq!(restored, vec![2, 5]);
        assert_eq!(page_labels(&working.join("doc_page_2.pdf")), vec!["a.pdf#2".to_string()]);
        assert_eq!(page_labels(&working.join("doc_page_5.pdf")), vec!["b.pdf#2".to_string()]);
        assert_eq!(std::fs::read(working.join("doc_page_1.pdf")).unwrap(), b"kept as is");
    }

    #[test]
    fn test_image_source_becomes_page() {
        let dir = TempDir::new().unwrap();
        let scan = dir.path().join("scan.jpg");
        image::RgbImage::from_pixel(20, 20, image::Rgb([9, 9, 9]))
            .save(&scan)
            .unwrap();
        let inventory = PageInventory::enumerate(&[SourceDoc::from_path(scan).unwrap()]).unwrap();
        let working = dir.path().join("work");

        let report = PageSplitter::new(&working, "scan", 150.0).split(&inventory).unwrap();

        assert_eq!(report.succeeded.len(), 1);
        let doc = Document::load(&report.succeeded[0].path).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }
}
