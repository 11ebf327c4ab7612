//! Group assembly: one output document per group of a partition

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use lopdf::Document;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::grouping::{Group, PageRange, Partition};
use crate::inventory::PageInventory;
use crate::pdf::merge_documents;
use crate::report::{BatchReport, Failure};
use crate::splitter::{page_filename, PageLoader, SinglePageArtifact};

/// `Group_{i}_Pages_{first}-{last}.pdf`
///
/// Only the lowest and highest member appear, so a non-contiguous group
/// such as `{1, 5}` is named like the range `1-5`.
pub fn group_filename(index: usize, first: u32, last: u32) -> String {
    format!("Group_{}_Pages_{}-{}.pdf", index, first, last)
}

/// `{base}_group_{i}_pages_{start}-{end}.pdf`
pub fn manual_group_filename(base_name: &str, index: usize, range: PageRange) -> String {
    format!(
        "{}_group_{}_pages_{}-{}.pdf",
        base_name, index, range.start, range.end
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssemblyKind {
    /// Single-page group: the page's artifact, used as is
    Passthrough,
    /// Pages concatenated into a new document
    Merged,
}

/// A document ready for export
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportedDocument {
    pub filename: String,
    pub path: PathBuf,
    /// Constituent page numbers, ascending
    pub pages: Vec<u32>,
    pub kind: AssemblyKind,
}

pub type AssemblyReport = BatchReport<ExportedDocument>;

/// Builds group documents in the working area
pub struct GroupAssembler<'a> {
    working_dir: &'a Path,
    base_name: &'a str,
}

impl<'a> GroupAssembler<'a> {
    pub fn new(working_dir: &'a Path, base_name: &'a str) -> Self {
        Self {
            working_dir,
            base_name,
        }
    }

    /// Assemble every group of `partition` from the single-page artifacts.
    ///
    /// Pages are always emitted in ascending order, whatever order the group
    /// lists them in. A single-page group passes its artifact through under
    /// `{base}_page_{n}.pdf`. A larger group is merged into a new document
    /// and its artifacts are deleted. A group whose artifacts are not all
    /// present fails on its own; the other groups are still assembled.
    pub fn assemble(
        &self,
        partition: &Partition,
        artifacts: &[SinglePageArtifact],
    ) -> Result<AssemblyReport> {
        fs::create_dir_all(self.working_dir)?;

        let by_page: HashMap<u32, &SinglePageArtifact> = artifacts
            .iter()
            .map(|artifact| (artifact.page_number, artifact))
            .collect();
        let mut report = AssemblyReport::default();

        for (position, group) in partition.groups().iter().enumerate() {
            let index = position + 1;
            match self.assemble_group(index, group, &by_page) {
                Ok(document) => {
                    debug!("group {} -> {}", index, document.filename);
                    report.push_ok(document);
                }
                Err(e) => report.push_err(Failure::new(format!("group {} {}", index, group), e)),
            }
        }

        info!(
            "Assembled {} of {} groups",
            report.succeeded.len(),
            partition.groups().len()
        );
        Ok(report)
    }

    fn assemble_group(
        &self,
        index: usize,
        group: &Group,
        by_page: &HashMap<u32, &SinglePageArtifact>,
    ) -> Result<ExportedDocument> {
        let pages = group.sorted_members();

        // Check every constituent before anything is consumed
        let mut constituents = Vec::with_capacity(pages.len());
        for &page in &pages {
            match by_page.get(&page) {
                Some(artifact) if artifact.path.is_file() => constituents.push(*artifact),
                _ => return Err(Error::MissingArtifact(page)),
            }
        }

        if let [artifact] = constituents.as_slice() {
            let filename = page_filename(self.base_name, artifact.page_number);
            let path = self.working_dir.join(&filename);
            if artifact.path != path {
                fs::rename(&artifact.path, &path)?;
            }
            return Ok(ExportedDocument {
                filename,
                path,
                pages,
                kind: AssemblyKind::Passthrough,
            });
        }

        let mut documents = Vec::with_capacity(constituents.len());
        for artifact in &constituents {
            documents.push(Document::load(&artifact.path)?);
        }
        let mut merged = merge_documents(documents)?;

        let (first, last) = (pages[0], pages[pages.len() - 1]);
        let filename = group_filename(index, first, last);
        let path = self.working_dir.join(&filename);
        merged.save(&path)?;

        // The merged document now holds these pages
        for artifact in &constituents {
            if let Err(e) = fs::remove_file(&artifact.path) {
                warn!("Could not remove {}: {}", artifact.path.display(), e);
            }
        }

        Ok(ExportedDocument {
            filename,
            path,
            pages,
            kind: AssemblyKind::Merged,
        })
    }

    /// Build one document per range straight from the source documents.
    /// Nothing is consumed, so the same ranges can be built again.
    pub fn assemble_ranges(
        &self,
        inventory: &PageInventory,
        ranges: &[PageRange],
        image_dpi: f64,
    ) -> Result<AssemblyReport> {
        for range in ranges {
            range.validate(inventory.page_count())?;
        }
        fs::create_dir_all(self.working_dir)?;

        let mut loader = PageLoader::new(inventory, image_dpi);
        let mut report = AssemblyReport::default();

        for (position, &range) in ranges.iter().enumerate() {
            let index = position + 1;
            let filename = manual_group_filename(self.base_name, index, range);
            let path = self.working_dir.join(&filename);

            let built = range
                .pages()
                .map(|page| loader.single_page_by_number(page))
                .collect::<Result<Vec<Document>>>()
                .and_then(merge_documents)
                .and_then(|mut merged| merged.save(&path).map(|_| ()).map_err(Error::from));

            match built {
                Ok(()) => report.push_ok(ExportedDocument {
                    filename,
                    path,
                    pages: range.pages().collect(),
                    kind: AssemblyKind::Merged,
                }),
                Err(e) => report.push_err(Failure::new(
                    format!("group {} pages {}-{}", index, range.start, range.end),
                    e,
                )),
            }
        }

        info!("Created {} of {} manual groups", report.succeeded.len(), ranges.len());
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::SourceDoc;
    use crate::splitter::PageSplitter;
    use crate::test_helpers::{page_labels, write_labeled_pdf};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        working: PathBuf,
        inventory: PageInventory,
        artifacts: Vec<SinglePageArtifact>,
    }

    fn split_fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let docs = vec![
            SourceDoc::from_path(write_labeled_pdf(dir.path(), "a.pdf", 3)).unwrap(),
            SourceDoc::from_path(write_labeled_pdf(dir.path(), "b.pdf", 2)).unwrap(),
        ];
        let inventory = PageInventory::enumerate(&docs).unwrap();
        let working = dir.path().join("work");
        let artifacts = PageSplitter::new(&working, "doc", 150.0)
            .split(&inventory)
            .unwrap()
            .succeeded;
        Fixture {
            _dir: dir,
            working,
            inventory,
            artifacts,
        }
    }

    #[test]
    fn test_group_filenames() {
        assert_eq!(group_filename(2, 2, 4), "Group_2_Pages_2-4.pdf");
        assert_eq!(
            manual_group_filename("inv", 1, PageRange::new(3, 5)),
            "inv_group_1_pages_3-5.pdf"
        );
    }

    #[test]
    fn test_assemble_one_output_per_group() {
        let fixture = split_fixture();
        let partition = Partition::from_groups(5, &[vec![1], vec![4, 2, 3], vec![5]]).unwrap();

        let report = GroupAssembler::new(&fixture.working, "doc")
            .assemble(&partition, &fixture.artifacts)
            .unwrap();

        assert!(report.is_complete());
        let names: Vec<&str> = report.succeeded.iter().map(|d| d.filename.as_str()).collect();
        assert_eq!(names, vec!["doc_page_1.pdf", "Group_2_Pages_2-4.pdf", "doc_page_5.pdf"]);

        let merged = &report.succeeded[1];
        assert_eq!(merged.kind, AssemblyKind::Merged);
        assert_eq!(merged.pages, vec![2, 3, 4]);
        assert_eq!(page_labels(&merged.path), vec!["a.pdf#2", "a.pdf#3", "b.pdf#1"]);

        // constituents are folded into the merged document
        for page in 2..=4 {
            assert!(!fixture.working.join(page_filename("doc", page)).exists());
        }
        assert_eq!(report.succeeded[0].kind, AssemblyKind::Passthrough);
        assert!(report.succeeded[0].path.exists());
    }

    #[test]
    fn test_assembled_pages_are_never_duplicated() {
        let fixture = split_fixture();
        let partition = Partition::from_groups(5, &[vec![5, 1], vec![2, 4], vec![3]]).unwrap();

        let report = GroupAssembler::new(&fixture.working, "doc")
            .assemble(&partition, &fixture.artifacts)
            .unwrap();

        let mut all_labels: Vec<String> = report
            .succeeded
            .iter()
            .flat_map(|doc| page_labels(&doc.path))
            .collect();
        assert_eq!(all_labels.len(), 5);
        all_labels.sort();
        all_labels.dedup();
        assert_eq!(all_labels.len(), 5);

        // range naming shows only the outer members
        assert_eq!(report.succeeded[0].filename, "Group_1_Pages_1-5.pdf");
        assert_eq!(page_labels(&report.succeeded[0].path), vec!["a.pdf#1", "b.pdf#2"]);
    }

    #[test]
    fn test_missing_artifact_fails_only_its_group() {
        let fixture = split_fixture();
        fs::remove_file(fixture.working.join("doc_page_3.pdf")).unwrap();
        let partition = Partition::from_groups(5, &[vec![1, 2], vec![3, 4], vec![5]]).unwrap();

        let report = GroupAssembler::new(&fixture.working, "doc")
            .assemble(&partition, &fixture.artifacts)
            .unwrap();

        let names: Vec<&str> = report.succeeded.iter().map(|d| d.filename.as_str()).collect();
        assert_eq!(names, vec!["Group_1_Pages_1-2.pdf", "doc_page_5.pdf"]);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].reason.contains("page 3"));
        // page 4 is not consumed by the failed group
        assert!(fixture.working.join("doc_page_4.pdf").exists());
    }

    #[test]
    fn test_second_assembly_reports_consumed_artifacts() {
        let fixture = split_fixture();
        let assembler = GroupAssembler::new(&fixture.working, "doc");
        let partition = Partition::from_groups(5, &[vec![1, 2, 3, 4, 5]]).unwrap();

        assert!(assembler.assemble(&partition, &fixture.artifacts).unwrap().is_complete());
        let again = assembler.assemble(&partition, &fixture.artifacts).unwrap();
        assert!(again.succeeded.is_empty());
        assert_eq!(again.failed.len(), 1);
    }

    #[test]
    fn test_assemble_ranges_from_sources() {
        let fixture = split_fixture();
        let out = fixture.working.join("manual");
        let ranges = [PageRange::new(1, 2), PageRange::new(3, 5)];

        let report = GroupAssembler::new(&out, "doc")
            .assemble_ranges(&fixture.inventory, &ranges, 150.0)
            .unwrap();

        assert!(report.is_complete());
        let names: Vec<&str> = report.succeeded.iter().map(|d| d.filename.as_str()).collect();
        assert_eq!(names, vec!["doc_group_1_pages_1-2.pdf", "doc_group_2_pages_3-5.pdf"]);
        assert_eq!(page_labels(&report.succeeded[0].path), vec!["a.pdf#1", "a.pdf#2"]);
        assert_eq!(
            page_labels(&report.succeeded[1].path),
            vec!["a.pdf#3", "b.pdf#1", "b.pdf#2"]
        );
    }

    #[test]
    fn test_assemble_ranges_rejects_bad_range() {
        let fixture = split_fixture();
        let out = fixture.working.join("manual");
        let assembler = GroupAssembler::new(&out, "doc");

        let result = assembler.assemble_ranges(&fixture.inventory, &[PageRange::new(2, 9)], 150.0);
        assert!(matches!(result, Err(Error::InvalidPageNumber { page: 9, .. })));
        assert!(!out.exists());
    }
}
