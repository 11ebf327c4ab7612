//! Workspace operations over the three stores, and the edit session that
//! owns a grouping model between entering and leaving group mode.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::assemble::{AssemblyKind, AssemblyReport, ExportedDocument, GroupAssembler};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::export::{clear_matching, matching_files, ExportReport, ExportStage, EXPORT_PATTERN};
use crate::grouping::{GroupingModel, PageRange, Partition, ToggleCase};
use crate::inventory::{discover_sources, PageInventory, SourceSummary};
use crate::report::Failure;
use crate::splitter::{PageSplitter, SinglePageArtifact, SplitReport};
use crate::thumbnail::{render_thumbnails, ThumbnailBatch, ThumbnailRenderer};

/// Base name used when no source document exists to take it from
pub const FALLBACK_BASE_NAME: &str = "document";

/// Page counts per source document
#[derive(Debug, Clone, Serialize)]
pub struct PageListing {
    pub sources: Vec<SourceSummary>,
    pub total_pages: u32,
    pub skipped: Vec<Failure>,
}

/// Number of documents in each store
#[derive(Debug, Clone, Serialize)]
pub struct StoreStatus {
    pub sources: usize,
    pub working: usize,
    pub destination: usize,
}

/// The source store, working area and destination named by a [`Config`]
#[derive(Debug, Clone)]
pub struct Workspace {
    config: Config,
}

impl Workspace {
    /// Fails when the config is invalid, including stores that share a
    /// directory.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn working_dir(&self) -> &Path {
        &self.config.paths.working
    }

    /// Enumerate the current source documents
    pub fn inventory(&self) -> Result<PageInventory> {
        let sources = discover_sources(&self.config.paths.sources)?;
        PageInventory::enumerate(&sources)
    }

    /// Inventory, or `None` when there is nothing to work on
    fn inventory_if_any(&self) -> Result<Option<PageInventory>> {
        match self.inventory() {
            Ok(inventory) => Ok(Some(inventory)),
            Err(Error::NoDocuments) => {
                info!(
                    "No source documents in {}",
                    self.config.paths.sources.display()
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Configured base name, else the first source's stem
    pub fn base_name(&self, inventory: Option<&PageInventory>) -> String {
        if let Some(base) = &self.config.naming.base_name {
            return base.clone();
        }
        inventory
            .and_then(|inventory| inventory.sources().first())
            .and_then(|source| {
                Path::new(&source.filename)
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| FALLBACK_BASE_NAME.to_string())
    }

    /// Page count of every source document
    pub fn list_pages(&self) -> Result<PageListing> {
        Ok(match self.inventory_if_any()? {
            Some(inventory) => PageListing {
                total_pages: inventory.page_count(),
                sources: inventory.sources().to_vec(),
                skipped: inventory.skipped().to_vec(),
            },
            None => PageListing {
                sources: Vec::new(),
                total_pages: 0,
                skipped: Vec::new(),
            },
        })
    }

    pub fn store_status(&self) -> Result<StoreStatus> {
        let paths = &self.config.paths;
        Ok(StoreStatus {
            sources: discover_sources(&paths.sources)?.len(),
            working: matching_files(&paths.working, EXPORT_PATTERN)?.len(),
            destination: matching_files(&paths.destination, EXPORT_PATTERN)?.len(),
        })
    }

    /// Split every source page into `{base}_page_{n}.pdf`, replacing
    /// whatever the working area held before.
    pub fn split_all_pages(&self) -> Result<SplitReport> {
        let Some(inventory) = self.inventory_if_any()? else {
            return Ok(SplitReport::default());
        };
        clear_matching(self.working_dir(), EXPORT_PATTERN)?;

        let base_name = self.base_name(Some(&inventory));
        PageSplitter::new(self.working_dir(), &base_name, self.config.images.dpi).split(&inventory)
    }

    /// Build `{base}_group_{i}_pages_{start}-{end}.pdf` for each range
    pub fn create_manual_groups(&self, ranges: &[PageRange]) -> Result<AssemblyReport> {
        let inventory = self.inventory()?;
        for range in ranges {
            range.validate(inventory.page_count())?;
        }
        clear_matching(self.working_dir(), EXPORT_PATTERN)?;

        let base_name = self.base_name(Some(&inventory));
        GroupAssembler::new(self.working_dir(), &base_name).assemble_ranges(
            &inventory,
            ranges,
            self.config.images.dpi,
        )
    }

    /// Assemble `groups` from the split pages and export them. The groups
    /// must cover every page exactly once.
    ///
    /// Split pages an earlier export consumed are rebuilt from the sources
    /// first, so exporting again replaces the previous export.
    pub fn export_groups(&self, groups: &[Vec<u32>]) -> Result<ExportReport> {
        let inventory = self.inventory()?;
        let partition = Partition::from_groups(inventory.page_count(), groups)?;
        self.export_partition(&inventory, &partition)
    }

    fn export_partition(
        &self,
        inventory: &PageInventory,
        partition: &Partition,
    ) -> Result<ExportReport> {
        let base_name = self.base_name(Some(inventory));
        PageSplitter::new(self.working_dir(), &base_name, self.config.images.dpi)
            .restore_missing(inventory)?;
        let artifacts = SinglePageArtifact::locate(self.working_dir(), &base_name, inventory);
        let assembly = GroupAssembler::new(self.working_dir(), &base_name).assemble(partition, &artifacts)?;
        self.export_assembled(assembly)
    }

    /// Export the single-page artifacts as they are
    pub fn export_split_pages(&self) -> Result<ExportReport> {
        let mut assembly = AssemblyReport::default();
        if let Some(inventory) = self.inventory_if_any()? {
            let base_name = self.base_name(Some(&inventory));
            for artifact in SinglePageArtifact::locate(self.working_dir(), &base_name, &inventory) {
                assembly.push_ok(ExportedDocument {
                    filename: artifact.filename(),
                    pages: vec![artifact.page_number],
                    path: artifact.path,
                    kind: AssemblyKind::Passthrough,
                });
            }
        }
        self.export_assembled(assembly)
    }

    fn export_assembled(&self, assembly: AssemblyReport) -> Result<ExportReport> {
        if assembly.succeeded.is_empty() {
            return Err(Error::General(format!(
                "Nothing to export ({} groups failed); {} left untouched",
                assembly.failed.len(),
                self.config.paths.destination.display()
            )));
        }

        let mut report = ExportStage::new(&self.config.paths.destination).export(&assembly.succeeded)?;
        let mut failed = assembly.failed;
        failed.append(&mut report.files.failed);
        report.files.failed = failed;
        Ok(report)
    }

    /// Bytes of a split page or assembled group in the working area
    pub fn fetch_single_page_document(&self, filename: &str) -> Result<Vec<u8>> {
        read_store_file(self.working_dir(), filename)
    }

    /// Bytes of an uploaded source document
    pub fn fetch_source_document(&self, filename: &str) -> Result<Vec<u8>> {
        read_store_file(&self.config.paths.sources, filename)
    }

    /// Render previews for `inventory` with `renderer`
    pub fn render_thumbnails(
        &self,
        inventory: &PageInventory,
        renderer: &dyn ThumbnailRenderer,
    ) -> Result<ThumbnailBatch> {
        let thumbnails = &self.config.thumbnails;
        render_thumbnails(
            inventory,
            renderer,
            &self.config.paths.thumbnails,
            thumbnails.size,
            thumbnails.workers,
        )
    }

    /// Enter group mode over the current sources
    pub fn begin_editing(&self) -> Result<EditSession> {
        let inventory = self.inventory()?;
        Ok(EditSession::new(inventory))
    }
}

/// Read `filename` from `dir`, refusing names that leave the directory
fn read_store_file(dir: &Path, filename: &str) -> Result<Vec<u8>> {
    let is_plain_name = !filename.is_empty()
        && filename != "."
        && filename != ".."
        && !filename.contains(['/', '\\'])
        && !filename.contains("..");
    if !is_plain_name {
        return Err(Error::InvalidFilename(filename.to_string()));
    }

    let path: PathBuf = dir.join(filename);
    if !path.is_file() {
        return Err(Error::FileNotFound(path));
    }
    Ok(fs::read(path)?)
}

/// Group mode: the page sequence and its grouping, owned by one editor.
///
/// Committing exports the grouping; dropping the session discards it.
#[derive(Debug)]
pub struct EditSession {
    inventory: PageInventory,
    model: GroupingModel,
}

impl EditSession {
    pub fn new(inventory: PageInventory) -> Self {
        let model = GroupingModel::new(inventory.page_count());
        Self { inventory, model }
    }

    pub fn inventory(&self) -> &PageInventory {
        &self.inventory
    }

    pub fn inventory_mut(&mut self) -> &mut PageInventory {
        &mut self.inventory
    }

    pub fn partition(&self) -> &Partition {
        self.model.partition()
    }

    pub fn toggle(&mut self, page: u32) -> Result<ToggleCase> {
        self.model.toggle_adjacent_grouping(page)
    }

    pub fn set_split_points(&mut self, points: &[u32]) -> Result<()> {
        self.model.set_explicit_split_points(points.iter().copied())
    }

    pub fn reset(&mut self) {
        self.model.reset();
    }

    /// Export the current grouping and end the session
    pub fn commit(self, workspace: &Workspace) -> Result<ExportReport> {
        info!("Committing grouping {}", self.model.partition());
        workspace.export_partition(&self.inventory, self.model.partition())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::write_labeled_pdf;
    use tempfile::TempDir;

    fn workspace(dir: &Path) -> Workspace {
        let mut config = Config::default();
        config.paths.sources = dir.join("incoming");
        config.paths.working = dir.join("split_pages");
        config.paths.destination = dir.join("uploads");
        config.paths.thumbnails = dir.join("split_pages/thumbnails");
        Workspace::new(config).unwrap()
    }

    #[test]
    fn test_empty_source_store() {
        let dir = TempDir::new().unwrap();
        let ws = workspace(dir.path());

        let listing = ws.list_pages().unwrap();
        assert_eq!(listing.total_pages, 0);
        assert!(listing.sources.is_empty());
        assert!(ws.split_all_pages().unwrap().succeeded.is_empty());
        assert!(matches!(ws.begin_editing(), Err(Error::NoDocuments)));
    }

    #[test]
    fn test_base_name_sources() {
        let dir = TempDir::new().unwrap();
        let mut ws = workspace(dir.path());
        assert_eq!(ws.base_name(None), FALLBACK_BASE_NAME);

        let incoming = dir.path().join("incoming");
        fs::create_dir_all(&incoming).unwrap();
        write_labeled_pdf(&incoming, "acme invoice.pdf", 1);
        let inventory = ws.inventory().unwrap();
        assert_eq!(ws.base_name(Some(&inventory)), "acme invoice");

        ws.config.naming.base_name = Some("batch".to_string());
        assert_eq!(ws.base_name(Some(&inventory)), "batch");
    }

    #[test]
    fn test_fetch_rejects_path_traversal() {
        let dir = TempDir::new().unwrap();
        let ws = workspace(dir.path());
        for name in ["../secret.pdf", "a/b.pdf", "..", "", "x\\y.pdf"] {
            assert!(matches!(
                ws.fetch_single_page_document(name),
                Err(Error::InvalidFilename(_))
            ));
        }
        assert!(matches!(
            ws.fetch_single_page_document("absent.pdf"),
            Err(Error::FileNotFound(_))
        ));
    }

    #[test]
    fn test_export_with_nothing_assembled_keeps_destination() {
        let dir = TempDir::new().unwrap();
        let ws = workspace(dir.path());
        let uploads = dir.path().join("uploads");
        fs::create_dir_all(&uploads).unwrap();
        fs::write(uploads.join("previous.pdf"), b"%PDF").unwrap();

        let mut assembly = AssemblyReport::default();
        assembly.push_err(Failure::new("group 1 [1-2]", Error::MissingArtifact(1)));
        assert!(ws.export_assembled(assembly).is_err());
        assert!(uploads.join("previous.pdf").exists());
    }

    #[test]
    fn test_export_without_split_builds_pages() {
        let dir = TempDir::new().unwrap();
        let ws = workspace(dir.path());
        let incoming = dir.path().join("incoming");
        fs::create_dir_all(&incoming).unwrap();
        write_labeled_pdf(&incoming, "a.pdf", 2);

        let report = ws.export_groups(&[vec![1, 2]]).unwrap();
        assert_eq!(report.exported(), ["Group_1_Pages_1-2.pdf".to_string()]);
        assert_eq!(ws.store_status().unwrap().working, 0);
    }

    #[test]
    fn test_shared_store_directory_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths.sources = dir.path().join("incoming");
        config.paths.working = dir.path().join("out");
        config.paths.destination = dir.path().join("out");

        assert!(matches!(Workspace::new(config), Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_partition_rejected_before_any_write() {
        let dir = TempDir::new().unwrap();
        let ws = workspace(dir.path());
        let incoming = dir.path().join("incoming");
        fs::create_dir_all(&incoming).unwrap();
        write_labeled_pdf(&incoming, "a.pdf", 3);
        ws.split_all_pages().unwrap();

        assert!(matches!(
            ws.export_groups(&[vec![1, 2]]),
            Err(Error::IncompletePartition { .. })
        ));
        assert!(matches!(
            ws.export_groups(&[vec![1, 2], vec![2, 3]]),
            Err(Error::DuplicatePage(2))
        ));
        assert_eq!(ws.store_status().unwrap().working, 3);
        assert_eq!(ws.store_status().unwrap().destination, 0);
    }
}
