//! Page inventory: the flat, globally numbered page sequence across all
//! source documents.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use glob::{glob_with, MatchOptions, Pattern};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::pdf::read_document_info;
use crate::report::Failure;

/// Extensions accepted as source documents
const PDF_EXTENSIONS: [&str; 1] = ["pdf"];
const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Pdf,
    Image,
}

/// An uploaded document, PDF or image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDoc {
    pub path: PathBuf,
    pub kind: SourceKind,
}

impl SourceDoc {
    /// Classify a path by extension; `None` for unsupported files
    pub fn from_path(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        let kind = if PDF_EXTENSIONS.contains(&extension.as_str()) {
            SourceKind::Pdf
        } else if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            SourceKind::Image
        } else {
            return None;
        };
        Some(Self { path, kind })
    }

    pub fn filename(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Page count and title
    fn read_info(&self) -> Result<(u32, Option<String>)> {
        match self.kind {
            SourceKind::Pdf => {
                let info = read_document_info(&self.path)?;
                Ok((info.page_count as u32, info.title))
            }
            SourceKind::Image => Ok((1, None)),
        }
    }
}

/// Find the supported documents directly inside `dir`, sorted by filename.
///
/// A missing directory holds no documents.
pub fn discover_sources(dir: &Path) -> Result<Vec<SourceDoc>> {
    if !dir.is_dir() {
        debug!("source directory {} does not exist", dir.display());
        return Ok(Vec::new());
    }

    let dir_str = dir
        .to_str()
        .ok_or_else(|| Error::InvalidGlob(dir.display().to_string()))?;
    let pattern = format!("{}/*", Pattern::escape(dir_str));
    let options = MatchOptions {
        case_sensitive: false,
        ..MatchOptions::new()
    };

    let mut sources = Vec::new();
    for entry in glob_with(&pattern, options).map_err(|e| Error::InvalidGlob(e.to_string()))? {
        match entry {
            Ok(path) if path.is_file() => {
                if let Some(source) = SourceDoc::from_path(path) {
                    sources.push(source);
                }
            }
            Ok(_) => {}
            Err(e) => warn!("Skipping unreadable entry: {}", e),
        }
    }

    sources.sort_by_key(|source| source.filename());
    Ok(sources)
}

/// A source document with its page count, as shown by page listings
#[derive(Debug, Clone, Serialize)]
pub struct SourceSummary {
    pub filename: String,
    pub path: PathBuf,
    pub kind: SourceKind,
    pub page_count: u32,
    /// Title from the PDF's document info, if any
    pub title: Option<String>,
}

/// One page of one source document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageRef {
    /// Global 1-based position in the page sequence
    pub number: u32,
    /// Index into [`PageInventory::sources`]
    pub source: usize,
    /// 1-based page index within the source document
    pub page_index: u32,
    /// Rendered preview, once available
    pub thumbnail: Option<PathBuf>,
}

/// Ordered page sequence over a set of source documents
#[derive(Debug, Clone, Serialize)]
pub struct PageInventory {
    generation: u64,
    sources: Vec<SourceSummary>,
    pages: Vec<PageRef>,
    /// Documents that could not be read and contribute no pages
    skipped: Vec<Failure>,
}

impl PageInventory {
    /// Enumerate every page of `documents`, keeping submission order and
    /// per-document page order. Unreadable documents are skipped and
    /// reported; an empty document set is [`Error::NoDocuments`].
    pub fn enumerate(documents: &[SourceDoc]) -> Result<Self> {
        if documents.is_empty() {
            return Err(Error::NoDocuments);
        }

        let mut sources = Vec::new();
        let mut pages = Vec::new();
        let mut skipped = Vec::new();

        for document in documents {
            let (page_count, title) = match document.read_info() {
                Ok(info) => info,
                Err(e) => {
                    warn!("Skipping {}: {}", document.filename(), e);
                    skipped.push(Failure::new(document.filename(), e));
                    continue;
                }
            };

            let source = sources.len();
            for page_index in 1..=page_count {
                pages.push(PageRef {
                    number: pages.len() as u32 + 1,
                    source,
                    page_index,
                    thumbnail: None,
                });
            }
            debug!("{}: {} pages", document.filename(), page_count);

            sources.push(SourceSummary {
                filename: document.filename(),
                path: document.path.clone(),
                kind: document.kind,
                page_count,
                title,
            });
        }

        info!(
            "Enumerated {} pages across {} documents",
            pages.len(),
            sources.len()
        );

        Ok(Self {
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
            sources,
            pages,
            skipped,
        })
    }

    /// Identifies this enumeration; background results carry it back
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn sources(&self) -> &[SourceSummary] {
        &self.sources
    }

    pub fn pages(&self) -> &[PageRef] {
        &self.pages
    }

    pub fn skipped(&self) -> &[Failure] {
        &self.skipped
    }

    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    /// Page by global 1-based number
    pub fn page(&self, number: u32) -> Option<&PageRef> {
        number
            .checked_sub(1)
            .and_then(|index| self.pages.get(index as usize))
    }

    pub fn source_of(&self, page: &PageRef) -> &SourceSummary {
        &self.sources[page.source]
    }

    /// Record rendered previews. Results from another enumeration are
    /// dropped; returns whether they were applied.
    pub fn attach_thumbnails(&mut self, generation: u64, thumbnails: &[(u32, PathBuf)]) -> bool {
        if generation != self.generation {
            debug!(
                "Discarding {} thumbnails from stale inventory {}",
                thumbnails.len(),
                generation
            );
            return false;
        }
        for (number, path) in thumbnails {
            if let Some(index) = number.checked_sub(1) {
                if let Some(page) = self.pages.get_mut(index as usize) {
                    page.thumbnail = Some(path.clone());
                }
            }
        }
        true
    }
}
