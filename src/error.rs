//! Error types for the pdf-regroup library

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the pdf-regroup library
#[derive(Error, Debug)]
pub enum Error {
    /// PDF processing error
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Configuration could not be loaded or is invalid
    #[error("Config error: {0}")]
    Config(String),

    /// File not found
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Invalid PDF (no pages)
    #[error("PDF has no pages: {}", .0.display())]
    EmptyPdf(PathBuf),

    /// Invalid glob pattern
    #[error("Invalid glob pattern: {0}")]
    InvalidGlob(String),

    /// The source set is empty
    #[error("No source documents")]
    NoDocuments,

    /// A single page could not be copied out of its source document
    #[error("Failed to extract page {page}: {reason}")]
    PageExtraction { page: u32, reason: String },

    /// Page number outside `1..=page_count`
    #[error("Invalid page number {page} (document set has {page_count} pages)")]
    InvalidPageNumber { page: u32, page_count: u32 },

    /// Page range with start after end
    #[error("Invalid page range {start}-{end}")]
    InvalidRange { start: u32, end: u32 },

    /// Page listed in more than one group
    #[error("Page {0} appears in more than one group")]
    DuplicatePage(u32),

    /// Page held by no group of a partition
    #[error("Page {0} is not in any group")]
    UngroupedPage(u32),

    /// Groups do not cover every page
    #[error("Pages not assigned to any group: {missing:?}")]
    IncompletePartition { missing: Vec<u32> },

    /// Single-page artifact already consumed or never created
    #[error("Missing single-page artifact for page {0}")]
    MissingArtifact(u32),

    /// Export could not move a file into the destination
    #[error("Failed to move {file}: {reason}")]
    MoveFailure { file: String, reason: String },

    /// Filename that would escape its store
    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    /// Thumbnail rendering failed for a page
    #[error("Thumbnail for page {page} failed: {reason}")]
    Thumbnail { page: u32, reason: String },

    /// General error
    #[error("{0}")]
    General(String),
}
