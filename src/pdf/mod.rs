//! PDF manipulation module

pub mod extract;
pub mod image;
pub mod merge;
pub mod metadata;

// Re-export commonly used items
pub use extract::{extract_page, materialize_inherited_attributes};
pub use image::image_page_document;
pub use merge::{merge_documents, merge_pdfs, MergeOptions};
pub use metadata::{count_pages, read_document_info, DocumentInfo};
