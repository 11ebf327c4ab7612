//! PDF Regroup Library
//!
//! Splits uploaded documents into single pages and regroups them into new
//! documents. This library provides functionality to:
//! - Enumerate the pages of a set of PDF and image uploads
//! - Split every page into its own PDF
//! - Edit a grouping of the pages by toggling page boundaries
//! - Assemble one document per group and export them, replacing the
//!   destination's previous contents
//!
//! # Example
//!
//! ```no_run
//! use pdf_regroup::{Config, Workspace};
//!
//! let workspace = Workspace::new(Config::default())?;
//! workspace.split_all_pages()?;
//!
//! let mut session = workspace.begin_editing()?;
//! session.toggle(2)?;
//! session.toggle(3)?;
//! let report = session.commit(&workspace)?;
//! println!("exported {:?}", report.exported());
//! # Ok::<(), pdf_regroup::Error>(())
//! ```

pub mod assemble;
pub mod config;
pub mod edit;
pub mod error;
pub mod export;
pub mod grouping;
pub mod inventory;
pub mod pdf;
pub mod report;
pub mod session;
pub mod splitter;
pub mod thumbnail;

#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used items
pub use config::Config;
pub use error::{Error, Result};
pub use grouping::{GroupingModel, PageRange, Partition, ToggleCase};
pub use inventory::PageInventory;
pub use session::{EditSession, Workspace};
