//! Page previews
//!
//! Rendering is independent per page: a failure is recorded for that page
//! and every other page still gets its preview. PDF pages go through a
//! [`ThumbnailRenderer`] (by default an external rasterizer such as
//! `pdftoppm`); image uploads are downscaled directly.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::ThumbnailsConfig;
use crate::error::{Error, Result};
use crate::inventory::{PageInventory, PageRef, SourceKind};
use crate::report::Failure;

/// Renders one page of a PDF file to an image file
pub trait ThumbnailRenderer: Sync {
    fn render(&self, input: &Path, page_index: u32, output: &Path) -> Result<()>;
}

/// Runs an external program once per page
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    program: String,
    args: Vec<String>,
    size: u32,
}

impl CommandRenderer {
    pub fn new(program: impl Into<String>, args: Vec<String>, size: u32) -> Self {
        Self {
            program: program.into(),
            args,
            size,
        }
    }

    pub fn from_config(config: &ThumbnailsConfig) -> Self {
        Self::new(config.program.clone(), config.args.clone(), config.size)
    }

    fn expand(&self, input: &Path, page_index: u32, output: &Path) -> Vec<String> {
        let output_stem = output.with_extension("");
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{input}", &input.to_string_lossy())
                    .replace("{page}", &page_index.to_string())
                    .replace("{size}", &self.size.to_string())
                    .replace("{output_stem}", &output_stem.to_string_lossy())
                    .replace("{output}", &output.to_string_lossy())
            })
            .collect()
    }
}

impl ThumbnailRenderer for CommandRenderer {
    fn render(&self, input: &Path, page_index: u32, output: &Path) -> Result<()> {
        let args = self.expand(input, page_index, output);
        debug!("{} {}", self.program, args.join(" "));

        let result = Command::new(&self.program).args(&args).output()?;
        if !result.status.success() {
            return Err(Error::General(format!(
                "{} exited with {}: {}",
                self.program,
                result.status,
                String::from_utf8_lossy(&result.stderr).trim()
            )));
        }
        if !output.exists() {
            return Err(Error::General(format!(
                "{} produced no file at {}",
                self.program,
                output.display()
            )));
        }
        Ok(())
    }
}

/// Previews rendered for one inventory generation
#[derive(Debug, Clone, Serialize)]
pub struct ThumbnailBatch {
    pub generation: u64,
    pub rendered: Vec<(u32, PathBuf)>,
    pub failed: Vec<Failure>,
}

/// File a page's preview is written to
pub fn thumbnail_path(dir: &Path, page_number: u32) -> PathBuf {
    dir.join(format!("thumb_{}.png", page_number))
}

fn downscale_image(input: &Path, size: u32, output: &Path) -> Result<()> {
    image::open(input)?.thumbnail(size, size).save(output)?;
    Ok(())
}

fn render_page(
    inventory: &PageInventory,
    page: &PageRef,
    renderer: &dyn ThumbnailRenderer,
    size: u32,
    output: &Path,
) -> Result<()> {
    let source = inventory.source_of(page);
    match source.kind {
        SourceKind::Pdf => renderer.render(&source.path, page.page_index, output),
        SourceKind::Image => downscale_image(&source.path, size, output),
    }
}

/// Render previews for every page of `inventory` into `out_dir`, running
/// at most `workers` pages at a time.
///
/// The inventory is only read; apply the batch with
/// [`PageInventory::attach_thumbnails`].
pub fn render_thumbnails(
    inventory: &PageInventory,
    renderer: &dyn ThumbnailRenderer,
    out_dir: &Path,
    size: u32,
    workers: usize,
) -> Result<ThumbnailBatch> {
    fs::create_dir_all(out_dir)?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
        .map_err(|e| Error::General(format!("Failed to start thumbnail workers: {}", e)))?;

    let outcomes: Vec<(u32, PathBuf, Result<()>)> = pool.install(|| {
        inventory
            .pages()
            .par_iter()
            .map(|page| {
                let output = thumbnail_path(out_dir, page.number);
                let outcome = render_page(inventory, page, renderer, size, &output);
                (page.number, output, outcome)
            })
            .collect()
    });

    let mut batch = ThumbnailBatch {
        generation: inventory.generation(),
        rendered: Vec::new(),
        failed: Vec::new(),
    };
    for (number, output, outcome) in outcomes {
        match outcome {
            Ok(()) => batch.rendered.push((number, output)),
            Err(e) => {
                let error = Error::Thumbnail {
                    page: number,
                    reason: e.to_string(),
                };
                tracing::warn!("{}", error);
                batch.failed.push(Failure::new(format!("page {}", number), error));
            }
        }
    }

    info!(
        "Rendered {} of {} thumbnails",
        batch.rendered.len(),
        inventory.page_count()
    );
    Ok(batch)
}
