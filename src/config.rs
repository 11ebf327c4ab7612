//! Configuration loaded from `pdf-regroup.toml`
//!
//! Every option is optional; defaults are shown below.
//!
//! ```toml
//! [paths]
//! sources = "incoming"                   # uploaded PDFs and images
//! working = "split_pages"                # single-page artifacts and assembled groups
//! destination = "uploads"                # export target, cleared on every export
//! thumbnails = "split_pages/thumbnails"
//!
//! [naming]
//! # base_name = "invoice"                # default: stem of the first source document
//!
//! [thumbnails]
//! enabled = false
//! program = "pdftoppm"
//! args = ["-png", "-singlefile", "-scale-to", "{size}", "-f", "{page}", "-l", "{page}", "{input}", "{output_stem}"]
//! size = 200                             # longest edge in pixels
//! workers = 4
//!
//! [images]
//! dpi = 150
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Name of the config file picked up from the current directory
pub const DEFAULT_CONFIG_FILE: &str = "pdf-regroup.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub paths: PathsConfig,
    pub naming: NamingConfig,
    pub thumbnails: ThumbnailsConfig,
    pub images: ImagesConfig,
}

/// Locations of the three stores
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    pub sources: PathBuf,
    pub working: PathBuf,
    pub destination: PathBuf,
    pub thumbnails: PathBuf,
}

/// Same directory, after resolving when both exist
fn same_location(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

impl PathsConfig {
    /// The three stores must be distinct: split clears the working area's
    /// PDFs and export clears the destination's.
    pub fn validate(&self) -> Result<()> {
        let stores = [
            ("sources", &self.sources),
            ("working", &self.working),
            ("destination", &self.destination),
        ];
        for (i, (name_a, path_a)) in stores.iter().enumerate() {
            for (name_b, path_b) in &stores[i + 1..] {
                if same_location(path_a, path_b) {
                    return Err(Error::Config(format!(
                        "paths.{} and paths.{} are both {}",
                        name_a,
                        name_b,
                        path_a.display()
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            sources: PathBuf::from("incoming"),
            working: PathBuf::from("split_pages"),
            destination: PathBuf::from("uploads"),
            thumbnails: PathBuf::from("split_pages/thumbnails"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NamingConfig {
    /// Prefix for `{base}_page_{n}.pdf` and `{base}_group_{i}_pages_{a}-{b}.pdf`
    pub base_name: Option<String>,
}

/// External rasterizer used for page previews
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThumbnailsConfig {
    pub enabled: bool,
    pub program: String,
    /// Arguments with `{input}`, `{page}`, `{size}`, `{output}` and `{output_stem}` placeholders
    pub args: Vec<String>,
    pub size: u32,
    /// Upper bound on concurrently running renderer processes
    pub workers: usize,
}

impl Default for ThumbnailsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            program: "pdftoppm".to_string(),
            args: [
                "-png", "-singlefile", "-scale-to", "{size}", "-f", "{page}", "-l", "{page}",
                "{input}", "{output_stem}",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            size: 200,
            workers: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagesConfig {
    /// Resolution assumed when sizing the PDF page for an image upload
    pub dpi: f64,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self { dpi: 150.0 }
    }
}

impl Config {
    /// Parse a TOML document and validate it
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load `path` if given, else `pdf-regroup.toml` when present, else defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::load(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.paths.validate()?;
        if self.thumbnails.workers == 0 {
            return Err(Error::Config("thumbnails.workers must be at least 1".to_string()));
        }
        if self.thumbnails.size == 0 {
            return Err(Error::Config("thumbnails.size must be at least 1".to_string()));
        }
        if !(self.images.dpi > 0.0) {
            return Err(Error::Config("images.dpi must be positive".to_string()));
        }
        if let Some(base) = &self.naming.base_name {
            if base.is_empty() || base.contains(['/', '\\']) {
                return Err(Error::Config(format!("naming.base_name is not a valid file stem: {:?}", base)));
            }
        }
        Ok(())
    }
}
