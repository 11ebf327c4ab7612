//! Fixture stores for integration tests. Every generated page carries a
//! `"{file}#{page}"` label so tests can tell which page ended up where.

use std::fs;
use std::path::{Path, PathBuf};

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use pdf_regroup::{Config, Workspace};
use tempfile::TempDir;

pub struct Stores {
    pub dir: TempDir,
    pub workspace: Workspace,
}

impl Stores {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let mut config = Config::default();
        config.paths.sources = dir.path().join("incoming");
        config.paths.working = dir.path().join("split_pages");
        config.paths.destination = dir.path().join("uploads");
        config.paths.thumbnails = dir.path().join("split_pages/thumbnails");
        fs::create_dir_all(&config.paths.sources).unwrap();

        Self {
            dir,
            workspace: Workspace::new(config).expect("Failed to open workspace"),
        }
    }

    pub fn sources(&self) -> PathBuf {
        self.dir.path().join("incoming")
    }

    pub fn working(&self) -> PathBuf {
        self.dir.path().join("split_pages")
    }

    pub fn destination(&self) -> PathBuf {
        self.dir.path().join("uploads")
    }

    /// Add an `n`-page PDF to the source store
    pub fn add_pdf(&self, name: &str, pages: u32) -> PathBuf {
        let path = self.sources().join(name);
        labeled_document(name, pages).save(&path).unwrap();
        path
    }
}

pub fn labeled_document(name: &str, pages: u32) -> Document {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut kids = Vec::new();
    for i in 1..=pages {
        let label = format!("{}#{}", name, i);
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(label.clone())]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
            "RegroupLabel" => Object::string_literal(label),
        });
        kids.push(Object::Reference(page_id));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Count" => pages as i64,
            "Kids" => kids,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc
}

/// Page labels of a PDF file, in page order
pub fn page_labels(path: &Path) -> Vec<String> {
    let doc = Document::load(path).unwrap();
    doc.get_pages()
        .values()
        .map(|&page_id| {
            let page = doc.get_dictionary(page_id).unwrap();
            let bytes = page.get(b"RegroupLabel").unwrap().as_str().unwrap();
            String::from_utf8(bytes.to_vec()).unwrap()
        })
        .collect()
}

/// Sorted file names in `dir`
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.path().is_file())
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
