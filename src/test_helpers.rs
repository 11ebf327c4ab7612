//! Shared test utilities: generated PDFs whose pages carry a label
//! (`"{file}#{page}"`) so tests can check which pages ended up where.

use std::path::{Path, PathBuf};

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

/// Dictionary key holding the page label
pub const LABEL_KEY: &[u8] = b"RegroupLabel";

/// Build an `n`-page document. Resources and MediaBox live on the Pages
/// node so extraction has to carry inherited attributes down to the page.
pub fn labeled_document(name: &str, pages: u32) -> Document {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids = Vec::new();
    for i in 1..=pages {
        let label = format!("{}#{}", name, i);
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![100.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(label.clone())]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
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
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc
}

/// Write a labeled document into `dir` and return its path
pub fn write_labeled_pdf(dir: &Path, name: &str, pages: u32) -> PathBuf {
    let path = dir.join(name);
    let mut doc = labeled_document(name, pages);
    doc.save(&path).unwrap();
    path
}

/// Labels of every page of a PDF file, in page order
pub fn page_labels(path: &Path) -> Vec<String> {
    let doc = Document::load(path).unwrap();
    labels_of(&doc)
}

pub fn labels_of(doc: &Document) -> Vec<String> {
    doc.get_pages()
        .values()
        .map(|&page_id| {
            let page = doc.get_dictionary(page_id).unwrap();
            let bytes = page.get(LABEL_KEY).unwrap().as_str().unwrap();
            String::from_utf8(bytes.to_vec()).unwrap()
        })
        .collect()
}
