//! Single-page extraction using lopdf
//!
//! Pages are copied structurally: the page and every object it references
//! are copied into a fresh document under their original ids. Content
//! streams, fonts and XObjects are never re-encoded, and objects that only
//! other pages use are never touched.

use std::collections::BTreeSet;

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};

use crate::error::{Error, Result};

/// Page attributes a page may inherit from its ancestors in the page tree
const INHERITABLE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Guard against cyclic Parent chains in damaged files
const MAX_TREE_DEPTH: usize = 64;

/// Attributes `page_id` inherits and does not set itself
fn inherited_attributes(doc: &Document, page_id: ObjectId) -> Result<Vec<(Vec<u8>, Object)>> {
    let (mut missing, mut parent) = {
        let page = doc.get_dictionary(page_id)?;
        let missing: Vec<&[u8]> = INHERITABLE_KEYS
            .iter()
            .copied()
            .filter(|key| !page.has(key))
            .collect();
        let parent = page.get(b"Parent").and_then(Object::as_reference).ok();
        (missing, parent)
    };

    let mut inherited = Vec::new();
    let mut depth = 0;
    while let Some(parent_id) = parent {
        if missing.is_empty() || depth >= MAX_TREE_DEPTH {
            break;
        }
        let node = doc.get_dictionary(parent_id)?;
        missing.retain(|key| match node.get(key) {
            Ok(value) => {
                inherited.push((key.to_vec(), value.clone()));
                false
            }
            Err(_) => true,
        });
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
        depth += 1;
    }
    Ok(inherited)
}

/// Copy inherited page attributes onto the page itself.
///
/// Needed before a page is re-parented (merge) or its tree is rebuilt,
/// otherwise it loses the Resources and MediaBox it inherited.
pub fn materialize_inherited_attributes(doc: &mut Document, page_id: ObjectId) -> Result<()> {
    let inherited = inherited_attributes(doc, page_id)?;
    if !inherited.is_empty() {
        let page = doc.get_dictionary_mut(page_id)?;
        for (key, value) in inherited {
            page.set(key, value);
        }
    }
    Ok(())
}

/// Push every reference held by `object`. `Parent` links point back up
/// the page or annotation tree and are not followed.
fn collect_references(object: &Object, out: &mut Vec<ObjectId>) {
    match object {
        Object::Reference(id) => out.push(*id),
        Object::Array(items) => items.iter().for_each(|item| collect_references(item, out)),
        Object::Dictionary(dict) => collect_dictionary_references(dict, out),
        Object::Stream(stream) => collect_dictionary_references(&stream.dict, out),
        _ => {}
    }
}

fn collect_dictionary_references(dict: &Dictionary, out: &mut Vec<ObjectId>) {
    for (key, value) in dict.iter() {
        if key.as_slice() != b"Parent" {
            collect_references(value, out);
        }
    }
}

/// Build a standalone document holding only page `page_number` (1-based)
/// of `source`.
///
/// Only the objects reachable from that page are copied, so splitting a
/// whole document costs about as much as the document itself.
pub fn extract_page(source: &Document, page_number: u32) -> Result<Document> {
    let pages = source.get_pages();
    let page_id = *pages.get(&page_number).ok_or(Error::InvalidPageNumber {
        page: page_number,
        page_count: pages.len() as u32,
    })?;

    let mut page = source.get_dictionary(page_id)?.clone();
    for (key, value) in inherited_attributes(source, page_id)? {
        page.set(key, value);
    }
    page.remove(b"Parent");

    let mut doc = Document::with_version(source.version.clone());
    doc.max_id = source.max_id;

    // Annotations point back at their page through /P; the page is
    // written separately below.
    let mut seen = BTreeSet::from([page_id]);
    let mut pending = Vec::new();
    collect_dictionary_references(&page, &mut pending);
    while let Some(id) = pending.pop() {
        if !seen.insert(id) {
            continue;
        }
        if let Ok(object) = source.get_object(id) {
            collect_references(object, &mut pending);
            doc.objects.insert(id, object.clone());
        }
    }

    let pages_id = doc.new_object_id();
    page.set("Parent", pages_id);
    doc.objects.insert(page_id, Object::Dictionary(page));
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Count" => 1,
            "Kids" => vec![Object::Reference(page_id)],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    if doc.get_pages().len() != 1 {
        return Err(Error::General(format!(
            "page tree holds {} pages after extracting page {}",
            doc.get_pages().len(),
            page_number
        )));
    }

    doc.compress();
    Ok(doc)
}
