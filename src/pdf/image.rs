//! Wrap an image upload (PNG/JPEG) into a one-page PDF

use std::path::Path;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use crate::error::{Error, Result};

/// Points per inch
const PT_PER_INCH: f64 = 72.0;

/// Page size in points for an image of `width` x `height` pixels at `dpi`
pub fn page_size_for(width: u32, height: u32, dpi: f64) -> (f64, f64) {
    (
        width as f64 * PT_PER_INCH / dpi,
        height as f64 * PT_PER_INCH / dpi,
    )
}

/// Decode an image file and place it on a page sized from its pixel
/// dimensions at `dpi`. Samples are stored as 8-bit RGB, Flate-compressed.
pub fn image_page_document(path: &Path, dpi: f64) -> Result<Document> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }

    let rgb = image::open(path)?.to_rgb8();
    let (width, height) = rgb.dimensions();
    if width == 0 || height == 0 {
        return Err(Error::General(format!("image has no pixels: {}", path.display())));
    }
    let (page_width, page_height) = page_size_for(width, height, dpi);

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut image_stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        },
        rgb.into_raw(),
    );
    image_stream.compress()?;
    let image_id = doc.add_object(image_stream);

    // Scale the unit square to the full page and paint the image into it
    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    Object::Real(page_width as f32),
                    0.into(),
                    0.into(),
                    Object::Real(page_height as f32),
                    0.into(),
                    0.into(),
                ],
            ),
            Operation::new("Do", vec!["Im1".into()]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![
            0.into(),
            0.into(),
            Object::Real(page_width as f32),
            Object::Real(page_height as f32),
        ],
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! { "Im1" => image_id },
        },
    });

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

    Ok(doc)
}
