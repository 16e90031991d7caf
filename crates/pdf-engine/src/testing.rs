//! Synthetic single-page documents for tests across the workspace.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

/// A line of Helvetica text placed with `Td` at a baseline position.
#[derive(Debug, Clone, Copy)]
pub struct SampleRun<'a> {
    pub text: &'a str,
    pub x: f64,
    pub y: f64,
    pub size: f64,
}

impl<'a> SampleRun<'a> {
    pub fn new(text: &'a str, x: f64, y: f64, size: f64) -> Self {
        Self { text, x, y, size }
    }
}

/// A US-letter page showing each run in its own `BT … ET` block.
pub fn single_page_pdf(runs: &[SampleRun<'_>]) -> Result<Vec<u8>, lopdf::Error> {
    single_page_pdf_with_media_box([0.0, 0.0, 612.0, 792.0], runs)
}

pub fn single_page_pdf_with_media_box(
    media_box: [f64; 4],
    runs: &[SampleRun<'_>],
) -> Result<Vec<u8>, lopdf::Error> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut operations = Vec::new();
    for run in runs {
        operations.push(Operation::new("BT", vec![]));
        operations.push(Operation::new("Tf", vec!["F1".into(), Object::Real(run.size as f32)]));
        operations.push(Operation::new(
            "Td",
            vec![Object::Real(run.x as f32), Object::Real(run.y as f32)],
        ));
        operations.push(Operation::new("Tj", vec![Object::string_literal(run.text)]));
        operations.push(Operation::new("ET", vec![]));
    }
    let content_id =
        doc.add_object(Stream::new(dictionary! {}, Content { operations }.encode()?));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => media_box.iter().map(|&v| Object::Real(v as f32)).collect::<Vec<_>>(),
        "Contents" => content_id,
        "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    finish(doc, pages_id)
}

/// A structurally valid document whose page tree is empty.
pub fn zero_page_pdf() -> Result<Vec<u8>, lopdf::Error> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.add_object(dictionary! {
        "Type" => "Pages",
        "Kids" => Vec::<Object>::new(),
        "Count" => 0,
    });
    finish(doc, pages_id)
}

fn finish(mut doc: Document, pages_id: lopdf::ObjectId) -> Result<Vec<u8>, lopdf::Error> {
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;
    Ok(bytes)
}
