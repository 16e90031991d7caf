//! Appends draw operations to page 1 of an existing document.

use crate::objects::{dict_dictionary, inherited, resolve};
use crate::ExportError;
use doc_model::{DrawOp, PdfRect, Rgb};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use std::collections::BTreeMap;
use tracing::{debug, info};

const FONT_RESOURCE: &str = "RtxHelv";
const STATE_RESOURCE: &str = "RtxGs";

/// Helvetica advance widths for U+0020..=U+007E, in thousandths of an em.
const HELVETICA_ASCII: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // 0..?
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // @..O
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // P.._
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // `..o
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // p..~
];
const HELVETICA_DEFAULT_WIDTH: u16 = 556;

/// Width of `text` set in Helvetica at `size`, in the same units as `size`.
pub fn helvetica_width(text: &str, size: f64) -> f64 {
    let units: u32 = text
        .chars()
        .map(|ch| {
            let code = ch as u32;
            if (0x20..=0x7e).contains(&code) {
                u32::from(HELVETICA_ASCII[(code - 0x20) as usize])
            } else {
                u32::from(HELVETICA_DEFAULT_WIDTH)
            }
        })
        .sum();
    f64::from(units) / 1000.0 * size
}

/// Splits `text` into rendered lines: hard breaks on `\n`, then greedy word
/// wrapping when `max_width` is given. A single word wider than the limit
/// keeps a line to itself.
pub fn wrap_text(text: &str, size: f64, max_width: Option<f64>) -> Vec<String> {
    let mut lines = Vec::new();

    for paragraph in text.split('\n') {
        let paragraph = paragraph.trim_end_matches('\r');
        let Some(limit) = max_width.filter(|width| *width > 0.0) else {
            lines.push(paragraph.to_owned());
            continue;
        };

        let mut current = String::new();
        for word in paragraph.split(' ').filter(|word| !word.is_empty()) {
            if current.is_empty() {
                current.push_str(word);
                continue;
            }
            let candidate = format!("{current} {word}");
            if helvetica_width(&candidate, size) <= limit {
                current = candidate;
            } else {
                lines.push(std::mem::take(&mut current));
                current.push_str(word);
            }
        }
        lines.push(current);
    }

    lines
}

/// Encodes `text` as WinAnsi bytes; unmappable characters become `?`.
pub(crate) fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|ch| match ch as u32 {
            code @ (0x20..=0x7e | 0xa0..=0xff) => code as u8,
            _ => match ch {
                '€' => 0x80,
                '‚' => 0x82,
                '„' => 0x84,
                '…' => 0x85,
                '‘' => 0x91,
                '’' => 0x92,
                '“' => 0x93,
                '”' => 0x94,
                '•' => 0x95,
                '–' => 0x96,
                '—' => 0x97,
                '™' => 0x99,
                '\t' => b' ',
                _ => b'?',
            },
        })
        .collect()
}

fn real(value: f64) -> Object {
    Object::Real(value as f32)
}

fn rect_operands(rect: &PdfRect) -> Vec<Object> {
    vec![real(rect.x), real(rect.y), real(rect.width), real(rect.height)]
}

fn color_operands(color: &Rgb) -> Vec<Object> {
    vec![real(color.r), real(color.g), real(color.b)]
}

/// Thousandths; opacities closer than that share a graphics state.
fn opacity_key(value: f64) -> u32 {
    (value.clamp(0.0, 1.0) * 1000.0).round() as u32
}

fn fresh_name(existing: &Dictionary, taken: &[String], base: &str) -> String {
    let mut index = 0usize;
    loop {
        let name = if index == 0 { base.to_owned() } else { format!("{base}{index}") };
        if !existing.has(name.as_bytes()) && !taken.contains(&name) {
            return name;
        }
        index += 1;
    }
}

struct ContentBuilder<'a> {
    operations: Vec<Operation>,
    font_name: String,
    existing_states: &'a Dictionary,
    states: BTreeMap<(u32, u32), String>,
}

impl<'a> ContentBuilder<'a> {
    fn new(font_name: String, existing_states: &'a Dictionary) -> Self {
        Self {
            // Closes the `q` wrapped around the original streams, then opens our own.
            operations: vec![Operation::new("Q", vec![]), Operation::new("q", vec![])],
            font_name,
            existing_states,
            states: BTreeMap::new(),
        }
    }

    fn op(&mut self, operator: &str, operands: Vec<Object>) {
        self.operations.push(Operation::new(operator, operands));
    }

    fn opacity(&mut self, fill: f64, stroke: f64) {
        let key = (opacity_key(fill), opacity_key(stroke));
        if key == (1000, 1000) {
            return;
        }
        let name = match self.states.get(&key) {
            Some(name) => name.clone(),
            None => {
                let taken: Vec<String> = self.states.values().cloned().collect();
                let name = fresh_name(self.existing_states, &taken, STATE_RESOURCE);
                self.states.insert(key, name.clone());
                name
            }
        };
        self.op("gs", vec![Object::Name(name.into_bytes())]);
    }

    fn push(&mut self, op: &DrawOp) {
        match op {
            DrawOp::MaskRect { rect } => {
                self.op("q", vec![]);
                self.op("rg", color_operands(&Rgb::WHITE));
                self.op("re", rect_operands(rect));
                self.op("f", vec![]);
                self.op("Q", vec![]);
            }
            DrawOp::Rect { rect, fill, fill_opacity, stroke, stroke_opacity, stroke_width } => {
                let stroke = stroke.filter(|_| *stroke_width > 0.0);
                let paint = match (fill, stroke) {
                    (Some(_), Some(_)) => "B",
                    (Some(_), None) => "f",
                    (None, Some(_)) => "S",
                    (None, None) => {
                        debug!("rectangle has neither fill nor stroke");
                        return;
                    }
                };

                self.op("q", vec![]);
                self.opacity(
                    fill.map_or(1.0, |_| *fill_opacity),
                    stroke.map_or(1.0, |_| *stroke_opacity),
                );
                if let Some(color) = fill {
                    self.op("rg", color_operands(color));
                }
                if let Some(color) = stroke {
                    self.op("RG", color_operands(&color));
                    self.op("w", vec![real(*stroke_width)]);
                }
                self.op("re", rect_operands(rect));
                self.op(paint, vec![]);
                self.op("Q", vec![]);
            }
            DrawOp::Text { text, x, y, size, max_width, line_height, color, opacity } => {
                let lines = wrap_text(text, *size, *max_width);

                self.op("q", vec![]);
                self.opacity(*opacity, *opacity);
                self.op("rg", color_operands(color));
                self.op("BT", vec![]);
                self.op("Tf", vec![Object::Name(self.font_name.clone().into_bytes()), real(*size)]);
                for (index, line) in lines.iter().enumerate() {
                    let baseline = y - index as f64 * line_height;
                    self.op(
                        "Tm",
                        vec![1.into(), 0.into(), 0.into(), 1.into(), real(*x), real(baseline)],
                    );
                    self.op(
                        "Tj",
                        vec![Object::String(encode_win_ansi(line), StringFormat::Literal)],
                    );
                }
                self.op("ET", vec![]);
                self.op("Q", vec![]);
            }
        }
    }

    fn finish(mut self) -> (Vec<Operation>, BTreeMap<(u32, u32), String>) {
        self.op("Q", vec![]);
        (self.operations, self.states)
    }
}

fn load_error(err: lopdf::Error) -> ExportError {
    ExportError::Load(err.to_string())
}

fn serialize_error(err: impl std::fmt::Display) -> ExportError {
    ExportError::Serialize(err.to_string())
}

fn first_page(doc: &Document) -> Result<ObjectId, ExportError> {
    doc.get_pages()
        .into_values()
        .next()
        .ok_or_else(|| ExportError::Load("document has no pages".to_owned()))
}

/// Returns the re-serialised document with `ops` drawn on top of page 1.
pub(crate) fn apply_ops(original: &[u8], ops: &[DrawOp]) -> Result<Vec<u8>, ExportError> {
    if ops.is_empty() {
        return Ok(original.to_vec());
    }

    let mut doc = Document::load_mem(original).map_err(load_error)?;
    let page_id = first_page(&doc)?;

    let mut resources = inherited(&doc, page_id, b"Resources")
        .and_then(|object| object.as_dict().ok())
        .cloned()
        .unwrap_or_default();
    let mut fonts = dict_dictionary(&doc, &resources, b"Font").cloned().unwrap_or_default();
    let mut states = dict_dictionary(&doc, &resources, b"ExtGState").cloned().unwrap_or_default();

    let font_name = fresh_name(&fonts, &[], FONT_RESOURCE);
    let mut builder = ContentBuilder::new(font_name.clone(), &states);
    for op in ops {
        builder.push(op);
    }
    let (operations, new_states) = builder.finish();
    let operation_count = operations.len();

    let existing_contents = doc
        .get_dictionary(page_id)
        .map_err(load_error)?
        .get(b"Contents")
        .ok()
        .map(|object| match resolve(&doc, object) {
            Object::Array(items) => items.clone(),
            _ => vec![object.clone()],
        })
        .unwrap_or_default();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    fonts.set(font_name, font_id);
    for ((fill, stroke), name) in &new_states {
        states.set(
            name.clone(),
            dictionary! {
                "Type" => "ExtGState",
                "ca" => real(f64::from(*fill) / 1000.0),
                "CA" => real(f64::from(*stroke) / 1000.0),
            },
        );
    }
    resources.set("Font", fonts);
    if !states.is_empty() {
        resources.set("ExtGState", states);
    }

    let encoded = Content { operations }.encode().map_err(serialize_error)?;
    let prefix_id = doc.add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
    let overlay_id = doc.add_object(Stream::new(dictionary! {}, encoded));

    let mut contents = Vec::with_capacity(existing_contents.len() + 2);
    contents.push(Object::Reference(prefix_id));
    contents.extend(existing_contents);
    contents.push(Object::Reference(overlay_id));

    let page = doc
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(load_error)?;
    page.set("Contents", contents);
    page.set("Resources", resources);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).map_err(serialize_error)?;

    info!(
        ops = ops.len(),
        operations = operation_count,
        bytes = bytes.len(),
        "wrote edited document"
    );
    Ok(bytes)
}
