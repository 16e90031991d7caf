//! Text-run extraction from a page content stream.
//!
//! Walks the operators that affect text placement and emits one [`TextRun`]
//! per text-showing operator, with the glyph matrix expressed in PDF user
//! space. Form XObjects are not descended into.

use crate::font::FontInfo;
use crate::objects::{dict_dictionary, inherited, number, resolve};
use doc_model::{Affine, TextRun};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, trace};

/// TJ adjustments past this many thousandths of an em read as a word gap.
const TJ_SPACE_THRESHOLD: f64 = 250.0;

#[derive(Debug, Clone)]
struct TextState {
    font: Option<Rc<FontInfo>>,
    size: f64,
    char_spacing: f64,
    word_spacing: f64,
    horizontal_scale: f64,
    leading: f64,
    rise: f64,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            font: None,
            size: 1.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct GraphicsState {
    ctm: Affine,
    text: TextState,
}

struct Interpreter<'a> {
    doc: &'a Document,
    fonts: Option<&'a Dictionary>,
    font_cache: HashMap<Vec<u8>, Rc<FontInfo>>,
    fallback_font: Rc<FontInfo>,
    state: GraphicsState,
    stack: Vec<GraphicsState>,
    tm: Affine,
    tlm: Affine,
    runs: Vec<TextRun>,
}

pub(crate) fn extract_runs(
    doc: &Document,
    page_id: ObjectId,
) -> Result<Vec<TextRun>, lopdf::Error> {
    let data = doc.get_page_content(page_id)?;
    let content = Content::decode(&data)?;
    let fonts = inherited(doc, page_id, b"Resources")
        .and_then(|object| object.as_dict().ok())
        .and_then(|resources| dict_dictionary(doc, resources, b"Font"));

    let mut interpreter = Interpreter::new(doc, fonts);
    for operation in &content.operations {
        interpreter.step(operation);
    }

    debug!(
        operations = content.operations.len(),
        runs = interpreter.runs.len(),
        "extracted text runs"
    );
    Ok(interpreter.runs)
}

fn numbers(operation: &Operation) -> Vec<f64> {
    operation.operands.iter().filter_map(number).collect()
}

fn matrix(operation: &Operation) -> Option<Affine> {
    let values = numbers(operation);
    let values: [f64; 6] = values.as_slice().try_into().ok()?;
    Some(Affine::from_array(values))
}

impl<'a> Interpreter<'a> {
    fn new(doc: &'a Document, fonts: Option<&'a Dictionary>) -> Self {
        Self {
            doc,
            fonts,
            font_cache: HashMap::new(),
            fallback_font: Rc::new(FontInfo::load(doc, &Dictionary::new())),
            state: GraphicsState::default(),
            stack: Vec::new(),
            tm: Affine::IDENTITY,
            tlm: Affine::IDENTITY,
            runs: Vec::new(),
        }
    }

    fn step(&mut self, operation: &Operation) {
        let first = operation.operands.first().and_then(number);

        match operation.operator.as_str() {
            "q" => self.stack.push(self.state.clone()),
            "Q" => match self.stack.pop() {
                Some(saved) => self.state = saved,
                None => trace!("unbalanced Q in content stream"),
            },
            "cm" => {
                if let Some(m) = matrix(operation) {
                    self.state.ctm = m.then(&self.state.ctm);
                }
            }
            "BT" => {
                self.tm = Affine::IDENTITY;
                self.tlm = Affine::IDENTITY;
            }
            "Tf" => {
                let font = operation
                    .operands
                    .first()
                    .and_then(|o| o.as_name().ok())
                    .map(|name| self.font(name));
                self.state.text.font = font;
                if let Some(size) = operation.operands.get(1).and_then(number) {
                    self.state.text.size = size;
                }
            }
            "Tc" => self.state.text.char_spacing = first.unwrap_or(0.0),
            "Tw" => self.state.text.word_spacing = first.unwrap_or(0.0),
            "Tz" => self.state.text.horizontal_scale = first.unwrap_or(100.0) / 100.0,
            "TL" => self.state.text.leading = first.unwrap_or(0.0),
            "Ts" => self.state.text.rise = first.unwrap_or(0.0),
            "Td" | "TD" => {
                if let [tx, ty] = numbers(operation).as_slice() {
                    if operation.operator == "TD" {
                        self.state.text.leading = -ty;
                    }
                    self.move_line(*tx, *ty);
                }
            }
            "Tm" => {
                if let Some(m) = matrix(operation) {
                    self.tlm = m;
                    self.tm = m;
                }
            }
            "T*" => self.next_line(),
            "Tj" => self.show(&operation.operands),
            "'" => {
                self.next_line();
                self.show(&operation.operands);
            }
            "\"" => {
                let values = numbers(operation);
                if let [word_spacing, char_spacing, ..] = values.as_slice() {
                    self.state.text.word_spacing = *word_spacing;
                    self.state.text.char_spacing = *char_spacing;
                }
                self.next_line();
                self.show(operation.operands.get(2..).unwrap_or_default());
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operation.operands.first() {
                    self.show(items);
                }
            }
            _ => {}
        }
    }

    fn font(&mut self, name: &[u8]) -> Rc<FontInfo> {
        if let Some(font) = self.font_cache.get(name) {
            return Rc::clone(font);
        }

        let font = self
            .fonts
            .and_then(|fonts| fonts.get(name).ok())
            .and_then(|object| resolve(self.doc, object).as_dict().ok())
            .map(|dict| Rc::new(FontInfo::load(self.doc, dict)))
            .unwrap_or_else(|| {
                debug!(font = %String::from_utf8_lossy(name), "font resource missing");
                Rc::clone(&self.fallback_font)
            });

        self.font_cache.insert(name.to_vec(), Rc::clone(&font));
        font
    }

    fn move_line(&mut self, tx: f64, ty: f64) {
        self.tlm = Affine::translation(tx, ty).then(&self.tlm);
        self.tm = self.tlm;
    }

    fn next_line(&mut self) {
        let leading = self.state.text.leading;
        self.move_line(0.0, -leading);
    }

    fn show(&mut self, items: &[Object]) {
        let ts = self.state.text.clone();
        let font = ts.font.clone().unwrap_or_else(|| Rc::clone(&self.fallback_font));
        let start = self.tm;
        let glyph = Affine::new(ts.size * ts.horizontal_scale, 0.0, 0.0, ts.size, 0.0, ts.rise)
            .then(&start)
            .then(&self.state.ctm);

        let mut text = String::new();
        let mut advance = 0.0;

        for item in items {
            match item {
                Object::String(bytes, _) => {
                    for code in font.codes(bytes) {
                        text.push_str(&font.decode(code));
                        let mut tx = font.width(code) / 1000.0 * ts.size + ts.char_spacing;
                        if code.len == 1 && code.value == 32 {
                            tx += ts.word_spacing;
                        }
                        advance += tx * ts.horizontal_scale;
                    }
                }
                other => {
                    if let Some(adjust) = number(other) {
                        let gap = adjust < -TJ_SPACE_THRESHOLD;
                        if gap && !text.is_empty() && !text.ends_with(' ') {
                            text.push(' ');
                        }
                        advance -= adjust / 1000.0 * ts.size * ts.horizontal_scale;
                    }
                }
            }
        }

        self.tm = Affine::translation(advance, 0.0).then(&self.tm);

        if text.is_empty() {
            return;
        }

        let user = start.then(&self.state.ctm);
        let width = advance.abs() * user.x_scale();
        let height = glyph.y_scale();

        self.runs.push(TextRun {
            text,
            transform: Some(glyph),
            declared_width: (font.has_metrics() && width > 0.0).then_some(width),
            declared_height: (height > 0.0).then_some(height),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Stream};

    fn page_with_content(operations: Vec<Operation>, font: Dictionary) -> (Document, ObjectId) {
        let mut doc = Document::with_version("1.7");
        let font_id = doc.add_object(font);
        let content = Content { operations }.encode().expect("content should encode");
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
        });
        let pages_id = doc.add_object(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
        });
        if let Ok(page) = doc.get_object_mut(page_id).and_then(Object::as_dict_mut) {
            page.set("Parent", pages_id);
        }
        (doc, page_id)
    }

    fn helvetica() -> Dictionary {
        dictionary! { "Type" => "Font", "Subtype" => "Type1", "BaseFont" => "Helvetica" }
    }

    fn text(s: &str) -> Object {
        Object::string_literal(s)
    }

    #[test]
    fn tf_size_and_td_position_define_glyph_matrix() {
        let (doc, page) = page_with_content(
            vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![50.into(), 700.into()]),
                Operation::new("Tj", vec![text("Hello")]),
                Operation::new("ET", vec![]),
            ],
            helvetica(),
        );

        let runs = extract_runs(&doc, page).expect("extraction should succeed");

        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].text, "Hello");
        assert_eq!(
            runs[0].transform.expect("transform expected").to_array(),
            [12.0, 0.0, 0.0, 12.0, 50.0, 700.0]
        );
        assert_eq!(runs[0].declared_height, Some(12.0));
        assert_eq!(runs[0].declared_width, None, "no Widths array means no declared width");
    }

    #[test]
    fn widths_array_produces_declared_width_and_advances_matrix() {
        let mut font = helvetica();
        font.set("FirstChar", 65);
        font.set("Widths", vec![Object::Integer(500), Object::Integer(600)]);
        let (doc, page) = page_with_content(
            vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 10.into()]),
                Operation::new(
                    "Tm",
                    vec![1.into(), 0.into(), 0.into(), 1.into(), 100.into(), 200.into()],
                ),
                Operation::new("Tj", vec![text("AB")]),
                Operation::new("Tj", vec![text("A")]),
                Operation::new("ET", vec![]),
            ],
            font,
        );

        let runs = extract_runs(&doc, page).expect("extraction should succeed");

        assert_eq!(runs.len(), 2);
        let width = runs[0].declared_width.expect("width expected");
        assert!((width - 11.0).abs() < 1e-9);
        let second = runs[1].transform.expect("transform expected");
        assert!((second.e - 111.0).abs() < 1e-9);
    }

    #[test]
    fn cm_and_q_stack_scope_the_transform() {
        let (doc, page) = page_with_content(
            vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![2.into(), 0.into(), 0.into(), 2.into(), 10.into(), 20.into()],
                ),
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 5.into()]),
                Operation::new("Tj", vec![text("scaled")]),
                Operation::new("ET", vec![]),
                Operation::new("Q", vec![]),
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 5.into()]),
                Operation::new("Tj", vec![text("plain")]),
                Operation::new("ET", vec![]),
            ],
            helvetica(),
        );

        let runs = extract_runs(&doc, page).expect("extraction should succeed");

        let scaled = runs[0].transform.expect("transform expected");
        assert_eq!(scaled.to_array(), [10.0, 0.0, 0.0, 10.0, 10.0, 20.0]);
        let plain = runs[1].transform.expect("transform expected");
        assert_eq!(plain.to_array(), [5.0, 0.0, 0.0, 5.0, 0.0, 0.0]);
    }

    #[test]
    fn tj_array_joins_segments_and_inserts_word_gaps() {
        let (doc, page) = page_with_content(
            vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new(
                    "TJ",
                    vec![Object::Array(vec![
                        text("Hel"),
                        (-20).into(),
                        text("lo"),
                        (-400).into(),
                        text("world"),
                    ])],
                ),
                Operation::new("ET", vec![]),
            ],
            helvetica(),
        );

        let runs = extract_runs(&doc, page).expect("extraction should succeed");

        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].text, "Hello world");
    }

    #[test]
    fn t_star_moves_down_by_leading() {
        let (doc, page) = page_with_content(
            vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("TL", vec![14.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![text("first")]),
                Operation::new("T*", vec![]),
                Operation::new("Tj", vec![text("second")]),
                Operation::new("ET", vec![]),
            ],
            helvetica(),
        );

        let runs = extract_runs(&doc, page).expect("extraction should succeed");

        let second = runs[1].transform.expect("transform expected");
        assert_eq!(second.e, 72.0);
        assert_eq!(second.f, 706.0);
    }
}
