use serde::{Deserialize, Serialize};

/// 2x3 affine matrix in PDF row-vector convention: `[x y 1] × M`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Affine {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Default for Affine {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Affine {
    pub const IDENTITY: Self = Self { a: 1.0, b: 0.0, c: 0.0, d: 1.0, e: 0.0, f: 0.0 };

    pub const fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    pub fn from_array(m: [f64; 6]) -> Self {
        Self::new(m[0], m[1], m[2], m[3], m[4], m[5])
    }

    pub fn translation(tx: f64, ty: f64) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    /// The transform that applies `self` first and `next` second.
    pub fn then(&self, next: &Affine) -> Affine {
        Affine {
            a: self.a * next.a + self.b * next.c,
            b: self.a * next.b + self.b * next.d,
            c: self.c * next.a + self.d * next.c,
            d: self.c * next.b + self.d * next.d,
            e: self.e * next.a + self.f * next.c + next.e,
            f: self.e * next.b + self.f * next.d + next.f,
        }
    }

    pub fn apply(&self, point: Point) -> Point {
        Point {
            x: self.a * point.x + self.c * point.y + self.e,
            y: self.b * point.x + self.d * point.y + self.f,
        }
    }

    /// Length of the transformed unit x vector.
    pub fn x_scale(&self) -> f64 {
        self.a.hypot(self.b)
    }

    /// Length of the transformed unit y vector.
    pub fn y_scale(&self) -> f64 {
        self.c.hypot(self.d)
    }

    pub fn to_array(&self) -> [f64; 6] {
        [self.a, self.b, self.c, self.d, self.e, self.f]
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Top-left anchored rectangle, used for raster and canvas space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self { left, top, width, height }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    /// Edges are inclusive, matching pointer hit-testing on the canvas.
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.left
            && point.x <= self.right()
            && point.y >= self.top
            && point.y <= self.bottom()
    }

    pub fn scaled(&self, factor: f64) -> Rect {
        Rect {
            left: self.left * factor,
            top: self.top * factor,
            width: self.width * factor,
            height: self.height * factor,
        }
    }

    pub fn inflate(&self, padding: f64) -> Rect {
        Rect {
            left: self.left - padding,
            top: self.top - padding,
            width: self.width + padding * 2.0,
            height: self.height + padding * 2.0,
        }
    }
}

/// Bottom-left anchored rectangle in PDF user space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PdfRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width_pt: f64,
    pub height_pt: f64,
}

impl Default for PageSize {
    fn default() -> Self {
        Self { width_pt: 612.0, height_pt: 792.0 }
    }
}

/// One glyph-positioning operation lifted from a page's content stream.
///
/// `transform` is the glyph matrix in PDF user space. The declared sizes are
/// in user-space units as well; either may be missing when the decoder had no
/// font metrics to measure with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRun {
    pub text: String,
    pub transform: Option<Affine>,
    pub declared_width: Option<f64>,
    pub declared_height: Option<f64>,
}

impl TextRun {
    pub fn new(text: impl Into<String>, transform: [f64; 6]) -> Self {
        Self {
            text: text.into(),
            transform: Some(Affine::from_array(transform)),
            declared_width: None,
            declared_height: None,
        }
    }

    pub fn with_declared_size(mut self, width: Option<f64>, height: Option<f64>) -> Self {
        self.declared_width = width;
        self.declared_height = height;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Rgb {
    pub const BLACK: Self = Self { r: 0.0, g: 0.0, b: 0.0 };
    pub const WHITE: Self = Self { r: 1.0, g: 1.0, b: 1.0 };
}

/// Normalised colour: every channel and alpha lies in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

impl Rgba {
    pub const fn new(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self { r, g, b, a }
    }

    pub fn rgb(&self) -> Rgb {
        Rgb { r: self.r, g: self.g, b: self.b }
    }
}

/// A page-1 drawing instruction handed to the PDF writer. Coordinates are
/// PDF user space with the origin at the bottom-left.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DrawOp {
    MaskRect {
        rect: PdfRect,
    },
    Text {
        text: String,
        x: f64,
        y: f64,
        size: f64,
        max_width: Option<f64>,
        line_height: f64,
        color: Rgb,
        opacity: f64,
    },
    Rect {
        rect: PdfRect,
        fill: Option<Rgb>,
        fill_opacity: f64,
        stroke: Option<Rgb>,
        stroke_opacity: f64,
        stroke_width: f64,
    },
}

/// A heuristically merged group of runs, in raster-pixel units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub id: String,
    pub text: String,
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub height: f64,
    pub font_size: f64,
}

impl Line {
    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.left, self.top, self.width(), self.height)
    }

    /// Projects the line into canvas space with the uniform factor `k`.
    pub fn project(&self, k: f64) -> EditableBox {
        EditableBox {
            id: self.id.clone(),
            text: self.text.clone(),
            left: self.left * k,
            top: self.top * k,
            width: self.width() * k,
            height: self.height * k,
            font_size: self.font_size * k,
        }
    }
}

/// Canvas-space projection of a detected line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditableBox {
    pub id: String,
    pub text: String,
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
    pub font_size: f64,
}

impl EditableBox {
    pub fn rect(&self) -> Rect {
        Rect::new(self.left, self.top, self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "obj-{}", self.0)
    }
}

/// Link from a replacement text box back to the line it hides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceLine {
    pub line_id: String,
    /// The line's rectangle in raster space; never touched by later edits.
    pub original_rect: Rect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextObject {
    pub id: ObjectId,
    pub text: String,
    pub left: f64,
    pub top: f64,
    /// Explicit wrap width; `None` lets the text run unbounded.
    pub width: Option<f64>,
    pub height: f64,
    pub font_size: f64,
    pub line_height: Option<f64>,
    pub fill: String,
    pub source: Option<SourceLine>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    Rectangle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeObject {
    pub id: ObjectId,
    pub kind: ShapeKind,
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
    pub fill: Option<String>,
    pub stroke: Option<String>,
    pub stroke_width: f64,
}

impl ShapeObject {
    pub fn rect(&self) -> Rect {
        Rect::new(self.left, self.top, self.width, self.height)
    }
}

/// Everything that can sit on the editing canvas, in z-order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CanvasObject {
    EditedText(TextObject),
    Shape(ShapeObject),
    /// Highlight over an untouched detected line. Never exported.
    LineMarker(EditableBox),
}

impl CanvasObject {
    pub fn object_id(&self) -> Option<ObjectId> {
        match self {
            Self::EditedText(text) => Some(text.id),
            Self::Shape(shape) => Some(shape.id),
            Self::LineMarker(_) => None,
        }
    }

    pub fn is_exported(&self) -> bool {
        !matches!(self, Self::LineMarker(_))
    }
}

/// Lifecycle of a detected line region on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RegionState {
    Detected,
    Editing { object: ObjectId },
    Edited { object: ObjectId },
}

impl RegionState {
    pub fn object(&self) -> Option<ObjectId> {
        match self {
            Self::Detected => None,
            Self::Editing { object } | Self::Edited { object } => Some(*object),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn then_applies_left_operand_first() {
        let glyph = Affine::new(12.0, 0.0, 0.0, 12.0, 50.0, 700.0);
        let view = Affine::new(1.2, 0.0, 0.0, -1.2, 0.0, 792.0 * 1.2);

        let combined = glyph.then(&view);
        let origin = combined.apply(Point::new(0.0, 0.0));

        assert!(approx(origin.x, 60.0));
        assert!(approx(origin.y, (792.0 - 700.0) * 1.2));
        assert!(approx(combined.x_scale(), 14.4));
        assert!(approx(combined.d, -14.4));
    }

    #[test]
    fn identity_is_neutral() {
        let m = Affine::new(2.0, 0.5, -0.5, 3.0, 10.0, -4.0);

        assert_eq!(m.then(&Affine::IDENTITY), m);
        assert_eq!(Affine::IDENTITY.then(&m), m);
    }

    #[test]
    fn rect_contains_is_edge_inclusive() {
        let rect = Rect::new(10.0, 20.0, 30.0, 40.0);

        assert!(rect.contains(Point::new(10.0, 20.0)));
        assert!(rect.contains(Point::new(40.0, 60.0)));
        assert!(!rect.contains(Point::new(40.1, 60.0)));
    }

    #[test]
    fn inflate_grows_every_side() {
        let rect = Rect::new(10.0, 20.0, 30.0, 40.0).inflate(2.5);

        assert_eq!(rect, Rect::new(7.5, 17.5, 35.0, 45.0));
    }

    #[test]
    fn line_projection_scales_every_coordinate() {
        let line = Line {
            id: "line-0-96".to_owned(),
            text: "Hello".to_owned(),
            left: 60.0,
            top: 96.0,
            right: 100.0,
            height: 14.4,
            font_size: 14.4,
        };

        let projected = line.project(0.5);

        assert!(approx(projected.left, 30.0));
        assert!(approx(projected.top, 48.0));
        assert!(approx(projected.width, 20.0));
        assert!(approx(projected.height, 7.2));
        assert!(approx(projected.font_size, 7.2));
        assert_eq!(projected.id, "line-0-96");
    }

    #[test]
    fn draw_ops_serialize_with_op_tag() {
        let op = DrawOp::MaskRect { rect: PdfRect { x: 1.0, y: 2.0, width: 3.0, height: 4.0 } };
        let json = serde_json::to_value(&op).expect("mask should serialize");

        assert_eq!(json["op"], "mask_rect");
        assert_eq!(json["rect"]["width"], 3.0);
    }

    #[test]
    fn line_markers_are_not_exported() {
        let marker = CanvasObject::LineMarker(EditableBox {
            id: "line-1-10".to_owned(),
            text: "x".to_owned(),
            left: 0.0,
            top: 0.0,
            width: 6.0,
            height: 12.0,
            font_size: 10.0,
        });

        assert!(!marker.is_exported());
        assert_eq!(marker.object_id(), None);
    }
}
