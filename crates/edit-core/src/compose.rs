//! Turns the final canvas object list into page-1 draw operations.
//!
//! Nothing in here fails: empty text, degenerate shapes and colours that do
//! not parse are skipped or defaulted, so an export always has a valid (if
//! possibly unchanged) op list.

use crate::color::parse_color;
use crate::coords::{CanvasSize, PdfMapping};
use doc_model::{CanvasObject, DrawOp, PageSize, Rect, Rgb, ShapeObject, TextObject};
use tracing::debug;

pub const DEFAULT_LINE_HEIGHT: f64 = 1.2;
const MASK_PADDING_RATIO: f64 = 0.12;
const MIN_MASK_PADDING: f64 = 1.0;

/// What an export needs to know about the surface the objects live on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportFrame {
    pub canvas: CanvasSize,
    pub page: PageSize,
    /// Canvas pixels per raster pixel, used to place original line rects.
    pub k: f64,
}

/// Draw operations for `objects`, in canvas z-order.
pub fn compose(objects: &[CanvasObject], frame: &ExportFrame) -> Vec<DrawOp> {
    let mapping = PdfMapping::new(frame.canvas, frame.page);
    let mut ops = Vec::new();

    for object in objects {
        match object {
            CanvasObject::EditedText(text) => compose_text(text, frame.k, &mapping, &mut ops),
            CanvasObject::Shape(shape) => compose_shape(shape, &mapping, &mut ops),
            CanvasObject::LineMarker(_) => {}
        }
    }

    debug!(objects = objects.len(), ops = ops.len(), "composed export operations");
    ops
}

/// The canvas rectangle that hides a line's original glyphs.
pub fn mask_rect(original: Rect) -> Rect {
    let padding = MIN_MASK_PADDING.max(original.height * MASK_PADDING_RATIO);
    let padded = original.inflate(padding);
    Rect { left: padded.left.max(0.0), top: padded.top.max(0.0), ..padded }
}

fn compose_text(text: &TextObject, k: f64, mapping: &PdfMapping, ops: &mut Vec<DrawOp>) {
    if text.text.trim().is_empty() {
        debug!(object = %text.id, "skipping empty text");
        return;
    }

    if let Some(source) = &text.source {
        let mask = mask_rect(source.original_rect.scaled(k));
        ops.push(DrawOp::MaskRect { rect: mapping.rect(mask) });
    }

    let size = text.font_size * mapping.scale_y();
    let (color, opacity) = match parse_color(&text.fill) {
        Some(color) => (color.rgb(), color.a),
        None => {
            debug!(object = %text.id, fill = %text.fill, "unparseable text colour, using black");
            (Rgb::BLACK, 1.0)
        }
    };

    ops.push(DrawOp::Text {
        text: text.text.clone(),
        x: text.left * mapping.scale_x(),
        y: mapping.point(doc_model::Point::new(text.left, text.top), 0.0).y - size,
        size,
        max_width: text.width.filter(|width| *width > 0.0).map(|width| width * mapping.scale_x()),
        line_height: text.line_height.unwrap_or(DEFAULT_LINE_HEIGHT) * size,
        color,
        opacity,
    });
}

fn compose_shape(shape: &ShapeObject, mapping: &PdfMapping, ops: &mut Vec<DrawOp>) {
    if shape.width <= 0.0 || shape.height <= 0.0 {
        debug!(object = %shape.id, "skipping degenerate shape");
        return;
    }

    let fill = shape.fill.as_deref().and_then(parse_color);
    let stroke = shape.stroke.as_deref().and_then(parse_color);

    ops.push(DrawOp::Rect {
        rect: mapping.rect(shape.rect()),
        fill: fill.map(|color| color.rgb()),
        fill_opacity: fill.map_or(1.0, |color| color.a),
        stroke: stroke.map(|color| color.rgb()),
        stroke_opacity: stroke.map_or(1.0, |color| color.a),
        stroke_width: shape.stroke_width * mapping.scale_x(),
    });
}
