//! Conversions between raster, canvas and PDF user space.
//!
//! Raster and canvas differ by one uniform factor `k = canvas_width /
//! raster_width`. Canvas to PDF uses independent x and y factors and flips
//! the y axis; the flip happens only here, at export time.

use doc_model::{PageSize, PdfRect, Point, Rect};

/// Ratio between the raster actually produced and the page width at the
/// requested scale. Exactly 1 unless the raster width was rounded.
pub fn raster_scale_factor(raster_width: u32, page_width_pt: f64, render_scale: f64) -> f64 {
    let expected = page_width_pt * render_scale;
    if raster_width == 0 || !expected.is_finite() || expected <= 0.0 {
        return 1.0;
    }
    f64::from(raster_width) / expected
}

/// `k` for a canvas of `canvas_width` showing a raster `raster_width` wide.
pub fn canvas_factor(canvas_width: f64, raster_width: u32) -> f64 {
    if raster_width == 0 {
        return 1.0;
    }
    canvas_width / f64::from(raster_width)
}

pub fn raster_to_canvas(point: Point, k: f64) -> Point {
    Point::new(point.x * k, point.y * k)
}

pub fn canvas_to_raster(point: Point, k: f64) -> Point {
    Point::new(point.x / k, point.y / k)
}

/// Size of the editing surface in canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CanvasSize {
    pub width: f64,
    pub height: f64,
}

/// Canvas-to-PDF mapping for one export.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdfMapping {
    sx: f64,
    sy: f64,
    page_height: f64,
}

impl PdfMapping {
    pub fn new(canvas: CanvasSize, page: PageSize) -> Self {
        Self {
            sx: page.width_pt / canvas.width,
            sy: page.height_pt / canvas.height,
            page_height: page.height_pt,
        }
    }

    pub fn scale_x(&self) -> f64 {
        self.sx
    }

    pub fn scale_y(&self) -> f64 {
        self.sy
    }

    /// Maps the top-left corner of something `height` canvas units tall to
    /// the PDF point at its bottom-left.
    pub fn point(&self, point: Point, height: f64) -> Point {
        Point::new(point.x * self.sx, self.page_height - point.y * self.sy - height * self.sy)
    }

    pub fn rect(&self, rect: Rect) -> PdfRect {
        let origin = self.point(Point::new(rect.left, rect.top), rect.height);
        PdfRect {
            x: origin.x,
            y: origin.y,
            width: rect.width * self.sx,
            height: rect.height * self.sy,
        }
    }

    /// Inverse of [`PdfMapping::point`].
    pub fn canvas_point(&self, point: Point, height: f64) -> Point {
        Point::new(point.x / self.sx, (self.page_height - point.y) / self.sy - height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-6 * a.abs().max(b.abs()).max(1.0)
    }

    #[test]
    fn scale_factor_is_one_for_exact_rasters() {
        assert_eq!(raster_scale_factor(918, 612.0, 1.5), 1.0);
        assert!((raster_scale_factor(734, 612.0, 1.2) - 734.0 / 734.4).abs() < 1e-12);
        assert_eq!(raster_scale_factor(0, 612.0, 1.2), 1.0);
    }

    #[test]
    fn rect_mapping_flips_y_from_the_bottom_edge() {
        let mapping =
            PdfMapping::new(CanvasSize { width: 612.0, height: 792.0 }, PageSize::default());

        let rect = mapping.rect(Rect::new(10.0, 20.0, 100.0, 30.0));

        assert_eq!(rect, PdfRect { x: 10.0, y: 742.0, width: 100.0, height: 30.0 });
    }

    #[test]
    fn mapping_uses_independent_axis_factors() {
        let mapping =
            PdfMapping::new(CanvasSize { width: 306.0, height: 198.0 }, PageSize::default());

        assert_eq!(mapping.scale_x(), 2.0);
        assert_eq!(mapping.scale_y(), 4.0);
        assert_eq!(mapping.point(Point::new(1.0, 1.0), 0.0), Point::new(2.0, 788.0));
    }

    proptest! {
        #[test]
        fn raster_canvas_pdf_round_trip(
            x in 0.0f64..2000.0,
            y in 0.0f64..3000.0,
            height in 0.0f64..200.0,
            k in 0.05f64..8.0,
            canvas_width in 100.0f64..2000.0,
            canvas_height in 100.0f64..3000.0,
        ) {
            let mapping = PdfMapping::new(
                CanvasSize { width: canvas_width, height: canvas_height },
                PageSize::default(),
            );
            let raster = Point::new(x, y);

            let canvas = raster_to_canvas(raster, k);
            let pdf = mapping.point(canvas, height);
            let back = canvas_to_raster(mapping.canvas_point(pdf, height), k);

            prop_assert!(close(back.x, raster.x), "x {} vs {}", back.x, raster.x);
            prop_assert!(close(back.y, raster.y), "y {} vs {}", back.y, raster.y);
        }
    }
}
