mod font;
mod objects;
mod text;
mod write;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

use doc_model::{Affine, DrawOp, PageSize, TextRun};
use image::{ImageBuffer, Rgba};
use lopdf::{Document, ObjectId};
use objects::{media_box, MediaBox};
use tracing::{info, warn};

pub use write::{helvetica_width, wrap_text};

pub type RgbaImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

/// Render scale used when a caller passes nothing usable.
pub const DEFAULT_RENDER_SCALE: f64 = 1.2;

/// Largest page side a conforming PDF may declare, in points.
pub const MAX_PAGE_EXTENT_PT: f64 = 14_400.0;

/// Upper bound on raster width × height; larger requests render at a reduced scale.
pub const MAX_RASTER_PIXELS: f64 = 40_000_000.0;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("corrupt PDF: {0}")]
    Corrupt(String),
    #[error("unsupported PDF: {0}")]
    Unsupported(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("cannot load source PDF for export: {0}")]
    Load(String),
    #[error("cannot serialize edited PDF: {0}")]
    Serialize(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DocumentInfo {
    pub page_count: u32,
    pub first_page_size: PageSize,
}

/// Page 1 of a document, rasterised and with its text runs lifted out.
#[derive(Debug, Clone)]
pub struct DecodedPage {
    pub page_size: PageSize,
    pub render_scale: f64,
    pub raster_width: u32,
    pub raster_height: u32,
    pub raster: RgbaImage,
    /// PDF user space to raster pixels, y pointing down.
    pub view_transform: Affine,
    pub text_runs: Vec<TextRun>,
    /// Set when the content stream could not be interpreted; the page is
    /// still usable, just without editable text.
    pub text_error: Option<String>,
}

pub trait PageDecoder {
    fn inspect(&self, bytes: &[u8]) -> Result<DocumentInfo, DecodeError>;
    fn decode(&self, bytes: &[u8], scale: f64) -> Result<DecodedPage, DecodeError>;
}

pub trait PdfWriter {
    /// Draws `ops` over page 1 and returns the whole re-serialised document.
    fn write(&self, original: &[u8], ops: &[DrawOp]) -> Result<Vec<u8>, ExportError>;
}

/// Both halves of the engine boundary.
pub trait PdfEngine: PageDecoder + PdfWriter {}

impl<T: PageDecoder + PdfWriter> PdfEngine for T {}

pub fn normalize_scale(scale: f64) -> f64 {
    if scale.is_finite() && scale > 0.0 {
        scale
    } else {
        DEFAULT_RENDER_SCALE
    }
}

fn view_transform(media: &MediaBox, scale: f64) -> Affine {
    Affine::new(scale, 0.0, 0.0, -scale, -media.x0 * scale, media.y1 * scale)
}

fn raster_dimension(points: f64, scale: f64) -> u32 {
    (points * scale).floor().max(1.0) as u32
}

fn check_page_extent(media: &MediaBox) -> Result<(), DecodeError> {
    for (side, points) in [("width", media.width()), ("height", media.height())] {
        if !points.is_finite() || points > MAX_PAGE_EXTENT_PT {
            return Err(DecodeError::Corrupt(format!(
                "page {side} of {points} pt exceeds {MAX_PAGE_EXTENT_PT} pt"
            )));
        }
    }
    Ok(())
}

/// Shrinks `scale` until the raster fits in [`MAX_RASTER_PIXELS`].
fn fitted_scale(media: &MediaBox, scale: f64) -> f64 {
    let pixels = media.width() * scale * media.height() * scale;
    if pixels <= MAX_RASTER_PIXELS {
        return scale;
    }

    let fitted = scale * (MAX_RASTER_PIXELS / pixels).sqrt();
    warn!(requested = scale, fitted, "render scale reduced to bound raster size");
    fitted
}

fn placeholder_raster(width: u32, height: u32) -> RgbaImage {
    let mut image = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));

    if width >= 4 && height >= 4 {
        let border = Rgba([220, 220, 220, 255]);
        for x in 0..width {
            image.put_pixel(x, 0, border);
            image.put_pixel(x, height - 1, border);
        }
        for y in 0..height {
            image.put_pixel(0, y, border);
            image.put_pixel(width - 1, y, border);
        }
    }

    image
}

/// Pure-Rust engine: text runs from the content stream, a blank page raster.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfEngine;

impl LopdfEngine {
    pub fn new() -> Self {
        Self
    }

    fn load(bytes: &[u8]) -> Result<(Document, ObjectId, u32), DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::Corrupt("document is empty".to_owned()));
        }
        if bytes.windows("/Encrypt".len()).any(|window| window == b"/Encrypt") {
            return Err(DecodeError::Unsupported(
                "encrypted documents are not supported".to_owned(),
            ));
        }

        let doc = Document::load_mem(bytes).map_err(|err| DecodeError::Corrupt(err.to_string()))?;
        let pages = doc.get_pages();
        let page_count = pages.len() as u32;
        let first = pages
            .into_values()
            .next()
            .ok_or_else(|| DecodeError::Unsupported("document has no pages".to_owned()))?;

        Ok((doc, first, page_count))
    }
}

impl PageDecoder for LopdfEngine {
    fn inspect(&self, bytes: &[u8]) -> Result<DocumentInfo, DecodeError> {
        let (doc, first, page_count) = Self::load(bytes)?;
        let media = media_box(&doc, first);
        check_page_extent(&media)?;

        Ok(DocumentInfo {
            page_count,
            first_page_size: PageSize { width_pt: media.width(), height_pt: media.height() },
        })
    }

    fn decode(&self, bytes: &[u8], scale: f64) -> Result<DecodedPage, DecodeError> {
        let (doc, page_id, _) = Self::load(bytes)?;
        let media = media_box(&doc, page_id);
        check_page_extent(&media)?;
        let scale = fitted_scale(&media, normalize_scale(scale));
        let raster_width = raster_dimension(media.width(), scale);
        let raster_height = raster_dimension(media.height(), scale);

        let (text_runs, text_error) = match text::extract_runs(&doc, page_id) {
            Ok(runs) => (runs, None),
            Err(err) => {
                warn!(error = %err, "page content stream could not be interpreted");
                (Vec::new(), Some(err.to_string()))
            }
        };

        info!(raster_width, raster_height, runs = text_runs.len(), scale, "decoded page");

        Ok(DecodedPage {
            page_size: PageSize { width_pt: media.width(), height_pt: media.height() },
            render_scale: scale,
            raster_width,
            raster_height,
            raster: placeholder_raster(raster_width, raster_height),
            view_transform: view_transform(&media, scale),
            text_runs,
            text_error,
        })
    }
}

impl PdfWriter for LopdfEngine {
    fn write(&self, original: &[u8], ops: &[DrawOp]) -> Result<Vec<u8>, ExportError> {
        write::apply_ops(original, ops)
    }
}

#[cfg(feature = "pdfium")]
pub mod pdfium_backend {
    use super::*;
    use pdfium_render::prelude::*;

    /// Renders real page pixels through pdfium; text runs and writing stay
    /// with [`LopdfEngine`] so both backends cluster identically.
    pub struct PdfiumEngine {
        pdfium: Pdfium,
        inner: LopdfEngine,
    }

    impl PdfiumEngine {
        pub fn from_system_library() -> Result<Self, DecodeError> {
            let bindings = Pdfium::bind_to_system_library().map_err(|err| {
                DecodeError::Unsupported(format!("failed to bind pdfium system library: {err}"))
            })?;

            Ok(Self { pdfium: Pdfium::new(bindings), inner: LopdfEngine::new() })
        }
    }

    impl PageDecoder for PdfiumEngine {
        fn inspect(&self, bytes: &[u8]) -> Result<DocumentInfo, DecodeError> {
            self.inner.inspect(bytes)
        }

        fn decode(&self, bytes: &[u8], scale: f64) -> Result<DecodedPage, DecodeError> {
            let mut page = self.inner.decode(bytes, scale)?;

            let document = self
                .pdfium
                .load_pdf_from_byte_slice(bytes, None)
                .map_err(|err| DecodeError::Corrupt(err.to_string()))?;
            let first =
                document.pages().get(0).map_err(|err| DecodeError::Corrupt(err.to_string()))?;

            let config = PdfRenderConfig::new()
                .set_target_width(page.raster_width as i32)
                .set_target_height(page.raster_height as i32);
            let bitmap = first
                .render_with_config(&config)
                .map_err(|err| DecodeError::Corrupt(err.to_string()))?;

            let pixels = bitmap.as_rgba_bytes().to_vec();
            page.raster = RgbaImage::from_raw(page.raster_width, page.raster_height, pixels)
                .ok_or_else(|| {
                    DecodeError::Corrupt("pdfium bitmap does not match raster size".to_owned())
                })?;
            Ok(page)
        }
    }

    impl PdfWriter for PdfiumEngine {
        fn write(&self, original: &[u8], ops: &[DrawOp]) -> Result<Vec<u8>, ExportError> {
            self.inner.write(original, ops)
        }
    }
}

pub fn default_engine() -> LopdfEngine {
    LopdfEngine::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{single_page_pdf, single_page_pdf_with_media_box, zero_page_pdf, SampleRun};
    use doc_model::{PdfRect, Point, Rgb};

    fn hello_pdf() -> Vec<u8> {
        single_page_pdf(&[SampleRun::new("Hello", 50.0, 700.0, 12.0)]).expect("sample should build")
    }

    #[test]
    fn inspect_reports_page_count_and_size() {
        let info = LopdfEngine::new().inspect(&hello_pdf()).expect("inspect should succeed");

        assert_eq!(info.page_count, 1);
        assert_eq!(info.first_page_size, PageSize { width_pt: 612.0, height_pt: 792.0 });
    }

    #[test]
    fn decode_produces_raster_view_transform_and_runs() {
        let page = LopdfEngine::new().decode(&hello_pdf(), 1.5).expect("decode should succeed");

        assert_eq!((page.raster_width, page.raster_height), (918, 1188));
        assert_eq!(page.raster.dimensions(), (918, 1188));
        assert_eq!(page.text_runs.len(), 1);
        assert_eq!(page.text_runs[0].text, "Hello");
        assert!(page.text_error.is_none());

        let baseline = page.view_transform.apply(Point::new(50.0, 700.0));
        assert!((baseline.x - 75.0).abs() < 1e-9);
        assert!((baseline.y - 138.0).abs() < 1e-9);
    }

    #[test]
    fn unusable_scale_falls_back_to_default() {
        let engine = LopdfEngine::new();

        for scale in [0.0, -2.0, f64::NAN, f64::INFINITY] {
            let page = engine.decode(&hello_pdf(), scale).expect("decode should succeed");
            assert_eq!(page.render_scale, DEFAULT_RENDER_SCALE);
        }
    }

    #[test]
    fn empty_or_garbage_input_is_corrupt() {
        let engine = LopdfEngine::new();

        assert!(matches!(engine.decode(&[], 1.2), Err(DecodeError::Corrupt(_))));
        assert!(matches!(
            engine.decode(b"definitely not a pdf", 1.2),
            Err(DecodeError::Corrupt(_))
        ));
    }

    #[test]
    fn oversized_media_box_is_corrupt() {
        let bytes = single_page_pdf_with_media_box([0.0, 0.0, 4e9, 4e9], &[])
            .expect("sample should build");
        let engine = LopdfEngine::new();

        let err = engine.decode(&bytes, 1.2).expect_err("should refuse oversized page");

        assert!(matches!(err, DecodeError::Corrupt(_)));
        assert!(matches!(engine.inspect(&bytes), Err(DecodeError::Corrupt(_))));
    }

    #[test]
    fn large_scale_is_reduced_to_pixel_budget() {
        let page = LopdfEngine::new().decode(&hello_pdf(), 100.0).expect("decode should succeed");

        assert!(page.render_scale < 100.0);
        let pixels = f64::from(page.raster_width) * f64::from(page.raster_height);
        assert!(pixels <= MAX_RASTER_PIXELS);
        assert_eq!(page.raster_width, raster_dimension(612.0, page.render_scale));
        assert_eq!(page.view_transform.x_scale(), page.render_scale);
    }

    #[test]
    fn largest_legal_page_still_decodes() {
        let bytes = single_page_pdf_with_media_box([0.0, 0.0, 14_400.0, 14_400.0], &[])
            .expect("sample should build");

        let page = LopdfEngine::new().decode(&bytes, 1.2).expect("decode should succeed");

        assert!(f64::from(page.raster_width) * f64::from(page.raster_height) <= MAX_RASTER_PIXELS);
    }

    #[test]
    fn zero_pages_is_unsupported() {
        let bytes = zero_page_pdf().expect("sample should build");

        let err = LopdfEngine::new().decode(&bytes, 1.2).expect_err("should fail without pages");

        assert!(matches!(err, DecodeError::Unsupported(_)));
    }

    #[test]
    fn encrypted_marker_is_unsupported() {
        let mut bytes = hello_pdf();
        bytes.extend_from_slice(b"\n% /Encrypt\n");

        let err = LopdfEngine::new().inspect(&bytes).expect_err("should refuse encrypted input");

        assert!(matches!(err, DecodeError::Unsupported(_)));
    }

    #[test]
    fn written_text_is_read_back_by_the_decoder() {
        let engine = LopdfEngine::new();
        let ops = vec![
            DrawOp::MaskRect { rect: PdfRect { x: 48.0, y: 697.0, width: 34.0, height: 16.0 } },
            DrawOp::Text {
                text: "Goodbye".to_owned(),
                x: 50.0,
                y: 688.0,
                size: 12.0,
                max_width: None,
                line_height: 14.4,
                color: Rgb::BLACK,
                opacity: 1.0,
            },
        ];

        let written = engine.write(&hello_pdf(), &ops).expect("write should succeed");
        let page = engine.decode(&written, 1.0).expect("decode should succeed");

        let texts: Vec<&str> = page.text_runs.iter().map(|run| run.text.as_str()).collect();
        assert_eq!(texts, vec!["Hello", "Goodbye"]);
    }
}
