//! Line detection, coordinate mapping, composition and the editing session
//! that ties them together.

pub mod cluster;
pub mod color;
pub mod compose;
pub mod config;
pub mod coords;
pub mod session;

pub use cluster::{cluster_runs, ClusterMode, Clustering};
pub use color::parse_color;
pub use compose::{compose, mask_rect, ExportFrame};
pub use config::{ConfigError, EditorConfig};
pub use coords::{canvas_factor, raster_scale_factor, CanvasSize, PdfMapping};
pub use session::{
    EditCommand, EditSession, Editor, RectangleSpec, RequestToken, SessionError, TextBoxSpec,
};
