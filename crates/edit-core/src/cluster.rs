//! Groups text runs into editable lines.
//!
//! A single pass over the runs in decoder order. Each run joins the first
//! existing line whose top lies within tolerance, otherwise it opens a new
//! line. Matching is first-fit rather than nearest-fit, so grouping depends
//! on run order.

use doc_model::{Affine, Line, TextRun};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Average glyph advance as a fraction of font height when nothing better is known.
const ESTIMATED_ADVANCE: f64 = 0.55;
const COLLAPSED_ADVANCE: f64 = 0.5;
const COLLAPSED_MIN_FONT: f64 = 10.0;
const FALLBACK_FONT_HEIGHT: f64 = 12.0;
const MIN_RUN_HEIGHT: f64 = 0.5;
const MIN_TOLERANCE: f64 = 3.0;
const TOLERANCE_RATIO: f64 = 0.6;

pub const MIN_BOX_WIDTH: f64 = 6.0;
pub const MIN_BOX_HEIGHT: f64 = 12.0;
pub const MIN_FONT_SIZE: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterMode {
    /// Runs were merged into lines.
    Lines,
    /// Merging produced nothing; one box per surviving run.
    PerRun,
    /// No run survived filtering.
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Clustering {
    pub mode: ClusterMode,
    /// Raster-space boxes, padded to the minimum hit-target size.
    pub lines: Vec<Line>,
}

/// A run placed in raster space.
#[derive(Debug, Clone, PartialEq)]
struct PlacedRun {
    text: String,
    left: f64,
    top: f64,
    width: f64,
    height: f64,
    font_size: f64,
}

/// Rounds half up, so ids match what a browser would produce.
fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

fn place(run: &TextRun, view: &Affine, scale_factor: f64) -> Option<PlacedRun> {
    let text = run.text.trim();
    if text.is_empty() {
        return None;
    }
    let transform = run.transform?;

    let tx = transform.then(view);
    let user_to_raster = view.x_scale();
    let declared_width = run.declared_width.filter(|w| *w > 0.0).map(|w| w * user_to_raster);
    let declared_height = run.declared_height.filter(|h| *h > 0.0).map(|h| h * user_to_raster);
    let length = run.text.chars().count() as f64;

    let mut font_height = tx.x_scale();
    if !(font_height >= MIN_RUN_HEIGHT) {
        font_height = declared_height.unwrap_or(FALLBACK_FONT_HEIGHT);
    }
    let raw_width = declared_width.unwrap_or(length * font_height * ESTIMATED_ADVANCE);
    let raw_height = declared_height.unwrap_or(font_height);

    let mut width = raw_width * scale_factor;
    let height = raw_height * scale_factor;
    if width <= 1.0 {
        width = length * font_height.max(COLLAPSED_MIN_FONT) * COLLAPSED_ADVANCE * scale_factor;
    }
    if height <= MIN_RUN_HEIGHT {
        trace!(text, height, "dropping run with negligible height");
        return None;
    }

    Some(PlacedRun {
        text: text.to_owned(),
        left: tx.e * scale_factor,
        top: (tx.f - raw_height) * scale_factor,
        width,
        height,
        font_size: font_height * scale_factor,
    })
}

/// Clusters `runs` into lines.
///
/// `view` maps PDF user space to raster pixels and `scale_factor` corrects
/// for the raster's actual width (see [`crate::coords::raster_scale_factor`]).
pub fn cluster_runs(runs: &[TextRun], view: &Affine, scale_factor: f64) -> Clustering {
    let mut lines: IndexMap<String, Line> = IndexMap::new();

    for (index, run) in runs.iter().enumerate() {
        let Some(placed) = place(run, view, scale_factor) else {
            continue;
        };
        let tolerance = MIN_TOLERANCE.max(placed.height * TOLERANCE_RATIO);

        let matched = (0..lines.len()).find(|&position| {
            lines
                .get_index(position)
                .is_some_and(|(_, line)| (line.top - placed.top).abs() < tolerance)
        });

        match matched.and_then(|position| lines.get_index_mut(position)) {
            Some((_, line)) => {
                line.text = format!("{} {}", line.text, placed.text).trim().to_owned();
                line.left = line.left.min(placed.left);
                line.right = line.right.max(placed.left + placed.width);
                line.height = line.height.max(placed.height);
                line.font_size = line.font_size.max(placed.font_size);
            }
            None => {
                let id = format!("line-{index}-{}", round_half_up(placed.top));
                lines.insert(
                    id.clone(),
                    Line {
                        id,
                        text: placed.text,
                        left: placed.left,
                        top: placed.top,
                        right: placed.left + placed.width,
                        height: placed.height,
                        font_size: placed.font_size,
                    },
                );
            }
        }
    }

    if !lines.is_empty() {
        debug!(runs = runs.len(), lines = lines.len(), "clustered runs into lines");
        return Clustering {
            mode: ClusterMode::Lines,
            lines: lines.into_values().map(pad_line).collect(),
        };
    }

    let boxes: Vec<Line> = runs
        .iter()
        .enumerate()
        .filter_map(|(index, run)| {
            place(run, view, scale_factor).map(|placed| run_box(index, placed))
        })
        .collect();
    let mode = if boxes.is_empty() { ClusterMode::Empty } else { ClusterMode::PerRun };
    debug!(runs = runs.len(), boxes = boxes.len(), ?mode, "line clustering produced nothing");

    Clustering { mode, lines: boxes }
}

/// Grows a merged line to the minimum hit target, keeping it vertically centred.
fn pad_line(line: Line) -> Line {
    let width = line.width().max(MIN_BOX_WIDTH);
    let height = line.height.max(MIN_BOX_HEIGHT);
    let top = line.top - (height - line.height) / 2.0;

    Line {
        right: line.left + width,
        top,
        height,
        font_size: line.font_size.max(MIN_FONT_SIZE),
        ..line
    }
}

fn run_box(index: usize, placed: PlacedRun) -> Line {
    let width = placed.width.max(MIN_BOX_WIDTH);

    Line {
        id: format!(
            "item-{index}-{}-{}",
            round_half_up(placed.left),
            round_half_up(placed.top)
        ),
        text: placed.text,
        left: placed.left,
        top: placed.top,
        right: placed.left + width,
        height: placed.height.max(MIN_BOX_HEIGHT),
        font_size: placed.font_size.max(MIN_FONT_SIZE),
    }
}
