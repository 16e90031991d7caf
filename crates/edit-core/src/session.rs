//! The editor and its per-document editing session.
//!
//! [`Editor`] owns the engine and at most one [`EditSession`]. Every load and
//! export carries a [`RequestToken`]; results for anything but the latest
//! token are discarded so a slow decode for an old document cannot replace
//! the current one.

use crate::cluster::{cluster_runs, ClusterMode, Clustering};
use crate::compose::{compose, ExportFrame};
use crate::config::EditorConfig;
use crate::coords::{canvas_factor, raster_scale_factor, CanvasSize};
use doc_model::{
    CanvasObject, DrawOp, EditableBox, Line, ObjectId, PageSize, Point, RegionState, ShapeKind,
    ShapeObject, SourceLine, TextObject,
};
use indexmap::IndexMap;
use pdf_engine::{DecodeError, DecodedPage, ExportError, PageDecoder, PdfEngine, PdfWriter};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

pub const PLACEHOLDER_TEXT: &str = "Edit text";
pub const EDITED_LINE_FILL: &str = "#111827";

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("cannot decode document: {0}")]
    Decode(#[from] DecodeError),
    #[error("cannot export document: {0}")]
    Export(#[from] ExportError),
    #[error("request is no longer current")]
    StaleRequest,
    #[error("no document is loaded")]
    NoDocument,
    #[error("unknown canvas object: {0}")]
    UnknownObject(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestToken(u64);

impl RequestToken {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// A free-standing text box, as created by the "add text" action.
#[derive(Debug, Clone, PartialEq)]
pub struct TextBoxSpec {
    pub text: String,
    pub left: f64,
    pub top: f64,
    pub font_size: f64,
    pub width: Option<f64>,
    pub fill: String,
}

impl Default for TextBoxSpec {
    fn default() -> Self {
        Self {
            text: PLACEHOLDER_TEXT.to_owned(),
            left: 80.0,
            top: 80.0,
            font_size: 32.0,
            width: None,
            fill: "#1f2937".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RectangleSpec {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
    pub fill: Option<String>,
    pub stroke: Option<String>,
    pub stroke_width: f64,
}

impl Default for RectangleSpec {
    fn default() -> Self {
        Self {
            left: 140.0,
            top: 160.0,
            width: 180.0,
            height: 120.0,
            fill: Some("rgba(100,116,139,0.15)".to_owned()),
            stroke: Some("#334155".to_owned()),
            stroke_width: 2.0,
        }
    }
}

/// A scripted edit, as read from an edits file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum EditCommand {
    EditLine {
        line_id: String,
        text: String,
    },
    EditAt {
        x: f64,
        y: f64,
        text: String,
    },
    AddText {
        text: String,
        left: f64,
        top: f64,
        #[serde(default)]
        font_size: Option<f64>,
        #[serde(default)]
        width: Option<f64>,
        #[serde(default)]
        fill: Option<String>,
    },
    AddRectangle {
        #[serde(default)]
        left: Option<f64>,
        #[serde(default)]
        top: Option<f64>,
        #[serde(default)]
        width: Option<f64>,
        #[serde(default)]
        height: Option<f64>,
        #[serde(default)]
        fill: Option<String>,
        #[serde(default)]
        stroke: Option<String>,
        #[serde(default)]
        stroke_width: Option<f64>,
    },
}

pub struct Editor<E> {
    engine: E,
    config: EditorConfig,
    issued: u64,
    latest: Option<RequestToken>,
    session: Option<EditSession>,
}

impl<E: PdfEngine> Editor<E> {
    pub fn new(engine: E, config: EditorConfig) -> Self {
        Self { engine, config, issued: 0, latest: None, session: None }
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn session(&self) -> Option<&EditSession> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut EditSession> {
        self.session.as_mut()
    }

    /// Starts a load: issues a fresh token and drops the current session.
    pub fn begin_load(&mut self) -> RequestToken {
        self.issued += 1;
        let token = RequestToken(self.issued);
        self.latest = Some(token);
        if self.session.take().is_some() {
            debug!(%token, "discarded previous session");
        }
        token
    }

    /// Decodes page 1 at the configured render scale.
    pub fn decode(&self, bytes: &[u8]) -> Result<DecodedPage, DecodeError> {
        self.engine.decode(bytes, self.config.render_scale)
    }

    /// Installs a finished decode if `token` is still the latest request.
    pub fn complete_load(
        &mut self,
        token: RequestToken,
        bytes: Vec<u8>,
        result: Result<DecodedPage, DecodeError>,
    ) -> Result<&mut EditSession, SessionError> {
        if self.latest != Some(token) {
            warn!(
                %token,
                latest = ?self.latest.map(RequestToken::raw),
                "discarding stale load result"
            );
            return Err(SessionError::StaleRequest);
        }

        let page = result?;
        let session = EditSession::new(token, bytes, page, &self.config);
        info!(
            %token,
            lines = session.clustering.lines.len(),
            mode = ?session.clustering.mode,
            "document loaded"
        );
        Ok(self.session.insert(session))
    }

    pub fn load(&mut self, bytes: Vec<u8>) -> Result<&mut EditSession, SessionError> {
        let token = self.begin_load();
        let result = self.decode(&bytes);
        self.complete_load(token, bytes, result)
    }

    /// Composes the active session and hands it to the writer.
    pub fn export(&self, token: RequestToken) -> Result<Vec<u8>, SessionError> {
        let session = self.session.as_ref().ok_or(SessionError::NoDocument)?;
        if session.token != token {
            warn!(%token, active = %session.token, "refusing export for stale request");
            return Err(SessionError::StaleRequest);
        }

        let ops = session.draw_ops();
        let bytes = self.engine.write(&session.source, &ops)?;
        info!(%token, ops = ops.len(), bytes = bytes.len(), "document exported");
        Ok(bytes)
    }

    pub fn close(&mut self) {
        self.latest = None;
        self.session = None;
    }
}

/// Everything known about the one document being edited.
#[derive(Debug, Clone)]
pub struct EditSession {
    token: RequestToken,
    source: Vec<u8>,
    config: EditorConfig,
    page_size: PageSize,
    raster_width: u32,
    raster_height: u32,
    canvas: CanvasSize,
    k: f64,
    clustering: Clustering,
    regions: IndexMap<String, RegionState>,
    objects: Vec<CanvasObject>,
    next_object: u64,
    text_error: Option<String>,
}

impl EditSession {
    fn new(token: RequestToken, source: Vec<u8>, page: DecodedPage, config: &EditorConfig) -> Self {
        let canvas_width = config.canvas_width();
        let k = canvas_factor(canvas_width, page.raster_width);
        let canvas = CanvasSize {
            width: canvas_width,
            height: config.fitted_height(canvas_width, page.raster_width, page.raster_height),
        };

        let scale_factor =
            raster_scale_factor(page.raster_width, page.page_size.width_pt, page.render_scale);
        let clustering = cluster_runs(&page.text_runs, &page.view_transform, scale_factor);

        let regions = clustering
            .lines
            .iter()
            .map(|line| (line.id.clone(), RegionState::Detected))
            .collect();
        let objects = clustering
            .lines
            .iter()
            .map(|line| CanvasObject::LineMarker(line.project(k)))
            .collect();

        Self {
            token,
            source,
            config: config.clone(),
            page_size: page.page_size,
            raster_width: page.raster_width,
            raster_height: page.raster_height,
            canvas,
            k,
            clustering,
            regions,
            objects,
            next_object: 0,
            text_error: page.text_error,
        }
    }

    pub fn token(&self) -> RequestToken {
        self.token
    }

    pub fn source(&self) -> &[u8] {
        &self.source
    }

    pub fn page_size(&self) -> PageSize {
        self.page_size
    }

    pub fn raster_size(&self) -> (u32, u32) {
        (self.raster_width, self.raster_height)
    }

    pub fn canvas(&self) -> CanvasSize {
        self.canvas
    }

    /// Canvas pixels per raster pixel.
    pub fn k(&self) -> f64 {
        self.k
    }

    pub fn mode(&self) -> ClusterMode {
        self.clustering.mode
    }

    /// Detected lines in raster space.
    pub fn lines(&self) -> &[Line] {
        &self.clustering.lines
    }

    /// Detected lines projected onto the canvas.
    pub fn editable_boxes(&self) -> Vec<EditableBox> {
        self.clustering.lines.iter().map(|line| line.project(self.k)).collect()
    }

    pub fn objects(&self) -> &[CanvasObject] {
        &self.objects
    }

    pub fn region(&self, line_id: &str) -> Option<RegionState> {
        self.regions.get(line_id).copied()
    }

    pub fn text_error(&self) -> Option<&str> {
        self.text_error.as_deref()
    }

    pub fn draw_ops(&self) -> Vec<DrawOp> {
        compose(
            &self.objects,
            &ExportFrame { canvas: self.canvas, page: self.page_size, k: self.k },
        )
    }

    /// Hit-tests the detected lines at a canvas point and promotes the first
    /// match. Returns the editing object, or `None` if nothing was hit.
    pub fn pointer_down(&mut self, point: Point) -> Option<ObjectId> {
        let line_id = self
            .clustering
            .lines
            .iter()
            .find(|line| line.project(self.k).rect().contains(point))
            .map(|line| line.id.clone())?;

        self.promote(&line_id).ok()
    }

    /// Turns a detected line into an editable text object. Promoting an
    /// already promoted line returns its existing object.
    pub fn promote(&mut self, line_id: &str) -> Result<ObjectId, SessionError> {
        match self.regions.get(line_id) {
            None => return Err(SessionError::UnknownObject(line_id.to_owned())),
            Some(state) => {
                if let Some(object) = state.object() {
                    return Ok(object);
                }
            }
        }

        let line = self
            .clustering
            .lines
            .iter()
            .find(|line| line.id == line_id)
            .cloned()
            .ok_or_else(|| SessionError::UnknownObject(line_id.to_owned()))?;
        let projected = line.project(self.k);
        let id = self.allocate_id();

        let text = match line.text.trim() {
            "" => PLACEHOLDER_TEXT.to_owned(),
            trimmed => trimmed.to_owned(),
        };

        self.objects.retain(|object| {
            !matches!(object, CanvasObject::LineMarker(marker) if marker.id == line.id)
        });
        self.objects.push(CanvasObject::EditedText(TextObject {
            id,
            text,
            left: projected.left,
            top: projected.top,
            width: Some(projected.width),
            height: projected.height,
            font_size: projected.font_size,
            line_height: None,
            fill: EDITED_LINE_FILL.to_owned(),
            source: Some(SourceLine { line_id: line.id.clone(), original_rect: line.rect() }),
        }));
        self.regions.insert(line.id.clone(), RegionState::Editing { object: id });

        debug!(line = %line.id, object = %id, "promoted line to editable text");
        Ok(id)
    }

    pub fn set_text(&mut self, id: ObjectId, text: &str) -> Result<(), SessionError> {
        let object = self.text_mut(id)?;
        object.text = text.to_owned();
        let line_id = object.source.as_ref().map(|source| source.line_id.clone());

        if let Some(line_id) = line_id {
            self.regions.insert(line_id, RegionState::Edited { object: id });
        }
        Ok(())
    }

    pub fn add_text_box(&mut self) -> ObjectId {
        self.add_text(TextBoxSpec::default())
    }

    pub fn add_text(&mut self, spec: TextBoxSpec) -> ObjectId {
        let id = self.allocate_id();
        self.objects.push(CanvasObject::EditedText(TextObject {
            id,
            text: spec.text,
            left: spec.left,
            top: spec.top,
            width: spec.width,
            height: spec.font_size * crate::compose::DEFAULT_LINE_HEIGHT,
            font_size: spec.font_size,
            line_height: None,
            fill: spec.fill,
            source: None,
        }));
        id
    }

    pub fn add_rectangle(&mut self) -> ObjectId {
        self.add_shape(RectangleSpec::default())
    }

    pub fn add_shape(&mut self, spec: RectangleSpec) -> ObjectId {
        let id = self.allocate_id();
        self.objects.push(CanvasObject::Shape(ShapeObject {
            id,
            kind: ShapeKind::Rectangle,
            left: spec.left,
            top: spec.top,
            width: spec.width,
            height: spec.height,
            fill: spec.fill,
            stroke: spec.stroke,
            stroke_width: spec.stroke_width,
        }));
        id
    }

    pub fn move_object(&mut self, id: ObjectId, left: f64, top: f64) -> Result<(), SessionError> {
        match self.object_mut(id)? {
            CanvasObject::EditedText(text) => {
                text.left = left;
                text.top = top;
            }
            CanvasObject::Shape(shape) => {
                shape.left = left;
                shape.top = top;
            }
            CanvasObject::LineMarker(_) => {}
        }
        Ok(())
    }

    pub fn resize_object(
        &mut self,
        id: ObjectId,
        width: f64,
        height: f64,
    ) -> Result<(), SessionError> {
        match self.object_mut(id)? {
            CanvasObject::EditedText(text) => {
                text.width = Some(width);
                text.height = height;
            }
            CanvasObject::Shape(shape) => {
                shape.width = width;
                shape.height = height;
            }
            CanvasObject::LineMarker(_) => {}
        }
        Ok(())
    }

    pub fn set_fill(&mut self, id: ObjectId, fill: &str) -> Result<(), SessionError> {
        match self.object_mut(id)? {
            CanvasObject::EditedText(text) => text.fill = fill.to_owned(),
            CanvasObject::Shape(shape) => shape.fill = Some(fill.to_owned()),
            CanvasObject::LineMarker(_) => {}
        }
        Ok(())
    }

    /// Refits the canvas to a new viewport width.
    ///
    /// Markers are re-projected from the raster-space lines; every other
    /// object is scaled by the change in canvas width. Original line rects
    /// live in raster space and are left alone.
    pub fn resize_canvas(&mut self, viewport_width: f64) {
        let width = self.config.canvas_width_for(viewport_width);
        let ratio = width / self.canvas.width;
        self.k = canvas_factor(width, self.raster_width);
        self.canvas = CanvasSize {
            width,
            height: self.config.fitted_height(width, self.raster_width, self.raster_height),
        };

        let k = self.k;
        let lines = &self.clustering.lines;
        for object in &mut self.objects {
            match object {
                CanvasObject::LineMarker(marker) => {
                    if let Some(line) = lines.iter().find(|line| line.id == marker.id) {
                        *marker = line.project(k);
                    }
                }
                CanvasObject::EditedText(text) => {
                    text.left *= ratio;
                    text.top *= ratio;
                    text.width = text.width.map(|width| width * ratio);
                    text.height *= ratio;
                    text.font_size *= ratio;
                }
                CanvasObject::Shape(shape) => {
                    shape.left *= ratio;
                    shape.top *= ratio;
                    shape.width *= ratio;
                    shape.height *= ratio;
                }
            }
        }

        debug!(width, height = self.canvas.height, k, "resized canvas");
    }

    /// Applies one scripted edit, returning the object it touched.
    pub fn apply(&mut self, command: EditCommand) -> Result<ObjectId, SessionError> {
        match command {
            EditCommand::EditLine { line_id, text } => {
                let id = self.promote(&line_id)?;
                self.set_text(id, &text)?;
                Ok(id)
            }
            EditCommand::EditAt { x, y, text } => {
                let id = self
                    .pointer_down(Point::new(x, y))
                    .ok_or_else(|| SessionError::UnknownObject(format!("no line at ({x}, {y})")))?;
                self.set_text(id, &text)?;
                Ok(id)
            }
            EditCommand::AddText { text, left, top, font_size, width, fill } => {
                let defaults = TextBoxSpec::default();
                Ok(self.add_text(TextBoxSpec {
                    text,
                    left,
                    top,
                    font_size: font_size.unwrap_or(defaults.font_size),
                    width,
                    fill: fill.unwrap_or(defaults.fill),
                }))
            }
            EditCommand::AddRectangle { left, top, width, height, fill, stroke, stroke_width } => {
                let defaults = RectangleSpec::default();
                Ok(self.add_shape(RectangleSpec {
                    left: left.unwrap_or(defaults.left),
                    top: top.unwrap_or(defaults.top),
                    width: width.unwrap_or(defaults.width),
                    height: height.unwrap_or(defaults.height),
                    fill: fill.or(defaults.fill),
                    stroke: stroke.or(defaults.stroke),
                    stroke_width: stroke_width.unwrap_or(defaults.stroke_width),
                }))
            }
        }
    }

    fn allocate_id(&mut self) -> ObjectId {
        self.next_object += 1;
        ObjectId(self.next_object)
    }

    fn object_mut(&mut self, id: ObjectId) -> Result<&mut CanvasObject, SessionError> {
        self.objects
            .iter_mut()
            .find(|object| object.object_id() == Some(id))
            .ok_or_else(|| SessionError::UnknownObject(id.to_string()))
    }

    fn text_mut(&mut self, id: ObjectId) -> Result<&mut TextObject, SessionError> {
        match self.object_mut(id)? {
            CanvasObject::EditedText(text) => Ok(text),
            _ => Err(SessionError::UnknownObject(id.to_string())),
        }
    }
}
