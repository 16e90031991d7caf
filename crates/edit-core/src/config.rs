//! Editor configuration: render scale and canvas sizing.
//!
//! Configuration can be built programmatically, read from environment
//! variables, or loaded from a TOML file. Missing keys fall back to the
//! defaults below and unknown keys are ignored.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

pub const RENDER_SCALE_ENV: &str = "RETEXT_RENDER_SCALE";
pub const VIEWPORT_WIDTH_ENV: &str = "RETEXT_VIEWPORT_WIDTH";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Scale handed to the page decoder when rasterising.
    pub render_scale: f64,
    /// Width of the host area the canvas sits in, in canvas pixels.
    pub viewport_width: f64,
    pub min_canvas_width: f64,
    pub max_canvas_width: f64,
    /// Horizontal space the host reserves around the canvas.
    pub viewport_gutter: f64,
    /// Height/width ratio assumed before a page has been decoded (A-series paper).
    pub placeholder_aspect: f64,
    pub min_canvas_height: f64,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            render_scale: 1.2,
            viewport_width: 900.0,
            min_canvas_width: 320.0,
            max_canvas_width: 1100.0,
            viewport_gutter: 24.0,
            placeholder_aspect: 1.4142,
            min_canvas_height: 480.0,
        }
    }
}

impl EditorConfig {
    pub fn with_render_scale(mut self, scale: f64) -> Self {
        self.render_scale = scale;
        self
    }

    pub fn with_viewport_width(mut self, width: f64) -> Self {
        self.viewport_width = width;
        self
    }

    /// Canvas width for the configured viewport.
    pub fn canvas_width(&self) -> f64 {
        self.canvas_width_for(self.viewport_width)
    }

    pub fn canvas_width_for(&self, viewport_width: f64) -> f64 {
        (viewport_width - self.viewport_gutter).clamp(self.min_canvas_width, self.max_canvas_width)
    }

    /// Canvas height shown before any page has been decoded.
    pub fn placeholder_height(&self, canvas_width: f64) -> f64 {
        (canvas_width * self.placeholder_aspect).round().max(self.min_canvas_height)
    }

    /// Canvas height that keeps the raster's aspect ratio at `canvas_width`.
    pub fn fitted_height(&self, canvas_width: f64, raster_width: u32, raster_height: u32) -> f64 {
        if raster_width == 0 {
            return self.placeholder_height(canvas_width);
        }
        (f64::from(raster_height) / f64::from(raster_width) * canvas_width).round()
    }

    /// Loads configuration from environment variables.
    ///
    /// - `RETEXT_RENDER_SCALE`: decoder render scale (default: 1.2)
    /// - `RETEXT_VIEWPORT_WIDTH`: host viewport width (default: 900)
    ///
    /// # Errors
    /// Returns an error if a variable is set to something that is not a
    /// positive number.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().merge_env()
    }

    /// Applies any environment overrides on top of `self`.
    pub fn merge_env(mut self) -> Result<Self, ConfigError> {
        if let Ok(value) = std::env::var(RENDER_SCALE_ENV) {
            self.render_scale = parse_positive(RENDER_SCALE_ENV, &value)?;
        }
        if let Ok(value) = std::env::var(VIEWPORT_WIDTH_ENV) {
            self.viewport_width = parse_positive(VIEWPORT_WIDTH_ENV, &value)?;
        }
        Ok(self)
    }

    /// Loads configuration from a TOML file.
    ///
    /// ```toml
    /// render_scale = 1.5
    /// viewport_width = 1280
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string(self).map_err(|err| ConfigError::InvalidValue(err.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("render_scale", self.render_scale),
            ("viewport_width", self.viewport_width),
            ("min_canvas_width", self.min_canvas_width),
            ("max_canvas_width", self.max_canvas_width),
            ("placeholder_aspect", self.placeholder_aspect),
        ];
        for (key, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::InvalidValue(key.to_owned()));
            }
        }
        if self.min_canvas_width > self.max_canvas_width {
            return Err(ConfigError::InvalidValue("min_canvas_width".to_owned()));
        }
        if !self.viewport_gutter.is_finite() || self.viewport_gutter < 0.0 {
            return Err(ConfigError::InvalidValue("viewport_gutter".to_owned()));
        }
        Ok(())
    }
}

fn parse_positive(key: &str, value: &str) -> Result<f64, ConfigError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|parsed| parsed.is_finite() && *parsed > 0.0)
        .ok_or_else(|| ConfigError::InvalidValue(key.to_owned()))
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for configuration key: {0}")]
    InvalidValue(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("cannot parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    fn canvas_width_clamps_viewport_minus_gutter() {
        let config = EditorConfig::default();

        assert_eq!(config.canvas_width(), 876.0);
        assert_eq!(config.canvas_width_for(200.0), 320.0);
        assert_eq!(config.canvas_width_for(4000.0), 1100.0);
    }

    #[test]
    fn heights_follow_placeholder_then_raster_aspect() {
        let config = EditorConfig::default();

        assert_eq!(config.placeholder_height(876.0), 1239.0);
        assert_eq!(config.placeholder_height(320.0), 480.0);
        assert_eq!(config.fitted_height(876.0, 734, 950), 1134.0);
    }

    #[test]
    fn builder_methods_override_defaults() {
        let config = EditorConfig::default().with_render_scale(2.0).with_viewport_width(1300.0);

        assert_eq!(config.render_scale, 2.0);
        assert_eq!(config.canvas_width(), 1100.0);
    }

    #[test]
    fn from_toml_defaults_missing_keys_and_ignores_unknown() {
        let config = EditorConfig::from_toml(
            r#"
            # editor settings
            render_scale = 1.5
            theme = "dark"
            "#,
        )
        .expect("toml should parse");

        assert_eq!(config.render_scale, 1.5);
        assert_eq!(config.viewport_width, 900.0);
    }

    #[test]
    fn from_toml_rejects_nonpositive_scale() {
        let err = EditorConfig::from_toml("render_scale = 0").expect_err("zero scale should fail");

        assert!(matches!(err, ConfigError::InvalidValue(key) if key == "render_scale"));
    }

    #[test]
    fn from_toml_reports_syntax_errors() {
        let err = EditorConfig::from_toml("render_scale = ").expect_err("bad toml should fail");

        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let path = dir.path().join("retext.toml");
        let config = EditorConfig::default().with_render_scale(1.75);

        fs::write(&path, config.to_toml().expect("config should serialize"))
            .expect("config should be written");
        let loaded = EditorConfig::from_file(&path).expect("config should load");

        assert_eq!(loaded, config);
    }

    #[test]
    #[serial]
    fn from_env_reads_overrides() {
        let _guard = EnvGuard::new(&[RENDER_SCALE_ENV, VIEWPORT_WIDTH_ENV]);
        env::set_var(RENDER_SCALE_ENV, "2.5");
        env::remove_var(VIEWPORT_WIDTH_ENV);

        let config = EditorConfig::from_env().expect("env should parse");

        assert_eq!(config.render_scale, 2.5);
        assert_eq!(config.viewport_width, 900.0);
    }

    #[test]
    #[serial]
    fn from_env_rejects_garbage() {
        let _guard = EnvGuard::new(&[RENDER_SCALE_ENV, VIEWPORT_WIDTH_ENV]);
        env::remove_var(RENDER_SCALE_ENV);
        env::set_var(VIEWPORT_WIDTH_ENV, "wide");

        let err = EditorConfig::from_env().expect_err("garbage should fail");

        assert!(matches!(err, ConfigError::InvalidValue(key) if key == VIEWPORT_WIDTH_ENV));
    }

    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(names: &[&str]) -> Self {
            Self {
                vars: names.iter().map(|name| (name.to_string(), env::var(name).ok())).collect(),
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (name, value) in &self.vars {
                match value {
                    Some(value) => env::set_var(name, value),
                    None => env::remove_var(name),
                }
            }
        }
    }
}
