use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Tunables for the frame-differencing engine. Width and height are fixed for
/// the lifetime of an engine.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_capture_interval_ms")]
    pub capture_interval_ms: u64,
    /// Per-pixel weighted difference at or above which a pixel counts as motion.
    #[serde(default = "default_sensitivity")]
    pub sensitivity: f64,
    #[serde(default)]
    pub weighting: WeightScheme,
    #[serde(default)]
    pub heatmap: HeatmapStyle,
    #[serde(default = "default_true")]
    pub emit_box: bool,
    #[serde(default = "default_box_color")]
    pub box_color: String,
    /// Split the pixel pass across threads for large frames.
    #[serde(default = "default_true")]
    pub parallel: bool,
}

/// Channel weights applied to the per-channel absolute difference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightScheme {
    /// wR = wG = wB = 1/3.
    #[default]
    Equal,
    /// wR = 0.3, wG = 0.6, wB = 0.1.
    Perceptual,
}

impl WeightScheme {
    /// Returns `[wR, wG, wB]`.
    pub fn weights(self) -> [f64; 3] {
        match self {
            WeightScheme::Equal => [1.0 / 3.0; 3],
            WeightScheme::Perceptual => [0.3, 0.6, 0.1],
        }
    }
}

/// How the normalized intensity is written into the diff buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeatmapStyle {
    /// R = G = B = intensity.
    #[default]
    Grayscale,
    /// Intensity in the green channel only, red and blue zeroed.
    Green,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_source_mode")]
    pub mode: String,
    /// Still-image endpoint polled in `http` mode.
    #[serde(default)]
    pub url: String,
    /// Image directory replayed in `directory` mode.
    #[serde(default)]
    pub directory: String,
    /// Scale decoded images to the engine size instead of rejecting them.
    #[serde(default = "default_true")]
    pub resize: bool,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_snapshot_directory")]
    pub directory: String,
    #[serde(default = "default_every_n_cycles")]
    pub every_n_cycles: u64,
    #[serde(default = "default_true")]
    pub only_on_motion: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_status_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            capture_interval_ms: default_capture_interval_ms(),
            sensitivity: default_sensitivity(),
            weighting: WeightScheme::default(),
            heatmap: HeatmapStyle::default(),
            emit_box: true,
            box_color: default_box_color(),
            parallel: true,
        }
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: default_snapshot_directory(),
            every_n_cycles: default_every_n_cycles(),
            only_on_motion: true,
        }
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_status_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl EngineConfig {
    pub fn capture_interval(&self) -> Duration {
        Duration::from_millis(self.capture_interval_ms)
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "frame size must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        if self.capture_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "capture_interval_ms must be positive".into(),
            ));
        }
        if !self.sensitivity.is_finite() || self.sensitivity <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "sensitivity must be a positive number, got {}",
                self.sensitivity
            )));
        }
        parse_hex_color(&self.box_color)?;
        Ok(())
    }

    /// The box color as RGB bytes.
    pub fn box_rgb(&self) -> Result<[u8; 3], ConfigError> {
        parse_hex_color(&self.box_color)
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        let config = Self::from_toml(&content)?;
        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()?;
        if self.snapshot.every_n_cycles == 0 {
            return Err(ConfigError::Invalid(
                "snapshot.every_n_cycles must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Parse `#rrggbb` into RGB bytes.
pub fn parse_hex_color(s: &str) -> Result<[u8; 3], ConfigError> {
    let invalid = || ConfigError::Invalid(format!("box_color must look like #rrggbb, got {s:?}"));
    let hex = s.strip_prefix('#').ok_or_else(invalid)?;
    if hex.len() != 6 || !hex.is_ascii() {
        return Err(invalid());
    }
    let mut rgb = [0u8; 3];
    for (i, channel) in rgb.iter_mut().enumerate() {
        *channel = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).map_err(|_| invalid())?;
    }
    Ok(rgb)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_width() -> u32 {
    400
}
fn default_height() -> u32 {
    300
}
fn default_capture_interval_ms() -> u64 {
    100
}
fn default_sensitivity() -> f64 {
    16.0
}
fn default_box_color() -> String {
    "#ff0000".into()
}
fn default_source_mode() -> String {
    "http".into()
}
fn default_timeout_ms() -> u64 {
    2000
}
fn default_snapshot_directory() -> String {
    "snapshots/".into()
}
fn default_every_n_cycles() -> u64 {
    5
}
fn default_status_port() -> u16 {
    8090
}
fn default_log_level() -> String {
    "info".into()
}
fn default_true() -> bool {
    true
}
