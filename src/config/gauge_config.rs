//! Gauge Configuration - every tunable of the reader as TOML values
//!
//! Each section implements `Default` with the values the reader has always
//! shipped with, so a missing or empty config file changes nothing.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::defaults;

/// Environment variable naming a config file.
pub const CONFIG_ENV_VAR: &str = "GAUGE_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "gauge_config.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one gauge installation.
///
/// Load with `GaugeConfig::load()` which searches:
/// 1. `$GAUGE_CONFIG` env var
/// 2. `./gauge_config.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GaugeConfig {
    /// Watched directory and hand-off tuning
    #[serde(default)]
    pub watch: WatchConfig,

    /// Output locations
    #[serde(default)]
    pub storage: StorageConfig,

    /// Dial calibration
    #[serde(default)]
    pub calibration: CalibrationConfig,

    /// Needle detection parameters
    #[serde(default)]
    pub vision: VisionConfig,

    /// Sanity band, warn threshold and tick rate
    #[serde(default)]
    pub alert: AlertConfig,

    /// Work-order publishing
    #[serde(default)]
    pub publish: PublishConfig,
}

impl GaugeConfig {
    /// Load configuration using the standard search order:
    /// 1. `$GAUGE_CONFIG` environment variable
    /// 2. `./gauge_config.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded gauge config from {}", CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded gauge config from ./{}", LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    ///
    /// Unknown keys are logged as warnings; range problems are errors.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(contents)
            .map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the full config (defaults included) to TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate every section, collecting all problems at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        let w = &self.watch;
        if w.canonical_name.trim().is_empty() {
            errors.push("watch.canonical_name must not be empty".to_string());
        }
        if w.extensions.is_empty() {
            errors.push("watch.extensions must list at least one extension".to_string());
        }
        for (name, v) in [
            ("watch.poll_interval_ms", w.poll_interval_ms),
            ("watch.stability_poll_ms", w.stability_poll_ms),
            ("watch.relocate_backoff_ms", w.relocate_backoff_ms),
        ] {
            if v == 0 {
                errors.push(format!("{name} must be > 0"));
            }
        }
        if w.stability_max_polls == 0 {
            errors.push("watch.stability_max_polls must be > 0".to_string());
        }
        if w.relocate_attempts == 0 {
            errors.push("watch.relocate_attempts must be > 0".to_string());
        }

        let c = &self.calibration;
        for (name, angle) in [("calibration.min_angle", c.min_angle), ("calibration.max_angle", c.max_angle)] {
            if !angle.is_finite() || !(0.0..360.0).contains(&angle) {
                errors.push(format!("{name} = {angle} must be in [0, 360)"));
            }
        }
        if !c.min_value.is_finite() || !c.max_value.is_finite() || c.min_value >= c.max_value {
            errors.push(format!(
                "calibration.min_value ({}) must be less than max_value ({})",
                c.min_value, c.max_value
            ));
        }

        let v = &self.vision;
        if v.resolution < 64 {
            errors.push(format!("vision.resolution = {} must be >= 64", v.resolution));
        }
        if v.blur_kernel == 0 || v.privacy_blur_kernel == 0 {
            errors.push("vision blur kernels must be >= 1".to_string());
        }
        if !(v.canny_low >= 0.0 && v.canny_low <= v.canny_high) {
            errors.push(format!(
                "vision.canny_low ({}) must be within [0, canny_high ({})]",
                v.canny_low, v.canny_high
            ));
        }
        if v.hough_threshold == 0 {
            errors.push("vision.hough_threshold must be > 0".to_string());
        }

        let a = &self.alert;
        if !a.sanity_min.is_finite() || !a.sanity_max.is_finite() || a.sanity_min >= a.sanity_max {
            errors.push(format!(
                "alert.sanity_min ({}) must be less than sanity_max ({})",
                a.sanity_min, a.sanity_max
            ));
        }
        if !a.default_threshold.is_finite() {
            errors.push("alert.default_threshold must be a finite number".to_string());
        }
        if a.tick_interval_ms == 0 {
            errors.push("alert.tick_interval_ms must be > 0".to_string());
        }

        let p = &self.publish;
        if p.enabled && p.topic.trim().is_empty() {
            errors.push("publish.topic must not be empty when publishing is enabled".to_string());
        }
        if p.timeout_secs == 0 {
            errors.push("publish.timeout_secs must be > 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Watch Config
// ============================================================================

/// How new files are discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchMode {
    /// OS notifications, falling back to polling if the watcher cannot start
    #[default]
    Auto,
    /// OS notifications only
    Events,
    /// Periodic directory listing only
    Poll,
}

/// Watched directory and the canonical-slot hand-off.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Directory watched (non-recursively) for new images
    pub dir: PathBuf,
    /// File name of the canonical slot inside `dir`
    pub canonical_name: String,
    /// Accepted extensions, matched case-insensitively
    pub extensions: Vec<String>,
    pub mode: WatchMode,
    pub poll_interval_ms: u64,
    /// Duplicate triggers for one path inside this window are ignored
    pub debounce_ms: u64,
    pub stability_poll_ms: u64,
    pub stability_max_polls: u32,
    pub relocate_attempts: u32,
    pub relocate_backoff_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            canonical_name: defaults::CANONICAL_NAME.to_string(),
            extensions: vec!["jpg".to_string()],
            mode: WatchMode::Auto,
            poll_interval_ms: defaults::WATCH_POLL_INTERVAL_MS,
            debounce_ms: defaults::DEBOUNCE_WINDOW_MS,
            stability_poll_ms: defaults::STABILITY_POLL_MS,
            stability_max_polls: defaults::STABILITY_MAX_POLLS,
            relocate_attempts: defaults::RELOCATE_ATTEMPTS,
            relocate_backoff_ms: defaults::RELOCATE_BACKOFF_MS,
        }
    }
}

impl WatchConfig {
    /// Absolute-or-relative path of the canonical slot.
    pub fn canonical_path(&self) -> PathBuf {
        self.dir.join(&self.canonical_name)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn stability_interval(&self) -> Duration {
        Duration::from_millis(self.stability_poll_ms)
    }

    pub fn relocate_backoff(&self) -> Duration {
        Duration::from_millis(self.relocate_backoff_ms)
    }
}

// ============================================================================
// Storage Config
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Where processed images are archived
    pub archive_dir: PathBuf,
    /// Single-value output file, fully overwritten every cycle
    pub value_file: PathBuf,
    /// Where the headless renderer writes the latest annotated frame
    pub display_image: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            archive_dir: PathBuf::from("archive"),
            value_file: PathBuf::from("value.txt"),
            display_image: None,
        }
    }
}

// ============================================================================
// Calibration Config
// ============================================================================

/// Dial calibration against the normalized frame.
///
/// Angles are degrees clockwise from straight up. The dead zone is the arc
/// from `max_angle` clockwise to `min_angle`, so the sweep normally crosses
/// the 0°/360° wrap (`max_angle < min_angle`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub min_angle: f64,
    pub max_angle: f64,
    pub min_value: f64,
    pub max_value: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            min_angle: 225.0,
            max_angle: 137.0,
            min_value: 0.0,
            max_value: 120.0,
        }
    }
}

// ============================================================================
// Vision Config
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// Side length of the square frame every image is resized to
    pub resolution: u32,
    /// Smoothing kernel applied before edge detection
    pub blur_kernel: u32,
    pub canny_low: f32,
    pub canny_high: f32,
    /// Minimum accumulator votes for a line
    pub hough_threshold: u32,
    pub min_line_length: u32,
    pub max_line_gap: u32,
    /// Kernel for the privacy blur (archive and composite display)
    pub privacy_blur_kernel: u32,
    /// Archive a blurred copy instead of moving the original
    pub blur_archive: bool,
    /// Show the annotated frame next to its blurred copy
    pub composite_display: bool,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            resolution: 500,
            blur_kernel: 5,
            canny_low: 50.0,
            canny_high: 150.0,
            hough_threshold: 80,
            min_line_length: 80,
            max_line_gap: 20,
            privacy_blur_kernel: 21,
            blur_archive: false,
            composite_display: false,
        }
    }
}

// ============================================================================
// Alert Config
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Readings below this are treated as camera/lighting artifacts
    pub sanity_min: f64,
    /// Readings above this are treated as camera/lighting artifacts
    pub sanity_max: f64,
    /// Initial warn threshold; operators may change it at runtime
    pub default_threshold: f64,
    pub tick_interval_ms: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            sanity_min: 15.0,
            sanity_max: 66.0,
            default_threshold: 25.0,
            tick_interval_ms: defaults::TICK_INTERVAL_MS,
        }
    }
}

impl AlertConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

// ============================================================================
// Publish Config
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub enabled: bool,
    /// HTTP endpoint of the message-bus bridge
    pub endpoint: String,
    pub topic: String,
    pub timeout_secs: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "http://localhost:1886/publish".to_string(),
            topic: "meter_workorder".to_string(),
            timeout_secs: 5,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = GaugeConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_yields_defaults() {
        let config = GaugeConfig::from_toml_str("").unwrap();
        assert_eq!(config.watch.canonical_name, "latest.jpg");
        assert_eq!(config.calibration.min_angle, 225.0);
        assert_eq!(config.calibration.max_angle, 137.0);
        assert_eq!(config.vision.resolution, 500);
        assert_eq!(config.alert.default_threshold, 25.0);
        assert_eq!(config.publish.topic, "meter_workorder");
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = GaugeConfig::from_toml_str(
            r#"
[alert]
default_threshold = 30.0

[watch]
mode = "poll"
"#,
        )
        .unwrap();
        assert_eq!(config.alert.default_threshold, 30.0);
        assert_eq!(config.alert.sanity_min, 15.0);
        assert_eq!(config.watch.mode, WatchMode::Poll);
        assert_eq!(config.watch.debounce_ms, 1500);
    }

    #[test]
    fn test_inverted_value_range_rejected() {
        let mut config = GaugeConfig::default();
        config.calibration.min_value = 100.0;
        config.calibration.max_value = 10.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("calibration.min_value"));
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = GaugeConfig::default();
        config.calibration.min_angle = 400.0;
        config.alert.sanity_min = 70.0;
        config.vision.resolution = 10;
        match config.validate() {
            Err(ConfigError::Validation(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("expected validation errors, got {other:?}"),
        }
    }

    #[test]
    fn test_wrapping_calibration_is_valid() {
        // max_angle < min_angle is the expected shape
        let config = GaugeConfig::default();
        assert!(config.calibration.max_angle < config.calibration.min_angle);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_roundtrip_preserves_values() {
        let mut config = GaugeConfig::default();
        config.vision.blur_archive = true;
        let text = config.to_toml().unwrap();
        let back = GaugeConfig::from_toml_str(&text).unwrap();
        assert!(back.vision.blur_archive);
    }

    #[test]
    fn test_canonical_path_joins_dir() {
        let mut w = WatchConfig::default();
        w.dir = PathBuf::from("/srv/gauge");
        assert_eq!(w.canonical_path(), PathBuf::from("/srv/gauge/latest.jpg"));
    }
}
