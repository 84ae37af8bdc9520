//! Run configuration, loaded from JSON and passed explicitly to the processor.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub extraction: ExtractionConfig,
    pub segmentation: SegmentationPolicy,
    pub overlay: OverlayConfig,
    pub output: OutputConfig,
    pub retry: RetryConfig,
    pub watch: WatchConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub watch_dir: PathBuf,
    pub overlay_image: PathBuf,
    pub output_dir: PathBuf,
    /// Where processed sources are moved. Defaults to `PROCESSED` next to the source.
    pub archive_dir: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        PathsConfig {
            watch_dir: PathBuf::from("temp/input_pdf"),
            overlay_image: PathBuf::from("temp/signature/firma.JPG"),
            output_dir: PathBuf::from("temp/output_pdf"),
            archive_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Regex locating the identifier; capture group 1 holds the code.
    pub identifier_pattern: String,
    /// 0-based line holding the group key. `None` disables group keys.
    pub group_key_line: Option<usize>,
    pub key_prefixes: Vec<String>,
    pub min_key_length: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        ExtractionConfig {
            identifier_pattern: r"CUIT\s*-?\s*(\d+(?:[ \t]+\d+)*)".to_string(),
            group_key_line: Some(1),
            key_prefixes: vec!["AF".to_string(), "BB".to_string()],
            min_key_length: 8,
        }
    }
}

/// What to do with a page whose identifier could not be extracted while an
/// earlier page already established one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingIdentifier {
    /// Take the current identifier and continue the open block.
    #[default]
    Inherit,
    /// Take the current identifier but seal the open block first.
    ForceBoundary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationPolicy {
    pub missing_identifier: MissingIdentifier,
    /// Drop pages that have neither a key nor an inherited one.
    pub require_group_key: bool,
}

impl Default for SegmentationPolicy {
    fn default() -> Self {
        SegmentationPolicy {
            missing_identifier: MissingIdentifier::Inherit,
            require_group_key: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Placement divisor: 2.0 centers the stamp, larger values push it toward
    /// the bottom-left corner.
    pub divisor: f32,
    pub page_width: f32,
    pub page_height: f32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        // US Letter in points
        OverlayConfig {
            divisor: 2.0,
            page_width: 612.0,
            page_height: 792.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    #[default]
    Overwrite,
    Suffix,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub extension: String,
    pub on_collision: CollisionPolicy,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            extension: "pdf".to_string(),
            on_collision: CollisionPolicy::Overwrite,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: 2,
            delay_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub debounce_ms: u64,
    pub process_existing: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        WatchConfig {
            debounce_ms: 500,
            process_existing: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_dir: Option<PathBuf>,
    /// `EnvFilter` directives, overridden by `RUST_LOG`.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            log_dir: None,
            filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Read a JSON config file, expand `~` and `$VAR` in its paths and validate it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Config =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.expand_paths()?;
        config.validate()?;
        Ok(config)
    }

    pub fn expand_paths(&mut self) -> Result<(), ConfigError> {
        let paths = &mut self.paths;
        paths.watch_dir = expand_path(&paths.watch_dir)?;
        paths.overlay_image = expand_path(&paths.overlay_image)?;
        paths.output_dir = expand_path(&paths.output_dir)?;
        if let Some(dir) = &paths.archive_dir {
            paths.archive_dir = Some(expand_path(dir)?);
        }
        if let Some(dir) = &self.logging.log_dir {
            self.logging.log_dir = Some(expand_path(dir)?);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let overlay = &self.overlay;
        if !(overlay.divisor.is_finite() && overlay.divisor > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "overlay.divisor must be a positive number, got {}",
                overlay.divisor
            )));
        }
        if !(overlay.page_width > 0.0 && overlay.page_height > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "overlay page size must be positive, got {}x{}",
                overlay.page_width, overlay.page_height
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.output.extension.is_empty() || self.output.extension.contains(['/', '\\']) {
            return Err(ConfigError::Invalid(format!(
                "output.extension {:?} is not a valid file extension",
                self.output.extension
            )));
        }
        let pattern = Regex::new(&self.extraction.identifier_pattern)?;
        if pattern.captures_len() < 2 {
            return Err(ConfigError::Invalid(
                "extraction.identifier_pattern needs a capture group".to_string(),
            ));
        }
        Ok(())
    }
}

fn expand_path(path: &Path) -> Result<PathBuf, ConfigError> {
    let raw = path.to_string_lossy();
    shellexpand::full(&raw)
        .map(|expanded| PathBuf::from(expanded.as_ref()))
        .map_err(|e| ConfigError::Expand {
            value: raw.to_string(),
            reason: e.to_string(),
        })
}
