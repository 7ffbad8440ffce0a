//! Pipeline configuration with TOML, environment variable, and default sources.
//!
//! Precedence, lowest first: built-in defaults, the `[softmax]` table of a
//! TOML file, `QSOFTMAX_*` environment variables. Command-line flags are
//! applied on top by the driver.

use std::path::Path;
use std::{env, fmt, fs};

use serde::{Deserialize, Serialize};

use crate::{DType, Device, QSoftmaxError, RoundingMode};

/// Environment variable naming a configuration file.
pub const CONFIG_PATH_ENV: &str = "QSOFTMAX_CONFIG";

// ── Errors ──────────────────────────────────────────────────────────

/// Errors produced by configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid environment variable value for {key}: {value}")]
    InvalidEnvVar { key: String, value: String },
}

impl From<ConfigError> for QSoftmaxError {
    fn from(err: ConfigError) -> Self {
        QSoftmaxError::Config(err.to_string())
    }
}

// ── Sample generator selection ──────────────────────────────────────

/// Which sample sequence the driver feeds into the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorKind {
    /// `cos(i / 10)` for `i = 0, 1, 2, ...`
    #[default]
    Cosine,
    /// `1, 2, 3, ...`
    Ramp,
    /// All zeros; exercises the degenerate-scale path.
    Zeros,
}

impl fmt::Display for GeneratorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cosine => write!(f, "cosine"),
            Self::Ramp => write!(f, "ramp"),
            Self::Zeros => write!(f, "zeros"),
        }
    }
}

impl std::str::FromStr for GeneratorKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" | "cos" => Ok(Self::Cosine),
            "ramp" => Ok(Self::Ramp),
            "zeros" | "zero" => Ok(Self::Zeros),
            other => Err(ConfigError::Validation(format!("unknown generator: {other}"))),
        }
    }
}

// ── Logging ─────────────────────────────────────────────────────────

/// Logging output settings consumed by the driver's subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive, e.g. `info` or `qsoftmax_runtime=debug`.
    pub level: String,
    /// One of `pretty`, `compact`, `json`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "warn".to_string(), format: "compact".to_string() }
    }
}

// ── TOML wrapper ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TomlWrapper {
    softmax: PipelineConfig,
}

// ── PipelineConfig ──────────────────────────────────────────────────

/// Full configuration of one quantize → softmax → read-back run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub device: Device,
    /// Element type the input is quantized to before execution.
    pub dtype: DType,
    pub batch: usize,
    pub channels: usize,
    /// Softmax reduction axis; checked against the input rank at bind time.
    pub axis: usize,
    /// Output rescale applied to the softmax probabilities.
    pub output_scale: f32,
    pub rounding: RoundingMode,
    pub generator: GeneratorKind,
    /// Write the result over the source buffer instead of a separate one.
    pub in_place: bool,
    pub timeout_ms: Option<u64>,
    /// Upper bound on bytes staged in one execution context.
    pub memory_limit_mb: Option<u64>,
    /// Force a kernel provider by name instead of automatic selection.
    pub kernel: Option<String>,
    pub logging: LoggingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            device: Device::Cpu,
            dtype: DType::U8,
            batch: 3,
            channels: 10,
            axis: 1,
            output_scale: 127.0,
            rounding: RoundingMode::HalfToEven,
            generator: GeneratorKind::Cosine,
            in_place: true,
            timeout_ms: None,
            memory_limit_mb: None,
            kernel: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl PipelineConfig {
    // ── Constructors ────────────────────────────────────────────

    /// Load configuration from a TOML file containing a `[softmax]` table.
    ///
    /// A missing file yields the defaults.
    pub fn from_toml(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::warn!("Config file not found: {}; using defaults", path.display());
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let wrapper: TomlWrapper = toml::from_str(text)?;
        Ok(wrapper.softmax)
    }

    /// Serialize to a TOML string wrapped in `[softmax]`.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        let wrapper = TomlWrapper { softmax: self.clone() };
        Ok(toml::to_string_pretty(&wrapper)?)
    }

    /// Defaults, then `path` (or `QSOFTMAX_CONFIG`), then environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let from_env_path = env::var(CONFIG_PATH_ENV).ok();
        let mut cfg = match path.or(from_env_path.as_deref().map(Path::new)) {
            Some(p) => Self::from_toml(p)?,
            None => Self::default(),
        };
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Overlay any `QSOFTMAX_*` environment variables onto `self`.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(v) = env::var("QSOFTMAX_DEVICE") {
            self.device = v.parse().map_err(|_| Self::invalid("QSOFTMAX_DEVICE", &v))?;
        }
        if let Ok(v) = env::var("QSOFTMAX_DTYPE") {
            self.dtype = v.parse().map_err(|_| Self::invalid("QSOFTMAX_DTYPE", &v))?;
        }
        if let Ok(v) = env::var("QSOFTMAX_BATCH") {
            self.batch = Self::parse_env("QSOFTMAX_BATCH", &v)?;
        }
        if let Ok(v) = env::var("QSOFTMAX_CHANNELS") {
            self.channels = Self::parse_env("QSOFTMAX_CHANNELS", &v)?;
        }
        if let Ok(v) = env::var("QSOFTMAX_AXIS") {
            self.axis = Self::parse_env("QSOFTMAX_AXIS", &v)?;
        }
        if let Ok(v) = env::var("QSOFTMAX_OUTPUT_SCALE") {
            self.output_scale = Self::parse_env("QSOFTMAX_OUTPUT_SCALE", &v)?;
        }
        if let Ok(v) = env::var("QSOFTMAX_ROUNDING") {
            self.rounding = v.parse().map_err(|_| Self::invalid("QSOFTMAX_ROUNDING", &v))?;
        }
        if let Ok(v) = env::var("QSOFTMAX_GENERATOR") {
            self.generator = v.parse()?;
        }
        if let Ok(v) = env::var("QSOFTMAX_IN_PLACE") {
            self.in_place = Self::parse_env_bool("QSOFTMAX_IN_PLACE", &v)?;
        }
        if let Ok(v) = env::var("QSOFTMAX_TIMEOUT_MS") {
            self.timeout_ms = Some(Self::parse_env("QSOFTMAX_TIMEOUT_MS", &v)?);
        }
        if let Ok(v) = env::var("QSOFTMAX_MEMORY_LIMIT_MB") {
            self.memory_limit_mb = Some(Self::parse_env("QSOFTMAX_MEMORY_LIMIT_MB", &v)?);
        }
        if let Ok(v) = env::var("QSOFTMAX_KERNEL") {
            self.kernel = Some(v);
        }
        if let Ok(v) = env::var("QSOFTMAX_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Ok(v) = env::var("QSOFTMAX_LOG_FORMAT") {
            self.logging.format = v;
        }
        Ok(())
    }

    // ── Validation ──────────────────────────────────────────────

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch == 0 || self.channels == 0 {
            return Err(ConfigError::Validation("batch and channels must be >= 1".into()));
        }
        if !self.output_scale.is_finite() || self.output_scale <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "output_scale must be positive and finite, got {}",
                self.output_scale
            )));
        }
        if self.timeout_ms == Some(0) {
            return Err(ConfigError::Validation("timeout_ms must be > 0 when set".into()));
        }
        if self.memory_limit_mb == Some(0) {
            return Err(ConfigError::Validation("memory_limit_mb must be > 0 when set".into()));
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "compact" | "json") {
            return Err(ConfigError::Validation(format!(
                "unknown log format: {}",
                self.logging.format
            )));
        }
        Ok(())
    }

    /// Memory limit converted to bytes.
    pub fn memory_limit_bytes(&self) -> Option<usize> {
        self.memory_limit_mb
            .map(|mb| usize::try_from(mb.saturating_mul(1024 * 1024)).unwrap_or(usize::MAX))
    }

    // ── Helpers ─────────────────────────────────────────────────

    fn invalid(key: &str, value: &str) -> ConfigError {
        ConfigError::InvalidEnvVar { key: key.to_string(), value: value.to_string() }
    }

    fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
        value.trim().parse::<T>().map_err(|_| Self::invalid(key, value))
    }

    fn parse_env_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(Self::invalid(key, value)),
        }
    }
}
