use std::fs;
use std::time::Duration;

use handfuse_engine::fusion::{FusionPolicy, DEFAULT_SECONDARY_THRESHOLD};
use handfuse_engine::grade::{
    GradingThresholds, DEFAULT_BOARD_CATEGORY_MAX, DEFAULT_MIN_DURATION_SECONDS,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CONFIG_PATH_ENV: &str = "HANDFUSE_CONFIG";
pub const MATCH_WINDOW_ENV: &str = "HANDFUSE_MATCH_WINDOW_MS";
pub const STALENESS_WINDOW_ENV: &str = "HANDFUSE_STALENESS_WINDOW_MS";
pub const SECONDARY_THRESHOLD_ENV: &str = "HANDFUSE_SECONDARY_THRESHOLD";
pub const MIN_DURATION_ENV: &str = "HANDFUSE_MIN_DURATION_SECS";
pub const BOARD_CATEGORY_MAX_ENV: &str = "HANDFUSE_BOARD_CATEGORY_MAX";
pub const MISMATCH_THRESHOLD_ENV: &str = "HANDFUSE_MISMATCH_THRESHOLD";

pub const DEFAULT_MISMATCH_THRESHOLD: u32 = 3;
pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_DISCONNECT_GRACE: Duration = Duration::from_secs(600);

/// Settings handed to every pipeline component at construction.
///
/// The match and staleness windows have no defaults; operators must choose
/// them. Everything else falls back to the documented values.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub match_window: Duration,
    pub staleness_window: Duration,
    pub secondary_confidence_threshold: f64,
    pub min_duration_seconds: u32,
    pub board_category_max: u8,
    /// Consecutive ambiguous fusions before a table reports degraded fusion
    pub mismatch_threshold: u32,
    pub health_check_interval: Duration,
    /// How long a table may stay disconnected before it is reaped
    pub disconnect_grace: Duration,
}

impl PipelineConfig {
    pub fn new(match_window: Duration, staleness_window: Duration) -> Self {
        Self {
            match_window,
            staleness_window,
            secondary_confidence_threshold: DEFAULT_SECONDARY_THRESHOLD,
            min_duration_seconds: DEFAULT_MIN_DURATION_SECONDS,
            board_category_max: DEFAULT_BOARD_CATEGORY_MAX,
            mismatch_threshold: DEFAULT_MISMATCH_THRESHOLD,
            health_check_interval: DEFAULT_HEALTH_CHECK_INTERVAL,
            disconnect_grace: DEFAULT_DISCONNECT_GRACE,
        }
    }

    pub fn fusion_policy(&self) -> FusionPolicy {
        FusionPolicy::new(self.secondary_confidence_threshold)
    }

    pub fn grading_thresholds(&self) -> GradingThresholds {
        GradingThresholds {
            min_duration_seconds: self.min_duration_seconds,
            board_category_max: self.board_category_max,
            ..GradingThresholds::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.match_window.is_zero() {
            return Err(ConfigError::Invalid("match_window must be > 0".into()));
        }
        if self.staleness_window < self.match_window {
            return Err(ConfigError::Invalid(
                "staleness_window must not be shorter than match_window".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.secondary_confidence_threshold) {
            return Err(ConfigError::Invalid(format!(
                "secondary_confidence_threshold must lie in [0.0, 1.0], got {}",
                self.secondary_confidence_threshold
            )));
        }
        if !(1..=10).contains(&self.board_category_max) {
            return Err(ConfigError::Invalid(
                "board_category_max must be a category value 1..=10".into(),
            ));
        }
        if self.mismatch_threshold == 0 {
            return Err(ConfigError::Invalid(
                "mismatch_threshold must be >= 1".into(),
            ));
        }
        if self.health_check_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "health_check_interval must be > 0".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Missing required setting `{0}`")]
    Missing(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueSource {
    Default,
    File,
    Env,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigSources {
    pub match_window: ValueSource,
    pub staleness_window: ValueSource,
    pub secondary_confidence_threshold: ValueSource,
    pub min_duration_seconds: ValueSource,
    pub board_category_max: ValueSource,
    pub mismatch_threshold: ValueSource,
    pub health_check_interval: ValueSource,
    pub disconnect_grace: ValueSource,
}

impl Default for ConfigSources {
    fn default() -> Self {
        Self {
            match_window: ValueSource::Default,
            staleness_window: ValueSource::Default,
            secondary_confidence_threshold: ValueSource::Default,
            min_duration_seconds: ValueSource::Default,
            board_category_max: ValueSource::Default,
            mismatch_threshold: ValueSource::Default,
            health_check_interval: ValueSource::Default,
            disconnect_grace: ValueSource::Default,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfigResolved {
    pub config: PipelineConfig,
    pub sources: ConfigSources,
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    match_window_ms: Option<u64>,
    #[serde(default)]
    staleness_window_ms: Option<u64>,
    #[serde(default)]
    secondary_confidence_threshold: Option<f64>,
    #[serde(default)]
    min_duration_seconds: Option<u32>,
    #[serde(default)]
    board_category_max: Option<u8>,
    #[serde(default)]
    mismatch_threshold: Option<u32>,
    #[serde(default)]
    health_check_interval_ms: Option<u64>,
    #[serde(default)]
    disconnect_grace_ms: Option<u64>,
}

pub fn load() -> Result<PipelineConfig, ConfigError> {
    load_with_sources().map(|resolved| resolved.config)
}

/// Layers defaults, the TOML file named by `HANDFUSE_CONFIG`, then
/// `HANDFUSE_*` environment overrides.
pub fn load_with_sources() -> Result<ConfigResolved, ConfigError> {
    resolve(|key| std::env::var(key).ok())
}

/// Same layering as [`load_with_sources`] with an injectable variable lookup.
pub fn resolve<F>(lookup: F) -> Result<ConfigResolved, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    let file = match var(CONFIG_PATH_ENV) {
        Some(path) => {
            let s = fs::read_to_string(path)?;
            toml::from_str::<FileConfig>(&s)?
        }
        None => FileConfig::default(),
    };

    let mut sources = ConfigSources::default();

    let match_window = layered(
        file.match_window_ms,
        var(MATCH_WINDOW_ENV),
        &mut sources.match_window,
        MATCH_WINDOW_ENV,
    )?
    .map(Duration::from_millis)
    .ok_or(ConfigError::Missing("match_window_ms"))?;
    let staleness_window = layered(
        file.staleness_window_ms,
        var(STALENESS_WINDOW_ENV),
        &mut sources.staleness_window,
        STALENESS_WINDOW_ENV,
    )?
    .map(Duration::from_millis)
    .ok_or(ConfigError::Missing("staleness_window_ms"))?;

    let mut cfg = PipelineConfig::new(match_window, staleness_window);

    if let Some(v) = layered(
        file.secondary_confidence_threshold,
        var(SECONDARY_THRESHOLD_ENV),
        &mut sources.secondary_confidence_threshold,
        SECONDARY_THRESHOLD_ENV,
    )? {
        cfg.secondary_confidence_threshold = v;
    }
    if let Some(v) = layered(
        file.min_duration_seconds,
        var(MIN_DURATION_ENV),
        &mut sources.min_duration_seconds,
        MIN_DURATION_ENV,
    )? {
        cfg.min_duration_seconds = v;
    }
    if let Some(v) = layered(
        file.board_category_max,
        var(BOARD_CATEGORY_MAX_ENV),
        &mut sources.board_category_max,
        BOARD_CATEGORY_MAX_ENV,
    )? {
        cfg.board_category_max = v;
    }
    if let Some(v) = layered(
        file.mismatch_threshold,
        var(MISMATCH_THRESHOLD_ENV),
        &mut sources.mismatch_threshold,
        MISMATCH_THRESHOLD_ENV,
    )? {
        cfg.mismatch_threshold = v;
    }
    if let Some(ms) = file.health_check_interval_ms {
        cfg.health_check_interval = Duration::from_millis(ms);
        sources.health_check_interval = ValueSource::File;
    }
    if let Some(ms) = file.disconnect_grace_ms {
        cfg.disconnect_grace = Duration::from_millis(ms);
        sources.disconnect_grace = ValueSource::File;
    }

    cfg.validate()?;
    Ok(ConfigResolved {
        config: cfg,
        sources,
    })
}

/// Environment wins over the file; records where the value came from.
fn layered<T: std::str::FromStr>(
    from_file: Option<T>,
    from_env: Option<String>,
    source: &mut ValueSource,
    env_key: &str,
) -> Result<Option<T>, ConfigError> {
    if let Some(raw) = from_env {
        let value = raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("Invalid {env_key}: {raw:?}")))?;
        *source = ValueSource::Env;
        return Ok(Some(value));
    }
    if from_file.is_some() {
        *source = ValueSource::File;
    }
    Ok(from_file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn resolve_with(vars: &HashMap<String, String>) -> Result<ConfigResolved, ConfigError> {
        resolve(|key| vars.get(key).cloned())
    }

    #[test]
    fn windows_are_required() {
        let err = resolve_with(&env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("match_window_ms")));

        let err = resolve_with(&env(&[(MATCH_WINDOW_ENV, "3000")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("staleness_window_ms")));
    }

    #[test]
    fn env_only_config_uses_defaults_elsewhere() {
        let resolved = resolve_with(&env(&[
            (MATCH_WINDOW_ENV, "3000"),
            (STALENESS_WINDOW_ENV, "30000"),
        ]))
        .unwrap();
        assert_eq!(resolved.config.match_window, Duration::from_secs(3));
        assert_eq!(resolved.config.staleness_window, Duration::from_secs(30));
        assert_eq!(resolved.config.secondary_confidence_threshold, 0.80);
        assert_eq!(resolved.config.min_duration_seconds, 120);
        assert_eq!(resolved.config.board_category_max, 7);
        assert_eq!(resolved.sources.match_window, ValueSource::Env);
        assert_eq!(resolved.sources.min_duration_seconds, ValueSource::Default);
    }

    #[test]
    fn env_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "match_window_ms = 2000\nstaleness_window_ms = 60000\nmin_duration_seconds = 90\ndisconnect_grace_ms = 1000"
        )
        .unwrap();
        let path = file.path().to_string_lossy().to_string();

        let resolved = resolve_with(&env(&[
            (CONFIG_PATH_ENV, path.as_str()),
            (MIN_DURATION_ENV, "150"),
        ]))
        .unwrap();
        assert_eq!(resolved.config.match_window, Duration::from_secs(2));
        assert_eq!(resolved.sources.match_window, ValueSource::File);
        assert_eq!(resolved.config.min_duration_seconds, 150);
        assert_eq!(resolved.sources.min_duration_seconds, ValueSource::Env);
        assert_eq!(resolved.config.disconnect_grace, Duration::from_secs(1));
        assert_eq!(resolved.sources.disconnect_grace, ValueSource::File);
    }

    #[test]
    fn bad_values_are_rejected() {
        let err = resolve_with(&env(&[
            (MATCH_WINDOW_ENV, "3000"),
            (STALENESS_WINDOW_ENV, "30000"),
            (SECONDARY_THRESHOLD_ENV, "high"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = resolve_with(&env(&[
            (MATCH_WINDOW_ENV, "3000"),
            (STALENESS_WINDOW_ENV, "30000"),
            (SECONDARY_THRESHOLD_ENV, "1.5"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn staleness_shorter_than_match_window_is_invalid() {
        let cfg = PipelineConfig::new(Duration::from_secs(10), Duration::from_secs(5));
        assert!(cfg.validate().is_err());
        let cfg = PipelineConfig::new(Duration::ZERO, Duration::from_secs(5));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "match_window_ms = \"soon\"").unwrap();
        let path = file.path().to_string_lossy().to_string();
        let err = resolve_with(&env(&[(CONFIG_PATH_ENV, path.as_str())])).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
