use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{EngineError, Result};

/// Environment variable switching default paths to the development data set.
pub const DEV_MODE_ENV: &str = "PLAYBACK_DEV_MODE";

const DEFAULT_DATABASE: &str = "~/Library/Application Support/Playback/data/meta.sqlite3";
const DEV_DATABASE: &str = "./dev_data/meta.sqlite3";

/// Engine configuration, usually read from `playback.toml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub playback: PlaybackConfig,

    #[serde(default)]
    pub frames: FramesConfig,

    #[serde(default)]
    pub workers: WorkersConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct PathsConfig {
    /// Recorder metadata database. `~` is expanded.
    #[serde(default)]
    pub database: Option<PathBuf>,

    /// Directory relative `video_path` values are resolved against.
    /// Defaults to the database's parent directory.
    #[serde(default)]
    pub data_root: Option<PathBuf>,
}

impl PathsConfig {
    /// Database path after dev-mode defaults and `~` expansion.
    pub fn database_path(&self) -> PathBuf {
        match &self.database {
            Some(path) => expand(path),
            None if dev_mode() => PathBuf::from(DEV_DATABASE),
            None => expand(Path::new(DEFAULT_DATABASE)),
        }
    }

    /// Data root after dev-mode defaults and `~` expansion.
    pub fn data_root_path(&self) -> PathBuf {
        if let Some(root) = &self.data_root {
            return expand(root);
        }
        self.database_path()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PlaybackConfig {
    /// Distance outside the current segment that still snaps back to its edge.
    #[serde(default = "default_stick_radius")]
    pub stick_radius_secs: f64,

    #[serde(default = "default_scrub_end_delay")]
    pub scrub_end_delay_ms: u64,

    #[serde(default = "default_update_debounce")]
    pub update_debounce_ms: u64,

    #[serde(default = "default_start_epsilon")]
    pub start_boundary_epsilon_secs: f64,

    /// Fraction of the current video after which the next segment is preloaded.
    #[serde(default = "default_preload_threshold")]
    pub preload_threshold: f64,

    #[serde(default = "default_preload_timeout")]
    pub preload_timeout_ms: u64,

    /// Consecutive failures that escalate to a repeated-failure error.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default = "default_end_tolerance")]
    pub end_of_segment_tolerance_secs: f64,

    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    #[serde(default = "default_index_refresh")]
    pub index_refresh_secs: u64,
}

fn default_stick_radius() -> f64 {
    0.5
}
fn default_scrub_end_delay() -> u64 {
    300
}
fn default_update_debounce() -> u64 {
    200
}
fn default_start_epsilon() -> f64 {
    0.001
}
fn default_preload_threshold() -> f64 {
    0.8
}
fn default_preload_timeout() -> u64 {
    5_000
}
fn default_failure_threshold() -> u32 {
    3
}
fn default_end_tolerance() -> f64 {
    0.05
}
fn default_tick_interval() -> u64 {
    100
}
fn default_index_refresh() -> u64 {
    30
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            stick_radius_secs: default_stick_radius(),
            scrub_end_delay_ms: default_scrub_end_delay(),
            update_debounce_ms: default_update_debounce(),
            start_boundary_epsilon_secs: default_start_epsilon(),
            preload_threshold: default_preload_threshold(),
            preload_timeout_ms: default_preload_timeout(),
            failure_threshold: default_failure_threshold(),
            end_of_segment_tolerance_secs: default_end_tolerance(),
            tick_interval_ms: default_tick_interval(),
            index_refresh_secs: default_index_refresh(),
        }
    }
}

impl PlaybackConfig {
    pub fn scrub_end_delay(&self) -> Duration {
        Duration::from_millis(self.scrub_end_delay_ms)
    }

    pub fn update_debounce(&self) -> Duration {
        Duration::from_millis(self.update_debounce_ms)
    }

    pub fn preload_timeout(&self) -> Duration {
        Duration::from_millis(self.preload_timeout_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn index_refresh(&self) -> Duration {
        Duration::from_secs(self.index_refresh_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FramesConfig {
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Width of the offset buckets stills are cached under.
    #[serde(default = "default_bucket_ms")]
    pub bucket_ms: i64,
}

fn default_cache_capacity() -> usize {
    64
}
fn default_bucket_ms() -> i64 {
    100
}

impl Default for FramesConfig {
    fn default() -> Self {
        Self {
            cache_capacity: default_cache_capacity(),
            bucket_ms: default_bucket_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WorkersConfig {
    #[serde(default = "default_worker_count")]
    pub count: usize,
}

fn default_worker_count() -> usize {
    2
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            count: default_worker_count(),
        }
    }
}

/// Loads and validates configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    let content = std::fs::read_to_string(path).map_err(|source| EngineError::ConfigIo {
        context: "failed to read config file",
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_config(&content).map_err(|error| match error {
        ConfigError::Toml(source) => EngineError::ConfigParse {
            path: path.to_path_buf(),
            source,
        },
        ConfigError::Invalid(error) => error,
    })?;
    info!(path = %path.display(), "loaded config");
    Ok(config)
}

/// Loads `custom_path`, or the first default location that exists, or defaults.
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<EngineConfig> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = ["./playback.toml", "~/.config/playback/config.toml"];
    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    debug!("no config file found, using defaults");
    Ok(EngineConfig::default())
}

enum ConfigError {
    Toml(toml::de::Error),
    Invalid(EngineError),
}

fn parse_config(content: &str) -> std::result::Result<EngineConfig, ConfigError> {
    let config: EngineConfig = toml::from_str(content).map_err(ConfigError::Toml)?;
    validate_config(&config).map_err(ConfigError::Invalid)?;
    Ok(config)
}

/// Rejects values the session cannot run with.
pub fn validate_config(config: &EngineConfig) -> Result<()> {
    let playback = &config.playback;
    let invalid = |reason: &str| {
        Err(EngineError::InvalidConfig {
            reason: reason.to_string(),
        })
    };

    if !(playback.stick_radius_secs >= 0.0 && playback.stick_radius_secs.is_finite()) {
        return invalid("playback.stick_radius_secs must be a non-negative number");
    }
    if !(playback.start_boundary_epsilon_secs >= 0.0
        && playback.start_boundary_epsilon_secs.is_finite())
    {
        return invalid("playback.start_boundary_epsilon_secs must be a non-negative number");
    }
    if !(playback.end_of_segment_tolerance_secs >= 0.0
        && playback.end_of_segment_tolerance_secs.is_finite())
    {
        return invalid("playback.end_of_segment_tolerance_secs must be a non-negative number");
    }
    if !(playback.preload_threshold > 0.0 && playback.preload_threshold <= 1.0) {
        return invalid("playback.preload_threshold must be in (0, 1]");
    }
    if playback.failure_threshold == 0 {
        return invalid("playback.failure_threshold must be at least 1");
    }
    if playback.tick_interval_ms == 0 {
        return invalid("playback.tick_interval_ms must be positive");
    }
    if config.frames.cache_capacity == 0 {
        return invalid("frames.cache_capacity must be positive");
    }
    if config.frames.bucket_ms <= 0 {
        return invalid("frames.bucket_ms must be positive");
    }
    if config.workers.count == 0 {
        return invalid("workers.count must be positive");
    }
    Ok(())
}

fn dev_mode() -> bool {
    std::env::var(DEV_MODE_ENV).is_ok_and(|value| !value.is_empty() && value != "0")
}

fn expand(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(raw.as_ref()).as_ref())
}
