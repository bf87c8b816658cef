use crate::fallback::Environment;
use crate::transport::RetryPolicy;
use crate::util::write_atomic;
use anyhow::{Context, Result};
use directories::UserDirs;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ── Top-level config ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding config and store - computed from home, not serialized
    #[serde(skip)]
    pub data_dir: PathBuf,
    /// Path to config.toml - computed from home, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub reliability: ReliabilityConfig,

    #[serde(default)]
    pub fallback: FallbackConfig,

    #[serde(default)]
    pub synthetic: SyntheticConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ── Backend ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Backend base address, e.g. `http://localhost:8080`.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Liveness endpoint probed by the health monitor.
    #[serde(default = "default_health_path")]
    pub health_path: String,
    #[serde(default = "default_health_timeout_ms")]
    pub health_timeout_ms: u64,
    /// How long a health verdict is reused before probing again.
    #[serde(default = "default_health_ttl_secs")]
    pub health_ttl_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:8080".into()
}

fn default_timeout_ms() -> u64 {
    8000
}

fn default_health_path() -> String {
    "/actuator/health".into()
}

fn default_health_timeout_ms() -> u64 {
    3000
}

fn default_health_ttl_secs() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
            health_path: default_health_path(),
            health_timeout_ms: default_health_timeout_ms(),
            health_ttl_secs: default_health_ttl_secs(),
        }
    }
}

// ── Reliability ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilityConfig {
    /// Retries for idempotent reads. Mutations are never retried.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Wait before the first retry (ms).
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Multiplier applied to the wait after each retry.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

fn default_max_retries() -> u32 {
    2
}

fn default_initial_backoff_ms() -> u64 {
    250
}

fn default_backoff_factor() -> f64 {
    2.0
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

// ── Fallback ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FallbackConfig {
    /// Always use synthetic data and never contact the backend.
    #[serde(default)]
    pub force_synthetic: bool,
    /// `development` allows falling back to synthetic data on backend failures.
    #[serde(default)]
    pub environment: Environment,
}

// ── Synthetic data ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticConfig {
    /// Start with a few completed sessions in history.
    #[serde(default = "default_true")]
    pub seed_history: bool,
    /// Simulated per-call latency (ms). 0 disables it.
    #[serde(default = "default_latency_ms")]
    pub latency_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_latency_ms() -> u64 {
    300
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            seed_history: true,
            latency_ms: default_latency_ms(),
        }
    }
}

// ── Observability ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Minimum log level when `RUST_LOG` is unset ("error" | "warn" | "info" | "debug" | "trace").
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "warn".into()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = UserDirs::new().map_or_else(
            || PathBuf::from(".fastkeeper"),
            |u| u.home_dir().join(".fastkeeper"),
        );
        let config_path = data_dir.join("config.toml");
        Self {
            data_dir,
            config_path,
            api: ApiConfig::default(),
            reliability: ReliabilityConfig::default(),
            fallback: FallbackConfig::default(),
            synthetic: SyntheticConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Config {
    /// Load `~/.fastkeeper/config.toml`, creating it with defaults on first run.
    ///
    /// Also returns the environment overrides that were ignored, so the caller
    /// can report them once logging is up.
    pub fn load_or_init() -> Result<(Self, Vec<String>)> {
        let home = UserDirs::new()
            .map(|u| u.home_dir().to_path_buf())
            .context("Could not find home directory")?;
        let mut config = Self::load_or_init_in(&home.join(".fastkeeper"))?;
        let ignored = config.apply_env_overrides();
        config.validate()?;
        Ok((config, ignored))
    }

    /// Load or create `config.toml` inside `data_dir`. No env overrides.
    pub fn load_or_init_in(data_dir: &Path) -> Result<Self> {
        let config_path = data_dir.join("config.toml");

        if !data_dir.exists() {
            fs::create_dir_all(data_dir).context("Failed to create .fastkeeper directory")?;
        }

        if config_path.exists() {
            let contents =
                fs::read_to_string(&config_path).context("Failed to read config file")?;
            let mut config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            config.data_dir = data_dir.to_path_buf();
            config.config_path = config_path;
            Ok(config)
        } else {
            let mut config = Config::default();
            config.data_dir = data_dir.to_path_buf();
            config.config_path = config_path;
            config.save()?;
            Ok(config)
        }
    }

    /// Apply environment variable overrides to config
    pub fn apply_env_overrides(&mut self) -> Vec<String> {
        self.apply_env_overrides_from(|key| std::env::var(key).ok())
    }

    /// Overrides read through `lookup`. Unparsable values leave the setting
    /// untouched and are described in the returned list.
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F) -> Vec<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut ignored = Vec::new();

        // Base address: FASTKEEPER_API_BASE
        if let Some(base) = var("FASTKEEPER_API_BASE") {
            self.api.base_url = base.trim().to_string();
        }

        // Request timeout: FASTKEEPER_TIMEOUT_MS
        if let Some(raw) = var("FASTKEEPER_TIMEOUT_MS") {
            match raw.trim().parse() {
                Ok(ms) => self.api.timeout_ms = ms,
                Err(e) => ignored.push(format!("Ignoring FASTKEEPER_TIMEOUT_MS={raw}: {e}")),
            }
        }

        // Retry budget: FASTKEEPER_MAX_RETRIES
        if let Some(raw) = var("FASTKEEPER_MAX_RETRIES") {
            match raw.trim().parse() {
                Ok(n) => self.reliability.max_retries = n,
                Err(e) => ignored.push(format!("Ignoring FASTKEEPER_MAX_RETRIES={raw}: {e}")),
            }
        }

        // Pinned synthetic mode: FASTKEEPER_FORCE_SYNTHETIC
        if let Some(val) = var("FASTKEEPER_FORCE_SYNTHETIC") {
            let val = val.trim();
            self.fallback.force_synthetic = val == "1" || val.eq_ignore_ascii_case("true");
        }

        // Environment: FASTKEEPER_ENV
        if let Some(env) = var("FASTKEEPER_ENV") {
            match env.parse::<Environment>() {
                Ok(parsed) => self.fallback.environment = parsed,
                Err(e) => ignored.push(format!("Ignoring FASTKEEPER_ENV={env}: {e}")),
            }
        }

        // Log level: FASTKEEPER_LOG_LEVEL
        if let Some(level) = var("FASTKEEPER_LOG_LEVEL") {
            self.observability.log_level = level.trim().to_string();
        }

        ignored
    }

    pub fn validate(&self) -> Result<()> {
        let base = Url::parse(self.api.base_url.trim())
            .with_context(|| format!("api.base_url is not a valid URL: {}", self.api.base_url))?;
        if !matches!(base.scheme(), "http" | "https") {
            anyhow::bail!("api.base_url must use http or https: {}", self.api.base_url);
        }
        if self.api.timeout_ms == 0 {
            anyhow::bail!("api.timeout_ms must be greater than 0");
        }
        if self.api.health_timeout_ms == 0 {
            anyhow::bail!("api.health_timeout_ms must be greater than 0");
        }
        if !self.api.health_path.starts_with('/') {
            anyhow::bail!("api.health_path must start with '/': {}", self.api.health_path);
        }
        if !self.reliability.backoff_factor.is_finite() || self.reliability.backoff_factor < 1.0 {
            anyhow::bail!(
                "reliability.backoff_factor must be at least 1.0, got {}",
                self.reliability.backoff_factor
            );
        }
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;
        write_atomic(&self.config_path, toml_str.as_bytes())
            .with_context(|| format!("Failed to save config: {}", self.config_path.display()))
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("store.json")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.api.timeout_ms)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.api.health_timeout_ms)
    }

    pub fn health_ttl(&self) -> Duration {
        Duration::from_secs(self.api.health_ttl_secs)
    }

    pub fn synthetic_latency(&self) -> Duration {
        Duration::from_millis(self.synthetic.latency_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.reliability.max_retries,
            self.reliability.initial_backoff_ms,
            self.reliability.backoff_factor,
        )
    }
}
