use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryPolicy;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            multiplier: self.backoff_multiplier,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AikaConfig {
    // Backend connection
    #[serde(default = "default_backend_url", alias = "api_url")]
    pub backend_url: String,
    #[serde(default)]
    pub auth_token: Option<String>,
    /// `AIKA_BACKEND_TOKEN`; wins over `auth_token` and is never written back.
    #[serde(skip)]
    env_token: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_health_check_interval_secs")]
    pub health_check_interval_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,

    // Chat behavior
    #[serde(default = "default_true")]
    pub stream_enabled: bool,

    // Voice (text stand-in for speech input)
    #[serde(default)]
    pub voice: bool,
    #[serde(default)]
    pub wake_word_mode: bool,
    #[serde(default = "default_wake_word")]
    pub wake_word: String,

    // Avatar
    #[serde(default = "default_true")]
    pub eyes_follow_cursor: bool,
    #[serde(default = "default_true")]
    pub cyan_accents: bool,
    #[serde(default = "default_true")]
    pub avatar_click_rage: bool,
    #[serde(default = "default_error_revert_ms")]
    pub error_revert_ms: u64,
    #[serde(default = "default_look_at_ms")]
    pub look_at_ms: u64,
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
    /// Fixed seed for the avatar's autonomous behavior; random when unset.
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

fn default_backend_url() -> String {
    DEFAULT_BACKEND_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_health_check_interval_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_wake_word() -> String {
    "aika".to_string()
}

fn default_error_revert_ms() -> u64 {
    2500
}

fn default_look_at_ms() -> u64 {
    2000
}

fn default_frame_interval_ms() -> u64 {
    16
}

impl Default for AikaConfig {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            auth_token: None,
            env_token: None,
            request_timeout_secs: default_request_timeout_secs(),
            health_check_interval_secs: default_health_check_interval_secs(),
            retry: RetryConfig::default(),
            stream_enabled: true,
            voice: false,
            wake_word_mode: false,
            wake_word: default_wake_word(),
            eyes_follow_cursor: true,
            cyan_accents: true,
            avatar_click_rage: true,
            error_revert_ms: default_error_revert_ms(),
            look_at_ms: default_look_at_ms(),
            frame_interval_ms: default_frame_interval_ms(),
            rng_seed: None,
        }
    }
}

impl AikaConfig {
    /// Get the directory containing the executable
    fn get_base_dir() -> PathBuf {
        match std::env::current_exe() {
            Ok(exe_path) => exe_path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".")),
            Err(_) => PathBuf::from("."),
        }
    }

    pub fn config_path() -> PathBuf {
        Self::get_base_dir().join("aika_config.toml")
    }

    /// Load `aika_config.toml` next to the executable, then apply env overrides.
    pub fn load() -> Self {
        let path = Self::config_path();
        let mut config = match Self::load_from(&path) {
            Ok(Some(config)) => {
                tracing::info!("Loaded config from {:?}", path);
                config
            }
            Ok(None) => {
                tracing::warn!("No config file found, using defaults + env vars");
                Self::default()
            }
            Err(e) => {
                tracing::error!("{:#}", e);
                Self::default()
            }
        };
        config.apply_env();
        config
    }

    /// Parse a config file; `Ok(None)` when the file does not exist.
    pub fn load_from(path: &Path) -> Result<Option<Self>> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {:?}", path)),
        };
        let config = toml::from_str::<AikaConfig>(&contents)
            .with_context(|| format!("Failed to parse {:?}", path))?;
        Ok(Some(config))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let toml_string = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, toml_string)
            .with_context(|| format!("Failed to write config to {:?}", path))?;

        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    fn apply_env(&mut self) {
        if let Ok(url) = env::var("AIKA_BACKEND_URL") {
            if !url.trim().is_empty() {
                self.backend_url = url;
            }
        }

        if let Ok(token) = env::var("AIKA_BACKEND_TOKEN") {
            let token = token.trim().to_string();
            if !token.is_empty() {
                self.env_token = Some(token);
            }
        }

        if let Some(enabled) = env_flag("AIKA_STREAM") {
            self.stream_enabled = enabled;
        }

        if let Some(enabled) = env_flag("AIKA_EYES_FOLLOW_CURSOR") {
            self.eyes_follow_cursor = enabled;
        }

        if let Some(enabled) = env_flag("AIKA_VOICE") {
            self.voice = enabled;
        }

        if let Some(enabled) = env_flag("AIKA_WAKE_WORD_MODE") {
            self.wake_word_mode = enabled;
        }

        if let Ok(seed) = env::var("AIKA_RNG_SEED") {
            if let Ok(seed) = seed.trim().parse() {
                self.rng_seed = Some(seed);
            }
        }
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.env_token
            .as_deref()
            .or(self.auth_token.as_deref())
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    pub fn token_from_env(&self) -> bool {
        self.env_token.is_some()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs.max(1))
    }

    pub fn error_revert(&self) -> Duration {
        Duration::from_millis(self.error_revert_ms)
    }

    pub fn look_at_duration(&self) -> Duration {
        Duration::from_millis(self.look_at_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let value = env::var(name).ok()?;
    Some(
        value.eq_ignore_ascii_case("1")
            || value.eq_ignore_ascii_case("true")
            || value.eq_ignore_ascii_case("yes"),
    )
}
