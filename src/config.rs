use anyhow::{Context, Result};
use chrono::NaiveTime;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct PsycheConfig {
    pub general: GeneralConfig,
    pub storage: StorageConfig,
    pub generation: GenerationConfig,
    pub evolution: EvolutionConfig,
    pub consolidation: ConsolidationConfig,
    pub goals: GoalsConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GenerationConfig {
    pub provider: String,
    pub url: String,
    pub model: String,
    pub timeout_secs: u64,
}

/// Per-turn trait evolution.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EvolutionConfig {
    pub enabled: bool,
    /// Base step for a triggered trait nudge.
    pub speed: f64,
    /// Value that passive decay pulls traits toward.
    pub baseline: f64,
    /// Passive decay as a fraction of `speed`.
    pub decay_ratio: f64,
}

/// Nightly consolidation and its scheduler.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ConsolidationConfig {
    pub enabled: bool,
    /// Local time of day ("HH:MM") at or after which tonight's run may start.
    pub run_at: String,
    pub tick_interval_secs: u64,
    /// Lookback window used when no completed run exists yet.
    pub lookback_hours: u64,
    pub max_turns: usize,
    /// Cap on the net per-trait delta of a single run.
    pub max_trait_delta: f64,
    /// Scale applied to the averaged per-turn signal before capping.
    pub rate: f64,
    pub min_cluster_size: usize,
    pub max_knowledge_entries: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GoalsConfig {
    pub seed_on_first_run: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_psyche_dir()
            .join("evolution.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".into(),
            url: "http://localhost:11434".into(),
            model: "llama3.1:8b".into(),
            timeout_secs: 120,
        }
    }
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            speed: 0.025,
            baseline: 0.5,
            decay_ratio: 0.3,
        }
    }
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            run_at: "02:00".into(),
            tick_interval_secs: 30,
            lookback_hours: 24,
            max_turns: 200,
            max_trait_delta: 0.10,
            rate: 0.5,
            min_cluster_size: 2,
            max_knowledge_entries: 5,
        }
    }
}

impl Default for GoalsConfig {
    fn default() -> Self {
        Self {
            seed_on_first_run: true,
        }
    }
}

impl ConsolidationConfig {
    /// Parse `run_at` into a time of day.
    pub fn run_time(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(self.run_at.trim(), "%H:%M")
            .with_context(|| format!("invalid consolidation.run_at {:?}, expected HH:MM", self.run_at))
    }
}

/// Returns `~/.psyche/`, or `./.psyche` when no home directory is known.
pub fn default_psyche_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".psyche")
}

/// Returns the default config file path: `~/.psyche/config.toml`
pub fn default_config_path() -> PathBuf {
    default_psyche_dir().join("config.toml")
}

impl PsycheConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            PsycheConfig::default()
        };

        config.apply_env_overrides();
        config.consolidation.run_time()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    /// (PSYCHE_DB, PSYCHE_LOG_LEVEL, PSYCHE_OLLAMA_URL, PSYCHE_MODEL).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("PSYCHE_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("PSYCHE_LOG_LEVEL") {
            self.general.log_level = val;
        }
        if let Ok(val) = std::env::var("PSYCHE_OLLAMA_URL") {
            self.generation.url = val;
        }
        if let Ok(val) = std::env::var("PSYCHE_MODEL") {
            self.generation.model = val;
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = PsycheConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.generation.provider, "ollama");
        assert_eq!(config.consolidation.tick_interval_secs, 30);
        assert!((config.consolidation.max_trait_delta - 0.10).abs() < 1e-9);
        assert!(config.storage.db_path.ends_with("evolution.db"));
        assert_eq!(
            config.consolidation.run_time().unwrap(),
            NaiveTime::from_hms_opt(2, 0, 0).unwrap()
        );
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[general]
log_level = "debug"

[storage]
db_path = "/tmp/test.db"

[consolidation]
run_at = "03:30"
max_turns = 40
"#;
        let config: PsycheConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.storage.db_path, "/tmp/test.db");
        assert_eq!(config.consolidation.max_turns, 40);
        assert_eq!(
            config.consolidation.run_time().unwrap(),
            NaiveTime::from_hms_opt(3, 30, 0).unwrap()
        );
        // defaults still apply for unset fields
        assert_eq!(config.consolidation.tick_interval_secs, 30);
        assert!(config.evolution.enabled);
    }

    #[test]
    fn invalid_run_time_is_rejected() {
        let mut config = ConsolidationConfig::default();
        config.run_at = "25:99".into();
        assert!(config.run_time().is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = PsycheConfig::default();
        std::env::set_var("PSYCHE_DB", "/tmp/override.db");
        std::env::set_var("PSYCHE_LOG_LEVEL", "trace");
        std::env::set_var("PSYCHE_OLLAMA_URL", "http://gpu-box:11434");

        config.apply_env_overrides();

        assert_eq!(config.storage.db_path, "/tmp/override.db");
        assert_eq!(config.general.log_level, "trace");
        assert_eq!(config.generation.url, "http://gpu-box:11434");

        // Clean up
        std::env::remove_var("PSYCHE_DB");
        std::env::remove_var("PSYCHE_LOG_LEVEL");
        std::env::remove_var("PSYCHE_OLLAMA_URL");
    }
}
