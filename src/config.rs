use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use squared::llm::OllamaConfig;
use squared::llm::ollama::DEFAULT_BASE_URL;
use squared::runner::RunnerConfig;
use squared::validation::{DEFAULT_FEEDBACK_PROMPT, DEFAULT_SENTINEL, JudgeCriteria};

/// Model used when neither the command line nor the config names one
pub const DEFAULT_MODEL: &str = "gpt-oss:20b";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub model: String,
    pub backend: BackendConfig,
    pub feedback: FeedbackConfig,
    pub runner: RunnerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub timeout_ms: Option<u64>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    pub prompt: String,
    pub sentinel: String,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_FEEDBACK_PROMPT.to_string(),
            sentinel: DEFAULT_SENTINEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSettings {
    pub max_attempts: Option<u32>,
    pub cycle_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            model: DEFAULT_MODEL.to_string(),
            backend: BackendConfig::default(),
            feedback: FeedbackConfig::default(),
            runner: RunnerSettings::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        Ok(Self::load_first_of(&Self::candidate_paths()))
    }

    /// Like [`Config::load`], but an explicit path that does not exist yet yields defaults
    pub fn load_or_default(config_path: Option<&PathBuf>) -> Result<Self> {
        match config_path {
            Some(path) if !path.exists() => {
                log::info!("Config {} does not exist yet, using defaults", path.display());
                Ok(Self::default())
            }
            _ => Self::load(config_path),
        }
    }

    /// Primary location first (~/.config/<project>/<project>.yml), then ./<project>.yml
    fn candidate_paths() -> Vec<PathBuf> {
        let project_name = env!("CARGO_PKG_NAME");
        Self::primary_path()
            .into_iter()
            .chain(std::iter::once(PathBuf::from(format!("{}.yml", project_name))))
            .collect()
    }

    /// First candidate that exists and parses; unreadable ones are skipped with a warning
    fn load_first_of(candidates: &[PathBuf]) -> Self {
        for path in candidates.iter().filter(|path| path.exists()) {
            match Self::load_from_file(path) {
                Ok(config) => return config,
                Err(e) => {
                    log::warn!("Failed to load config from {}: {:#}", path.display(), e);
                }
            }
        }

        // No config file found, use defaults
        log::info!("No config file found, using defaults");
        Self::default()
    }

    /// ~/.config/<project>/<project>.yml
    pub fn primary_path() -> Option<PathBuf> {
        let project_name = env!("CARGO_PKG_NAME");
        dirs::config_dir().map(|dir| dir.join(project_name).join(format!("{}.yml", project_name)))
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Write `model` as the default into the config at `path`, keeping every other setting.
    pub fn save_default_model<P: AsRef<Path>>(path: P, model: &str) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            Self::load_from_file(path)?
        } else {
            Self::default()
        };
        config.model = model.to_string();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).context(format!("Failed to create {}", parent.display()))?;
        }
        let content = serde_yaml::to_string(&config).context("Failed to serialize config")?;
        fs::write(path, content).context(format!("Failed to write config to {}", path.display()))?;

        log::info!("Saved default model {} to {}", model, path.display());
        Ok(config)
    }

    /// Model for this run: command line override, then config
    pub fn resolve_model(&self, model_override: Option<&str>) -> String {
        match model_override {
            Some(model) if !model.trim().is_empty() => model.to_string(),
            _ => self.model.clone(),
        }
    }

    pub fn runner_config(&self, model_override: Option<&str>, max_attempts: Option<u32>) -> RunnerConfig {
        RunnerConfig::new(self.resolve_model(model_override))
            .with_criteria(JudgeCriteria::new(&self.feedback.prompt, &self.feedback.sentinel))
            .with_max_attempts(max_attempts.or(self.runner.max_attempts))
            .with_cycle_delay(Duration::from_millis(self.runner.cycle_delay_ms))
    }

    pub fn ollama_config(&self) -> OllamaConfig {
        OllamaConfig::from_env_or(&self.backend.base_url).timeout(self.backend.timeout_ms.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.backend.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.feedback.sentinel, "DONE");
        assert!(config.runner.max_attempts.is_none());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("squared.yml");
        fs::write(&path, "model: qwen3:8b\nrunner:\n  max_attempts: 4\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();

        assert_eq!(config.model, "qwen3:8b");
        assert_eq!(config.runner.max_attempts, Some(4));
        assert_eq!(config.runner.cycle_delay_ms, 0);
        assert_eq!(config.feedback.prompt, DEFAULT_FEEDBACK_PROMPT);
    }

    #[test]
    fn test_explicit_missing_path_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.yml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_fallback_skips_malformed_primary() {
        let dir = TempDir::new().unwrap();
        let primary = dir.path().join("primary.yml");
        let fallback = dir.path().join("fallback.yml");
        fs::write(&primary, "model: [unterminated\n").unwrap();
        fs::write(&fallback, "model: qwen3:8b\n").unwrap();

        let config = Config::load_first_of(&[primary, fallback]);
        assert_eq!(config.model, "qwen3:8b");
    }

    #[test]
    fn test_fallback_uses_defaults_when_nothing_loads() {
        let dir = TempDir::new().unwrap();
        let malformed = dir.path().join("primary.yml");
        fs::write(&malformed, "model: [unterminated\n").unwrap();
        let missing = dir.path().join("missing.yml");

        let config = Config::load_first_of(&[malformed, missing]);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.feedback.sentinel, DEFAULT_SENTINEL);
    }

    #[test]
    fn test_candidate_paths_end_with_local_file() {
        let candidates = Config::candidate_paths();
        assert_eq!(candidates.last(), Some(&PathBuf::from("squared.yml")));
    }

    #[test]
    fn test_load_or_default_accepts_missing_explicit_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fresh").join("squared.yml");

        let config = Config::load_or_default(Some(&path)).unwrap();
        assert_eq!(config.model, DEFAULT_MODEL);

        Config::save_default_model(&path, "llama3.2").unwrap();
        assert_eq!(Config::load(Some(&path)).unwrap().model, "llama3.2");
    }

    #[test]
    fn test_load_or_default_still_rejects_malformed_explicit_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("squared.yml");
        fs::write(&path, "model: [unterminated\n").unwrap();
        assert!(Config::load_or_default(Some(&path)).is_err());
    }

    #[test]
    fn test_save_default_model_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("squared.yml");

        Config::save_default_model(&path, "llama3.2").unwrap();

        let reloaded = Config::load(Some(&path)).unwrap();
        assert_eq!(reloaded.model, "llama3.2");
    }

    #[test]
    fn test_save_default_model_preserves_other_settings() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("squared.yml");
        fs::write(&path, "model: old\nfeedback:\n  sentinel: APPROVED\n").unwrap();

        let saved = Config::save_default_model(&path, "new").unwrap();

        assert_eq!(saved.model, "new");
        assert_eq!(saved.feedback.sentinel, "APPROVED");
        let reloaded = Config::load(Some(&path)).unwrap();
        assert_eq!(reloaded.feedback.sentinel, "APPROVED");
    }

    #[test]
    fn test_resolve_model() {
        let config = Config::default();
        assert_eq!(config.resolve_model(None), DEFAULT_MODEL);
        assert_eq!(config.resolve_model(Some("mistral")), "mistral");
        assert_eq!(config.resolve_model(Some("  ")), DEFAULT_MODEL);
    }

    #[test]
    fn test_runner_config_from_settings() {
        let mut config = Config::default();
        config.runner.max_attempts = Some(7);
        config.runner.cycle_delay_ms = 1000;
        config.feedback.sentinel = "ship it".to_string();

        let runner = config.runner_config(Some("mistral"), None);
        assert_eq!(runner.model, "mistral");
        assert_eq!(runner.max_attempts, Some(7));
        assert_eq!(runner.cycle_delay, Duration::from_secs(1));
        assert_eq!(runner.criteria.sentinel, "SHIP IT");

        let capped = config.runner_config(None, Some(2));
        assert_eq!(capped.max_attempts, Some(2));
    }
}
