//! Configuration management for llm-optimizer
//!
//! Settings live in `~/.config/llm-optimizer/config.toml` unless a path is
//! given on the command line. Every field has a default, so an empty or
//! missing file is a valid configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_DIR_NAME: &str = "llm-optimizer";
const CONFIG_FILE_NAME: &str = "config.toml";

pub const API_URL_ENV: &str = "LLM_OPTIMIZER_API_URL";
pub const API_KEY_ENV: &str = "LLM_OPTIMIZER_API_KEY";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub sandbox: SandboxConfig,
    pub run: RunConfig,
}

/// Text-generation endpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_url: String,
    pub model: String,
    /// Kept low so repeated requests stay close to reproducible.
    pub temperature: f32,
    /// Sent as a bearer token when present.
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
    /// Retries on HTTP 429 before the round is given up.
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:1234/v1/chat/completions".to_string(),
            model: "local-model".to_string(),
            temperature: 0.1,
            api_key: None,
            request_timeout_secs: 300,
            max_retries: 2,
        }
    }
}

/// Isolation boundary for candidate processes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub interpreter: String,
    /// Hard wall-clock limit per candidate.
    pub timeout_secs: u64,
    /// Start candidates with an almost empty environment.
    pub clear_env: bool,
    /// Address-space cap (`ulimit -v`), unix only.
    pub memory_limit_mb: Option<u64>,
    /// CPU-time cap (`ulimit -t`), unix only.
    pub cpu_limit_secs: Option<u64>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            timeout_secs: 30,
            clear_env: true,
            memory_limit_mb: None,
            cpu_limit_secs: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub max_iterations: usize,
    /// Where the best verified implementation is kept between runs.
    pub champion_path: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            champion_path: PathBuf::from("final_implementation.py"),
        }
    }
}

impl Config {
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load from the default location, falling back to defaults.
    ///
    /// A file that fails to parse is moved aside to `config.toml.corrupt`.
    pub fn load() -> Self {
        let mut config = Self::default();
        if let Some(path) = Self::config_path() {
            if let Ok(content) = fs::read_to_string(&path) {
                match toml::from_str(&content) {
                    Ok(parsed) => config = parsed,
                    Err(err) => {
                        preserve_corrupt_config(&path, &content);
                        tracing::warn!(
                            path = %path.display(),
                            "config file was corrupted ({err}); a backup was saved and defaults were loaded"
                        );
                    }
                }
            }
        }
        config.apply_env_overrides();
        config
    }

    /// Load from an explicit path. Unlike [`Config::load`], a missing or invalid file is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file '{}'", path.display()))?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(url) = non_empty_env(API_URL_ENV) {
            self.llm.api_url = url;
        }
        if let Some(key) = non_empty_env(API_KEY_ENV) {
            self.llm.api_key = Some(key);
        }
    }

    pub fn config_location() -> String {
        Self::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| format!("~/.config/{CONFIG_DIR_NAME}/{CONFIG_FILE_NAME}"))
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn preserve_corrupt_config(path: &Path, content: &str) {
    let corrupt_path = path.with_extension("toml.corrupt");
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::write(&corrupt_path, content);
    }
}
