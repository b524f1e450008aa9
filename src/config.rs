use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Missing required configuration: {0}")]
    Missing(&'static str),
}

/// Top-level configuration loaded from .issue-fixer.toml with environment
/// overrides. Constructed once at startup and passed by reference into every
/// component; nothing reads the environment after this.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub workspace: WorkspaceConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitHubConfig {
    /// Shared secret for webhook signature verification.
    #[serde(default)]
    pub webhook_secret: String,

    /// Access token used for clone, push, and the pull-request API.
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// Provider tag; the recognized set is closed ("openai", "anthropic").
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model identifier passed through to the provider.
    #[serde(default)]
    pub model: String,

    #[serde(default)]
    pub api_key: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: String::new(),
            api_key: String::new(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkspaceConfig {
    /// Root directory for disposable working copies. Defaults to the system
    /// temp directory.
    pub temp_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration: an explicit path must exist; otherwise
    /// .issue-fixer.toml in the current directory is used when present.
    /// Environment variables override file values either way.
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load_from(path)?,
            None => {
                let default_path = Path::new(".issue-fixer.toml");
                if default_path.exists() {
                    Self::load_from(default_path)?
                } else {
                    Config::default()
                }
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from a specific path (useful for testing).
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("GITHUB_WEBHOOK_SECRET") {
            self.github.webhook_secret = value;
        }
        if let Ok(value) = std::env::var("GITHUB_TOKEN") {
            self.github.token = value;
        }
        if let Ok(value) = std::env::var("LLM_PROVIDER") {
            self.llm.provider = value;
        }
        if let Ok(value) = std::env::var("LLM_MODEL") {
            self.llm.model = value;
        }
        if let Ok(value) = std::env::var("LLM_API_KEY") {
            self.llm.api_key = value;
        }
        if let Ok(value) = std::env::var("TEMP_DIR") {
            self.workspace.temp_dir = Some(PathBuf::from(value));
        }
    }

    /// Fail fast at startup instead of deep inside a pipeline run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.github.webhook_secret.is_empty() {
            return Err(ConfigError::Missing("github.webhook_secret"));
        }
        if self.github.token.is_empty() {
            return Err(ConfigError::Missing("github.token"));
        }
        if self.llm.model.is_empty() {
            return Err(ConfigError::Missing("llm.model"));
        }
        if self.llm.api_key.is_empty() {
            return Err(ConfigError::Missing("llm.api_key"));
        }
        Ok(())
    }

    /// Root under which working copies are created.
    pub fn temp_root(&self) -> PathBuf {
        self.workspace
            .temp_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("issue-fixer"))
    }
}
