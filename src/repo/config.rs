//! Configuration for rulescope

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory holding rulescope state inside the source root
pub const STATE_DIR: &str = ".rulescope";

/// Configuration for a source tree being analyzed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulescopeConfig {
    /// Extensions of Python files (functions and embedded SQL)
    #[serde(default = "default_python_extensions")]
    pub python_extensions: Vec<String>,

    /// Extensions of SQL files
    #[serde(default = "default_sql_extensions")]
    pub sql_extensions: Vec<String>,

    /// Directory names never descended into
    #[serde(default = "default_exclude_dirs")]
    pub exclude_dirs: Vec<String>,

    /// Snapshot store location, relative to the source root
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: PathBuf,

    /// Classifier settings
    #[serde(default)]
    pub classifier: ClassifierSettings,

    /// Assistant endpoint configuration
    #[serde(default)]
    pub llm: LlmSettings,
}

/// Classifier configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierSettings {
    /// Ask the assistant when patterns are inconclusive
    #[serde(default)]
    pub use_assistant: bool,

    /// Maximum source characters sent to the assistant
    #[serde(default = "default_max_excerpt_chars")]
    pub max_excerpt_chars: usize,

    /// Maximum concurrent assistant requests
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

/// Assistant configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmSettings {
    /// API endpoint URL (e.g., http://localhost:11434 for Ollama)
    pub endpoint: Option<String>,

    /// Model name to use
    pub model: Option<String>,

    /// API key (if required)
    pub api_key: Option<String>,

    /// Maximum tokens for response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Temperature for generation
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: None,
            api_key: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            use_assistant: false,
            max_excerpt_chars: default_max_excerpt_chars(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

fn default_python_extensions() -> Vec<String> {
    vec!["py".to_string()]
}

fn default_sql_extensions() -> Vec<String> {
    vec!["sql".to_string()]
}

fn default_exclude_dirs() -> Vec<String> {
    [
        ".git",
        ".hg",
        ".svn",
        "venv",
        ".venv",
        "env",
        ".env",
        "__pycache__",
        "node_modules",
        "site-packages",
        "build",
        "dist",
        ".tox",
        ".mypy_cache",
        ".pytest_cache",
        "target",
        STATE_DIR,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_snapshot_dir() -> PathBuf {
    Path::new(STATE_DIR).join("snapshots")
}

fn default_max_excerpt_chars() -> usize {
    2000
}

fn default_max_concurrency() -> usize {
    4
}

fn default_max_tokens() -> usize {
    512
}

fn default_temperature() -> f32 {
    0.0
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for RulescopeConfig {
    fn default() -> Self {
        Self {
            python_extensions: default_python_extensions(),
            sql_extensions: default_sql_extensions(),
            exclude_dirs: default_exclude_dirs(),
            snapshot_dir: default_snapshot_dir(),
            classifier: ClassifierSettings::default(),
            llm: LlmSettings::default(),
        }
    }
}

impl RulescopeConfig {
    /// Path of the config file for a source root
    pub fn path_for(root: &Path) -> PathBuf {
        root.join(STATE_DIR).join("config.toml")
    }

    /// Load configuration from the source root or return defaults
    pub fn load_or_default(root: &Path) -> Result<Self> {
        let config_path = Self::path_for(root);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file: {:?}", config_path))?;
            let config: RulescopeConfig = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the source root
    pub fn save(&self, root: &Path) -> Result<()> {
        let state_dir = root.join(STATE_DIR);
        std::fs::create_dir_all(&state_dir)
            .with_context(|| format!("Failed to create {:?}", state_dir))?;

        let config_path = Self::path_for(root);
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        std::fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        Ok(())
    }

    /// Check if a directory name is excluded from scanning
    pub fn is_excluded_dir(&self, name: &str) -> bool {
        self.exclude_dirs.iter().any(|d| d == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RulescopeConfig::default();
        assert_eq!(config.python_extensions, vec!["py"]);
        assert_eq!(config.sql_extensions, vec!["sql"]);
        assert!(config.is_excluded_dir("venv"));
        assert!(config.is_excluded_dir("node_modules"));
        assert!(!config.is_excluded_dir("src"));
        assert!(!config.classifier.use_assistant);
        assert_eq!(config.classifier.max_excerpt_chars, 2000);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: RulescopeConfig = toml::from_str(
            r#"
snapshot_dir = "out/snapshots"

[classifier]
use_assistant = true
"#,
        )
        .unwrap();

        assert_eq!(config.snapshot_dir, PathBuf::from("out/snapshots"));
        assert!(config.classifier.use_assistant);
        assert_eq!(config.classifier.max_concurrency, 4);
        assert_eq!(config.llm.timeout_secs, 60);
        assert_eq!(config.python_extensions, vec!["py"]);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RulescopeConfig::default();
        config.llm.model = Some("llama3".to_string());
        config.save(dir.path()).unwrap();

        let loaded = RulescopeConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(loaded, config);
    }
}
