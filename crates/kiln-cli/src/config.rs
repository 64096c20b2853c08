//! Configuration file support

use kiln_build::{CommandSpec, PreviewConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Default address for `kiln --serve`
pub const DEFAULT_BIND: &str = "127.0.0.1:3000";

/// Configuration for kiln
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Gemini model id
    pub model: Option<String>,
    /// Talk to a running `kiln --serve` instead of calling the model directly
    pub backend_url: Option<String>,
    /// Address the backend server listens on
    pub bind: Option<String>,
    /// Directory the preview sandbox writes projects into
    pub workspace: Option<String>,
    /// Working directory reported to the model
    pub working_directory: Option<String>,
    #[serde(default)]
    pub preview: PreviewSettings,
    /// API keys (alternative to environment variables)
    #[serde(default)]
    pub api_keys: ApiKeys,
}

/// Preview sandbox settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewSettings {
    pub enabled: Option<bool>,
    /// Dependency install command line
    pub install: Option<String>,
    /// Dev server command line
    pub dev: Option<String>,
}

/// API key configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiKeys {
    pub google: Option<String>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("kiln")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("KILN_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from file
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content).unwrap_or_else(|e| {
                eprintln!("Warning: Failed to parse config file: {}", e);
                Self::default()
            }),
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Save config to file
    pub fn save(&self) -> std::io::Result<()> {
        let path = Self::config_path();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        let default_config = Config {
            model: Some(kiln_ai::Model::DEFAULT_ID.to_string()),
            bind: Some(DEFAULT_BIND.to_string()),
            preview: PreviewSettings {
                enabled: Some(true),
                ..Default::default()
            },
            ..Default::default()
        };

        default_config.save()?;
        Ok(path)
    }

    /// Gemini API key from config, then environment
    pub fn get_api_key(&self) -> Option<String> {
        if let Some(key) = self.api_keys.google.clone().filter(|k| !k.is_empty()) {
            return Some(key);
        }

        kiln_ai::providers::google::API_KEY_ENV_VARS
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|k| !k.is_empty()))
    }

    pub fn preview_enabled(&self) -> bool {
        self.preview.enabled.unwrap_or(true)
    }

    /// Install and dev commands, falling back to npm for blank or missing entries
    pub fn preview_config(&self) -> PreviewConfig {
        let defaults = PreviewConfig::default();
        PreviewConfig {
            install: self
                .preview
                .install
                .as_deref()
                .and_then(CommandSpec::parse)
                .unwrap_or(defaults.install),
            dev: self
                .preview
                .dev
                .as_deref()
                .and_then(CommandSpec::parse)
                .unwrap_or(defaults.dev),
        }
    }

    /// Where preview projects are written
    pub fn workspace_dir(&self) -> PathBuf {
        match &self.workspace {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("kiln")
                .join("workspace"),
        }
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# kiln configuration file
# Place at ~/.config/kiln/config.toml (Linux) or set KILN_CONFIG_PATH

# Gemini model to use
model = "gemini-pro"

# Use a running `kiln --serve` instead of calling the model directly
# backend_url = "http://127.0.0.1:3000"

# Address for `kiln --serve`
bind = "127.0.0.1:3000"

# Where preview projects are written (defaults to the local data dir)
# workspace = "/tmp/kiln"

# Working directory reported to the model
# working_directory = "/home/project"

[preview]
enabled = true
install = "npm install"
dev = "npm run dev"

# API keys (optional - can also use GOOGLE_API_KEY or GEMINI_API_KEY)
[api_keys]
# google = "..."
"#
}
