//! Bootstrap configuration and root folder resolution
//!
//! Bootstrap values come from a TOML file and environment variables. Tunables
//! that operators adjust at runtime live in the database instead (see
//! [`crate::params`]).

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "AEGIS_ROOT_FOLDER";

/// Database file created inside the root folder
pub const DATABASE_FILE_NAME: &str = "feedback.db";

/// Default HTTP bind address
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:5730";

const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const GROQ_DEFAULT_MODEL: &str = "llama-3.1-8b-instant";
const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_REQUESTS_PER_SECOND: u32 = 5;

/// Contents of `config.toml`. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    pub root_folder: Option<String>,
    pub bind_address: Option<String>,
    pub log_level: Option<String>,
    #[serde(default)]
    pub ai: AiSection,
    #[serde(default)]
    pub alerts: AlertsSection,
}

/// `[ai]` table
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AiSection {
    /// groq | openai | mock | disabled
    pub provider: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub requests_per_second: Option<u32>,
}

/// `[alerts]` table
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertsSection {
    pub webhook_url: Option<String>,
}

/// Which completion backend the engine talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiProvider {
    Groq,
    OpenAi,
    /// Simulated latency, heuristic-derived answers
    Mock,
    /// No backend: every race resolves to the fallback
    Disabled,
}

impl AiProvider {
    pub fn label(&self) -> &'static str {
        match self {
            AiProvider::Groq => "groq",
            AiProvider::OpenAi => "openai",
            AiProvider::Mock => "mock-llm",
            AiProvider::Disabled => "disabled",
        }
    }
}

/// Resolved AI backend settings
#[derive(Debug, Clone)]
pub struct AiSettings {
    pub provider: AiProvider,
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub requests_per_second: u32,
}

impl TomlConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid config file: {}", e)))
    }

    /// Read and parse a config file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load the platform config file, falling back to defaults
    ///
    /// A missing or unreadable file is never fatal.
    pub fn load_or_default() -> Self {
        let Some(path) = config_file_path() else {
            info!("No config file found, using defaults");
            return Self::default();
        };

        match Self::load_from(&path) {
            Ok(config) => {
                info!("Loaded config file: {}", path.display());
                config
            }
            Err(e) => {
                warn!("Ignoring config file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Resolve the AI backend from file values and environment
    ///
    /// Priority: explicit `provider` in the file, then `GROQ_API_KEY`, then
    /// `OPENAI_API_KEY`, then mock mode (`force_mock` or `AEGIS_MOCK_AI`),
    /// otherwise disabled.
    pub fn ai_settings(&self, force_mock: bool) -> AiSettings {
        let groq_key = env_non_empty("GROQ_API_KEY");
        let openai_key = env_non_empty("OPENAI_API_KEY");
        let mock_env = env_non_empty("AEGIS_MOCK_AI")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let file_key = self.ai.api_key.clone().filter(|k| !k.is_empty());
        let requested = self.ai.provider.as_deref().map(|p| p.to_ascii_lowercase());

        let (provider, api_key) = if force_mock || mock_env {
            (AiProvider::Mock, None)
        } else {
            match requested.as_deref() {
                Some("groq") => (AiProvider::Groq, file_key.or(groq_key)),
                Some("openai") => (AiProvider::OpenAi, file_key.or(openai_key)),
                Some("mock") => (AiProvider::Mock, None),
                Some("disabled") => (AiProvider::Disabled, None),
                Some(other) => {
                    warn!("Unknown AI provider '{}' in config, auto-detecting", other);
                    auto_detect(groq_key, openai_key)
                }
                None => auto_detect(groq_key, openai_key),
            }
        };

        // A remote provider without a key cannot be called
        let provider = match provider {
            AiProvider::Groq | AiProvider::OpenAi if api_key.is_none() => {
                warn!("No API key for {} provider, AI classification disabled", provider.label());
                AiProvider::Disabled
            }
            other => other,
        };

        let (default_base, default_model) = match provider {
            AiProvider::OpenAi => (OPENAI_BASE_URL, OPENAI_DEFAULT_MODEL),
            _ => (GROQ_BASE_URL, GROQ_DEFAULT_MODEL),
        };

        AiSettings {
            provider,
            api_key,
            model: self.ai.model.clone().unwrap_or_else(|| default_model.to_string()),
            base_url: self
                .ai
                .base_url
                .clone()
                .unwrap_or_else(|| default_base.to_string()),
            requests_per_second: self
                .ai
                .requests_per_second
                .filter(|r| *r > 0)
                .unwrap_or(DEFAULT_REQUESTS_PER_SECOND),
        }
    }

    /// Webhook for urgent alerts (`AEGIS_WEBHOOK_URL` overrides the file)
    pub fn webhook_url(&self) -> Option<String> {
        env_non_empty("AEGIS_WEBHOOK_URL")
            .or_else(|| self.alerts.webhook_url.clone().filter(|u| !u.is_empty()))
    }
}

fn auto_detect(groq_key: Option<String>, openai_key: Option<String>) -> (AiProvider, Option<String>) {
    if let Some(key) = groq_key {
        (AiProvider::Groq, Some(key))
    } else if let Some(key) = openai_key {
        (AiProvider::OpenAi, Some(key))
    } else {
        (AiProvider::Disabled, None)
    }
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Locate the config file for the platform, if one exists
///
/// Checks `<config dir>/aegis/config.toml` first, then `/etc/aegis/config.toml`.
pub fn config_file_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("aegis").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    let system_config = PathBuf::from("/etc/aegis/config.toml");
    if system_config.exists() {
        return Some(system_config);
    }

    None
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("aegis"))
        .unwrap_or_else(|| PathBuf::from("./aegis_data"))
}

/// Root folder resolution
///
/// Priority order:
/// 1. Command-line argument
/// 2. `AEGIS_ROOT_FOLDER` environment variable
/// 3. `root_folder` in the TOML config
/// 4. OS-dependent default
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    toml_root: Option<String>,
}

impl RootFolderResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            cli_arg: None,
            toml_root: None,
        }
    }

    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    pub fn with_toml(mut self, config: &TomlConfig) -> Self {
        self.toml_root = config.root_folder.clone();
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            info!(module = %self.module_name, "Root folder from command line: {}", path.display());
            return path.clone();
        }

        if let Some(path) = env_non_empty(ROOT_FOLDER_ENV) {
            info!(module = %self.module_name, "Root folder from {}: {}", ROOT_FOLDER_ENV, path);
            return PathBuf::from(path);
        }

        if let Some(path) = self.toml_root.as_deref().filter(|p| !p.is_empty()) {
            info!(module = %self.module_name, "Root folder from config file: {}", path);
            return PathBuf::from(path);
        }

        let path = default_root_folder();
        info!(module = %self.module_name, "Root folder (default): {}", path.display());
        path
    }
}

/// Creates the root folder and locates the database inside it
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
            info!("Created root folder: {}", self.root_folder.display());
        }
        if !self.root_folder.is_dir() {
            return Err(Error::Config(format!(
                "Root folder is not a directory: {}",
                self.root_folder.display()
            )));
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE_NAME)
    }
}
