//! Configuration for deep-agent-chat.
//!
//! A global file under the user's config directory is merged with an
//! optional project-local `.deep-agent-chat/config.toml`, then `DAC_*`
//! environment variables are applied on top.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::client::{ClientAuth, GraphClient};
use crate::core::diff::DiffFormat;
use crate::core::keychain;

const APP_DIR: &str = "deep-agent-chat";
const PROJECT_DIR: &str = ".deep-agent-chat";

/// How the chat is hosted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMode {
    /// Embedded in an agent platform; authenticates with an access token.
    Oap,
    /// Talks to a deployment directly.
    #[default]
    Standalone,
}

/// Connection settings for the chat and the optimizer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Assistant (or graph) to chat with.
    pub assistant_id: String,

    /// Base URL of the graph deployment.
    pub deployment_url: String,

    /// Access token. Prefer the keychain (`dac auth login`) over storing it here.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// Deployment running the optimizer graph; defaults to `deployment_url`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimizer_deployment_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimizer_access_token: Option<String>,

    pub mode: DeploymentMode,

    /// Deployment id for the proxy path used without an access token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<String>,
}

impl ChatConfig {
    /// Check the settings needed to connect.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first missing setting.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.deployment_url.trim().is_empty() {
            anyhow::bail!("no deployment URL configured (set chat.deployment_url or DAC_DEPLOYMENT_URL)");
        }
        if self.assistant_id.trim().is_empty() {
            anyhow::bail!("no assistant configured (set chat.assistant_id or DAC_ASSISTANT_ID)");
        }
        if self.mode == DeploymentMode::Oap && self.resolved_access_token().is_none() {
            anyhow::bail!("oap mode needs an access token (run `dac auth login`)");
        }
        Ok(())
    }

    /// Access token from config, falling back to the keychain.
    #[must_use]
    pub fn resolved_access_token(&self) -> Option<String> {
        self.access_token
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| keychain::get_access_token(&self.deployment_url))
    }

    /// URL of the optimizer deployment.
    #[must_use]
    pub fn optimizer_url(&self) -> &str {
        self.optimizer_deployment_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .unwrap_or(&self.deployment_url)
    }

    fn auth(&self, token: Option<String>) -> ClientAuth {
        match token {
            Some(token) => ClientAuth::AccessToken(token),
            None => ClientAuth::LangSmith {
                deployment_id: self.deployment_id.clone(),
            },
        }
    }

    /// Client for the chat deployment.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is empty or the token is not a valid header.
    pub fn client(&self) -> anyhow::Result<GraphClient> {
        let auth = self.auth(self.resolved_access_token());
        Ok(GraphClient::new(&self.deployment_url, auth)?)
    }

    /// Client for the optimizer deployment.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is empty or the token is not a valid header.
    pub fn optimizer_client(&self) -> anyhow::Result<GraphClient> {
        let url = self.optimizer_url();
        let token = self
            .optimizer_access_token
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| keychain::get_access_token(url))
            .or_else(|| self.resolved_access_token());
        Ok(GraphClient::new(url, self.auth(token))?)
    }
}

/// Settings for `dac serve`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,

    /// Bearer token required on `/api` routes. Unset leaves them open.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7891,
            token: None,
        }
    }
}

/// Terminal UI settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuiConfig {
    /// Enable mouse support.
    pub mouse: bool,

    /// Start in debug (single step) mode.
    pub debug: bool,

    /// Format used when reviewing config diffs.
    pub diff_format: DiffFormat,

    /// Quiet period before the thread list refreshes, in milliseconds.
    pub refresh_debounce_ms: u64,
}

impl Default for TuiConfig {
    fn default() -> Self {
        Self {
            mouse: true,
            debug: false,
            diff_format: DiffFormat::Yaml,
            refresh_debounce_ms: 300,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub chat: ChatConfig,
    pub api: ApiConfig,
    pub tui: TuiConfig,
}

impl Config {
    /// Load configuration from the default locations and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file cannot be read or parsed.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;

        if let Ok(project_path) = Self::project_config_path() {
            if project_path.exists() {
                config.merge(Self::load_from(&project_path)?);
            }
        }

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Read one file; a missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config = toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("invalid config {}: {e}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Write the configuration as TOML, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Project-local config file (`.deep-agent-chat/config.toml` in the cwd).
    ///
    /// # Errors
    ///
    /// Returns an error if the current directory is unavailable.
    pub fn project_config_path() -> anyhow::Result<PathBuf> {
        Ok(std::env::current_dir()?.join(PROJECT_DIR).join("config.toml"))
    }

    /// Global config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined.
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Config directory (`~/.config/deep-agent-chat/`).
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined.
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        if let Ok(xdg_config_home) = std::env::var("XDG_CONFIG_HOME") {
            return Ok(PathBuf::from(xdg_config_home).join(APP_DIR));
        }

        let base = directories::BaseDirs::new()
            .ok_or_else(|| anyhow::anyhow!("could not determine config directory"))?;
        Ok(base.config_dir().join(APP_DIR))
    }

    /// Data directory (`~/.local/share/deep-agent-chat/`), used for logs.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory cannot be determined.
    pub fn data_dir() -> anyhow::Result<PathBuf> {
        let base = directories::BaseDirs::new()
            .ok_or_else(|| anyhow::anyhow!("could not determine data directory"))?;
        Ok(base.data_dir().join(APP_DIR))
    }

    /// Overlay values set in `other` (project config wins over global).
    fn merge(&mut self, other: Self) {
        let chat = other.chat;
        let defaults = ChatConfig::default();

        if !chat.assistant_id.is_empty() {
            self.chat.assistant_id = chat.assistant_id;
        }
        if !chat.deployment_url.is_empty() {
            self.chat.deployment_url = chat.deployment_url;
        }
        if chat.mode != defaults.mode {
            self.chat.mode = chat.mode;
        }
        self.chat.access_token = chat.access_token.or(self.chat.access_token.take());
        self.chat.optimizer_deployment_url = chat
            .optimizer_deployment_url
            .or(self.chat.optimizer_deployment_url.take());
        self.chat.optimizer_access_token = chat
            .optimizer_access_token
            .or(self.chat.optimizer_access_token.take());
        self.chat.deployment_id = chat.deployment_id.or(self.chat.deployment_id.take());

        if other.api != ApiConfig::default() {
            self.api = other.api;
        }
        if other.tui != TuiConfig::default() {
            self.tui = other.tui;
        }
    }

    /// Apply `DAC_*` overrides. `lookup` reads a variable.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(url) = get("DAC_DEPLOYMENT_URL") {
            self.chat.deployment_url = url;
        }
        if let Some(id) = get("DAC_ASSISTANT_ID") {
            self.chat.assistant_id = id;
        }
        if let Some(token) = get("DAC_ACCESS_TOKEN") {
            self.chat.access_token = Some(token);
        }
        if let Some(url) = get("DAC_OPTIMIZER_URL") {
            self.chat.optimizer_deployment_url = Some(url);
        }
        if let Some(id) = get("DAC_DEPLOYMENT_ID") {
            self.chat.deployment_id = Some(id);
        }
        if let Some(token) = get("DAC_API_TOKEN") {
            self.api.token = Some(token);
        }
        if let Some(mode) = get("DAC_MODE") {
            match mode.to_ascii_lowercase().as_str() {
                "oap" => self.chat.mode = DeploymentMode::Oap,
                "standalone" => self.chat.mode = DeploymentMode::Standalone,
                other => tracing::warn!(mode = other, "ignoring unknown DAC_MODE"),
            }
        }
    }
}
