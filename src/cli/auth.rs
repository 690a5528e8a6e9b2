use crate::config::Config;
use crate::core::keychain;
use dialoguer::{theme::ColorfulTheme, Input, Password};

use super::LoginArgs;

/// Where the access token for a deployment comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Environment,
    ConfigFile,
    Keychain,
    None,
}

impl TokenSource {
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::Environment => "DAC_ACCESS_TOKEN",
            Self::ConfigFile => "config file",
            Self::Keychain => "system keychain",
            Self::None => "none (LangSmith auth scheme)",
        }
    }
}

/// Resolve where the token would be read from, without revealing it.
#[must_use]
pub fn token_source(config: &Config, env_token: Option<&str>, keychain_token: Option<&str>) -> TokenSource {
    if env_token.is_some_and(|t| !t.is_empty()) {
        TokenSource::Environment
    } else if config.chat.access_token.as_deref().is_some_and(|t| !t.is_empty()) {
        TokenSource::ConfigFile
    } else if keychain_token.is_some() {
        TokenSource::Keychain
    } else {
        TokenSource::None
    }
}

fn resolve_url(url: Option<String>, config: &Config) -> anyhow::Result<String> {
    let url = url
        .filter(|u| !u.trim().is_empty())
        .or_else(|| Some(config.chat.deployment_url.clone()).filter(|u| !u.is_empty()));
    match url {
        Some(url) => Ok(url.trim().trim_end_matches('/').to_string()),
        None => prompt_url(),
    }
}

pub fn auth_login(args: LoginArgs, config: &Config) -> anyhow::Result<()> {
    let url = resolve_url(args.url, config)?;
    let token = match args.token {
        Some(token) => token,
        None => prompt_token(&url)?,
    };
    if token.trim().is_empty() {
        anyhow::bail!("Access token cannot be empty");
    }

    keychain::store_access_token(&url, token.trim())?;
    println!("Stored access token for {url} in system keychain");
    Ok(())
}

pub fn auth_logout(url: Option<String>, config: &Config) -> anyhow::Result<()> {
    let url = resolve_url(url, config)?;
    keychain::delete_access_token(&url)?;
    println!("Removed access token for {url}");
    Ok(())
}

pub fn auth_status(config: &Config) {
    let url = &config.chat.deployment_url;
    if url.is_empty() {
        println!("No deployment configured");
        return;
    }
    let env = std::env::var("DAC_ACCESS_TOKEN").ok();
    let stored = keychain::get_access_token(url);
    let source = token_source(config, env.as_deref(), stored.as_deref());
    println!("Deployment: {url}");
    println!("Mode:       {:?}", config.chat.mode);
    println!("Token:      {}", source.describe());
}

fn prompt_url() -> anyhow::Result<String> {
    let url: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("Deployment URL")
        .interact_text()?;
    if url.trim().is_empty() {
        anyhow::bail!("Deployment URL cannot be empty");
    }
    Ok(url.trim().trim_end_matches('/').to_string())
}

fn prompt_token(url: &str) -> anyhow::Result<String> {
    let token = Password::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("Access token for {url}"))
        .interact()?;
    Ok(token)
}
