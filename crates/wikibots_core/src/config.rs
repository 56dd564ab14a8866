use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_HOST: &str = "zh.wikipedia.org";
pub const DEFAULT_USER_AGENT: &str = "wikibots/0.2";
pub const DEFAULT_CONFIG_FILENAME: &str = "wikibots.toml";

pub const DEFAULT_MAX_SAVE_RETRIES: usize = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 5_000;
pub const DEFAULT_CONCURRENCY: usize = 100;

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct BotConfig {
    #[serde(default)]
    pub wiki: WikiSection,
    #[serde(default)]
    pub bot: TuningSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WikiSection {
    pub host: Option<String>,
    pub api_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct TuningSection {
    pub max_save_retries: Option<usize>,
    pub retry_delay_ms: Option<u64>,
    pub concurrency: Option<usize>,
    pub rate_limit_read_ms: Option<u64>,
    pub rate_limit_write_ms: Option<u64>,
    pub http_timeout_ms: Option<u64>,
    pub http_retries: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl BotConfig {
    /// Resolve the wiki host: env WIKI_HOST > config > DEFAULT_HOST.
    pub fn host(&self) -> String {
        env_override("WIKI_HOST")
            .or_else(|| self.wiki.host.clone())
            .unwrap_or_else(|| DEFAULT_HOST.to_string())
    }

    /// Resolve the API endpoint: env WIKI_API_URL > config > derived from host.
    pub fn api_url(&self) -> String {
        env_override("WIKI_API_URL")
            .or_else(|| self.wiki.api_url.clone())
            .unwrap_or_else(|| derive_api_url(&self.host()))
    }

    /// Resolve user agent: env WIKI_USER_AGENT > config > DEFAULT_USER_AGENT.
    pub fn user_agent(&self) -> String {
        env_override("WIKI_USER_AGENT")
            .or_else(|| self.wiki.user_agent.clone())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    /// Account used to sign in. Both halves must resolve, each from env first.
    pub fn credentials(&self) -> Option<Credentials> {
        let username = env_override("WIKI_USERNAME").or_else(|| self.wiki.username.clone())?;
        let password = env_override("WIKI_PASSWORD").or_else(|| self.wiki.password.clone())?;
        if username.trim().is_empty() || password.is_empty() {
            return None;
        }
        Some(Credentials {
            username: username.trim().to_string(),
            password,
        })
    }

    pub fn max_save_retries(&self) -> usize {
        self.bot
            .max_save_retries
            .unwrap_or(DEFAULT_MAX_SAVE_RETRIES)
    }

    pub fn retry_delay_ms(&self) -> u64 {
        self.bot.retry_delay_ms.unwrap_or(DEFAULT_RETRY_DELAY_MS)
    }

    pub fn concurrency(&self) -> usize {
        self.bot.concurrency.unwrap_or(DEFAULT_CONCURRENCY).max(1)
    }
}

/// Load and parse a BotConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<BotConfig> {
    if !config_path.exists() {
        return Ok(BotConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: BotConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

/// `zh.wikipedia.org` -> `https://zh.wikipedia.org/w/api.php`. A host that
/// already carries a scheme keeps it.
pub fn derive_api_url(host: &str) -> String {
    let trimmed = host.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        format!("{trimmed}/w/api.php")
    } else {
        format!("https://{trimmed}/w/api.php")
    }
}

fn env_override(key: &str) -> Option<String> {
    let value = env::var(key).ok()?;
    let trimmed = value.trim().to_string();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
