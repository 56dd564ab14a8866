use std::io::{self, Write};

use anyhow::{Context, Result};
use tracing::info;

use crate::api::{MediaWikiClient, MediaWikiClientConfig, WikiWriteApi};
use crate::config::BotConfig;

/// Build a client for the configured wiki and sign in with the configured
/// bot account.
pub fn open_session(config: &BotConfig) -> Result<MediaWikiClient> {
    let credentials = config.credentials().context(
        "no bot account configured: set WIKI_USERNAME and WIKI_PASSWORD or [wiki] username/password",
    )?;
    let host = config.host();
    let client = MediaWikiClient::new(MediaWikiClientConfig::from_config(config))?;

    print!("Logging into {host}... ");
    let _ = io::stdout().flush();
    client
        .login(&credentials.username, &credentials.password)
        .with_context(|| format!("failed to sign in to {host} as {}", credentials.username))?;
    println!("Ready.");
    info!(host = %host, api = client.api_url(), "session opened");
    Ok(client)
}
