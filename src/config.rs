//! Configuration loading from `.env` files.

use std::{env, path::PathBuf};

use anyhow::{bail, Context, Result};

/// Runtime settings derived from environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Root directory for all storage.
    pub store_root: PathBuf,
    /// HTTP API bind address, e.g. `127.0.0.1:3000`.
    pub bind_http: String,
    /// Viewer push channel bind address, e.g. `127.0.0.1:3001`.
    pub bind_ws: String,
    /// Base URL of the platform's REST API.
    pub api_base: String,
    /// URL of the platform's filtered live stream.
    pub stream_url: String,
    /// Application key issued by the platform.
    pub consumer_key: String,
    /// Application secret issued by the platform.
    pub consumer_secret: String,
    /// Account access token.
    pub access_token: String,
    /// Account access token secret.
    pub access_token_secret: String,
    /// Handle of the bot's own account, used for timeline fetches.
    pub account: String,
    /// Hashtags to watch. Fixed at startup, at least one required.
    pub watch_terms: Vec<String>,
    /// Log HTTP request lines to stdout.
    pub verbose: bool,
}

impl Settings {
    /// Load settings from the specified `.env` file.
    pub fn from_env(path: &str) -> Result<Self> {
        dotenvy::from_filename(path).context("reading env file")?;
        let store_root = PathBuf::from(env::var("STORE_ROOT")?);
        let bind_http = env::var("BIND_HTTP")?;
        let bind_ws = env::var("BIND_WS")?;
        let api_base = env::var("API_BASE")?.trim_end_matches('/').to_string();
        let stream_url = env::var("STREAM_URL")?;
        let consumer_key = env::var("CONSUMER_KEY")?;
        let consumer_secret = env::var("CONSUMER_SECRET")?;
        let access_token = env::var("ACCESS_TOKEN")?;
        let access_token_secret = env::var("ACCESS_TOKEN_SECRET")?;
        let account = env::var("ACCOUNT")?;
        let watch_terms = csv_strings(env::var("WATCH_TERMS").unwrap_or_default());
        if watch_terms.is_empty() {
            bail!("WATCH_TERMS must list at least one hashtag");
        }
        let verbose = env::var("VERBOSE").unwrap_or_else(|_| "0".into()) == "1";
        Ok(Self {
            store_root,
            bind_http,
            bind_ws,
            api_base,
            stream_url,
            consumer_key,
            consumer_secret,
            access_token,
            access_token_secret,
            account,
            watch_terms,
            verbose,
        })
    }
}

/// Split a comma-separated string into trimmed string values.
pub fn csv_strings(input: impl AsRef<str>) -> Vec<String> {
    let s = input.as_ref();
    s.split(',')
        .filter_map(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .collect()
}

#[cfg(test)]
pub(crate) const ENV_VARS: [&str; 12] = [
    "STORE_ROOT",
    "BIND_HTTP",
    "BIND_WS",
    "API_BASE",
    "STREAM_URL",
    "CONSUMER_KEY",
    "CONSUMER_SECRET",
    "ACCESS_TOKEN",
    "ACCESS_TOKEN_SECRET",
    "ACCOUNT",
    "WATCH_TERMS",
    "VERBOSE",
];
