use anyhow::Context;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand_core::{OsRng, RngCore};
use secrecy::SecretBox;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Runtime settings for the console client.
pub struct Config {
    /// Backend origin, e.g. `https://rooms.example.com`.
    pub backend_url: String,
    /// Path segment between the origin and every endpoint. May be empty.
    pub api_prefix: String,
    /// File used for persisted client state. In-memory storage when unset.
    pub storage_path: Option<PathBuf>,
    /// Passphrase the persisted tokens are encrypted with. Random per
    /// process unless configured, which is only usable with in-memory
    /// storage.
    pub storage_key: SecretBox<String>,
    /// Tokens expiring within this window are refreshed in the background.
    pub soft_refresh_window: Duration,
    /// Quiet period before a text search change is allowed to fetch.
    pub debounce: Duration,
    /// A refresh call taking longer than this counts as failed.
    pub refresh_timeout: Duration,
    /// `pageSize` used by new lists unless the page overrides it.
    pub page_size: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:3000".into(),
            api_prefix: String::new(),
            storage_path: None,
            storage_key: ephemeral_key(),
            soft_refresh_window: Duration::from_secs(60 * 60),
            debounce: Duration::from_millis(700),
            refresh_timeout: Duration::from_secs(10),
            page_size: payloads::DEFAULT_PAGE_SIZE,
        }
    }
}

impl Config {
    /// Read settings from `CONSOLE_*` environment variables, falling back to
    /// the defaults for anything unset.
    pub fn from_env() -> anyhow::Result<Self> {
        use std::env::var;

        let defaults = Self::default();
        let storage_path = var("CONSOLE_STORAGE_PATH").ok().map(PathBuf::from);
        let storage_key = storage_key(
            storage_path.as_deref(),
            var("CONSOLE_STORAGE_KEY").ok(),
        )?;

        Ok(Config {
            backend_url: var("CONSOLE_BACKEND_URL")
                .unwrap_or(defaults.backend_url),
            api_prefix: var("CONSOLE_API_PREFIX")
                .unwrap_or(defaults.api_prefix),
            storage_path,
            storage_key,
            soft_refresh_window: parse_env("CONSOLE_SOFT_REFRESH_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.soft_refresh_window),
            debounce: parse_env("CONSOLE_DEBOUNCE_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.debounce),
            refresh_timeout: parse_env("CONSOLE_REFRESH_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.refresh_timeout),
            page_size: parse_env("CONSOLE_PAGE_SIZE")?
                .unwrap_or(defaults.page_size),
        })
    }
}

fn ephemeral_key() -> SecretBox<String> {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    SecretBox::new(Box::new(STANDARD.encode(bytes)))
}

/// Tokens written to disk must be readable by the next run, so a
/// persistent store needs a configured key.
fn storage_key(
    storage_path: Option<&Path>,
    configured: Option<String>,
) -> anyhow::Result<SecretBox<String>> {
    match (configured, storage_path) {
        (Some(key), _) if !key.is_empty() => Ok(SecretBox::new(Box::new(key))),
        (_, Some(path)) => anyhow::bail!(
            "CONSOLE_STORAGE_KEY must be set when CONSOLE_STORAGE_PATH is \
             ({})",
            path.display()
        ),
        (_, None) => Ok(ephemeral_key()),
    }
}

fn parse_env<T>(name: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{name} has an invalid value: {raw:?}")),
        Err(_) => Ok(None),
    }
}
