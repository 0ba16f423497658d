use anyhow::{Context, bail};
use client::{
    Access, Config, Console, LoginRedirect, Navigator, Resource,
    telemetry::{get_subscriber, init_subscriber},
    time::TimeSource,
};
use payloads::requests::LoginCredentials;
use serde_json::Value;
use std::sync::Arc;

/// Console probe
///
/// Signs in to a running admin backend, enters a protected list route and
/// prints the first page of that resource. Useful for checking a deployment
/// and the session settings against it.
///
/// Environment variables can be set directly or loaded from a .env file:
/// - CONSOLE_BACKEND_URL: backend origin (default http://127.0.0.1:3000)
/// - CONSOLE_API_PREFIX: path prefix of every endpoint (optional)
/// - CONSOLE_STORAGE_PATH: file for persisted tokens (optional)
/// - CONSOLE_STORAGE_KEY: passphrase the persisted tokens are encrypted with
/// - CONSOLE_EMAIL, CONSOLE_PASSWORD: credentials used when no stored
///   session is usable
///
/// Example:
/// cargo run --bin console-probe -- booking_list admin/booking_list
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let subscriber = get_subscriber("info".into());
    init_subscriber(subscriber)?;

    let config = Config::from_env()?;

    let mut args = std::env::args().skip(1);
    let name = args.next().unwrap_or_else(|| "room".to_string());
    let base_path = args.next().unwrap_or_else(|| name.clone());
    let route = format!("/{name}");

    #[cfg(not(feature = "mock-time"))]
    let time_source = TimeSource::new();
    #[cfg(feature = "mock-time")]
    let time_source = TimeSource::new(jiff::Timestamp::now());

    let console = Console::open(&config, Arc::new(LogNavigator), time_source)?;

    if let Access::Redirect(to) = console.enter(&route).await {
        tracing::info!("No usable session ({to}), signing in");
        let credentials = LoginCredentials {
            email: std::env::var("CONSOLE_EMAIL")
                .context("CONSOLE_EMAIL is required to sign in")?,
            password: std::env::var("CONSOLE_PASSWORD")
                .context("CONSOLE_PASSWORD is required to sign in")?,
        };
        let query = to.to_url();
        let query = query.split_once('?').map(|(_, q)| q).unwrap_or_default();
        let target = console.login(&credentials, query).await?;
        if let Access::Redirect(to) = console.enter(&target).await {
            bail!("still not allowed into {target} after login: {to}");
        }
    }

    let resource = Resource::new(name).base_path(base_path);
    let list = console.list::<Value>(resource, &route);
    list.refresh().await;
    let page = list.snapshot();
    if let Some(e) = page.error {
        bail!("loading {route} failed: {e}");
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "query": page.query,
            "meta": page.meta,
            "data": page.rows,
        }))?
    );
    Ok(())
}

struct LogNavigator;

impl Navigator for LogNavigator {
    fn redirect(&self, to: &LoginRedirect) {
        tracing::info!(%to, "Redirect");
    }
}
