use client::storage::MemoryStorage;
use client::time::TimeSource;
use client::token_store::TokenStore;
use client::{Config, Console, LoginRedirect, Navigator, telemetry};

pub mod mock;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jiff::{Span, Timestamp};
use payloads::ClientError;
use payloads::responses::TokenPair;
use secrecy::SecretBox;
use std::sync::{Arc, Mutex};
use tracing_log::LogTracer;
use tracing_subscriber::util::SubscriberInitExt;

use crate::mock::FakeBackend;

pub const STORAGE_KEY: &str = "test-storage-key";

pub struct TestConsole {
    pub console: Console,
    pub backend: Arc<FakeBackend>,
    pub navigator: Arc<RecordingNavigator>,
    pub storage: Arc<MemoryStorage>,
    pub time_source: TimeSource,
}

impl TestConsole {
    pub fn now(&self) -> Timestamp {
        self.time_source.now()
    }

    /// A fresh token pair expiring `lifetime` from now.
    pub fn pair_expiring_in(&self, lifetime: Span, tag: &str) -> TokenPair {
        token_pair(self.time_source.after(lifetime), tag)
    }

    /// Put a session in storage as a previous login would have, expiring
    /// `lifetime` from now (negative for an already expired token).
    pub fn sign_in_expiring_in(&self, lifetime: Span) -> TokenPair {
        let pair = self.pair_expiring_in(lifetime, "initial");
        self.console.guard().login(&pair);
        pair
    }

    /// The same console after a restart: new process state over the same
    /// persisted storage, backend and clock.
    pub fn reload(&self) -> TestConsole {
        build_console(
            test_config(),
            self.backend.clone(),
            self.storage.clone(),
            self.time_source.clone(),
        )
    }
}

pub fn test_config() -> Config {
    Config {
        storage_key: SecretBox::new(Box::new(STORAGE_KEY.to_string())),
        ..Config::default()
    }
}

/// A console over a seeded [`FakeBackend`] with the clock at
/// 2025-01-01T00:00:00Z and nobody logged in.
pub fn spawn_console() -> TestConsole {
    spawn_console_with(test_config())
}

pub fn spawn_console_with(config: Config) -> TestConsole {
    let subscriber = telemetry::get_subscriber("error".into());
    let _ = LogTracer::init();
    let _ = subscriber.try_init();

    #[cfg(feature = "mock-time")]
    let time_source = TimeSource::new("2025-01-01T00:00:00Z".parse().unwrap());

    #[cfg(not(feature = "mock-time"))]
    let time_source = TimeSource::new();

    build_console(
        config,
        Arc::new(FakeBackend::seeded()),
        Arc::new(MemoryStorage::new()),
        time_source,
    )
}

fn build_console(
    config: Config,
    backend: Arc<FakeBackend>,
    storage: Arc<MemoryStorage>,
    time_source: TimeSource,
) -> TestConsole {
    let navigator = Arc::new(RecordingNavigator::default());
    let tokens = TokenStore::new(storage.clone(), &config.storage_key);
    let console = Console::new(
        &config,
        backend.clone(),
        storage.clone(),
        tokens,
        navigator.clone(),
        time_source.clone(),
    );
    TestConsole {
        console,
        backend,
        navigator,
        storage,
        time_source,
    }
}

/// Remembers every redirect instead of navigating.
#[derive(Default)]
pub struct RecordingNavigator {
    redirects: Mutex<Vec<LoginRedirect>>,
}

impl RecordingNavigator {
    pub fn redirects(&self) -> Vec<LoginRedirect> {
        self.redirects.lock().unwrap().clone()
    }

    pub fn last_url(&self) -> Option<String> {
        self.redirects.lock().unwrap().last().map(|r| r.to_url())
    }
}

impl Navigator for RecordingNavigator {
    fn redirect(&self, to: &LoginRedirect) {
        self.redirects.lock().unwrap().push(to.clone());
    }
}

/// An unsigned JWT whose only claims are `sub` and `exp`.
pub fn make_access_token(exp: Timestamp, tag: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let claims = URL_SAFE_NO_PAD.encode(
        serde_json::json!({ "sub": tag, "exp": exp.as_second() }).to_string(),
    );
    format!("{header}.{claims}.not-a-signature")
}

pub fn token_pair(exp: Timestamp, tag: &str) -> TokenPair {
    TokenPair {
        access_token: make_access_token(exp, tag),
        refresh_token: format!("refresh-{tag}"),
    }
}

pub fn assert_client_error<T: std::fmt::Debug>(
    result: Result<T, ClientError>,
    expected: ClientError,
) {
    match result {
        Err(e) => assert_eq!(e, expected),
        Ok(value) => panic!("Expected {expected:?}, got Ok({value:?})"),
    };
}
