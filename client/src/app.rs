//! The process-wide console state: one token store, one session guard and
//! one resource cache shared by every page.

use anyhow::Context;
use payloads::requests::LoginCredentials;
use payloads::{ClientError, FilterQuery};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::backend::{Backend, HttpBackend};
use crate::bulk_action::BulkActionCoordinator;
use crate::columns::ColumnPreferences;
use crate::config::Config;
use crate::list_controller::ListController;
use crate::redirect::{Navigator, post_login_target};
use crate::resource::Resource;
use crate::resource_cache::ResourceCache;
use crate::session_guard::{Access, SessionGuard};
use crate::storage::{FileStorage, MemoryStorage, Storage};
use crate::time::TimeSource;
use crate::token_store::TokenStore;

pub struct Console {
    backend: Arc<dyn Backend>,
    tokens: TokenStore,
    guard: SessionGuard,
    cache: Arc<ResourceCache>,
    bulk: BulkActionCoordinator,
    columns: ColumnPreferences,
    profile: Mutex<Option<Map<String, Value>>>,
    debounce: Duration,
    page_size: u32,
}

impl Console {
    /// Wire the console around an existing backend. `tokens` must be the
    /// store the backend authenticates with.
    pub fn new(
        config: &Config,
        backend: Arc<dyn Backend>,
        storage: Arc<dyn Storage>,
        tokens: TokenStore,
        navigator: Arc<dyn Navigator>,
        time_source: TimeSource,
    ) -> Self {
        let guard = SessionGuard::new(
            backend.clone(),
            tokens.clone(),
            navigator,
            time_source,
            config.soft_refresh_window,
            config.refresh_timeout,
        );
        let cache = Arc::new(ResourceCache::new(backend.clone()));
        Self {
            bulk: BulkActionCoordinator::new(backend.clone(), cache.clone()),
            columns: ColumnPreferences::new(storage),
            backend,
            tokens,
            guard,
            cache,
            profile: Mutex::new(None),
            debounce: config.debounce,
            page_size: config.page_size,
        }
    }

    /// Open persisted state and connect to the backend named in `config`.
    pub fn open(
        config: &Config,
        navigator: Arc<dyn Navigator>,
        time_source: TimeSource,
    ) -> anyhow::Result<Self> {
        let storage: Arc<dyn Storage> = match &config.storage_path {
            Some(path) => Arc::new(FileStorage::new(path.clone())),
            None => Arc::new(MemoryStorage::new()),
        };
        let tokens = TokenStore::new(storage.clone(), &config.storage_key);
        let backend = HttpBackend::from_config(config, tokens.clone())
            .context("building HTTP client")?;
        Ok(Self::new(
            config,
            Arc::new(backend),
            storage,
            tokens,
            navigator,
            time_source,
        ))
    }

    fn profile_lock(&self) -> MutexGuard<'_, Option<Map<String, Value>>> {
        self.profile
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn guard(&self) -> &SessionGuard {
        &self.guard
    }

    pub fn cache(&self) -> &Arc<ResourceCache> {
        &self.cache
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn columns(&self) -> &ColumnPreferences {
        &self.columns
    }

    /// Profile fields returned with the last login.
    pub fn profile(&self) -> Option<Map<String, Value>> {
        self.profile_lock().clone()
    }

    /// Sign in. `location_query` is the login screen's query string; the
    /// returned path is where to navigate next.
    pub async fn login(
        &self,
        credentials: &LoginCredentials,
        location_query: &str,
    ) -> Result<String, ClientError> {
        match self.backend.login(credentials).await {
            Ok(signed_in) => {
                self.guard.login(&signed_in.token_pair());
                *self.profile_lock() = Some(signed_in.profile);
                tracing::info!("Logged in");
                Ok(post_login_target(location_query))
            }
            Err(e) => {
                self.tokens.clear();
                Err(e)
            }
        }
    }

    /// Sign out. The session is dropped locally even if the backend call
    /// fails.
    pub async fn logout(&self) {
        if let Err(e) = self.backend.logout().await {
            tracing::warn!("Logout request failed: {e}");
        }
        self.guard.logout();
        self.cache.clear();
        *self.profile_lock() = None;
        tracing::info!("Logged out");
    }

    /// A navigation to a protected route.
    pub async fn enter(&self, path: &str) -> Access {
        self.guard.enter(path).await
    }

    /// A list controller for `resource` mounted at `route`, starting from
    /// the default filter.
    pub fn list<T>(&self, resource: Resource, route: &str) -> ListController<T>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let defaults = FilterQuery {
            page_size: self.page_size,
            ..FilterQuery::default()
        };
        self.list_with(resource, route, defaults)
    }

    pub fn list_with<T>(
        &self,
        resource: Resource,
        route: &str,
        defaults: FilterQuery,
    ) -> ListController<T>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        ListController::new(
            resource,
            route,
            defaults,
            self.debounce,
            self.cache.clone(),
            self.bulk.clone(),
            self.guard.clone(),
        )
    }
}
