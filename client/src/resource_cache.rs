//! Keyed cache in front of the resource read endpoints.
//!
//! Concurrent reads of the same key share one in-flight fetch. Writes never
//! patch cached data; they invalidate entries so the next read goes to the
//! backend. A fetch that completes after its entry was invalidated (or the
//! cache cleared) still answers its own waiters but is not stored.

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use payloads::responses::PageMeta;
use payloads::{ClientError, EntityId, FilterQuery};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::Instant;

use crate::backend::Backend;
use crate::resource::Resource;

type Fetched = Result<Arc<Value>, ClientError>;
type InFlight = Shared<BoxFuture<'static, Fetched>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    List { resource: String, filter: String },
    Item { resource: String, id: EntityId },
    Dropdown { resource: String },
}

impl CacheKey {
    pub fn list(resource: &str, filter: &FilterQuery) -> Self {
        Self::List {
            resource: resource.to_string(),
            filter: filter.cache_key(),
        }
    }

    pub fn item(resource: &str, id: EntityId) -> Self {
        Self::Item {
            resource: resource.to_string(),
            id,
        }
    }

    pub fn dropdown(resource: &str) -> Self {
        Self::Dropdown {
            resource: resource.to_string(),
        }
    }

    fn resource(&self) -> &str {
        match self {
            Self::List { resource, .. }
            | Self::Item { resource, .. }
            | Self::Dropdown { resource } => resource,
        }
    }
}

/// Which entries of one resource to invalidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Every entry of the resource.
    All,
    /// Every collection read: all list pages and the dropdown.
    Lists,
    /// One list page.
    List(FilterQuery),
    /// One by-id entry.
    Item(EntityId),
}

impl Scope {
    fn matches(&self, key: &CacheKey) -> bool {
        match (self, key) {
            (Self::All, _) => true,
            (
                Self::Lists,
                CacheKey::List { .. } | CacheKey::Dropdown { .. },
            ) => {
                true
            }
            (Self::List(query), CacheKey::List { filter, .. }) => {
                *filter == query.cache_key()
            }
            (Self::Item(wanted), CacheKey::Item { id, .. }) => wanted == id,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Pending,
    Success,
    Error,
}

enum EntryState {
    Pending(InFlight),
    Ready(Fetched),
}

struct CacheEntry {
    state: EntryState,
    requested_at: Instant,
    epoch: u64,
}

/// What a page renders from: never an `Err`, errors travel in `error`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryState {
    pub data: Option<Value>,
    /// Set for list pages only.
    pub meta: Option<PageMeta>,
    pub is_pending: bool,
    pub error: Option<ClientError>,
}

impl QueryState {
    fn pending() -> Self {
        Self {
            is_pending: true,
            ..Self::default()
        }
    }

    fn failed(error: ClientError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    fn item(fetched: Fetched) -> Self {
        match fetched {
            Ok(value) => Self {
                data: Some(Value::clone(&value)),
                ..Self::default()
            },
            Err(e) => Self::failed(e),
        }
    }

    fn page(fetched: Fetched) -> Self {
        match fetched.and_then(|value| split_page(&value)) {
            Ok((data, meta)) => Self {
                data: Some(data),
                meta: Some(meta),
                ..Self::default()
            },
            Err(e) => Self::failed(e),
        }
    }
}

/// Split a `{ data, meta }` search document.
fn split_page(document: &Value) -> Result<(Value, PageMeta), ClientError> {
    let data = document
        .get("data")
        .filter(|data| data.is_array())
        .cloned()
        .ok_or_else(|| {
            ClientError::InvalidResponse(
                "search result has no data array".into(),
            )
        })?;
    let meta = match document.get("meta") {
        Some(meta) => serde_json::from_value(meta.clone())
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?,
        None => PageMeta::default(),
    };
    Ok((data, meta))
}

pub struct ResourceCache {
    backend: Arc<dyn Backend>,
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
    epochs: AtomicU64,
}

impl ResourceCache {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            entries: Mutex::new(HashMap::new()),
            epochs: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, CacheEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// One page of `resource` for `filter`.
    pub async fn query(
        &self,
        resource: &Resource,
        filter: &FilterQuery,
    ) -> QueryState {
        let key = CacheKey::list(resource.name(), filter);
        let backend = self.backend.clone();
        let resource = resource.clone();
        let filter = filter.clone();
        let fetched = self
            .load(key, move || {
                async move { backend.search(&resource, &filter).await }.boxed()
            })
            .await;
        QueryState::page(fetched)
    }

    pub async fn by_id(&self, resource: &Resource, id: EntityId) -> QueryState {
        let key = CacheKey::item(resource.name(), id);
        let backend = self.backend.clone();
        let resource = resource.clone();
        let fetched = self
            .load(key, move || {
                async move { backend.fetch_by_id(&resource, id).await }.boxed()
            })
            .await;
        QueryState::item(fetched)
    }

    /// The unpaginated list used by selectors.
    pub async fn dropdown(&self, resource: &Resource) -> QueryState {
        let key = CacheKey::dropdown(resource.name());
        let backend = self.backend.clone();
        let resource = resource.clone();
        let fetched = self
            .load(key, move || {
                async move { backend.dropdown(&resource).await }.boxed()
            })
            .await;
        QueryState::item(fetched)
    }

    /// Current state of a list page without fetching.
    pub fn peek(
        &self,
        resource: &Resource,
        filter: &FilterQuery,
    ) -> QueryState {
        let key = CacheKey::list(resource.name(), filter);
        match self.lock().get(&key).map(|entry| &entry.state) {
            Some(EntryState::Pending(_)) => QueryState::pending(),
            Some(EntryState::Ready(fetched)) => {
                QueryState::page(fetched.clone())
            }
            None => QueryState::default(),
        }
    }

    pub fn status(&self, key: &CacheKey) -> Option<EntryStatus> {
        self.lock().get(key).map(|entry| match &entry.state {
            EntryState::Pending(_) => EntryStatus::Pending,
            EntryState::Ready(Ok(_)) => EntryStatus::Success,
            EntryState::Ready(Err(_)) => EntryStatus::Error,
        })
    }

    /// Drop the matching entries of `resource`. Returns how many went.
    pub fn invalidate(&self, resource: &str, scope: Scope) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|key, _| {
            !(key.resource() == resource && scope.matches(key))
        });
        let removed = before - entries.len();
        tracing::debug!(resource, ?scope, removed, "Invalidated cache entries");
        removed
    }

    /// Invalidate after a create or edit: every collection read of the
    /// resource, plus the edited entity.
    pub fn after_write(&self, resource: &str, id: Option<EntityId>) {
        self.invalidate(resource, Scope::Lists);
        if let Some(id) = id {
            self.invalidate(resource, Scope::Item(id));
        }
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    async fn load<F>(&self, key: CacheKey, fetch: F) -> Fetched
    where
        F: FnOnce() -> BoxFuture<'static, Result<Value, ClientError>>,
    {
        let (in_flight, epoch) = {
            let mut entries = self.lock();
            let joined = match entries.get(&key) {
                Some(CacheEntry {
                    state: EntryState::Ready(Ok(value)),
                    requested_at,
                    ..
                }) => {
                    tracing::debug!(
                        ?key,
                        age = ?requested_at.elapsed(),
                        "Cache hit"
                    );
                    return Ok(value.clone());
                }
                Some(CacheEntry {
                    state: EntryState::Pending(in_flight),
                    epoch,
                    ..
                }) => {
                    tracing::debug!(?key, "Joining in-flight fetch");
                    Some((in_flight.clone(), *epoch))
                }
                _ => None,
            };
            match joined {
                Some(joined) => joined,
                None => {
                    tracing::debug!(?key, "Cache miss");
                    let epoch = self.epochs.fetch_add(1, Ordering::Relaxed);
                    let in_flight =
                        fetch().map(|r| r.map(Arc::new)).boxed().shared();
                    entries.insert(
                        key.clone(),
                        CacheEntry {
                            state: EntryState::Pending(in_flight.clone()),
                            requested_at: Instant::now(),
                            epoch,
                        },
                    );
                    (in_flight, epoch)
                }
            }
        };

        let fetched = in_flight.await;

        let mut entries = self.lock();
        match entries.get_mut(&key) {
            Some(entry)
                if entry.epoch == epoch
                    && matches!(entry.state, EntryState::Pending(_)) =>
            {
                if let Err(e) = &fetched {
                    tracing::debug!(?key, "Fetch failed: {e}");
                }
                entry.state = EntryState::Ready(fetched.clone());
            }
            _ => {
                tracing::debug!(?key, "Not storing result of invalidated fetch")
            }
        }
        fetched
    }
}
