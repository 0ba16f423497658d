//! The contract every entity list page is built on.
//!
//! A [`ListController`] owns the filter of one table, reads pages through
//! the shared [`ResourceCache`] and routes row and bulk actions through the
//! [`BulkActionCoordinator`]. What it exposes always belongs to the current
//! committed filter: a response for a filter that has since been replaced
//! is dropped when it arrives.

use payloads::responses::PageMeta;
use payloads::{ClientError, EntityId, FilterQuery};
use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

use crate::bulk_action::{BulkActionCoordinator, BulkOperation};
use crate::filter_state::{FilterState, FilterUpdate};
use crate::resource::Resource;
use crate::resource_cache::{CacheKey, QueryState, ResourceCache};
use crate::selection::Selection;
use crate::session_guard::SessionGuard;

/// Everything a page renders.
#[derive(Debug, Clone, PartialEq)]
pub struct ListView<T> {
    /// The filter as the inputs show it.
    pub query: FilterQuery,
    pub rows: Vec<T>,
    pub meta: PageMeta,
    pub is_pending: bool,
    pub error: Option<ClientError>,
}

struct State<T> {
    filter: FilterState,
    /// Filter the current rows were loaded for.
    shown: Option<FilterQuery>,
    rows: Vec<T>,
    meta: PageMeta,
    is_pending: bool,
    error: Option<ClientError>,
}

struct Inner<T> {
    resource: Resource,
    route: String,
    cache: Arc<ResourceCache>,
    bulk: BulkActionCoordinator,
    guard: SessionGuard,
    selection: Selection,
    state: Mutex<State<T>>,
}

/// Cheap to clone; clones drive the same list.
pub struct ListController<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for ListController<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> ListController<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn new(
        resource: Resource,
        route: impl Into<String>,
        defaults: FilterQuery,
        debounce: Duration,
        cache: Arc<ResourceCache>,
        bulk: BulkActionCoordinator,
        guard: SessionGuard,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                resource,
                route: route.into(),
                cache,
                bulk,
                guard,
                selection: Selection::new(),
                state: Mutex::new(State {
                    filter: FilterState::new(defaults, debounce),
                    shown: None,
                    rows: Vec::new(),
                    meta: PageMeta::default(),
                    is_pending: false,
                    error: None,
                }),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn resource(&self) -> &Resource {
        &self.inner.resource
    }

    pub fn selection(&self) -> &Selection {
        &self.inner.selection
    }

    /// The filter as the inputs show it, including uncommitted text.
    pub fn query(&self) -> FilterQuery {
        self.lock().filter.current().clone()
    }

    /// The filter the shown rows belong to.
    pub fn committed(&self) -> FilterQuery {
        self.lock().filter.committed().clone()
    }

    pub fn snapshot(&self) -> ListView<T> {
        let state = self.lock();
        ListView {
            query: state.filter.current().clone(),
            rows: state.rows.clone(),
            meta: state.meta.clone(),
            is_pending: state.is_pending,
            error: state.error.clone(),
        }
    }

    /// Merge a filter change. Returns the filter as the inputs should show
    /// it; a committed change is fetched before this returns.
    pub async fn update(&self, mut partial: FilterUpdate) -> FilterQuery {
        let resource = &self.inner.resource;
        partial.extra.retain(|key, _| {
            let accepted = resource.accepts_filter_key(key);
            if !accepted {
                tracing::debug!(
                    resource = resource.name(),
                    key,
                    "Ignoring undeclared filter key"
                );
            }
            accepted
        });

        let (shown, committed) = {
            let mut state = self.lock();
            let before = state.filter.committed().clone();
            let shown = state.filter.update(&partial, Instant::now());
            let after = state.filter.committed();
            (shown, (*after != before).then(|| after.clone()))
        };
        if let Some(query) = committed {
            self.load(query).await;
        }
        shown
    }

    /// Commit debounced text whose quiet period is over, and fetch it.
    /// Returns whether anything was committed.
    pub async fn tick(&self) -> bool {
        let committed = self.lock().filter.poll(Instant::now());
        match committed {
            Some(query) => {
                self.load(query).await;
                true
            }
            None => false,
        }
    }

    /// Wait out any pending debounce and fetch its result.
    pub async fn settle(&self) {
        loop {
            let deadline = self.lock().filter.deadline();
            let Some(deadline) = deadline else {
                break;
            };
            tokio::time::sleep_until(deadline).await;
            self.tick().await;
        }
    }

    /// Fetch the current page, from the cache when it is still valid.
    pub async fn refresh(&self) {
        let query = self.committed();
        self.load(query).await;
    }

    pub async fn run_bulk(
        &self,
        operation: &BulkOperation,
    ) -> Result<(), ClientError> {
        let active = self.committed();
        let result = self
            .inner
            .bulk
            .run(
                &self.inner.resource,
                operation,
                &self.inner.selection,
                &active,
            )
            .await;
        match result {
            Ok(()) => {
                self.refresh().await;
                self.step_back_if_out_of_range().await;
                Ok(())
            }
            Err(e) => {
                if e == ClientError::AuthExpired {
                    self.inner.guard.handle_unauthorized(&self.inner.route);
                }
                Err(e)
            }
        }
    }

    pub async fn update_row_status(
        &self,
        id: EntityId,
        status: i32,
    ) -> Result<(), ClientError> {
        self.run_bulk(&BulkOperation::row_status(id, status)).await
    }

    pub async fn delete_row(&self, id: EntityId) -> Result<(), ClientError> {
        self.run_bulk(&BulkOperation::row_delete(id)).await
    }

    /// Deleting the last rows of the last page leaves the page past the
    /// end; move to the new last page.
    async fn step_back_if_out_of_range(&self) {
        let last_page = {
            let state = self.lock();
            let page = state.filter.committed().page;
            let page_count = state.meta.page_count.max(1);
            (state.error.is_none() && u64::from(page) > page_count)
                .then_some(page_count)
        };
        if let Some(last_page) = last_page {
            let page = u32::try_from(last_page).unwrap_or(u32::MAX);
            self.update(FilterUpdate::new().page(page)).await;
        }
    }

    async fn load(&self, query: FilterQuery) {
        let reloading = {
            let mut state = self.lock();
            state.is_pending = true;
            state.shown.as_ref() == Some(&query)
        };
        let key = CacheKey::list(self.inner.resource.name(), &query);
        if reloading && self.inner.cache.status(&key).is_none() {
            // the page on screen was invalidated; its rows may be gone
            self.inner.selection.clear();
        }
        let result = self.inner.cache.query(&self.inner.resource, &query).await;
        self.apply(&query, result);
    }

    fn apply(&self, query: &FilterQuery, result: QueryState) {
        if result.error == Some(ClientError::AuthExpired) {
            self.inner.guard.handle_unauthorized(&self.inner.route);
        }

        let mut state = self.lock();
        if state.filter.committed() != query {
            tracing::debug!(
                resource = self.inner.resource.name(),
                "Discarding response for a superseded filter"
            );
            return;
        }
        state.is_pending = false;
        if let Some(e) = result.error {
            state.error = Some(e);
            return;
        }
        let rows = result
            .data
            .map(serde_json::from_value::<Vec<T>>)
            .transpose()
            .map_err(|e| ClientError::InvalidResponse(e.to_string()));
        match rows {
            Ok(rows) => {
                state.rows = rows.unwrap_or_default();
                state.shown = Some(query.clone());
                state.meta = result.meta.unwrap_or_default();
                state.error = None;
            }
            Err(e) => state.error = Some(e),
        }
    }
}
