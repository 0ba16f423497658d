//! Filter, sort and pagination state of one list.

use payloads::{FilterQuery, SortOrder};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;

use crate::debounce::Debounced;

/// A partial [`FilterQuery`]. Only the fields that are set are merged.
///
/// An empty string clears a text field or a resource-specific key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterUpdate {
    pub text_search: Option<String>,
    pub search_field: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub sort_field: Option<String>,
    pub sort_order: Option<SortOrder>,
    pub status: Option<String>,
    pub extra: BTreeMap<String, String>,
}

impl FilterUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text_search(mut self, text: impl Into<String>) -> Self {
        self.text_search = Some(text.into());
        self
    }

    pub fn search_field(mut self, field: impl Into<String>) -> Self {
        self.search_field = Some(field.into());
        self
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn sort(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort_field = Some(field.into());
        self.sort_order = Some(order);
        self
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// A resource-specific key such as `room_id`. Keys that name a typed
    /// field (`page`, `status`, ...) are ignored on merge.
    pub fn filter(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Whether the update touches anything that changes the result set.
    pub fn touches_filter(&self) -> bool {
        self.text_search.is_some()
            || self.search_field.is_some()
            || self.sort_field.is_some()
            || self.sort_order.is_some()
            || self.status.is_some()
            || self.extra_keys().next().is_some()
    }

    /// Resource-specific entries, minus any that shadow a typed field.
    fn extra_keys(&self) -> impl Iterator<Item = (&String, &String)> {
        self.extra.iter().filter(|(key, _)| {
            let reserved = FilterQuery::is_reserved_key(key);
            if reserved {
                tracing::debug!(
                    key = key.as_str(),
                    "Ignoring reserved filter key"
                );
            }
            !reserved
        })
    }

    fn is_text_only(&self) -> bool {
        self.text_search.is_some()
            && *self
                == Self {
                    text_search: self.text_search.clone(),
                    ..Self::default()
                }
    }

    /// Shallow-merge into `query`, resetting `page` to 1 when a filter key
    /// is touched, even if its value did not change.
    pub fn merge_into(&self, query: &mut FilterQuery) {
        fn merge(slot: &mut Option<String>, value: &Option<String>) {
            if let Some(value) = value {
                *slot = Some(value.clone()).filter(|v| !v.is_empty());
            }
        }

        merge(&mut query.text_search, &self.text_search);
        merge(&mut query.search_field, &self.search_field);
        merge(&mut query.sort_field, &self.sort_field);
        merge(&mut query.status, &self.status);
        if let Some(order) = self.sort_order {
            query.sort_order = Some(order);
        }
        for (key, value) in self.extra_keys() {
            if value.is_empty() {
                query.extra.remove(key);
            } else {
                query.extra.insert(key.clone(), value.clone());
            }
        }
        if let Some(page_size) = self.page_size {
            query.page_size = page_size.max(1);
        }
        if let Some(page) = self.page {
            query.page = page.max(1);
        }
        if self.touches_filter() {
            query.page = 1;
        }
    }
}

/// Owns the [`FilterQuery`] of one list. Text search is debounced; every
/// other change commits at once and flushes any pending text with it.
#[derive(Debug, Clone)]
pub struct FilterState {
    query: Debounced<FilterQuery>,
}

impl FilterState {
    pub fn new(initial: FilterQuery, debounce: Duration) -> Self {
        Self {
            query: Debounced::new(initial, debounce),
        }
    }

    /// The query as the inputs show it, including uncommitted text.
    pub fn current(&self) -> &FilterQuery {
        self.query.value()
    }

    /// The query fetches are made for.
    pub fn committed(&self) -> &FilterQuery {
        self.query.committed()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.query.deadline()
    }

    /// Merge `partial` and return the displayed query.
    pub fn update(
        &mut self,
        partial: &FilterUpdate,
        now: Instant,
    ) -> FilterQuery {
        let mut next = self.query.value().clone();
        partial.merge_into(&mut next);
        if partial.is_text_only() {
            self.query.set(next, now);
        } else {
            self.query.commit_now(next);
        }
        self.query.value().clone()
    }

    /// Commit debounced text whose quiet period is over. Returns the newly
    /// committed query.
    pub fn poll(&mut self, now: Instant) -> Option<FilterQuery> {
        self.query.poll(now)
    }
}
