//! Types shared between the console client and the admin backend, plus the
//! HTTP client used to talk to it.

pub mod api_client;
pub mod requests;
pub mod responses;

pub use api_client::{APIClient, ClientError};

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Numeric id of any entity managed by the console (room, booking, user,
/// department, accessory, admin).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct EntityId(pub i64);

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[display("asc")]
    Asc,
    #[display("desc")]
    Desc,
}

/// Filter, sort and pagination parameters for a resource search.
///
/// Resource-specific keys (`room_id`, `department_id`, `book_start`, ...)
/// live in `extra`. The map is ordered so that serializing the same query
/// twice always yields the same string, which the cache relies on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_search: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_field: Option<String>,
    pub page: u32,
    pub page_size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<SortOrder>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl Default for FilterQuery {
    fn default() -> Self {
        Self {
            text_search: None,
            search_field: None,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            sort_field: None,
            sort_order: None,
            status: None,
            extra: BTreeMap::new(),
        }
    }
}

impl FilterQuery {
    /// Query parameters owned by the typed fields. A resource-specific key
    /// may not reuse one of them.
    pub const RESERVED_KEYS: [&'static str; 7] = [
        "textSearch",
        "searchField",
        "page",
        "pageSize",
        "sortField",
        "sortOrder",
        "status",
    ];

    pub fn is_reserved_key(key: &str) -> bool {
        Self::RESERVED_KEYS.contains(&key)
    }

    /// Deterministic serialization used as the list cache key.
    pub fn cache_key(&self) -> String {
        // Struct fields serialize in declaration order and `extra` is a
        // BTreeMap, so the output is stable.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Query string pairs sent to `{resource}/search`. Unset and empty
    /// values are omitted.
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        let mut push = |key: &str, value: Option<String>| {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                pairs.push((key.to_string(), value));
            }
        };
        push("textSearch", self.text_search.clone());
        push("searchField", self.search_field.clone());
        push("page", Some(self.page.to_string()));
        push("pageSize", Some(self.page_size.to_string()));
        push("sortField", self.sort_field.clone());
        push("sortOrder", self.sort_order.map(|o| o.to_string()));
        push("status", self.status.clone());
        for (key, value) in &self.extra {
            if !Self::is_reserved_key(key) {
                push(key, Some(value.clone()));
            }
        }
        pairs
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.extra.get(key).map(String::as_str)
    }
}
