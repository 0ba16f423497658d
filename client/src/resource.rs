//! Per-resource configuration: the one place where a room list differs from
//! a booking list.

use payloads::EntityId;
use std::collections::BTreeSet;

/// Endpoints a resource exposes. Templates may use `{base}` and `{id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Search,
    ById,
    Dropdown,
    UpdateStatusMany,
    DeleteMany,
    UpdateStatus,
    Delete,
}

impl Endpoint {
    fn default_template(self) -> &'static str {
        match self {
            Self::Search => "{base}/search",
            Self::ById | Self::Delete => "{base}/{id}",
            Self::Dropdown => "{base}/list/dropdown",
            Self::UpdateStatusMany => "{base}/update-status-many",
            Self::DeleteMany => "{base}/delete-many",
            Self::UpdateStatus => "{base}/update/status/{id}",
        }
    }
}

/// A remote collection managed by a list page.
///
/// ```
/// use client::resource::Resource;
///
/// let bookings = Resource::new("booking_list")
///     .base_path("admin/booking_list")
///     .filter_key("room_id")
///     .filter_key("department_id");
/// assert_eq!(bookings.search_path(), "admin/booking_list/search");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    name: String,
    base_path: String,
    filter_keys: BTreeSet<String>,
    overrides: Vec<(Endpoint, String)>,
}

impl Resource {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            base_path: name.clone(),
            name,
            filter_keys: BTreeSet::new(),
            overrides: Vec::new(),
        }
    }

    pub fn base_path(mut self, path: impl Into<String>) -> Self {
        self.base_path = path.into().trim_matches('/').to_string();
        self
    }

    /// Declare a resource-specific filter key. Once any key is declared,
    /// undeclared keys are ignored by filter updates.
    pub fn filter_key(mut self, key: impl Into<String>) -> Self {
        self.filter_keys.insert(key.into());
        self
    }

    pub fn endpoint(
        mut self,
        endpoint: Endpoint,
        template: impl Into<String>,
    ) -> Self {
        self.overrides.retain(|(e, _)| *e != endpoint);
        self.overrides.push((endpoint, template.into()));
        self
    }

    /// Name used for cache namespacing.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn accepts_filter_key(&self, key: &str) -> bool {
        self.filter_keys.is_empty() || self.filter_keys.contains(key)
    }

    pub fn path(&self, endpoint: Endpoint, id: Option<EntityId>) -> String {
        let template = self
            .overrides
            .iter()
            .find(|(e, _)| *e == endpoint)
            .map(|(_, t)| t.as_str())
            .unwrap_or_else(|| endpoint.default_template());
        let path = template.replace("{base}", &self.base_path);
        match id {
            Some(id) => path.replace("{id}", &id.to_string()),
            None => path,
        }
    }

    pub fn search_path(&self) -> String {
        self.path(Endpoint::Search, None)
    }
}
