use payloads::{ClientError, EntityId, FilterQuery};
use std::sync::Arc;

use crate::backend::Backend;
use crate::resource::Resource;
use crate::resource_cache::{ResourceCache, Scope};
use crate::selection::Selection;
use crate::telemetry::log_error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkAction {
    UpdateStatus(i32),
    Delete,
}

/// Whether an operation came from the selection toolbar or a row's own
/// controls. The two hit different endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionScope {
    Selection,
    Row,
}

/// A mutation applied to a set of rows as one logical operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkOperation {
    pub ids: Vec<EntityId>,
    pub action: BulkAction,
    pub scope: ActionScope,
}

impl BulkOperation {
    pub fn update_status(ids: impl Into<Vec<EntityId>>, status: i32) -> Self {
        Self {
            ids: ids.into(),
            action: BulkAction::UpdateStatus(status),
            scope: ActionScope::Selection,
        }
    }

    pub fn delete(ids: impl Into<Vec<EntityId>>) -> Self {
        Self {
            ids: ids.into(),
            action: BulkAction::Delete,
            scope: ActionScope::Selection,
        }
    }

    pub fn row_status(id: EntityId, status: i32) -> Self {
        Self {
            ids: vec![id],
            action: BulkAction::UpdateStatus(status),
            scope: ActionScope::Row,
        }
    }

    pub fn row_delete(id: EntityId) -> Self {
        Self {
            ids: vec![id],
            action: BulkAction::Delete,
            scope: ActionScope::Row,
        }
    }
}

/// Runs row and bulk mutations and keeps the cache and selection in step
/// with them.
///
/// On success the affected cache entries are invalidated and the selection
/// is cleared. On failure neither is touched.
#[derive(Clone)]
pub struct BulkActionCoordinator {
    backend: Arc<dyn Backend>,
    cache: Arc<ResourceCache>,
}

impl BulkActionCoordinator {
    pub fn new(backend: Arc<dyn Backend>, cache: Arc<ResourceCache>) -> Self {
        Self { backend, cache }
    }

    /// Selections go through the batched endpoints whatever their size; row
    /// actions use the row endpoints. `active_filter` is the list page
    /// currently shown, which a row status change invalidates instead of
    /// every page.
    pub async fn run(
        &self,
        resource: &Resource,
        operation: &BulkOperation,
        selection: &Selection,
        active_filter: &FilterQuery,
    ) -> Result<(), ClientError> {
        let ids = operation.ids.as_slice();
        if ids.is_empty() {
            return Err(ClientError::InvalidInput(
                "select at least one row".into(),
            ));
        }

        let result = match (operation.scope, operation.action, ids) {
            (ActionScope::Row, BulkAction::UpdateStatus(status), [id]) => {
                self.backend.update_status(resource, *id, status).await
            }
            (ActionScope::Row, BulkAction::Delete, [id]) => {
                self.backend.delete(resource, *id).await
            }
            (ActionScope::Row, ..) => {
                return Err(ClientError::InvalidInput(
                    "a row action applies to exactly one row".into(),
                ));
            }
            (ActionScope::Selection, BulkAction::UpdateStatus(status), ids) => {
                self.backend.update_status_many(resource, ids, status).await
            }
            (ActionScope::Selection, BulkAction::Delete, ids) => {
                self.backend.delete_many(resource, ids).await
            }
        };
        if let Err(e) = result {
            if matches!(e, ClientError::ServerError(..)) {
                log_error(e.clone());
            }
            return Err(e);
        }

        let name = resource.name();
        match (operation.scope, operation.action, ids) {
            (ActionScope::Row, BulkAction::UpdateStatus(_), [id]) => {
                self.cache.invalidate(name, Scope::Item(*id));
                self.cache
                    .invalidate(name, Scope::List(active_filter.clone()));
            }
            _ => {
                self.cache.invalidate(name, Scope::Lists);
                for id in ids {
                    self.cache.invalidate(name, Scope::Item(*id));
                }
            }
        }
        selection.clear();
        tracing::info!(
            resource = name,
            action = ?operation.action,
            scope = ?operation.scope,
            count = ids.len(),
            "Applied row action"
        );
        Ok(())
    }
}
