use std::sync::Arc;

use crate::storage::{Storage, StorageError};

const KEY_PREFIX: &str = "visible_columns";

/// Which columns each table shows, in display order, remembered across
/// restarts.
#[derive(Clone)]
pub struct ColumnPreferences {
    storage: Arc<dyn Storage>,
}

impl ColumnPreferences {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    fn key(table_id: &str) -> String {
        format!("{KEY_PREFIX}.{table_id}")
    }

    /// The stored choice for a table. Unreadable values count as unset.
    pub fn visible(&self, table_id: &str) -> Option<Vec<String>> {
        let raw = match self.storage.get(&Self::key(table_id)) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(
                    table_id,
                    "Reading column preferences failed: {e}"
                );
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(columns) => Some(columns),
            Err(e) => {
                tracing::warn!(
                    table_id,
                    "Ignoring stored column preferences: {e}"
                );
                None
            }
        }
    }

    /// The columns to show the first time a table renders: the stored
    /// choice if there is one, otherwise `defaults`, which are then stored.
    pub fn ensure_defaults(
        &self,
        table_id: &str,
        defaults: &[&str],
    ) -> Vec<String> {
        if let Some(columns) = self.visible(table_id) {
            return columns;
        }
        let columns: Vec<String> =
            defaults.iter().map(|c| c.to_string()).collect();
        if let Err(e) = self.update(table_id, &columns) {
            tracing::warn!(table_id, "Storing default columns failed: {e}");
        }
        columns
    }

    pub fn update(
        &self,
        table_id: &str,
        columns: &[String],
    ) -> Result<(), StorageError> {
        let raw = serde_json::to_string(columns)?;
        self.storage.set(&Self::key(table_id), &raw)
    }
}
