//! In-memory registry of dataset definitions.

use std::sync::Arc;

use dashmap::DashMap;

use tempo_common::types::{Dataset, DatasetRef};
use tempo_common::StoreError;

/// Dataset-definition metastore. Definitions are immutable once registered;
/// changing one requires a new `DatasetRef`.
#[derive(Default)]
pub struct MetaStore {
    datasets: DashMap<DatasetRef, Arc<Dataset>>,
}

impl MetaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dataset. Fails if the reference is already taken.
    pub fn create(&self, dataset: Dataset) -> Result<(), StoreError> {
        let dataset_ref = dataset.dataset_ref().clone();
        match self.datasets.entry(dataset_ref.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(StoreError::DatasetExists(dataset_ref))
            }
            dashmap::mapref::entry::Entry::Vacant(v) => {
                tracing::info!(dataset = %dataset_ref, "dataset registered");
                v.insert(Arc::new(dataset));
                Ok(())
            }
        }
    }

    pub fn get(&self, dataset_ref: &DatasetRef) -> Result<Arc<Dataset>, StoreError> {
        self.datasets
            .get(dataset_ref)
            .map(|d| d.value().clone())
            .ok_or_else(|| StoreError::DatasetNotFound(dataset_ref.clone()))
    }

    /// Remove a dataset definition. Deleting a reference that does not exist
    /// is a no-op success, so retries of a delete are harmless.
    pub fn delete(&self, dataset_ref: &DatasetRef) {
        if self.datasets.remove(dataset_ref).is_some() {
            tracing::info!(dataset = %dataset_ref, "dataset deleted");
        }
    }

    pub fn list(&self) -> Vec<DatasetRef> {
        let mut refs: Vec<_> = self.datasets.iter().map(|e| e.key().clone()).collect();
        refs.sort_by(|a, b| a.to_string().cmp(&b.to_string()));
        refs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempo_common::types::{Column, ColumnType};

    fn dataset(name: &str) -> Dataset {
        Dataset::new(
            DatasetRef::new(name),
            vec![
                Column::new(0, "seg", ColumnType::String),
                Column::new(1, "t", ColumnType::Timestamp),
            ],
            &["seg"],
            &["t"],
        )
        .unwrap()
    }

    #[test]
    fn test_create_then_get_then_delete() {
        let store = MetaStore::new();
        store.create(dataset("foo")).unwrap();

        // Second registration under the same ref fails.
        let err = store.create(dataset("foo")).unwrap_err();
        assert_eq!(err, StoreError::DatasetExists(DatasetRef::new("foo")));

        let found = store.get(&DatasetRef::new("foo")).unwrap();
        assert_eq!(found.dataset_ref(), &DatasetRef::new("foo"));

        let missing = store.get(&DatasetRef::new("missing")).unwrap_err();
        assert_eq!(missing, StoreError::DatasetNotFound(DatasetRef::new("missing")));

        store.delete(&DatasetRef::new("foo"));
        let gone = store.get(&DatasetRef::new("foo")).unwrap_err();
        assert_eq!(gone, StoreError::DatasetNotFound(DatasetRef::new("foo")));
    }

    #[test]
    fn test_delete_missing_is_idempotent() {
        let store = MetaStore::new();
        store.delete(&DatasetRef::new("never-created"));
    }

    #[test]
    fn test_list_is_sorted() {
        let store = MetaStore::new();
        store.create(dataset("zeta")).unwrap();
        store.create(dataset("alpha")).unwrap();
        let refs: Vec<String> = store.list().iter().map(|r| r.to_string()).collect();
        assert_eq!(refs, vec!["alpha", "zeta"]);
    }
}
