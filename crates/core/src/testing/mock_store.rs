//! Mock torrent store for testing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::store::{StoreEntry, StoreError, TorrentStore};

/// A recorded store operation for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedStoreOp {
    Add { tag: String, payload_len: usize },
    DeleteByTag { tag: String, delete_files: bool },
    ClearCategory,
}

/// Mock implementation of the TorrentStore trait.
///
/// Keeps entries in a tag-keyed map, records every operation, and supports
/// one-shot failure injection per operation kind.
#[derive(Default)]
pub struct MockStore {
    entries: Arc<RwLock<HashMap<String, Vec<StoreEntry>>>>,
    operations: Arc<RwLock<Vec<RecordedStoreOp>>>,
    next_add_error: Arc<RwLock<Option<StoreError>>>,
    next_delete_error: Arc<RwLock<Option<StoreError>>>,
    hash_counter: Arc<RwLock<u32>>,
}

impl MockStore {
    /// Create a new empty mock store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `add` call with the given error.
    pub async fn fail_next_add(&self, error: StoreError) {
        *self.next_add_error.write().await = Some(error);
    }

    /// Fail the next `delete_by_tag`/`clear_category` call with the given error.
    pub async fn fail_next_delete(&self, error: StoreError) {
        *self.next_delete_error.write().await = Some(error);
    }

    /// All recorded operations in call order.
    pub async fn operations(&self) -> Vec<RecordedStoreOp> {
        self.operations.read().await.clone()
    }

    /// Total number of store calls made.
    pub async fn operation_count(&self) -> usize {
        self.operations.read().await.len()
    }

    /// Entries currently held under a tag.
    pub async fn entries_for_tag(&self, tag: &str) -> Vec<StoreEntry> {
        self.entries
            .read()
            .await
            .get(tag)
            .cloned()
            .unwrap_or_default()
    }

    /// Total number of entries across all tags.
    pub async fn total_entries(&self) -> usize {
        self.entries.read().await.values().map(Vec::len).sum()
    }

    async fn generate_hash(&self) -> String {
        let mut counter = self.hash_counter.write().await;
        *counter += 1;
        format!("mockhash{:08x}", *counter)
    }
}

#[async_trait]
impl TorrentStore for MockStore {
    fn name(&self) -> &str {
        "mock"
    }

    async fn add(&self, data: Vec<u8>, tag: &str) -> Result<(), StoreError> {
        self.operations.write().await.push(RecordedStoreOp::Add {
            tag: tag.to_string(),
            payload_len: data.len(),
        });

        if let Some(error) = self.next_add_error.write().await.take() {
            return Err(error);
        }

        let entry = StoreEntry {
            hash: self.generate_hash().await,
            name: format!("torrent-{}", tag),
            progress: 0.0,
        };
        self.entries
            .write()
            .await
            .entry(tag.to_string())
            .or_default()
            .push(entry);
        Ok(())
    }

    async fn delete_by_tag(&self, tag: &str, delete_files: bool) -> Result<(), StoreError> {
        self.operations
            .write()
            .await
            .push(RecordedStoreOp::DeleteByTag {
                tag: tag.to_string(),
                delete_files,
            });

        if let Some(error) = self.next_delete_error.write().await.take() {
            return Err(error);
        }

        // Deleting an absent tag is a no-op success, as in the real store.
        self.entries.write().await.remove(tag);
        Ok(())
    }

    async fn list_by_tag(&self, tag: &str) -> Result<Vec<StoreEntry>, StoreError> {
        Ok(self.entries_for_tag(tag).await)
    }

    async fn clear_category(&self) -> Result<(), StoreError> {
        self.operations
            .write()
            .await
            .push(RecordedStoreOp::ClearCategory);

        if let Some(error) = self.next_delete_error.write().await.take() {
            return Err(error);
        }

        self.entries.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_then_list_then_delete() {
        let store = MockStore::new();
        store.add(vec![1, 2, 3], "id_7").await.unwrap();

        let entries = store.list_by_tag("id_7").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "torrent-id_7");

        store.delete_by_tag("id_7", false).await.unwrap();
        assert!(store.list_by_tag("id_7").await.unwrap().is_empty());

        // Absent tag deletes succeed.
        store.delete_by_tag("id_7", false).await.unwrap();
    }

    #[tokio::test]
    async fn test_operations_are_recorded_in_order() {
        let store = MockStore::new();
        store.add(vec![0; 4], "id_1").await.unwrap();
        store.delete_by_tag("id_1", true).await.unwrap();

        assert_eq!(
            store.operations().await,
            vec![
                RecordedStoreOp::Add {
                    tag: "id_1".to_string(),
                    payload_len: 4
                },
                RecordedStoreOp::DeleteByTag {
                    tag: "id_1".to_string(),
                    delete_files: true
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_injection_is_one_shot() {
        let store = MockStore::new();
        store
            .fail_next_add(StoreError::ApiError("boom".to_string()))
            .await;

        assert!(store.add(vec![], "id_1").await.is_err());
        assert!(store.add(vec![], "id_1").await.is_ok());
    }
}
