//! Mock series repository for testing.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::Utc;

use crate::repo::{RepoError, Series, SeriesRepository};

/// Mock implementation of the SeriesRepository trait.
///
/// Keeps series in an id-keyed map with the same smallest-free-id
/// allocation the SQLite repository performs, and can inject allocation
/// conflicts to exercise insert retry paths.
#[derive(Default)]
pub struct MockRepo {
    series: Mutex<BTreeMap<u32, Series>>,
    next_insert_conflicts: Mutex<u32>,
    insert_attempts: Mutex<u32>,
}

impl MockRepo {
    /// Create a new empty mock repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` insert calls with `AllocationConflict`.
    pub fn fail_next_inserts(&self, count: u32) {
        *self.next_insert_conflicts.lock().unwrap() = count;
    }

    /// Total number of insert calls made, failed ones included.
    pub fn insert_attempts(&self) -> u32 {
        *self.insert_attempts.lock().unwrap()
    }

    fn smallest_free_id(series: &BTreeMap<u32, Series>) -> u32 {
        let mut id = 1;
        while series.contains_key(&id) {
            id += 1;
        }
        id
    }
}

impl SeriesRepository for MockRepo {
    fn insert(
        &self,
        url: &str,
        title: &str,
        update_marker: &str,
        added_by: i64,
    ) -> Result<Series, RepoError> {
        *self.insert_attempts.lock().unwrap() += 1;

        let mut series = self.series.lock().unwrap();
        let id = Self::smallest_free_id(&series);

        let mut conflicts = self.next_insert_conflicts.lock().unwrap();
        if *conflicts > 0 {
            *conflicts -= 1;
            return Err(RepoError::AllocationConflict(id));
        }

        if series.values().any(|s| s.url == url) {
            return Err(RepoError::DuplicateUrl(url.to_string()));
        }

        let record = Series {
            id,
            url: url.to_string(),
            title: title.to_string(),
            update_marker: update_marker.to_string(),
            added_by,
            added_at: Utc::now(),
        };
        series.insert(id, record.clone());
        Ok(record)
    }

    fn update(
        &self,
        id: u32,
        title: Option<&str>,
        update_marker: Option<&str>,
    ) -> Result<(), RepoError> {
        let mut series = self.series.lock().unwrap();
        let record = series.get_mut(&id).ok_or(RepoError::NotFound(id))?;
        if let Some(title) = title {
            record.title = title.to_string();
        }
        if let Some(marker) = update_marker {
            record.update_marker = marker.to_string();
        }
        Ok(())
    }

    fn delete(&self, id: u32) -> Result<(), RepoError> {
        self.series
            .lock()
            .unwrap()
            .remove(&id)
            .map(|_| ())
            .ok_or(RepoError::NotFound(id))
    }

    fn get(&self, id: u32) -> Result<Option<Series>, RepoError> {
        Ok(self.series.lock().unwrap().get(&id).cloned())
    }

    fn list(&self) -> Result<Vec<Series>, RepoError> {
        Ok(self.series.lock().unwrap().values().cloned().collect())
    }

    fn exists_by_url(&self, url: &str) -> Result<bool, RepoError> {
        Ok(self.series.lock().unwrap().values().any(|s| s.url == url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocates_smallest_free_id() {
        let repo = MockRepo::new();
        for i in 1..=3 {
            let series = repo.insert(&format!("u{}", i), "t", "", 1).unwrap();
            assert_eq!(series.id, i);
        }

        repo.delete(2).unwrap();
        assert_eq!(repo.insert("u4", "t", "", 1).unwrap().id, 2);
    }

    #[test]
    fn test_conflict_injection_counts_down() {
        let repo = MockRepo::new();
        repo.fail_next_inserts(2);

        assert!(matches!(
            repo.insert("u", "t", "", 1),
            Err(RepoError::AllocationConflict(_))
        ));
        assert!(matches!(
            repo.insert("u", "t", "", 1),
            Err(RepoError::AllocationConflict(_))
        ));
        assert!(repo.insert("u", "t", "", 1).is_ok());
        assert_eq!(repo.insert_attempts(), 3);
    }

    #[test]
    fn test_duplicate_url_is_rejected() {
        let repo = MockRepo::new();
        repo.insert("u", "t", "", 1).unwrap();
        assert!(matches!(
            repo.insert("u", "t", "", 1),
            Err(RepoError::DuplicateUrl(_))
        ));
    }
}
