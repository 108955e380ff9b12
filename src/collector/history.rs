//! Diffing a finalized result against stored history
//!
//! History is loaded once before the diff and written once after it. How the
//! result is written depends on what the load returned:
//!
//! | History load | Diff against | Save |
//! |--------------|--------------|------|
//! | `Ok(set)` | `set` | new records only, append |
//! | `HistoryNotFound` | empty | full result, overwrite |
//! | any other error | empty | full result, append |

use crate::collector::merge::diff_new;
use crate::collector::{Collection, PaginatedCollector};
use crate::model::{Record, RequestDescriptor, ResultSet};
use crate::storage::{Storage, StorageError};
use crate::SweepError;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// What a history load produced
#[derive(Debug)]
pub enum HistoryState<T> {
    /// A previously saved result set
    Loaded(ResultSet<T>),

    /// Nothing was ever saved under the key (first run)
    NotFound,

    /// The store could not be read; the error is kept for reporting
    Unavailable(StorageError),
}

impl<T> HistoryState<T> {
    /// The set to diff against; empty unless history was loaded
    pub fn snapshot(&self) -> Option<&ResultSet<T>> {
        match self {
            Self::Loaded(set) => Some(set),
            _ => None,
        }
    }
}

/// Loads history for `key`, never failing the caller
pub fn load_history_or_empty<T, S>(store: &S, key: &str) -> HistoryState<T>
where
    T: Record + DeserializeOwned,
    S: Storage,
{
    match store.load_history(key) {
        Ok(set) => HistoryState::Loaded(set),
        Err(StorageError::HistoryNotFound(_)) => {
            tracing::info!("No history under {}, treating as first run", key);
            HistoryState::NotFound
        }
        Err(e) => {
            tracing::warn!(
                "History for {} unavailable ({}), treating every record as new",
                key,
                e
            );
            HistoryState::Unavailable(e)
        }
    }
}

/// Diffs `result` against the history under `key` and saves it
///
/// # Returns
///
/// * `Ok(Vec<T>)` - Records whose identity was not in history, in result order
/// * `Err(SweepError)` - The save failed
pub fn diff_and_save<T, S>(store: &mut S, key: &str, result: &ResultSet<T>) -> Result<Vec<T>, SweepError>
where
    T: Record + Serialize + DeserializeOwned,
    S: Storage,
{
    let history = load_history_or_empty::<T, S>(store, key);
    let empty = ResultSet::empty();
    let new_items = diff_new(result, history.snapshot().unwrap_or(&empty));

    let written = match &history {
        HistoryState::Loaded(_) => {
            let additions = ResultSet::from_ordered(new_items.clone());
            store.save_result(key, &additions, true)?
        }
        HistoryState::NotFound => store.save_result(key, result, false)?,
        HistoryState::Unavailable(_) => store.save_result(key, result, true)?,
    };

    tracing::debug!(
        "Saved {} record(s) under {} ({} new)",
        written,
        key,
        new_items.len()
    );

    Ok(new_items)
}

/// Collects one partition, then diffs and saves it under `history_key`
///
/// # Returns
///
/// * `Ok((Collection, Vec<T>))` - The finalized collection and its new records
/// * `Err(SweepError::Collection)` - The collection itself failed; history untouched
/// * `Err(SweepError::Storage)` - The result could not be saved
pub async fn collect_and_diff<T, S>(
    collector: &PaginatedCollector<T>,
    descriptor: &RequestDescriptor,
    store: &mut S,
    history_key: &str,
) -> Result<(Collection<T>, Vec<T>), SweepError>
where
    T: Record + Serialize + DeserializeOwned,
    S: Storage,
{
    let collection = collector.collect(descriptor).await?;
    let new_items = diff_and_save(store, history_key, &collection.result)?;
    Ok((collection, new_items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{CollectorOptions, FetchError, PageFetcher, RetryPolicy};
    use crate::model::{AddressRecord, DuplicatePolicy, Page};
    use crate::storage::{
        PartitionRunRecord, RunRecord, RunStatus, SqliteStorage, StorageResult, StoredResult,
    };
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;
    use url::Url;

    fn record(address: &str, rank: f64) -> AddressRecord {
        AddressRecord::new(address, rank, "501")
    }

    fn result_of(entries: &[(&str, f64)]) -> ResultSet<AddressRecord> {
        ResultSet::from_records(
            entries.iter().map(|(a, r)| record(a, *r)),
            DuplicatePolicy::FirstSeen,
        )
    }

    fn addresses(records: &[AddressRecord]) -> Vec<&str> {
        records.iter().map(|r| r.address.as_str()).collect()
    }

    /// A store whose history reads always fail
    #[derive(Default)]
    struct BrokenHistoryStore {
        saves: Vec<(String, usize, bool)>,
    }

    impl Storage for BrokenHistoryStore {
        fn create_run(&mut self, _config_hash: &str) -> StorageResult<i64> {
            Ok(1)
        }

        fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
            Err(StorageError::RunNotFound(run_id))
        }

        fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
            Ok(None)
        }

        fn finish_run(&mut self, _run_id: i64, _status: RunStatus) -> StorageResult<()> {
            Ok(())
        }

        fn record_partition_run(&mut self, _record: &PartitionRunRecord) -> StorageResult<()> {
            Ok(())
        }

        fn get_partition_runs(&self, _run_id: i64) -> StorageResult<Vec<PartitionRunRecord>> {
            Ok(Vec::new())
        }

        fn load_history<T>(&self, _key: &str) -> StorageResult<ResultSet<T>>
        where
            T: Record + DeserializeOwned,
        {
            Err(StorageError::Database("disk I/O error".to_string()))
        }

        fn save_result<T>(&mut self, key: &str, result: &ResultSet<T>, append: bool) -> StorageResult<usize>
        where
            T: Record + Serialize,
        {
            self.saves.push((key.to_string(), result.len(), append));
            Ok(result.len())
        }

        fn clear_history(&mut self) -> StorageResult<u64> {
            Ok(0)
        }

        fn history_keys(&self) -> StorageResult<Vec<String>> {
            Ok(Vec::new())
        }

        fn top_results(&self, _key: &str, _limit: usize) -> StorageResult<Vec<StoredResult>> {
            Ok(Vec::new())
        }

        fn count_runs(&self) -> StorageResult<u64> {
            Ok(0)
        }

        fn count_runs_by_status(&self, _status: RunStatus) -> StorageResult<u64> {
            Ok(0)
        }

        fn count_results(&self, _key: Option<&str>) -> StorageResult<u64> {
            Ok(0)
        }

        fn count_lost_pages(&self) -> StorageResult<u64> {
            Ok(0)
        }
    }

    #[test]
    fn test_first_run_saves_everything() {
        let mut store = SqliteStorage::new_in_memory().unwrap();
        let result = result_of(&[("A", 0.4), ("B", 0.6)]);

        let new_items = diff_and_save(&mut store, "holders:501", &result).unwrap();
        assert_eq!(addresses(&new_items), vec!["B", "A"]);
        assert_eq!(store.count_results(Some("holders:501")).unwrap(), 2);
    }

    #[test]
    fn test_second_run_appends_only_new() {
        let mut store = SqliteStorage::new_in_memory().unwrap();
        diff_and_save(&mut store, "k", &result_of(&[("A", 0.5), ("B", 0.5)])).unwrap();

        let new_items =
            diff_and_save(&mut store, "k", &result_of(&[("A", 0.99), ("C", 0.3), ("D", 0.2)]))
                .unwrap();
        assert_eq!(addresses(&new_items), vec!["C", "D"]);

        let history: ResultSet<AddressRecord> = store.load_history("k").unwrap();
        assert_eq!(history.len(), 4);
        // Known identities keep their stored rank
        assert_eq!(history.get("A").unwrap().rank, 0.5);
    }

    #[test]
    fn test_unavailable_history_appends_full_result() {
        let mut store = BrokenHistoryStore::default();
        let result = result_of(&[("A", 0.5), ("B", 0.4)]);

        let new_items = diff_and_save(&mut store, "k", &result).unwrap();
        assert_eq!(new_items.len(), 2);
        assert_eq!(store.saves, vec![("k".to_string(), 2, true)]);
    }

    #[test]
    fn test_load_history_or_empty_states() {
        let mut store = SqliteStorage::new_in_memory().unwrap();
        assert!(matches!(
            load_history_or_empty::<AddressRecord, _>(&store, "k"),
            HistoryState::NotFound
        ));

        store.save_result("k", &result_of(&[("A", 0.1)]), false).unwrap();
        let state = load_history_or_empty::<AddressRecord, _>(&store, "k");
        assert_eq!(state.snapshot().map(ResultSet::len), Some(1));

        let broken = BrokenHistoryStore::default();
        assert!(matches!(
            load_history_or_empty::<AddressRecord, _>(&broken, "k"),
            HistoryState::Unavailable(_)
        ));
    }

    struct SinglePageFetcher {
        records: Vec<AddressRecord>,
    }

    #[async_trait]
    impl PageFetcher<AddressRecord> for SinglePageFetcher {
        async fn fetch(
            &self,
            _descriptor: &RequestDescriptor,
        ) -> Result<Page<AddressRecord>, FetchError> {
            Ok(Page::new(self.records.clone(), Some(self.records.len() as u64)))
        }
    }

    #[tokio::test]
    async fn test_collect_and_diff_end_to_end() {
        let fetcher: Arc<dyn PageFetcher<AddressRecord>> = Arc::new(SinglePageFetcher {
            records: vec![record("A", 0.2), record("B", 0.8), record("A", 0.9)],
        });
        let options = CollectorOptions {
            retry: RetryPolicy::new(0, Duration::from_millis(1)),
            ..CollectorOptions::default()
        };
        let collector = PaginatedCollector::new(fetcher, options);
        let descriptor =
            RequestDescriptor::new(Url::parse("https://example.com/list").unwrap(), "501", 50);
        let mut store = SqliteStorage::new_in_memory().unwrap();

        let (collection, new_items) = collect_and_diff(&collector, &descriptor, &mut store, "w:501")
            .await
            .unwrap();
        assert_eq!(collection.result.len(), 2);
        assert_eq!(addresses(&new_items), vec!["B", "A"]);

        let (_, new_items) = collect_and_diff(&collector, &descriptor, &mut store, "w:501")
            .await
            .unwrap();
        assert!(new_items.is_empty());
    }
}
