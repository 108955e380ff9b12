//! Deduplication, merging and history diffing of collected records

use crate::model::{Accumulator, DuplicatePolicy, Record, ResultSet};
use std::collections::{BTreeMap, HashMap};

/// Builds the result set of an accumulator
///
/// Partitions are visited in key order and records in arrival order. For each
/// identity one record survives according to `policy`; survivors are then
/// stably sorted descending by rank, so ties keep first-seen order. Calling
/// this twice on the same accumulator yields the same result.
pub fn finalize<T: Record>(accumulator: &Accumulator<T>, policy: DuplicatePolicy) -> ResultSet<T> {
    dedupe_and_sort(
        accumulator
            .partitions()
            .flat_map(|(_, records)| records.iter().cloned()),
        policy,
    )
}

/// Builds one result set per partition
pub fn finalize_partitions<T: Record>(
    accumulator: &Accumulator<T>,
    policy: DuplicatePolicy,
) -> BTreeMap<String, ResultSet<T>> {
    accumulator
        .partitions()
        .map(|(key, records)| {
            (
                key.to_string(),
                dedupe_and_sort(records.iter().cloned(), policy),
            )
        })
        .collect()
}

/// Folds several result sets into one, earlier sets winning first-seen ties
pub fn merge<T: Record>(
    sets: impl IntoIterator<Item = ResultSet<T>>,
    policy: DuplicatePolicy,
) -> ResultSet<T> {
    dedupe_and_sort(sets.into_iter().flatten(), policy)
}

/// Returns the records whose identity is absent from `history`
///
/// A changed rank for a known identity does not make the record new.
pub fn diff_new<T: Record>(result: &ResultSet<T>, history: &ResultSet<T>) -> Vec<T> {
    let known = history.identities();
    result
        .iter()
        .filter(|record| !known.contains(record.identity()))
        .cloned()
        .collect()
}

pub(crate) fn dedupe_and_sort<T: Record>(
    records: impl IntoIterator<Item = T>,
    policy: DuplicatePolicy,
) -> ResultSet<T> {
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<T> = Vec::new();

    for record in records {
        match slots.get(record.identity()) {
            Some(&slot) => {
                if policy == DuplicatePolicy::BestRank && record.rank() > unique[slot].rank() {
                    unique[slot] = record;
                }
            }
            None => {
                slots.insert(record.identity().to_string(), unique.len());
                unique.push(record);
            }
        }
    }

    // sort_by is stable: equal ranks keep first-seen order
    unique.sort_by(|a, b| b.rank().total_cmp(&a.rank()));
    ResultSet::from_ordered(unique)
}
