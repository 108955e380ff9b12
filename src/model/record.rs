//! Records, per-partition accumulation and result sets

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// A ranked record with a stable identity
pub trait Record: Clone + Send + 'static {
    /// Key used for deduplication (e.g. a wallet address)
    fn identity(&self) -> &str;

    /// Metric used to order results, higher first (e.g. win rate)
    fn rank(&self) -> f64;
}

/// How duplicate identities are resolved when a result set is built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    /// The first record seen for an identity wins
    #[default]
    FirstSeen,

    /// The record with the strictly higher rank wins; equal ranks keep the
    /// first one seen
    BestRank,
}

impl fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FirstSeen => write!(f, "first-seen"),
            Self::BestRank => write!(f, "best-rank"),
        }
    }
}

/// An address collected from a ranked listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressRecord {
    /// Wallet or token address
    pub address: String,

    /// Rank metric as reported by the provider
    pub rank: f64,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Display name, when the provider has one
    #[serde(default)]
    pub label: Option<String>,

    /// Partition (chain id) the record was collected from
    pub partition: String,

    /// RFC 3339 timestamp of collection
    pub collected_at: String,
}

impl AddressRecord {
    pub fn new(address: impl Into<String>, rank: f64, partition: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            rank,
            tags: Vec::new(),
            label: None,
            partition: partition.into(),
            collected_at: Utc::now().to_rfc3339(),
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_label(mut self, label: Option<String>) -> Self {
        self.label = label;
        self
    }
}

impl Record for AddressRecord {
    fn identity(&self) -> &str {
        &self.address
    }

    fn rank(&self) -> f64 {
        self.rank
    }
}

/// Append-only record sequences keyed by partition
///
/// Partitions iterate in key order, records in the order they were folded in.
#[derive(Debug, Clone)]
pub struct Accumulator<T> {
    partitions: BTreeMap<String, Vec<T>>,
}

impl<T> Default for Accumulator<T> {
    fn default() -> Self {
        Self {
            partitions: BTreeMap::new(),
        }
    }
}

impl<T> Accumulator<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends records to a partition, returning how many were appended
    pub fn fold(&mut self, partition: &str, records: impl IntoIterator<Item = T>) -> usize {
        let entry = self.partitions.entry(partition.to_string()).or_default();
        let before = entry.len();
        entry.extend(records);
        entry.len() - before
    }

    pub fn partition(&self, key: &str) -> Option<&[T]> {
        self.partitions.get(key).map(Vec::as_slice)
    }

    pub fn partitions(&self) -> impl Iterator<Item = (&str, &[T])> {
        self.partitions
            .iter()
            .map(|(key, records)| (key.as_str(), records.as_slice()))
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Total records across all partitions, duplicates included
    pub fn len(&self) -> usize {
        self.partitions.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Deduplicated records ordered descending by rank
///
/// Built by [`crate::collector::finalize`] or [`ResultSet::from_records`];
/// no two elements share an identity.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet<T> {
    records: Vec<T>,
}

impl<T> Default for ResultSet<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
        }
    }
}

impl<T> ResultSet<T> {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Wraps records that are already unique and sorted
    pub(crate) fn from_ordered(records: Vec<T>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.records.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.records
    }

    pub fn into_vec(self) -> Vec<T> {
        self.records
    }
}

impl<T: Record> ResultSet<T> {
    /// Deduplicates and sorts an arbitrary record sequence
    pub fn from_records(records: impl IntoIterator<Item = T>, policy: DuplicatePolicy) -> Self {
        crate::collector::dedupe_and_sort(records, policy)
    }

    pub fn get(&self, identity: &str) -> Option<&T> {
        self.records.iter().find(|r| r.identity() == identity)
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.get(identity).is_some()
    }

    pub fn identities(&self) -> HashSet<&str> {
        self.records.iter().map(Record::identity).collect()
    }
}

impl<T> IntoIterator for ResultSet<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a ResultSet<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
