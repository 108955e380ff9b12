//! Sweep orchestration across configured sources
//!
//! A sweep visits sources in declaration order. All partitions of a source
//! are collected concurrently; once they have settled, each finalized
//! partition is diffed against its history and saved. A source with a
//! `seed` runs one sub-collection per identity of an earlier source's result.

use crate::collector::history::diff_and_save;
use crate::collector::{
    build_fetcher, Collection, CollectionError, CollectorOptions, ConcurrencyLimiter,
    PaginatedCollector, PartitionSummary,
};
use crate::config::{Config, SeedConfig, SourceConfig, PARTITION_PLACEHOLDER};
use crate::model::{AddressRecord, Record, RequestDescriptor, ResultSet};
use crate::storage::{PartitionRunRecord, RunStatus, Storage};
use crate::{ConfigError, SweepError};
use futures::future::join_all;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use url::Url;

/// A partition key with its collection outcome; `None` when not attempted
type SettledPartition = (String, Option<Result<Collection<AddressRecord>, CollectionError>>);

/// What happened to one partition during a sweep
#[derive(Debug, Clone)]
pub enum PartitionOutcome {
    /// Finalized; `new_records` is `None` when the source is not persisted
    Collected {
        summary: PartitionSummary,
        new_records: Option<usize>,
    },

    /// Not attempted (for example a seeded partition without seeds)
    Skipped { reason: String },

    Failed { error: String },

    Cancelled,
}

#[derive(Debug, Clone)]
pub struct PartitionReport {
    pub source: String,
    pub partition: String,
    pub outcome: PartitionOutcome,
}

impl PartitionReport {
    pub fn history_key(&self) -> String {
        format!("{}:{}", self.source, self.partition)
    }
}

/// Outcome of a whole sweep
#[derive(Debug, Clone)]
pub struct SweepReport {
    pub run_id: i64,
    pub status: RunStatus,
    pub partitions: Vec<PartitionReport>,
    pub elapsed: Duration,
}

impl SweepReport {
    pub fn collected(&self) -> impl Iterator<Item = (&PartitionReport, &PartitionSummary)> {
        self.partitions.iter().filter_map(|report| match &report.outcome {
            PartitionOutcome::Collected { summary, .. } => Some((report, summary)),
            _ => None,
        })
    }

    pub fn failed_count(&self) -> usize {
        self.partitions
            .iter()
            .filter(|r| matches!(r.outcome, PartitionOutcome::Failed { .. }))
            .count()
    }

    pub fn new_records(&self) -> usize {
        self.partitions
            .iter()
            .filter_map(|r| match r.outcome {
                PartitionOutcome::Collected { new_records, .. } => new_records,
                _ => None,
            })
            .sum()
    }

    /// True when every partition finalized without losing pages or seeds
    pub fn is_complete(&self) -> bool {
        self.partitions.iter().all(|r| match &r.outcome {
            PartitionOutcome::Collected { summary, .. } => summary.is_complete(),
            _ => false,
        })
    }
}

/// Builds the request template of one partition of a source
///
/// `{partition}` in the endpoint is replaced by the partition key. Query
/// parameters are applied in this order: the partition parameter, fixed
/// `params`, then the partition's `partition-params`; later ones replace
/// earlier ones with the same name.
pub fn descriptor_for(source: &SourceConfig, partition: &str) -> Result<RequestDescriptor, ConfigError> {
    let endpoint = source.endpoint.replace(PARTITION_PLACEHOLDER, partition);
    let endpoint = Url::parse(&endpoint).map_err(|e| {
        ConfigError::InvalidUrl(format!(
            "Invalid endpoint '{}' for source '{}': {}",
            endpoint, source.name, e
        ))
    })?;

    let mut descriptor =
        RequestDescriptor::new(endpoint, partition, source.page_size).with_paging(source.paging());

    if let Some(param) = &source.partition_param {
        descriptor = descriptor.with_param(param.as_str(), partition);
    }
    for (key, value) in &source.params {
        descriptor = descriptor.with_param(key.as_str(), value.as_str());
    }
    if let Some(extra) = source.partition_params.get(partition) {
        for (key, value) in extra {
            descriptor = descriptor.with_param(key.as_str(), value.as_str());
        }
    }

    Ok(descriptor)
}

/// Runs one sweep over every configured source
///
/// # Arguments
///
/// * `config` - Validated configuration
/// * `config_hash` - Hash stored with the run record
/// * `store` - History and run storage
/// * `cancel` - Stops dispatch of further pages and sources when cancelled
///
/// # Returns
///
/// * `Ok(SweepReport)` - Completed, interrupted or failed (every partition failed)
/// * `Err(SweepError)` - The run could not be recorded or a fetcher could not be built
pub async fn run_sweep<S: Storage>(
    config: &Config,
    config_hash: &str,
    store: &mut S,
    cancel: &CancellationToken,
) -> Result<SweepReport, SweepError> {
    let started = Instant::now();
    let run_id = store.create_run(config_hash)?;
    tracing::info!("Starting sweep run {} over {} source(s)", run_id, config.sources.len());

    let partitions = match sweep_sources(config, run_id, store, cancel).await {
        Ok(partitions) => partitions,
        Err(e) => {
            tracing::error!("Sweep run {} aborted: {}", run_id, e);
            store.finish_run(run_id, RunStatus::Failed)?;
            return Err(e);
        }
    };

    let attempted = partitions
        .iter()
        .filter(|r| !matches!(r.outcome, PartitionOutcome::Skipped { .. }))
        .count();
    let failed = partitions
        .iter()
        .filter(|r| matches!(r.outcome, PartitionOutcome::Failed { .. }))
        .count();

    let status = if cancel.is_cancelled() {
        RunStatus::Interrupted
    } else if attempted > 0 && failed == attempted {
        RunStatus::Failed
    } else {
        RunStatus::Completed
    };
    store.finish_run(run_id, status)?;

    let report = SweepReport {
        run_id,
        status,
        partitions,
        elapsed: started.elapsed(),
    };

    tracing::info!(
        "Sweep run {} {}: {} partition(s), {} failed, {} new record(s) in {:.1}s",
        run_id,
        status.to_db_string(),
        report.partitions.len(),
        report.failed_count(),
        report.new_records(),
        report.elapsed.as_secs_f64()
    );

    Ok(report)
}

async fn sweep_sources<S: Storage>(
    config: &Config,
    run_id: i64,
    store: &mut S,
    cancel: &CancellationToken,
) -> Result<Vec<PartitionReport>, SweepError> {
    let options = CollectorOptions::from(&config.collector);
    let mut finalized: HashMap<String, ResultSet<AddressRecord>> = HashMap::new();
    let mut reports = Vec::new();

    for source in &config.sources {
        if cancel.is_cancelled() {
            tracing::info!("Skipping source {} after cancellation", source.name);
            reports.extend(source.partitions.iter().map(|partition| PartitionReport {
                source: source.name.clone(),
                partition: partition.clone(),
                outcome: PartitionOutcome::Cancelled,
            }));
            continue;
        }

        tracing::info!(
            "Collecting source {} ({} partition(s))",
            source.name,
            source.partitions.len()
        );

        let fetcher = build_fetcher(source, &config.http)?;
        let collector =
            PaginatedCollector::new(fetcher, options).with_cancellation(cancel.clone());

        let outcomes: Vec<SettledPartition> = match &source.seed {
            None if !source.variants.is_empty() => {
                collect_variant_source(&collector, source, options.max_concurrency).await?
            }
            None => {
                let descriptors = source
                    .partitions
                    .iter()
                    .map(|partition| descriptor_for(source, partition))
                    .collect::<Result<Vec<_>, _>>()?;
                collector
                    .collect_partitions(&descriptors)
                    .await
                    .into_iter()
                    .map(|(partition, outcome)| (partition, Some(outcome)))
                    .collect()
            }
            Some(seed) => collect_seeded_source(&collector, source, seed, &finalized).await?,
        };

        for (partition, outcome) in outcomes {
            let key = source.history_key(&partition);
            let outcome = match outcome {
                None => PartitionOutcome::Skipped {
                    reason: format!(
                        "no seeds from {}",
                        source.seed.as_ref().map_or("", |s| s.from.as_str())
                    ),
                },
                Some(Ok(collection)) => {
                    let outcome = settle_partition(store, run_id, source, &key, &collection);
                    finalized.insert(key, collection.result);
                    outcome
                }
                Some(Err(CollectionError::Cancelled { .. })) => PartitionOutcome::Cancelled,
                Some(Err(e)) => {
                    tracing::error!("Partition {} failed: {}", key, e);
                    PartitionOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };

            reports.push(PartitionReport {
                source: source.name.clone(),
                partition,
                outcome,
            });
        }
    }

    Ok(reports)
}

/// Collects every partition of a source with request variants concurrently
///
/// The variants of one partition run through a limiter of `concurrency`.
async fn collect_variant_source(
    collector: &PaginatedCollector<AddressRecord>,
    source: &SourceConfig,
    concurrency: usize,
) -> Result<Vec<SettledPartition>, SweepError> {
    let limiter = ConcurrencyLimiter::new(concurrency)?;
    let descriptors = source
        .partitions
        .iter()
        .map(|partition| descriptor_for(source, partition))
        .collect::<Result<Vec<_>, _>>()?;

    let outcomes = join_all(descriptors.iter().map(|descriptor| {
        let limiter = &limiter;
        async move {
            tracing::info!(
                "Collecting {} variant(s) for {}",
                source.variants.len(),
                source.history_key(descriptor.partition())
            );
            let outcome = collector
                .collect_variants(descriptor, &source.variants, limiter)
                .await;
            (descriptor.partition().to_string(), Some(outcome))
        }
    }))
    .await;

    Ok(outcomes)
}

/// Collects every partition of a seeded source concurrently
///
/// A partition whose seed partition did not finalize yields `None`.
async fn collect_seeded_source(
    collector: &PaginatedCollector<AddressRecord>,
    source: &SourceConfig,
    seed: &SeedConfig,
    finalized: &HashMap<String, ResultSet<AddressRecord>>,
) -> Result<Vec<SettledPartition>, SweepError> {
    let limiter = ConcurrencyLimiter::new(seed.concurrency)?;

    let mut planned = Vec::new();
    for partition in &source.partitions {
        let seed_key = format!("{}:{}", seed.from, partition);
        let seeds: Vec<String> = match finalized.get(&seed_key) {
            Some(result) => result
                .iter()
                .take(seed.limit.unwrap_or(usize::MAX))
                .map(|record| record.identity().to_string())
                .collect(),
            None => {
                tracing::warn!(
                    "Seed partition {} did not finalize, skipping {}",
                    seed_key,
                    source.history_key(partition)
                );
                Vec::new()
            }
        };
        planned.push((partition.clone(), descriptor_for(source, partition)?, seeds));
    }

    let outcomes = join_all(planned.iter().map(|(partition, descriptor, seeds)| {
        let limiter = &limiter;
        async move {
            if seeds.is_empty() {
                return (partition.clone(), None);
            }
            tracing::info!(
                "Collecting {} seed(s) for {}",
                seeds.len(),
                source.history_key(partition)
            );
            let outcome = collector
                .collect_seeded(descriptor, &seed.param, seeds, limiter)
                .await;
            (partition.clone(), Some(outcome))
        }
    }))
    .await;

    Ok(outcomes)
}

/// Diffs, saves and records one finalized partition
///
/// Storage failures are logged; the partition still counts as collected.
fn settle_partition<S: Storage>(
    store: &mut S,
    run_id: i64,
    source: &SourceConfig,
    key: &str,
    collection: &Collection<AddressRecord>,
) -> PartitionOutcome {
    let summary = collection.summary.clone();

    let new_records = if source.persist {
        match diff_and_save(store, key, &collection.result) {
            Ok(new_items) => Some(new_items.len()),
            Err(e) => {
                tracing::error!("Failed to save {}: {}", key, e);
                None
            }
        }
    } else {
        None
    };

    let record = PartitionRunRecord {
        run_id,
        history_key: key.to_string(),
        total: summary.total,
        total_pages: summary.total_pages,
        pages_fetched: summary.pages_fetched,
        lost_pages: summary.lost_pages.len() as u32,
        lost_scopes: summary.lost_scopes.len() as u32,
        records_received: summary.records_received as u64,
        unique_records: summary.unique_records as u64,
        new_records: new_records.unwrap_or(0) as u64,
    };
    if let Err(e) = store.record_partition_run(&record) {
        tracing::warn!("Failed to record partition run for {}: {}", key, e);
    }

    if !summary.is_complete() {
        tracing::warn!(
            "{} finalized with {} lost page(s) and {} lost scope(s)",
            key,
            summary.lost_pages.len(),
            summary.lost_scopes.len()
        );
    }

    PartitionOutcome::Collected {
        summary,
        new_records,
    }
}
