use crate::collector::RetryPolicy;
use crate::model::{DuplicatePolicy, PagingParams};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Main configuration structure for Smart-Sweep
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub http: HttpConfig,
    pub output: OutputConfig,
    #[serde(default, rename = "source")]
    pub sources: Vec<SourceConfig>,
}

impl Config {
    /// Looks up a source by name
    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.name == name)
    }
}

/// Collection behavior shared by every source
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CollectorConfig {
    /// Maximum number of concurrent page fetches per partition
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Retries after the first attempt of a page fetch
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Fixed delay between attempts (milliseconds)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Upper bound on a single fetch attempt (milliseconds)
    #[serde(default)]
    pub per_fetch_timeout_ms: Option<u64>,

    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,

    /// Minutes between sweeps in watch mode
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,

    /// Ceiling on the pages collected per partition, whatever the provider's total
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

impl CollectorConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.retry_delay_ms))
    }

    pub fn per_fetch_timeout(&self) -> Option<Duration> {
        self.per_fetch_timeout_ms.map(Duration::from_millis)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.saturating_mul(60))
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            per_fetch_timeout_ms: None,
            duplicate_policy: DuplicatePolicy::default(),
            interval_minutes: default_interval_minutes(),
            max_pages: default_max_pages(),
        }
    }
}

/// HTTP client configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HttpConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Whole-request timeout (milliseconds)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Path to the SQLite database file
    pub database_path: String,

    /// Path to the markdown report file
    pub report_path: String,

    /// Rows per history key in the markdown report
    #[serde(default = "default_report_limit")]
    pub report_limit: usize,
}

/// How pages of a source are obtained
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Transport {
    #[default]
    Http,
    Fixture,
}

/// One paginated listing, collected once per partition
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SourceConfig {
    /// Unique name; also the prefix of the history key
    pub name: String,

    /// Endpoint URL; `{partition}` is replaced by the partition key
    pub endpoint: String,

    /// Partition keys (for example chain ids)
    pub partitions: Vec<String>,

    /// Query parameter that carries the partition key, if any
    #[serde(default)]
    pub partition_param: Option<String>,

    #[serde(default = "default_page_size")]
    pub page_size: u32,

    #[serde(default = "default_page_param")]
    pub page_param: String,

    #[serde(default = "default_page_size_param")]
    pub page_size_param: String,

    /// Cache-busting parameter; empty disables it
    #[serde(default = "default_freshness_param")]
    pub freshness_param: String,

    #[serde(default)]
    pub transport: Transport,

    /// Directory holding page fixtures when `transport = "fixture"`
    #[serde(default)]
    pub fixture_dir: Option<String>,

    /// Fixed query parameters sent with every page
    #[serde(default)]
    pub params: BTreeMap<String, String>,

    /// Extra query parameters per partition key
    #[serde(default)]
    pub partition_params: BTreeMap<String, BTreeMap<String, String>>,

    /// Whether results are diffed against and saved to history
    #[serde(default = "default_persist")]
    pub persist: bool,

    #[serde(default)]
    pub layout: LayoutConfig,

    #[serde(default)]
    pub seed: Option<SeedConfig>,

    /// Query-string variants collected for every partition and merged in
    /// declaration order (for example `["", "tag=pump_smart"]`); an empty
    /// string requests the base listing
    #[serde(default)]
    pub variants: Vec<String>,
}

impl SourceConfig {
    pub fn paging(&self) -> PagingParams {
        PagingParams {
            page: self.page_param.clone(),
            page_size: self.page_size_param.clone(),
            freshness: (!self.freshness_param.is_empty()).then(|| self.freshness_param.clone()),
        }
    }

    /// Key under which a partition's results are stored
    pub fn history_key(&self, partition: &str) -> String {
        format!("{}:{}", self.name, partition)
    }
}

/// Where records live in a page document and how they are shaped
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LayoutConfig {
    /// JSON pointer to the records array
    #[serde(default = "default_records_pointer")]
    pub records: String,

    /// JSON pointer to the total record count; empty when the listing has none
    #[serde(default = "default_total_pointer")]
    pub total: String,

    /// Field holding the identity
    #[serde(default = "default_identity_field")]
    pub identity: String,

    /// Field holding the rank metric
    #[serde(default)]
    pub rank: Option<String>,

    #[serde(default)]
    pub tags: Option<String>,

    #[serde(default)]
    pub label: Option<String>,

    /// Tags added to every record of the source
    #[serde(default)]
    pub static_tags: Vec<String>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            records: default_records_pointer(),
            total: default_total_pointer(),
            identity: default_identity_field(),
            rank: None,
            tags: None,
            label: None,
            static_tags: Vec::new(),
        }
    }
}

/// Runs one sub-collection per record of an earlier source
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SeedConfig {
    /// Name of the source whose identities seed this one
    pub from: String,

    /// Query parameter that carries the seed identity
    pub param: String,

    /// Sub-collections in flight at once
    #[serde(default = "default_seed_concurrency")]
    pub concurrency: usize,

    /// Use only the top-ranked `limit` seeds
    #[serde(default)]
    pub limit: Option<usize>,
}

fn default_max_concurrency() -> usize {
    5
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    2000
}

fn default_interval_minutes() -> u64 {
    60
}

fn default_max_pages() -> u32 {
    1000
}

fn default_user_agent() -> String {
    format!("smart-sweep/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_report_limit() -> usize {
    50
}

fn default_page_size() -> u32 {
    50
}

fn default_page_param() -> String {
    "pageNo".to_string()
}

fn default_page_size_param() -> String {
    "pageSize".to_string()
}

fn default_freshness_param() -> String {
    "t".to_string()
}

fn default_persist() -> bool {
    true
}

fn default_records_pointer() -> String {
    "/data/result".to_string()
}

fn default_total_pointer() -> String {
    "/data/total".to_string()
}

fn default_identity_field() -> String {
    "address".to_string()
}

fn default_seed_concurrency() -> usize {
    10
}
