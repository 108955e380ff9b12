use crate::config::types::{
    CollectorConfig, Config, HttpConfig, LayoutConfig, OutputConfig, SourceConfig, Transport,
};
use crate::ConfigError;
use std::collections::HashSet;
use url::{form_urlencoded, Url};

/// Placeholder in a source endpoint replaced by the partition key
pub const PARTITION_PLACEHOLDER: &str = "{partition}";

/// One week
const MAX_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_collector_config(&config.collector)?;
    validate_http_config(&config.http)?;
    validate_output_config(&config.output)?;
    validate_sources(&config.sources)?;
    Ok(())
}

/// Validates collector configuration
fn validate_collector_config(config: &CollectorConfig) -> Result<(), ConfigError> {
    if config.max_concurrency < 1 || config.max_concurrency > 100 {
        return Err(ConfigError::Validation(format!(
            "max-concurrency must be between 1 and 100, got {}",
            config.max_concurrency
        )));
    }

    if config.retry_delay_ms > 60_000 {
        return Err(ConfigError::Validation(format!(
            "retry-delay-ms must be <= 60000ms, got {}ms",
            config.retry_delay_ms
        )));
    }

    if config.per_fetch_timeout_ms == Some(0) {
        return Err(ConfigError::Validation(
            "per-fetch-timeout-ms must be greater than zero when set".to_string(),
        ));
    }

    if config.interval_minutes < 1 || config.interval_minutes > MAX_INTERVAL_MINUTES {
        return Err(ConfigError::Validation(format!(
            "interval-minutes must be between 1 and {}, got {}",
            MAX_INTERVAL_MINUTES, config.interval_minutes
        )));
    }

    if config.max_pages < 1 {
        return Err(ConfigError::Validation(
            "max-pages must be at least 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates HTTP client configuration
fn validate_http_config(config: &HttpConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if config.timeout_ms == 0 || config.connect_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "HTTP timeouts must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    if config.report_path.is_empty() {
        return Err(ConfigError::Validation(
            "report-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates every source, in declaration order
fn validate_sources(sources: &[SourceConfig]) -> Result<(), ConfigError> {
    if sources.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[source]] must be configured".to_string(),
        ));
    }

    let mut declared: HashSet<&str> = HashSet::new();
    for source in sources {
        validate_source(source, &declared)?;
        declared.insert(source.name.as_str());
    }

    Ok(())
}

/// Validates one source against the sources declared before it
fn validate_source(source: &SourceConfig, declared: &HashSet<&str>) -> Result<(), ConfigError> {
    let invalid = |message: String| ConfigError::InvalidSource {
        source_name: source.name.clone(),
        message,
    };

    if source.name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "source name cannot be empty".to_string(),
        ));
    }

    if declared.contains(source.name.as_str()) {
        return Err(invalid("duplicate source name".to_string()));
    }

    if source.partitions.is_empty() {
        return Err(invalid("at least one partition is required".to_string()));
    }

    if source.partitions.iter().any(|p| p.trim().is_empty()) {
        return Err(invalid("partition keys cannot be empty".to_string()));
    }

    let mut partitions = HashSet::new();
    for partition in &source.partitions {
        if !partitions.insert(partition.as_str()) {
            return Err(invalid(format!("duplicate partition '{}'", partition)));
        }
    }

    if source.page_size < 1 || source.page_size > 1000 {
        return Err(invalid(format!(
            "page-size must be between 1 and 1000, got {}",
            source.page_size
        )));
    }

    if source.page_param.is_empty() || source.page_size_param.is_empty() {
        return Err(invalid(
            "page-param and page-size-param cannot be empty".to_string(),
        ));
    }

    validate_endpoint(source)?;

    if source.transport == Transport::Fixture && source.fixture_dir.is_none() {
        return Err(invalid(
            "transport = \"fixture\" requires fixture-dir".to_string(),
        ));
    }

    for key in source.partition_params.keys() {
        if !source.partitions.contains(key) {
            return Err(invalid(format!(
                "partition-params names unknown partition '{}'",
                key
            )));
        }
    }

    validate_layout(&source.layout).map_err(invalid)?;

    if let Some(seed) = &source.seed {
        if seed.from == source.name {
            return Err(invalid("a source cannot seed itself".to_string()));
        }

        if !declared.contains(seed.from.as_str()) {
            return Err(invalid(format!(
                "seed source '{}' must be declared before this source",
                seed.from
            )));
        }

        if seed.param.is_empty() {
            return Err(invalid("seed param cannot be empty".to_string()));
        }

        if seed.concurrency < 1 || seed.concurrency > 100 {
            return Err(invalid(format!(
                "seed concurrency must be between 1 and 100, got {}",
                seed.concurrency
            )));
        }
    }

    validate_variants(source).map_err(invalid)?;

    Ok(())
}

fn validate_variants(source: &SourceConfig) -> Result<(), String> {
    if source.variants.is_empty() {
        return Ok(());
    }

    if source.seed.is_some() {
        return Err("variants cannot be combined with seed".to_string());
    }

    let mut seen = HashSet::new();
    for variant in &source.variants {
        let variant = variant.trim();
        if !seen.insert(variant) {
            return Err(format!("duplicate variant '{}'", variant));
        }
        if form_urlencoded::parse(variant.as_bytes()).any(|(key, _)| key.is_empty()) {
            return Err(format!("variant '{}' has an empty parameter name", variant));
        }
    }

    Ok(())
}

/// Validates the endpoint URL with the placeholder substituted
fn validate_endpoint(source: &SourceConfig) -> Result<(), ConfigError> {
    let sample = source.endpoint.replace(PARTITION_PLACEHOLDER, &source.partitions[0]);
    let url = Url::parse(&sample).map_err(|e| {
        ConfigError::InvalidUrl(format!(
            "Invalid endpoint '{}' for source '{}': {}",
            source.endpoint, source.name, e
        ))
    })?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "Endpoint '{}' must use http or https",
            source.endpoint
        )));
    }

    Ok(())
}

/// Validates JSON pointers and field names of a layout
fn validate_layout(layout: &LayoutConfig) -> Result<(), String> {
    if !layout.records.starts_with('/') {
        return Err(format!(
            "layout.records must be a JSON pointer starting with '/', got '{}'",
            layout.records
        ));
    }

    if !layout.total.is_empty() && !layout.total.starts_with('/') {
        return Err(format!(
            "layout.total must be empty or a JSON pointer starting with '/', got '{}'",
            layout.total
        ));
    }

    if layout.identity.is_empty() {
        return Err("layout.identity cannot be empty".to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::SeedConfig;

    fn create_test_source(name: &str) -> SourceConfig {
        toml::from_str(&format!(
            r#"
name = "{}"
endpoint = "https://example.com/smart-money/token/page"
partitions = ["1", "501"]
"#,
            name
        ))
        .unwrap()
    }

    fn validate_one(source: &SourceConfig) -> Result<(), ConfigError> {
        validate_source(source, &HashSet::new())
    }

    #[test]
    fn test_valid_source() {
        assert!(validate_one(&create_test_source("tokens")).is_ok());
    }

    #[test]
    fn test_page_size_bounds() {
        let mut source = create_test_source("tokens");
        source.page_size = 0;
        assert!(validate_one(&source).is_err());

        source.page_size = 1001;
        assert!(validate_one(&source).is_err());

        source.page_size = 1000;
        assert!(validate_one(&source).is_ok());
    }

    #[test]
    fn test_partitions_required() {
        let mut source = create_test_source("tokens");
        source.partitions.clear();
        assert!(matches!(
            validate_one(&source),
            Err(ConfigError::InvalidSource { .. })
        ));
    }

    #[test]
    fn test_endpoint_scheme() {
        let mut source = create_test_source("tokens");
        source.endpoint = "ftp://example.com/list".to_string();
        assert!(matches!(
            validate_one(&source),
            Err(ConfigError::InvalidUrl(_))
        ));

        source.endpoint = "not a url".to_string();
        assert!(validate_one(&source).is_err());
    }

    #[test]
    fn test_endpoint_placeholder_is_substituted() {
        let mut source = create_test_source("tokens");
        source.endpoint = "https://example.com/rank/{partition}/wallets".to_string();
        assert!(validate_one(&source).is_ok());
    }

    #[test]
    fn test_fixture_transport_requires_dir() {
        let mut source = create_test_source("tokens");
        source.transport = Transport::Fixture;
        assert!(validate_one(&source).is_err());

        source.fixture_dir = Some("./fixtures".to_string());
        assert!(validate_one(&source).is_ok());
    }

    #[test]
    fn test_layout_pointers() {
        let mut source = create_test_source("tokens");
        source.layout.records = "data.result".to_string();
        assert!(validate_one(&source).is_err());

        source.layout.records = "/data/result".to_string();
        source.layout.total = String::new();
        assert!(validate_one(&source).is_ok());
    }

    #[test]
    fn test_duplicate_source_names() {
        let sources = vec![create_test_source("tokens"), create_test_source("tokens")];
        assert!(matches!(
            validate_sources(&sources),
            Err(ConfigError::InvalidSource { .. })
        ));
    }

    #[test]
    fn test_seed_must_be_declared_earlier() {
        let mut holders = create_test_source("holders");
        holders.seed = Some(SeedConfig {
            from: "tokens".to_string(),
            param: "tokenAddress".to_string(),
            concurrency: 10,
            limit: None,
        });

        let out_of_order = vec![holders.clone(), create_test_source("tokens")];
        assert!(validate_sources(&out_of_order).is_err());

        let in_order = vec![create_test_source("tokens"), holders];
        assert!(validate_sources(&in_order).is_ok());
    }

    #[test]
    fn test_partition_params_must_name_known_partition() {
        let mut source = create_test_source("tokens");
        source
            .partition_params
            .insert("56".to_string(), Default::default());
        assert!(validate_one(&source).is_err());
    }

    #[test]
    fn test_collector_bounds() {
        let mut collector = CollectorConfig::default();
        assert!(validate_collector_config(&collector).is_ok());

        collector.max_concurrency = 0;
        assert!(validate_collector_config(&collector).is_err());

        collector.max_concurrency = 5;
        collector.retry_delay_ms = 60_001;
        assert!(validate_collector_config(&collector).is_err());
    }

    #[test]
    fn test_duplicate_partitions_rejected() {
        let mut source = create_test_source("tokens");
        source.partitions = vec!["501".to_string(), "1".to_string(), "501".to_string()];

        let error = validate_one(&source).unwrap_err();
        assert!(error.to_string().contains("duplicate partition '501'"));
    }

    #[test]
    fn test_interval_bounds() {
        let mut collector = CollectorConfig {
            interval_minutes: u64::MAX,
            ..CollectorConfig::default()
        };
        assert!(validate_collector_config(&collector).is_err());
        assert_eq!(collector.interval().as_secs(), u64::MAX);

        collector.interval_minutes = MAX_INTERVAL_MINUTES;
        assert!(validate_collector_config(&collector).is_ok());
    }

    #[test]
    fn test_max_pages_must_be_positive() {
        let collector = CollectorConfig {
            max_pages: 0,
            ..CollectorConfig::default()
        };
        assert!(validate_collector_config(&collector).is_err());
    }

    #[test]
    fn test_variants_validation() {
        let mut source = create_test_source("smart-money");
        source.variants = vec![
            String::new(),
            "tag=pump_smart".to_string(),
            "tag=smart_degen&tag=pump_smart".to_string(),
        ];
        assert!(validate_one(&source).is_ok());

        source.variants.push("tag=pump_smart".to_string());
        assert!(validate_one(&source).is_err());

        source.variants = vec!["=pump_smart".to_string()];
        assert!(validate_one(&source).is_err());
    }

    #[test]
    fn test_variants_cannot_combine_with_seed() {
        let mut source = create_test_source("holders");
        source.variants = vec!["tag=kol".to_string()];
        source.seed = Some(SeedConfig {
            from: "tokens".to_string(),
            param: "tokenAddress".to_string(),
            concurrency: 2,
            limit: None,
        });

        let mut declared = HashSet::new();
        declared.insert("tokens");
        assert!(validate_source(&source, &declared).is_err());
    }
}
