//! Page body parsing
//!
//! Providers answer either with a raw JSON document or, when the request went
//! through a challenge page, with HTML that renders the JSON inside a `<pre>`
//! element. Both are reduced to a [`serde_json::Value`] and mapped to records
//! using the source's [`LayoutConfig`].

use crate::config::LayoutConfig;
use crate::model::{AddressRecord, Page};
use scraper::{Html, Selector};
use serde_json::Value;

/// Extracts the JSON document from a response body
///
/// # Returns
///
/// * `Some(Value)` - The body itself, or the first `<pre>` element, parsed as JSON
/// * `None` - No JSON document found (typically an unsolved challenge page)
pub fn extract_json_document(body: &str) -> Option<Value> {
    let trimmed = body.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(value) = serde_json::from_str(trimmed) {
            return Some(value);
        }
    }

    let document = Html::parse_document(body);
    let selector = Selector::parse("pre").ok()?;
    document.select(&selector).find_map(|pre| {
        let text: String = pre.text().collect();
        serde_json::from_str(text.trim()).ok()
    })
}

/// Maps a JSON document to a page of address records
///
/// # Arguments
///
/// * `document` - The parsed response document
/// * `layout` - Where the records and total live and how records are shaped
/// * `partition` - Partition key stamped onto every record
///
/// # Returns
///
/// * `Ok(Page)` - Records in document order; records without an identity are skipped
/// * `Err(String)` - The records array is missing or not an array
pub fn parse_page(
    document: &Value,
    layout: &LayoutConfig,
    partition: &str,
) -> Result<Page<AddressRecord>, String> {
    let items = document
        .pointer(&layout.records)
        .ok_or_else(|| format!("no records found at '{}'", layout.records))?
        .as_array()
        .ok_or_else(|| format!("value at '{}' is not an array", layout.records))?;

    let total = if layout.total.is_empty() {
        None
    } else {
        document.pointer(&layout.total).and_then(lenient_u64)
    };

    let records = items
        .iter()
        .filter_map(|item| parse_record(item, layout, partition))
        .collect();

    Ok(Page::new(records, total))
}

fn parse_record(item: &Value, layout: &LayoutConfig, partition: &str) -> Option<AddressRecord> {
    let address = match item.get(&layout.identity).and_then(Value::as_str) {
        Some(address) if !address.trim().is_empty() => address.trim(),
        _ => {
            tracing::debug!(
                "Skipping record without '{}' in partition {}",
                layout.identity,
                partition
            );
            return None;
        }
    };

    let rank = layout
        .rank
        .as_deref()
        .and_then(|field| item.get(field))
        .and_then(lenient_f64)
        .unwrap_or(0.0);

    let mut tags = layout
        .tags
        .as_deref()
        .and_then(|field| item.get(field))
        .map(parse_tags)
        .unwrap_or_default();
    for tag in &layout.static_tags {
        if !tags.contains(tag) {
            tags.push(tag.clone());
        }
    }

    let label = layout
        .label
        .as_deref()
        .and_then(|field| item.get(field))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Some(
        AddressRecord::new(address, rank, partition)
            .with_tags(tags)
            .with_label(label),
    )
}

/// Tags arrive either as an array of strings or as one comma-separated string
fn parse_tags(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Numbers may be JSON numbers or numeric strings ("0.8125")
fn lenient_f64(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

fn lenient_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create_test_layout() -> LayoutConfig {
        LayoutConfig {
            records: "/data/result".to_string(),
            total: "/data/total".to_string(),
            identity: "userWalletAddress".to_string(),
            rank: Some("winRate".to_string()),
            tags: Some("tags".to_string()),
            label: Some("name".to_string()),
            static_tags: vec!["smart_money".to_string()],
        }
    }

    #[test]
    fn test_extract_raw_json() {
        let value = extract_json_document(r#"{"code":0,"data":{"total":3}}"#).unwrap();
        assert_eq!(value["data"]["total"], 3);
    }

    #[test]
    fn test_extract_json_from_pre_element() {
        let html = r#"<html><body><div class="json-formatter-container"></div>
            <pre>{"code":0,"data":{"total":12,"result":[]}}</pre></body></html>"#;

        let value = extract_json_document(html).unwrap();
        assert_eq!(value["data"]["total"], 12);
    }

    #[test]
    fn test_challenge_page_has_no_document() {
        let html = "<html><head><title>Just a moment...</title></head><body>Checking</body></html>";
        assert!(extract_json_document(html).is_none());
    }

    #[test]
    fn test_parse_page_maps_records() {
        let document = json!({
            "code": 0,
            "data": {
                "total": "237",
                "result": [
                    {"userWalletAddress": "0xaaa", "winRate": "0.8125", "tags": ["kol"], "name": "alpha"},
                    {"userWalletAddress": "0xbbb", "winRate": 0.5},
                    {"winRate": "0.9"},
                    {"userWalletAddress": "", "winRate": "0.9"}
                ]
            }
        });

        let page = parse_page(&document, &create_test_layout(), "1").unwrap();
        assert_eq!(page.total, Some(237));
        assert_eq!(page.len(), 2);

        let first = &page.records[0];
        assert_eq!(first.address, "0xaaa");
        assert_eq!(first.rank, 0.8125);
        assert_eq!(first.tags, vec!["kol".to_string(), "smart_money".to_string()]);
        assert_eq!(first.label.as_deref(), Some("alpha"));
        assert_eq!(first.partition, "1");

        assert_eq!(page.records[1].tags, vec!["smart_money".to_string()]);
    }

    #[test]
    fn test_parse_page_without_total() {
        let mut layout = create_test_layout();
        layout.total = String::new();
        let document = json!({"data": {"total": 5, "result": []}});

        let page = parse_page(&document, &layout, "1").unwrap();
        assert_eq!(page.total, None);
    }

    #[test]
    fn test_parse_page_missing_records() {
        let document = json!({"data": {"total": 5}});
        let result = parse_page(&document, &create_test_layout(), "1");
        assert!(result.is_err());
    }

    #[test]
    fn test_unparsable_rank_defaults_to_zero() {
        let document = json!({"data": {"result": [{"userWalletAddress": "0x1", "winRate": "n/a"}]}});
        let page = parse_page(&document, &create_test_layout(), "1").unwrap();
        assert_eq!(page.records[0].rank, 0.0);
    }

    #[test]
    fn test_parse_comma_separated_tags() {
        let tags = parse_tags(&json!("sniper, fresh_wallet,,"));
        assert_eq!(tags, vec!["sniper".to_string(), "fresh_wallet".to_string()]);
    }
}
