//! Compact schema and statistics summary, gzip compressed

use base64::Engine;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{json, Map, Value};
use std::io::Write;

use crate::error::{Error, Result};
use crate::types::{CompressionSummary, Dataset};

use super::stats;

const GZIP_LEVEL: u32 = 6;

/// Per-column type plus missing/unique counts and numeric ranges
pub fn schema_summary(dataset: &Dataset) -> (Value, Value) {
    let mut schema = Map::new();
    let mut statistics = Map::new();

    for column in dataset.columns() {
        schema.insert(column.name.clone(), json!(column.kind().as_str()));

        let mut entry = Map::new();
        entry.insert("n_missing".into(), json!(column.missing_count()));
        entry.insert("n_unique".into(), json!(column.unique_count()));

        if let Some(values) = column.numeric() {
            let values = stats::present(values);
            let (min, max) = stats::min_max(&values).unzip();
            entry.insert("min".into(), json!(min));
            entry.insert("max".into(), json!(max));
            entry.insert("mean".into(), json!(stats::mean(&values)));
            entry.insert("std".into(), json!(stats::std_dev(&values)));
        }

        statistics.insert(column.name.clone(), Value::Object(entry));
    }

    (Value::Object(schema), Value::Object(statistics))
}

/// Gzip the schema/statistics summary and report the size reduction
pub fn compress_summary(dataset: &Dataset) -> Result<CompressionSummary> {
    let (schema, statistics) = schema_summary(dataset);
    let raw = serde_json::to_vec(&json!({ "schema": schema, "statistics": statistics }))?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::new(GZIP_LEVEL));
    encoder
        .write_all(&raw)
        .map_err(|e| Error::pipeline(format!("gzip failed: {}", e)))?;
    let compressed = encoder
        .finish()
        .map_err(|e| Error::pipeline(format!("gzip failed: {}", e)))?;

    let ratio = 1.0 - compressed.len() as f64 / raw.len().max(1) as f64;

    Ok(CompressionSummary {
        method: "gzip-fallback".to_string(),
        original_bytes: raw.len(),
        compressed_bytes: compressed.len(),
        compression_ratio: stats::round_to(ratio, 3),
        compressed_b64: base64::engine::general_purpose::STANDARD.encode(&compressed),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::DatasetLoader;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[test]
    fn test_summary_decompresses_to_schema() {
        let dataset = DatasetLoader::load("c.csv", b"a,b\n1,x\n3,\n").unwrap();
        let summary = compress_summary(&dataset).unwrap();

        assert_eq!(summary.method, "gzip-fallback");
        let compressed = base64::engine::general_purpose::STANDARD
            .decode(&summary.compressed_b64)
            .unwrap();
        assert_eq!(compressed.len(), summary.compressed_bytes);

        let mut raw = String::new();
        GzDecoder::new(compressed.as_slice())
            .read_to_string(&mut raw)
            .unwrap();
        assert_eq!(raw.len(), summary.original_bytes);

        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["schema"]["a"], "numeric");
        assert_eq!(value["schema"]["b"], "text");
        assert_eq!(value["statistics"]["a"]["mean"], 2.0);
        assert_eq!(value["statistics"]["b"]["n_missing"], 1);
    }
}
