use anyhow::{bail, Context, Result};
use market_core::RawRecord;
use serde_json::Value;
use std::path::Path;
use valuation_model::ValuationModel;

/// Parse a feed dump: either one JSON array of objects or JSON lines.
/// Entries that are not objects are skipped with a warning.
pub fn parse_records(text: &str) -> Result<Vec<RawRecord>> {
    let values: Vec<Value> = if text.trim_start().starts_with('[') {
        serde_json::from_str(text).context("input is not a valid JSON array")?
    } else {
        text.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str(line)
                    .with_context(|| format!("invalid JSON on line {}", i + 1))
            })
            .collect::<Result<_>>()?
    };

    let mut records = Vec::with_capacity(values.len());
    for (i, value) in values.into_iter().enumerate() {
        match value {
            Value::Object(map) => records.push(map),
            other => tracing::warn!(
                index = i,
                kind = %kind(&other),
                "skipping non-object input entry"
            ),
        }
    }
    Ok(records)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub fn read_records(path: &Path) -> Result<Vec<RawRecord>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let records =
        parse_records(&text).with_context(|| format!("failed to parse {}", path.display()))?;
    if records.is_empty() {
        bail!("{} contains no records", path.display());
    }
    tracing::info!(path = %path.display(), records = records.len(), "loaded raw listings");
    Ok(records)
}

/// Prior artifact from an earlier run's output directory, if present
pub fn read_model(dir: &Path, file_name: &str) -> Result<Option<ValuationModel>> {
    let path = dir.join(file_name);
    if !path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let model: ValuationModel = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a valuation model", path.display()))?;
    tracing::info!(path = %path.display(), version = %model.version, "loaded prior model");
    Ok(Some(model))
}
