//! JSON-lines input replayed into the broker.

use std::path::Path;

use bytes::Bytes;
use contracts::Topic;
use serde::Deserialize;

use crate::error::{CliError, Result};

#[derive(Deserialize)]
struct InputLine {
    topic: String,
    payload: serde_json::Value,
}

/// One message to publish
#[derive(Debug, Clone)]
pub struct InputRecord {
    /// 1-based line number in the input file
    pub line: usize,
    pub topic: Topic,
    pub payload: Bytes,
}

/// Read and parse a JSON-lines input file
pub fn read_input(path: &Path) -> Result<Vec<InputRecord>> {
    let content = std::fs::read_to_string(path)?;
    parse_input(&content)
}

/// Parse JSON-lines content
///
/// Blank lines and lines starting with `#` are skipped. A string payload is
/// published verbatim, anything else is re-serialized as JSON.
pub fn parse_input(content: &str) -> Result<Vec<InputRecord>> {
    let mut records = Vec::new();
    for (idx, raw) in content.lines().enumerate() {
        let line = idx + 1;
        let raw = raw.trim();
        if raw.is_empty() || raw.starts_with('#') {
            continue;
        }

        let parsed: InputLine =
            serde_json::from_str(raw).map_err(|e| CliError::invalid_input(line, e.to_string()))?;
        let topic =
            Topic::new(&parsed.topic).map_err(|e| CliError::invalid_input(line, e.to_string()))?;
        let payload = match parsed.payload {
            serde_json::Value::String(s) => Bytes::from(s),
            other => Bytes::from(
                serde_json::to_vec(&other)
                    .map_err(|e| CliError::invalid_input(line, e.to_string()))?,
            ),
        };

        records.push(InputRecord {
            line,
            topic,
            payload,
        });
    }
    Ok(records)
}
