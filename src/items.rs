// src/items.rs
//! Input items for the command line host: a JSON document or a CSV file.
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use csv::ReaderBuilder;
use serde_json::{Map, Value};
use tracing::warn;

use crate::context::WorkItem;
use crate::error::{NodeError, Result};

pub fn load_items<P: AsRef<Path>>(path: P, no_header: bool) -> Result<Vec<WorkItem>> {
    let path = path.as_ref();
    let is_csv = path
        .extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));

    if is_csv {
        load_csv(path, no_header)
    } else {
        load_json(path)
    }
}

/// The item used when nothing is piped in, so single-shot operations still run once.
pub fn default_items() -> Vec<WorkItem> {
    vec![WorkItem::new(0, Value::Object(Map::new()))]
}

fn io_error(path: &Path, e: impl std::fmt::Display) -> NodeError {
    NodeError::Config(format!("{}: {}", path.display(), e))
}

fn load_json(path: &Path) -> Result<Vec<WorkItem>> {
    let file = File::open(path).map_err(|e| io_error(path, e))?;
    let value: Value = serde_json::from_reader(BufReader::new(file))?;

    match value {
        Value::Array(values) => Ok(values
            .into_iter()
            .enumerate()
            .map(|(i, json)| WorkItem::new(i, json))
            .collect()),
        obj @ Value::Object(_) => Ok(vec![WorkItem::new(0, obj)]),
        _ => Err(io_error(path, "expected a JSON object or an array of objects")),
    }
}

fn load_csv(path: &Path, no_header: bool) -> Result<Vec<WorkItem>> {
    let file = File::open(path).map_err(|e| io_error(path, e))?;
    let mut rdr = ReaderBuilder::new()
        .delimiter(b',')
        .has_headers(!no_header)
        .from_reader(BufReader::new(file));

    let headers = if no_header {
        None
    } else {
        Some(rdr.headers().map_err(|e| io_error(path, e))?.clone())
    };

    let mut items = Vec::new();
    for (row_num, result) in rdr.records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!(row = row_num + 1, error = %e, "skipping unreadable CSV row");
                continue;
            }
        };

        let json: Map<String, Value> = match &headers {
            Some(hdrs) => hdrs
                .iter()
                .zip(record.iter())
                .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
                .collect(),
            None => record
                .iter()
                .enumerate()
                .map(|(i, v)| (format!("col_{}", i), Value::String(v.to_string())))
                .collect(),
        };
        items.push(WorkItem::new(items.len(), Value::Object(json)));
    }

    Ok(items)
}
