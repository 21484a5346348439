// src/output.rs
use bson::{Bson, Document};
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::context::PairedItem;

/// One record in the host's uniform output format.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputRecord {
    pub json: Value,
    pub paired_item: Vec<PairedItem>,
}

impl OutputRecord {
    pub fn new(json: Value, paired_item: Vec<PairedItem>) -> Self {
        OutputRecord { json, paired_item }
    }

    pub fn from_document(doc: Document, paired_item: Vec<PairedItem>) -> Self {
        OutputRecord::new(document_to_json(doc), paired_item)
    }

    pub fn error(message: impl Into<String>, paired_item: Vec<PairedItem>) -> Self {
        OutputRecord::new(error_json(message), paired_item)
    }

    pub fn is_error(&self) -> bool {
        self.json.get("error").is_some()
    }
}

pub fn error_json(message: impl Into<String>) -> Value {
    json!({ "error": message.into() })
}

/// Provenance covering inputs `0..len`.
pub fn paired_items(len: usize) -> Vec<PairedItem> {
    (0..len).map(|item| PairedItem { item }).collect()
}

/// Pairs every result with the whole provenance list.
pub fn construct_execution_metadata(results: Vec<Value>, item_data: &[PairedItem]) -> Vec<OutputRecord> {
    results
        .into_iter()
        .map(|json| OutputRecord::new(json, item_data.to_vec()))
        .collect()
}

pub fn document_to_json(doc: Document) -> Value {
    Value::Object(
        doc.into_iter()
            .map(|(key, value)| (key, bson_to_json(value)))
            .collect::<Map<String, Value>>(),
    )
}

/// Final conversion for output. Identifiers become hex strings and dates
/// RFC 3339 strings, so downstream workflow steps see plain JSON.
pub fn bson_to_json(value: Bson) -> Value {
    match value {
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::DateTime(dt) => match dt.try_to_rfc3339_string() {
            Ok(s) => Value::String(s),
            Err(_) => Value::from(dt.timestamp_millis()),
        },
        Bson::Int32(i) => Value::from(i),
        Bson::Int64(i) => Value::from(i),
        Bson::Document(doc) => document_to_json(doc),
        Bson::Array(items) => Value::Array(items.into_iter().map(bson_to_json).collect()),
        other => other.into_relaxed_extjson(),
    }
}
