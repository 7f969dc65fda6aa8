//! Canonical JSON output.
//!
//! Keys are sorted at every level and the text is indented with four spaces,
//! so serializing the same document twice yields identical bytes.

use crate::error::{Result, XpjsonError};
use crate::node::Document;

use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

/// Unwrap typed nodes back into plain JSON, keeping document key order.
pub fn to_value(doc: &Document) -> Value {
    doc.to_value()
}

/// Canonical text: sorted keys, four-space indentation, no trailing newline.
pub fn dump_document_to_string(doc: &Document) -> Result<String> {
    dump_value_to_string(&to_value(doc))
}

/// Canonical text for any JSON value.
pub fn dump_value_to_string(value: &Value) -> Result<String> {
    let sorted = sort_keys(value);
    let mut out = Vec::new();
    let mut ser = Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"    "));
    sorted.serialize(&mut ser)?;
    // serde_json only writes valid UTF-8.
    Ok(String::from_utf8_lossy(&out).into_owned())
}

/// Write the canonical text plus a trailing newline.
pub fn dump_document_to_path(doc: &Document, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let mut text = dump_document_to_string(doc)?;
    text.push('\n');
    fs::write(path, text).map_err(|e| XpjsonError::io(path, e))
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let sorted: Map<String, Value> = keys
                .into_iter()
                .map(|k| (k.clone(), sort_keys(&map[k.as_str()])))
                .collect();
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}
