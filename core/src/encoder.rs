//! "Full square" batch encoding.
//!
//! # Design
//! The service rebuilds per-object records by zipping same-named array fields
//! by position, so every operation must contribute exactly one value to every
//! column, even for keys it never mentioned. The batch is laid out as a table:
//! rows are operations, columns are the sorted Wire Key Set. The key union is
//! computed once and each row is walked against it.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::field::{FieldValue, FileAttachment, Value, NO_VALUE, NULL_VALUE};
use crate::operation::Operation;

/// Whether wire names and values are percent-encoded by the encoder or left
/// for the transport to encode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    #[default]
    Percent,
    Raw,
}

/// One emitted form field. Names and values of `Text` fields are already
/// encoded according to the `Encoding` they were produced with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireField {
    Text { name: String, value: String },
    File { name: String, file: FileAttachment },
}

impl WireField {
    /// Field name as it appears on the wire.
    pub fn name(&self) -> &str {
        match self {
            WireField::Text { name, .. } | WireField::File { name, .. } => name,
        }
    }

    /// `name=value` for text fields; file fields have no inline form.
    pub fn to_pair(&self) -> Option<String> {
        match self {
            WireField::Text { name, value } => Some(format!("{name}={value}")),
            WireField::File { .. } => None,
        }
    }
}

/// Encode a string for a form body. Spaces become `+`, brackets and colons
/// are escaped.
pub fn encode_component(s: &str) -> String {
    form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

/// A text field whose name is a fixed protocol token (`_ff[]`, `_fm`, ...);
/// only the value is subject to `encoding`.
pub(crate) fn protocol_field(name: &str, value: &str, encoding: Encoding) -> WireField {
    let value = match encoding {
        Encoding::Percent => encode_component(value),
        Encoding::Raw => value.to_string(),
    };
    WireField::Text {
        name: name.to_string(),
        value,
    }
}

/// The sorted union of every canonical key of every operation.
pub fn wire_key_set(operations: &[Operation]) -> Vec<String> {
    operations
        .iter()
        .flat_map(Operation::wire_keys)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Rows = operations, columns = the Wire Key Set (canonical keys).
#[derive(Debug, Clone, PartialEq)]
pub struct SquareTable {
    pub keys: Vec<String>,
    pub rows: Vec<Vec<FieldValue>>,
}

impl SquareTable {
    pub fn from_operations(operations: &[Operation]) -> Self {
        let keys = wire_key_set(operations);
        let rows = operations
            .iter()
            .map(|op| keys.iter().map(|k| op.value_for(k)).collect())
            .collect();
        Self { keys, rows }
    }

    /// Emit the table row by row, each row in key order.
    pub fn encode(&self, encoding: Encoding) -> Vec<WireField> {
        let mut out = Vec::with_capacity(self.keys.len() * self.rows.len());
        for row in &self.rows {
            for (name, value) in self.keys.iter().zip(row) {
                out.push(encode_cell(name, value, encoding));
            }
        }
        out
    }
}

fn encode_cell(name: &str, value: &FieldValue, encoding: Encoding) -> WireField {
    let rendered = match value {
        FieldValue::Absent => NO_VALUE.to_string(),
        FieldValue::Null => NULL_VALUE.to_string(),
        FieldValue::Present(Value::File(file)) => {
            return WireField::File {
                name: format!("{name}[]"),
                file: file.clone(),
            };
        }
        FieldValue::Present(v) => v.to_string(),
    };
    // The array suffix is appended after encoding and stays literal.
    let (name, value) = match encoding {
        Encoding::Percent => (encode_component(name), encode_component(&rendered)),
        Encoding::Raw => (name.to_string(), rendered),
    };
    WireField::Text {
        name: format!("{name}[]"),
        value,
    }
}

/// Encode a batch's operations into ordered wire fields: all of operation
/// `i`'s fields precede operation `i + 1`'s.
pub fn encode_operations(operations: &[Operation], encoding: Encoding) -> Vec<WireField> {
    let table = SquareTable::from_operations(operations);
    tracing::trace!(keys = ?table.keys, rows = table.rows.len(), "full square");
    table.encode(encoding)
}
