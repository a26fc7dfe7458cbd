//! Field values carried by an operation.
//!
//! # Design
//! The service must tell "leave this attribute alone" apart from "set it to
//! null", so `FieldValue` keeps `Absent` and `Null` as separate variants and
//! the encoder gives each its own sentinel token. A key that an operation
//! never mentions behaves exactly like an explicit `Absent`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Wire token for a key the operation did not declare.
pub const NO_VALUE: &str = ":no_value:";

/// Wire token for a key the operation explicitly set to null.
pub const NULL_VALUE: &str = ":null_value:";

/// The value of one attribute in one operation.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Absent,
    Null,
    Present(Value),
}

/// A concrete attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    /// A sequence of scalars, sent as a single `[a,b,c]` literal.
    List(Vec<Value>),
    File(FileAttachment),
}

/// A file-bearing value. The encoder only decides the field name; framing the
/// upload is left to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttachment {
    pub file_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl FieldValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, FieldValue::Absent)
    }
}

impl fmt::Display for Value {
    /// Scalar string form. Lists are comma-joined inside brackets with no
    /// escaping of embedded commas; the service parses exactly this format.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => f.write_str(s),
            Value::Integer(n) => write!(f, "{n}"),
            // Whole floats keep their decimal point: `1.0`, not `1`.
            Value::Float(x) if x.is_finite() && x.fract() == 0.0 => write!(f, "{x:.1}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::File(file) => f.write_str(&file.file_name),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<FileAttachment> for Value {
    fn from(file: FileAttachment) -> Self {
        Value::File(file)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

macro_rules! present_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(v: $ty) -> Self {
                    FieldValue::Present(v.into())
                }
            }
        )*
    };
}

present_from!(&str, String, i64, f64, bool, FileAttachment, Value);

impl<T: Into<Value>> From<Vec<T>> for FieldValue {
    fn from(items: Vec<T>) -> Self {
        FieldValue::Present(items.into())
    }
}

impl From<serde_json::Value> for FieldValue {
    /// JSON `null` becomes `Null`; objects are sent as their JSON text.
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => FieldValue::Null,
            other => FieldValue::Present(json_to_value(other)),
        }
    }
}

fn json_to_value(v: serde_json::Value) -> Value {
    match v {
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Float(n.as_f64().unwrap_or_default()),
        },
        serde_json::Value::String(s) => Value::Text(s),
        serde_json::Value::Array(items) => Value::List(items.into_iter().map(json_to_value).collect()),
        serde_json::Value::Null => Value::Text(String::new()),
        obj @ serde_json::Value::Object(_) => Value::Text(obj.to_string()),
    }
}
