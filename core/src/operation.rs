//! Operations and batches.
//!
//! # Design
//! An `Operation` is one create/update/delete intent against a single remote
//! object. Identity (`id`, `lock_version`) lives in dedicated slots instead of
//! the attribute map, so the filter synthesizer can validate it without
//! guessing at dynamic values. The caller's `method` tag is never sent; the
//! synthesizer records the resolved method in `protocol_method`, which is sent
//! as the `__method` column.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::field::{FieldValue, Value};
use crate::http::HttpMethod;
use crate::key::normalize_key;

/// Wire column carrying each operation's resolved HTTP verb.
pub const PROTOCOL_METHOD_KEY: &str = "__method";
pub const ID_KEY: &str = "id";
pub const LOCK_VERSION_KEY: &str = "lock_version";

/// The mutation an operation requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Create,
    Update,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Create => "create",
            Method::Update => "update",
            Method::Delete => "delete",
        }
    }

    /// The verb the service uses to route a row of the batch.
    pub fn http_verb(self) -> HttpMethod {
        match self {
            Method::Create => HttpMethod::Post,
            Method::Update => HttpMethod::Put,
            Method::Delete => HttpMethod::Delete,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a method tag is not one of create/update/delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMethod(pub String);

impl fmt::Display for UnknownMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown method {:?}", self.0)
    }
}

impl std::error::Error for UnknownMethod {}

impl FromStr for Method {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Method::Create),
            "update" => Ok(Method::Update),
            "delete" => Ok(Method::Delete),
            other => Err(UnknownMethod(other.to_string())),
        }
    }
}

/// One intended mutation of one remote object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Operation {
    pub method: Option<Method>,
    pub id: Option<i64>,
    pub lock_version: Option<i64>,
    /// Set by filter synthesis; `None` until then.
    pub protocol_method: Option<Method>,
    /// Attributes. `set` stores them under their canonical key.
    pub fields: BTreeMap<String, FieldValue>,
}

impl Operation {
    /// An operation with no method tag; it takes the batch default.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create() -> Self {
        Self {
            method: Some(Method::Create),
            ..Self::default()
        }
    }

    pub fn update(id: i64, lock_version: i64) -> Self {
        Self {
            method: Some(Method::Update),
            id: Some(id),
            lock_version: Some(lock_version),
            ..Self::default()
        }
    }

    pub fn delete(id: i64, lock_version: i64) -> Self {
        Self {
            method: Some(Method::Delete),
            id: Some(id),
            lock_version: Some(lock_version),
            ..Self::default()
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn with_identity(mut self, id: i64, lock_version: i64) -> Self {
        self.id = Some(id);
        self.lock_version = Some(lock_version);
        self
    }

    /// Set an attribute. Nested keys may be given hash-style (`a[b[c]]`);
    /// `a[b[c]]` and `a[b][c]` name the same attribute and the later call wins.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(normalize_key(&key.into()), value.into());
        self
    }

    /// Explicitly null an attribute on the server.
    pub fn set_null(self, key: impl Into<String>) -> Self {
        self.set(key, FieldValue::Null)
    }

    pub fn has_file(&self) -> bool {
        self.fields
            .values()
            .any(|v| matches!(v, FieldValue::Present(Value::File(_))))
    }

    /// Every canonical key this operation contributes to the wire,
    /// attributes and protocol slots alike.
    pub fn wire_keys(&self) -> impl Iterator<Item = String> + '_ {
        let slots = [
            self.protocol_method.map(|_| PROTOCOL_METHOD_KEY),
            self.id.map(|_| ID_KEY),
            self.lock_version.map(|_| LOCK_VERSION_KEY),
        ];
        slots
            .into_iter()
            .flatten()
            .map(str::to_string)
            .chain(self.fields.keys().map(|k| normalize_key(k)))
    }

    /// The value this operation holds for the canonical `key`. Protocol slots
    /// shadow attributes of the same name; an attribute stored under its
    /// canonical spelling shadows one stored hash-style.
    pub fn value_for(&self, key: &str) -> FieldValue {
        let slot = match key {
            PROTOCOL_METHOD_KEY => self.protocol_method.map(|m| FieldValue::from(m.http_verb().as_str())),
            ID_KEY => self.id.map(FieldValue::from),
            LOCK_VERSION_KEY => self.lock_version.map(FieldValue::from),
            _ => None,
        };
        slot.or_else(|| self.fields.get(key).cloned())
            .or_else(|| {
                self.fields
                    .iter()
                    .find(|(k, _)| normalize_key(k) == key)
                    .map(|(_, v)| v.clone())
            })
            .unwrap_or(FieldValue::Absent)
    }
}

/// Operations sent to one endpoint in one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub endpoint: String,
    /// Used for operations that carry no method tag of their own.
    pub default_method: Option<Method>,
    pub operations: Vec<Operation>,
    /// Extra uniquely-keyed request parameters, e.g. `_per_object_transactions`.
    pub params: BTreeMap<String, String>,
}

impl Batch {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            default_method: None,
            operations: Vec::new(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_default_method(mut self, method: Method) -> Self {
        self.default_method = Some(method);
        self
    }

    pub fn push(mut self, operation: Operation) -> Self {
        self.operations.push(operation);
        self
    }

    pub fn extend(mut self, operations: impl IntoIterator<Item = Operation>) -> Self {
        self.operations.extend(operations);
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
