//! Reply decoding and classification.
//!
//! # Design
//! Decoding is lenient: any JSON value becomes an `ApiResponse`, with missing
//! or mistyped elements left empty, so that classification is total over every
//! reply shape. Classification returns data; `assert_status` is the opt-in
//! fail-fast path.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ApiError;

/// Three-way summary of a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CondensedStatus {
    /// The reply is not a protocol reply at all (no `success` element).
    Failed,
    /// Understood, but something in the request could not be satisfied.
    NotOk,
    /// Completely successful.
    Ok,
}

impl CondensedStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CondensedStatus::Failed => "failed",
            CondensedStatus::NotOk => "not_ok",
            CondensedStatus::Ok => "ok",
        }
    }
}

impl fmt::Display for CondensedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-object outcome from `affected_objects`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AffectedObject {
    pub id: Option<i64>,
    pub lock_version: Option<i64>,
    pub success: Option<bool>,
    #[serde(default)]
    pub messages: Vec<Value>,
}

/// Identity of an object after the request, for chaining a create into a
/// later update or delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdVersion {
    pub id: Option<i64>,
    pub lock_version: Option<i64>,
}

/// A decoded reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiResponse {
    /// `None` when the element is missing or not a boolean.
    pub success: Option<bool>,
    pub errors: Vec<Value>,
    pub affected_objects: Vec<AffectedObject>,
    pub data: Vec<Map<String, Value>>,
    pub total: Option<u64>,
    /// The reply as received.
    pub raw: Value,
}

impl ApiResponse {
    /// Decode any JSON value. Never fails; non-object replies come out with
    /// every element empty.
    pub fn from_value(raw: Value) -> Self {
        let Some(obj) = raw.as_object() else {
            return Self {
                raw,
                ..Self::default()
            };
        };

        let success = obj.get("success").and_then(Value::as_bool);
        let errors = match obj.get("errors") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.clone(),
            Some(other) => vec![other.clone()],
        };
        let affected_objects = obj
            .get("affected_objects")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(affected_object).collect())
            .unwrap_or_default();
        let data = obj
            .get("data")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(|r| r.as_object().cloned()).collect())
            .unwrap_or_default();
        let total = obj.get("total").and_then(|t| match t {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        });

        Self {
            success,
            errors,
            affected_objects,
            data,
            total,
            raw,
        }
    }

    pub fn from_json(body: &str) -> Result<Self, ApiError> {
        let raw: Value =
            serde_json::from_str(body).map_err(|e| ApiError::DeserializationError(e.to_string()))?;
        Ok(Self::from_value(raw))
    }

    /// Classify the reply. A missing `success` short-circuits to `Failed`
    /// before anything else is looked at.
    pub fn condensed_status(&self) -> CondensedStatus {
        let Some(success) = self.success else {
            return CondensedStatus::Failed;
        };
        if !success || !self.errors.is_empty() {
            return CondensedStatus::NotOk;
        }
        if self.affected_objects.iter().any(|a| a.success != Some(true)) {
            return CondensedStatus::NotOk;
        }
        CondensedStatus::Ok
    }

    /// Return `self` if the condensed status is `expected`, otherwise an error
    /// describing what was received.
    pub fn assert_status(&self, expected: CondensedStatus) -> Result<&Self, ApiError> {
        let actual = self.condensed_status();
        if actual == expected {
            return Ok(self);
        }
        tracing::warn!(%expected, %actual, "unexpected reply status");
        Err(match (expected, actual) {
            (CondensedStatus::Ok, CondensedStatus::Failed) => ApiError::ProtocolMismatch,
            (CondensedStatus::Ok, CondensedStatus::NotOk) => ApiError::PartialFailure {
                summary: self.failure_summary(),
            },
            _ => ApiError::UnexpectedStatus { expected, actual },
        })
    }

    pub fn assert_ok(&self) -> Result<&Self, ApiError> {
        self.assert_status(CondensedStatus::Ok)
    }

    /// `(id, lock_version)` of each affected object, in reply order.
    pub fn id_versions(&self) -> Vec<IdVersion> {
        self.affected_objects
            .iter()
            .map(|a| IdVersion {
                id: a.id,
                lock_version: a.lock_version,
            })
            .collect()
    }

    pub fn data(&self) -> &[Map<String, Value>] {
        &self.data
    }

    pub fn affected_objects(&self) -> &[AffectedObject] {
        &self.affected_objects
    }

    pub fn total(&self) -> Option<u64> {
        self.total
    }

    fn failure_summary(&self) -> String {
        let mut parts: Vec<String> = self.errors.iter().map(render_message).collect();
        for (i, a) in self.affected_objects.iter().enumerate() {
            if a.success != Some(true) {
                let messages: Vec<String> = a.messages.iter().map(render_message).collect();
                parts.push(format!("object {i} (id {:?}): {}", a.id, messages.join("; ")));
            }
        }
        if parts.is_empty() {
            parts.push("success=false".to_string());
        }
        parts.join(", ")
    }
}

fn affected_object(v: &Value) -> AffectedObject {
    AffectedObject {
        id: v.get("id").and_then(as_integer),
        lock_version: v.get("lock_version").and_then(as_integer),
        success: v.get("success").and_then(Value::as_bool),
        messages: v
            .get("messages")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
    }
}

// The service sometimes quotes integers.
fn as_integer(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn render_message(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
