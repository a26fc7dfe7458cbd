//! Filter expressions and working-set synthesis.
//!
//! # Design
//! The service only ever sees one flat request per batch. The filter is what
//! tells it which existing objects the rows apply to, so every batch carries
//! one `id eq <n>` predicate per distinct target (0 standing in for objects
//! being created). The same expression type is reused for read queries.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::encoder::{protocol_field, Encoding, WireField};
use crate::error::ApiError;
use crate::operation::{Method, Operation};

/// One `(field, test, value)` triple, e.g. `id eq 5`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predicate {
    pub field: String,
    pub test: String,
    pub value: Option<String>,
}

impl Predicate {
    pub fn new(field: impl Into<String>, test: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            test: test.into(),
            value: Some(value.into()),
        }
    }

    /// A test that takes no operand, such as `not_blank`.
    pub fn unary(field: impl Into<String>, test: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            test: test.into(),
            value: None,
        }
    }

    pub fn id_eq(id: i64) -> Self {
        Self::new("id", "eq", id.to_string())
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(v) => write!(f, "{} {} {v}", self.field, self.test),
            None => write!(f, "{} {}", self.field, self.test),
        }
    }
}

/// How multiple predicates combine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Combinator {
    And,
    Or,
    /// A combinator string over 1-based predicate positions, e.g. `1 AND (2 OR 3)`.
    Custom(String),
}

impl Combinator {
    pub fn as_wire(&self) -> &str {
        match self {
            Combinator::And => "and",
            Combinator::Or => "or",
            Combinator::Custom(s) => s,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterExpression {
    pub predicates: Vec<Predicate>,
    pub combinator: Option<Combinator>,
}

impl FilterExpression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn with_combinator(mut self, combinator: Combinator) -> Self {
        self.combinator = Some(combinator);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// `_fm` (when a combinator is set) followed by one
    /// `_ff[]`/`_ft[]`/`_fc[]` triple per predicate.
    pub fn to_wire_fields(&self, encoding: Encoding) -> Vec<WireField> {
        let mut out = Vec::with_capacity(self.predicates.len() * 3 + 1);
        if let Some(combinator) = &self.combinator {
            out.push(protocol_field("_fm", combinator.as_wire(), encoding));
        }
        for p in &self.predicates {
            out.push(protocol_field("_ff[]", &p.field, encoding));
            out.push(protocol_field("_ft[]", &p.test, encoding));
            out.push(protocol_field("_fc[]", p.value.as_deref().unwrap_or_default(), encoding));
        }
        out
    }
}

impl fmt::Display for FilterExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joiner = match &self.combinator {
            None if self.predicates.len() == 1 => return write!(f, "{}", self.predicates[0]),
            // The service ANDs predicates when no combinator is sent.
            None | Some(Combinator::And) => " AND ",
            Some(Combinator::Or) => " OR ",
            Some(Combinator::Custom(s)) => {
                write!(f, "{s}:")?;
                return self.predicates.iter().try_for_each(|p| write!(f, " ({p})"));
            }
        };
        for (i, p) in self.predicates.iter().enumerate() {
            if i > 0 {
                f.write_str(joiner)?;
            }
            write!(f, "({p})")?;
        }
        Ok(())
    }
}

/// Stamp each operation with its protocol method, validate its identity, and
/// return the filter selecting exactly the objects the batch touches.
///
/// Creates are forced to `id = 0, lock_version = 0`. Fails on the first bad
/// operation; the caller must then discard the batch.
pub fn synthesize_filter(
    operations: &mut [Operation],
    default_method: Option<Method>,
) -> Result<FilterExpression, ApiError> {
    let mut target_ids: Vec<i64> = Vec::with_capacity(operations.len());

    for (index, op) in operations.iter_mut().enumerate() {
        let method = op
            .method
            .or(default_method)
            .ok_or(ApiError::InvalidMethod { index })?;

        let target = match method {
            Method::Create => {
                if op.id.unwrap_or(0) > 0 || op.lock_version.unwrap_or(0) > 0 {
                    return Err(ApiError::InvalidCreateIdentity { index });
                }
                op.id = Some(0);
                op.lock_version = Some(0);
                0
            }
            Method::Update | Method::Delete => match (op.id, op.lock_version) {
                (Some(id), Some(_)) if id > 0 => id,
                _ => return Err(ApiError::MissingIdentity { index, method }),
            },
        };
        op.protocol_method = Some(method);

        if !target_ids.contains(&target) {
            target_ids.push(target);
        }
    }

    let mut filter = FilterExpression {
        predicates: target_ids.into_iter().map(Predicate::id_eq).collect(),
        combinator: None,
    };
    if filter.predicates.len() > 1 {
        filter.combinator = Some(Combinator::Or);
    }
    tracing::debug!(operations = operations.len(), %filter, "working-set filter");
    Ok(filter)
}
