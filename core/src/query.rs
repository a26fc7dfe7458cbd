//! Read queries: paging, sorting, column selection and filters for GET.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::encoder::{protocol_field, Encoding, WireField};
use crate::filter::FilterExpression;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDir {
    #[serde(rename = "ASC")]
    Asc,
    #[serde(rename = "DESC")]
    Desc,
}

impl SortDir {
    pub fn as_str(self) -> &'static str {
        match self {
            SortDir::Asc => "ASC",
            SortDir::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadQuery {
    pub start: Option<u64>,
    pub limit: Option<u64>,
    pub sort: Option<String>,
    pub dir: Option<SortDir>,
    pub columns: Vec<String>,
    pub filter: FilterExpression,
    pub params: BTreeMap<String, String>,
}

impl ReadQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, start: u64, limit: u64) -> Self {
        self.start = Some(start);
        self.limit = Some(limit);
        self
    }

    pub fn sort(mut self, column: impl Into<String>, dir: SortDir) -> Self {
        self.sort = Some(column.into());
        self.dir = Some(dir);
        self
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn filter(mut self, filter: FilterExpression) -> Self {
        self.filter = filter;
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Uniquely-keyed parameters (paging, sorting and caller extras).
    pub fn unique_params(&self) -> BTreeMap<String, String> {
        let mut out = self.params.clone();
        if let Some(start) = self.start {
            out.insert("_start".into(), start.to_string());
        }
        if let Some(limit) = self.limit {
            out.insert("_limit".into(), limit.to_string());
        }
        if let Some(sort) = &self.sort {
            out.insert("_sort".into(), sort.clone());
        }
        if let Some(dir) = self.dir {
            out.insert("_dir".into(), dir.as_str().into());
        }
        out
    }

    /// Repeated fields: selected columns, then the filter.
    pub fn ordered_fields(&self, encoding: Encoding) -> Vec<WireField> {
        let mut out: Vec<WireField> = self
            .columns
            .iter()
            .map(|c| protocol_field("_select_columns[]", c, encoding))
            .collect();
        out.extend(self.filter.to_wire_fields(encoding));
        out
    }
}
