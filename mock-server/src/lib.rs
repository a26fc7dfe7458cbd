//! In-memory service speaking the batch wire protocol.
//!
//! Every `<endpoint>.api` path is a table of records. A PUT zips the
//! same-named `key[]` arrays back into per-object rows by position, checks
//! each row against the working-set filter and its lock version, and applies
//! the batch atomically unless `_per_object_transactions=true` is sent. A GET
//! answers with `data` and `total`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::{
    extract::{Path, RawQuery, State},
    http::{Method, StatusCode},
    routing::any,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};

pub const NO_VALUE: &str = ":no_value:";
pub const NULL_VALUE: &str = ":null_value:";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: i64,
    pub lock_version: i64,
    pub fields: BTreeMap<String, Value>,
}

impl Record {
    fn to_json(&self, columns: &[String]) -> Value {
        let mut obj = Map::new();
        obj.insert("id".into(), json!(self.id));
        obj.insert("lock_version".into(), json!(self.lock_version));
        for (k, v) in &self.fields {
            if columns.is_empty() || columns.contains(k) {
                obj.insert(k.clone(), v.clone());
            }
        }
        Value::Object(obj)
    }
}

#[derive(Clone, Debug, Default)]
pub struct Store {
    next_id: i64,
    tables: HashMap<String, BTreeMap<i64, Record>>,
}

pub type Db = Arc<RwLock<Store>>;

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Store {
        next_id: 1,
        ..Store::default()
    }));
    Router::new()
        .route("/{*endpoint}", any(dispatch))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

type Reply = (StatusCode, Json<Value>);

fn failure(errors: Vec<String>) -> Reply {
    (StatusCode::OK, Json(json!({ "success": false, "errors": errors })))
}

async fn dispatch(
    State(db): State<Db>,
    Path(endpoint): Path<String>,
    method: Method,
    RawQuery(query): RawQuery,
    body: String,
) -> Reply {
    let Some(table) = endpoint.strip_suffix(".api") else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "errors": ["unknown endpoint"] })),
        );
    };

    let raw = if method == Method::GET {
        query.unwrap_or_default()
    } else {
        body
    };
    let fields: Vec<(String, String)> = url::form_urlencoded::parse(raw.as_bytes())
        .into_owned()
        .collect();
    let verb = fields
        .iter()
        .find(|(k, _)| k == "_method")
        .map(|(_, v)| v.to_uppercase())
        .unwrap_or_else(|| method.as_str().to_string());

    tracing::debug!(table, %verb, fields = fields.len(), "request");
    match verb.as_str() {
        "GET" => read(&db, table, &fields).await,
        "PUT" => batch(&db, table, &fields).await,
        other => failure(vec![format!("unsupported method {other}")]),
    }
}

/// Repeated fields split into filter triples, `key[]` columns and unique params.
#[derive(Debug, Default)]
struct Decoded {
    predicates: Vec<(String, String, String)>,
    combinator: Option<String>,
    columns: BTreeMap<String, Vec<String>>,
    params: HashMap<String, String>,
    select: Vec<String>,
}

fn decode(fields: &[(String, String)]) -> Result<Decoded, String> {
    let mut out = Decoded::default();
    let (mut ff, mut ft, mut fc) = (Vec::new(), Vec::new(), Vec::new());
    for (k, v) in fields {
        match k.as_str() {
            "_ff[]" => ff.push(v.clone()),
            "_ft[]" => ft.push(v.clone()),
            "_fc[]" => fc.push(v.clone()),
            "_fm" => out.combinator = Some(v.to_lowercase()),
            "_select_columns[]" => out.select.push(v.clone()),
            _ => match k.strip_suffix("[]") {
                Some(column) => out.columns.entry(column.to_string()).or_default().push(v.clone()),
                None => {
                    out.params.insert(k.clone(), v.clone());
                }
            },
        }
    }
    if ff.len() != ft.len() || ff.len() != fc.len() {
        return Err("filter fields _ff[], _ft[] and _fc[] differ in length".into());
    }
    out.predicates = ff
        .into_iter()
        .zip(ft)
        .zip(fc)
        .map(|((f, t), c)| (f, t, c))
        .collect();
    Ok(out)
}

impl Decoded {
    /// Zip the parallel columns into rows; every column must be the same length.
    fn rows(&self) -> Result<Vec<BTreeMap<&str, &str>>, String> {
        let mut lengths = self.columns.iter().map(|(k, v)| (k, v.len()));
        let Some((_, len)) = lengths.next() else {
            return Ok(Vec::new());
        };
        if let Some((key, other)) = lengths.find(|(_, l)| *l != len) {
            return Err(format!("column {key} has {other} values, expected {len}"));
        }
        Ok((0..len)
            .map(|i| {
                self.columns
                    .iter()
                    .map(|(k, v)| (k.as_str(), v[i].as_str()))
                    .collect()
            })
            .collect())
    }

    /// Ids named by `id eq <n>` predicates: the batch's working set.
    fn working_set(&self) -> Vec<i64> {
        self.predicates
            .iter()
            .filter(|(f, t, _)| f == "id" && t == "eq")
            .filter_map(|(_, _, c)| c.parse().ok())
            .collect()
    }

    fn matches(&self, record: &Record) -> Result<bool, String> {
        let mut results = self
            .predicates
            .iter()
            .map(|(f, t, c)| eval_test(record, f, t, c));
        match self.combinator.as_deref() {
            None | Some("and") => results.try_fold(true, |acc, r| r.map(|m| acc && m)),
            Some("or") => results.try_fold(false, |acc, r| r.map(|m| acc || m)),
            Some(other) => Err(format!("unsupported filter combinator {other}")),
        }
    }
}

fn eval_test(record: &Record, field: &str, test: &str, operand: &str) -> Result<bool, String> {
    let value = match field {
        "id" => Some(record.id.to_string()),
        "lock_version" => Some(record.lock_version.to_string()),
        _ => record.fields.get(field).and_then(|v| match v {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }),
    };
    let value = value.unwrap_or_default();
    Ok(match test {
        "eq" => value == operand,
        "ne" => value != operand,
        "bg" => value.starts_with(operand),
        "ct" => value.contains(operand),
        "blank" => value.is_empty(),
        "not_blank" => !value.is_empty(),
        other => return Err(format!("unsupported filter test {other}")),
    })
}

async fn read(db: &Db, table: &str, fields: &[(String, String)]) -> Reply {
    let decoded = match decode(fields) {
        Ok(d) => d,
        Err(e) => return failure(vec![e]),
    };
    let store = db.read().await;
    let mut matching = Vec::new();
    for record in store.tables.get(table).into_iter().flat_map(|t| t.values()) {
        match decoded.matches(record) {
            Ok(true) => matching.push(record),
            Ok(false) => {}
            Err(e) => return failure(vec![e]),
        }
    }
    let total = matching.len();
    let start = decoded.params.get("_start").and_then(|s| s.parse().ok()).unwrap_or(0);
    let limit = decoded.params.get("_limit").and_then(|s| s.parse().ok()).unwrap_or(usize::MAX);
    let data: Vec<Value> = matching
        .into_iter()
        .skip(start)
        .take(limit)
        .map(|r| r.to_json(&decoded.select))
        .collect();
    (
        StatusCode::OK,
        Json(json!({ "success": true, "errors": [], "data": data, "total": total })),
    )
}

fn cell_value(raw: &str) -> Option<Value> {
    match raw {
        NO_VALUE => None,
        NULL_VALUE => Some(Value::Null),
        other => Some(Value::String(other.to_string())),
    }
}

fn parse_int(row: &BTreeMap<&str, &str>, key: &str) -> Option<i64> {
    row.get(key).and_then(|v| v.parse().ok())
}

/// Apply one row to `store`, returning the affected object's id and lock
/// version or the reason it was refused.
fn apply_row(
    store: &mut Store,
    table: &str,
    row: &BTreeMap<&str, &str>,
    working_set: &[i64],
) -> Result<(i64, i64), (Option<i64>, String)> {
    let id = parse_int(row, "id");
    let lock_version = parse_int(row, "lock_version");
    let target = id.unwrap_or(0);
    if !working_set.contains(&target) {
        return Err((id, format!("object {target} is outside the filtered working set")));
    }
    let attributes = row
        .iter()
        .filter(|(k, _)| !matches!(**k, "__method" | "id" | "lock_version"))
        .filter_map(|(k, v)| cell_value(v).map(|v| (k.to_string(), v)));

    let method = row.get("__method").copied().unwrap_or_default();
    let records = store.tables.entry(table.to_string()).or_default();
    match method {
        "POST" => {
            if target != 0 || lock_version.unwrap_or(0) != 0 {
                return Err((id, "create must not carry an id or lock_version".into()));
            }
            let new_id = store.next_id;
            store.next_id += 1;
            let record = Record {
                id: new_id,
                lock_version: 0,
                fields: attributes.collect(),
            };
            records.insert(new_id, record);
            Ok((new_id, 0))
        }
        "PUT" | "DELETE" => {
            let Some(record) = records.get_mut(&target) else {
                return Err((id, format!("object {target} not found")));
            };
            if Some(record.lock_version) != lock_version {
                return Err((id, format!("stale lock_version for object {target}")));
            }
            if method == "DELETE" {
                records.remove(&target);
                return Ok((target, lock_version.unwrap_or_default()));
            }
            for (k, v) in attributes {
                record.fields.insert(k, v);
            }
            record.lock_version += 1;
            Ok((target, record.lock_version))
        }
        other => Err((id, format!("unexpected __method {other:?}"))),
    }
}

async fn batch(db: &Db, table: &str, fields: &[(String, String)]) -> Reply {
    let decoded = match decode(fields) {
        Ok(d) => d,
        Err(e) => return failure(vec![e]),
    };
    let rows = match decoded.rows() {
        Ok(rows) => rows,
        Err(e) => return failure(vec![e]),
    };
    let working_set = decoded.working_set();
    let per_object = decoded
        .params
        .get("_per_object_transactions")
        .is_some_and(|v| v == "true" || v == "1");

    let mut store = db.write().await;
    let mut draft = store.clone();
    let mut affected = Vec::with_capacity(rows.len());
    let mut all_ok = true;
    for row in &rows {
        match apply_row(&mut draft, table, row, &working_set) {
            Ok((id, lock_version)) => affected.push(json!({
                "id": id, "lock_version": lock_version, "success": true, "messages": [],
            })),
            Err((id, message)) => {
                all_ok = false;
                affected.push(json!({
                    "id": id, "lock_version": Value::Null, "success": false, "messages": [message],
                }));
            }
        }
    }

    if all_ok || per_object {
        *store = draft;
    }
    tracing::info!(table, rows = rows.len(), all_ok, per_object, "batch applied");
    let errors: Vec<String> = if all_ok || per_object {
        Vec::new()
    } else {
        vec!["batch rolled back".to_string()]
    };
    (
        StatusCode::OK,
        Json(json!({
            "success": errors.is_empty(),
            "errors": errors,
            "affected_objects": affected,
            "total": rows.len(),
        })),
    )
}
