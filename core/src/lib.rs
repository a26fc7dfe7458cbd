//! Synchronous client core for a batched object-CRUD API.
//!
//! # Overview
//! Turns collections of create/update/delete intents into a single wire
//! request, and turns the service's reply into a typed verdict. Requests are
//! built as `HttpRequest` values and replies parsed from `HttpResponse`
//! values without touching the network (host-does-IO pattern).
//!
//! # Design
//! - `filter::synthesize_filter` stamps each operation with its protocol
//!   method and derives the working-set filter.
//! - `encoder` lays the stamped operations out as a "full square": one value
//!   per operation for every key used anywhere in the batch.
//! - `response::ApiResponse::condensed_status` classifies replies as
//!   failed / not_ok / ok.
//! - `ApiClient` is stateless; session details arrive in `ClientConfig`.

pub mod client;
pub mod config;
pub mod encoder;
pub mod error;
pub mod field;
pub mod filter;
pub mod http;
pub mod key;
pub mod log;
pub mod operation;
pub mod query;
pub mod response;

pub use client::{prepare_batch, ApiClient, PreparedBatch};
pub use config::ClientConfig;
pub use encoder::{encode_operations, wire_key_set, Encoding, SquareTable, WireField};
pub use error::ApiError;
pub use field::{FieldValue, FileAttachment, Value, NO_VALUE, NULL_VALUE};
pub use filter::{synthesize_filter, Combinator, FilterExpression, Predicate};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use key::normalize_key;
pub use operation::{Batch, Method, Operation};
pub use query::{ReadQuery, SortDir};
pub use response::{AffectedObject, ApiResponse, CondensedStatus, IdVersion};
