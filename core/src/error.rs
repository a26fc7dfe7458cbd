//! Error types for the batch API client.
//!
//! # Design
//! Preparation errors (`InvalidMethod`, `InvalidCreateIdentity`,
//! `MissingIdentity`) are caller programming errors: they abort the whole
//! batch before any wire field is produced and are never worth retrying.
//! `ProtocolMismatch`, `PartialFailure` and `UnexpectedStatus` only come out of
//! `ApiResponse::assert_status`; plain classification returns data instead.
//! The remaining variants describe the transport boundary.

use thiserror::Error;

use crate::operation::Method;
use crate::response::CondensedStatus;

/// Errors returned by `ApiClient` and the batch preparation functions.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The operation at `index` declares no method and the batch has no default.
    #[error("operation {index}: no method given and the batch has no default method")]
    InvalidMethod { index: usize },

    /// A create operation arrived with a positive `id` or `lock_version`.
    #[error("operation {index}: neither \"id\" nor \"lock_version\" can be set to create an object")]
    InvalidCreateIdentity { index: usize },

    /// An update or delete operation lacks a usable `id` or any `lock_version`.
    #[error("operation {index}: both \"id\" and \"lock_version\" must be set to {method} an object")]
    MissingIdentity { index: usize, method: Method },

    /// The reply carried no `success` element at all.
    #[error("unexpected reply shape: no success element")]
    ProtocolMismatch,

    /// The reply was understood but at least one operation did not succeed.
    #[error("request did not fully succeed: {summary}")]
    PartialFailure { summary: String },

    /// The caller asserted a non-ok status and the reply was something else.
    #[error("expected a {expected} reply, got {actual}")]
    UnexpectedStatus {
        expected: CondensedStatus,
        actual: CondensedStatus,
    },

    /// The server returned a status other than 200.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// The response body could not be decoded as JSON.
    #[error("deserialization failed: {0}")]
    DeserializationError(String),

    /// Client configuration could not be read or parsed.
    #[error("invalid configuration: {0}")]
    Config(String),
}
