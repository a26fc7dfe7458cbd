//! Stateless HTTP request builder and response parser for the batch API.
//!
//! # Design
//! `ApiClient` holds only a `ClientConfig` and carries no mutable state
//! between calls. Building a request and parsing its response are separate
//! steps; the caller executes the HTTP round-trip in between, keeping the
//! core deterministic and free of I/O dependencies.
//!
//! A batch request is assembled in three parts: the uniquely-keyed params
//! (form-encoded, sorted), then the working-set filter, then the full-square
//! wire fields. Preparation either succeeds for the whole batch or produces
//! nothing. A batch carrying a file is framed as an ordered multipart part
//! list instead, so each file keeps its slot in its row.

use std::collections::BTreeMap;

use url::form_urlencoded;

use crate::config::ClientConfig;
use crate::encoder::{encode_operations, Encoding, WireField};
use crate::error::ApiError;
use crate::filter::{synthesize_filter, FilterExpression};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::log::truncate_for_log;
use crate::operation::{Batch, Method, Operation};
use crate::query::ReadQuery;
use crate::response::ApiResponse;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// A batch after filter synthesis and encoding, ready to be framed.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedBatch {
    pub endpoint: String,
    pub filter: FilterExpression,
    /// Filter fields followed by the full-square fields.
    pub fields: Vec<WireField>,
    pub params: BTreeMap<String, String>,
}

/// Synthesize the batch's filter, then encode its stamped operations.
pub fn prepare_batch(batch: Batch, encoding: Encoding) -> Result<PreparedBatch, ApiError> {
    let Batch {
        endpoint,
        default_method,
        mut operations,
        params,
    } = batch;

    let filter = synthesize_filter(&mut operations, default_method)?;
    let mut fields = filter.to_wire_fields(encoding);
    fields.extend(encode_operations(&operations, encoding));

    Ok(PreparedBatch {
        endpoint,
        filter,
        fields,
        params,
    })
}

/// Synchronous, stateless client for the batch API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    config: ClientConfig,
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    /// Client with default settings against `service`.
    pub fn for_service(service: &str) -> Self {
        Self::new(ClientConfig::new(service))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Build one PUT request applying a mix of creates, updates and deletes.
    pub fn build_batch(&self, batch: Batch) -> Result<HttpRequest, ApiError> {
        tracing::debug!(
            endpoint = %batch.endpoint,
            operations = batch.len(),
            default_method = ?batch.default_method,
            "building batch request"
        );
        // Multipart parts are sent unencoded.
        let encoding = if batch.operations.iter().any(Operation::has_file) {
            Encoding::Raw
        } else {
            self.config.encoding
        };
        let prepared = prepare_batch(batch, encoding)?;
        Ok(self.frame(HttpMethod::Put, &prepared.endpoint, prepared.params, prepared.fields))
    }

    pub fn build_create(&self, endpoint: &str, operations: Vec<Operation>) -> Result<HttpRequest, ApiError> {
        self.build_with_default(endpoint, operations, Method::Create)
    }

    pub fn build_update(&self, endpoint: &str, operations: Vec<Operation>) -> Result<HttpRequest, ApiError> {
        self.build_with_default(endpoint, operations, Method::Update)
    }

    pub fn build_delete(&self, endpoint: &str, operations: Vec<Operation>) -> Result<HttpRequest, ApiError> {
        self.build_with_default(endpoint, operations, Method::Delete)
    }

    /// Build a GET request reading objects from `endpoint`.
    pub fn build_get(&self, endpoint: &str, query: &ReadQuery) -> HttpRequest {
        tracing::debug!(endpoint, ?query, "building read request");
        let fields = query.ordered_fields(self.config.encoding);
        self.frame(HttpMethod::Get, endpoint, query.unique_params(), fields)
    }

    /// Decode a reply. Anything but HTTP 200 is an error; a 200 with any JSON
    /// body decodes, leaving classification to the caller.
    pub fn parse_response(&self, response: HttpResponse) -> Result<ApiResponse, ApiError> {
        tracing::debug!(
            status = response.status,
            body = %truncate_for_log(&response.body, self.config.max_log_size),
            "parsing reply"
        );
        if response.status != 200 {
            tracing::warn!(status = response.status, "non-OK reply");
            return Err(ApiError::HttpError {
                status: response.status,
                body: response.body,
            });
        }
        ApiResponse::from_json(&response.body)
    }

    fn build_with_default(
        &self,
        endpoint: &str,
        operations: Vec<Operation>,
        method: Method,
    ) -> Result<HttpRequest, ApiError> {
        let batch = Batch::new(endpoint)
            .with_default_method(method)
            .extend(operations);
        self.build_batch(batch)
    }

    /// Protocol params the service expects on every request. Caller params
    /// take precedence.
    fn common_params(&self, method: HttpMethod, params: &mut BTreeMap<String, String>) {
        let mut defaults = vec![
            ("_method", method.as_str().to_string()),
            ("client", "api".to_string()),
        ];
        if let Some(api_key) = &self.config.api_key {
            defaults.push(("api_key", api_key.clone()));
            defaults.push(("api_version", self.config.api_version.to_string()));
            if let Some(name) = &self.config.application_name {
                defaults.push(("application_name", name.clone()));
            }
            if let Some(agent) = &self.config.user_agent {
                defaults.push(("user_agent", agent.clone()));
            }
        }
        if method != HttpMethod::Get {
            if let Some(token) = &self.config.authenticity_token {
                defaults.push(("_authenticity_token", token.clone()));
            }
        }
        if let Some(days) = self.config.audit_lifetime_days {
            defaults.push(("_audit_lifetime_days", days.to_string()));
        }
        for (key, value) in defaults {
            params.entry(key.to_string()).or_insert(value);
        }
    }

    fn frame(
        &self,
        method: HttpMethod,
        endpoint: &str,
        mut params: BTreeMap<String, String>,
        fields: Vec<WireField>,
    ) -> HttpRequest {
        self.common_params(method, &mut params);

        let url = self.url(endpoint);
        let mut headers = Vec::new();
        if let Some(agent) = &self.config.user_agent {
            headers.push(("user-agent".to_string(), agent.clone()));
        }

        let request = if fields.iter().any(|f| matches!(f, WireField::File { .. })) {
            // The transport picks the multipart boundary and content type.
            let mut parts: Vec<WireField> = params
                .into_iter()
                .map(|(name, value)| WireField::Text { name, value })
                .collect();
            parts.extend(fields);
            HttpRequest {
                method,
                path: url,
                headers,
                body: None,
                parts,
            }
        } else {
            let mut form = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(&params)
                .finish();
            for field in &fields {
                let Some(pair) = field.to_pair() else { continue };
                form.push('&');
                if method == HttpMethod::Get {
                    // Brackets are not allowed unescaped in a URL query.
                    form.push_str(&pair.replace('[', "%5B").replace(']', "%5D"));
                } else {
                    form.push_str(&pair);
                }
            }
            if method == HttpMethod::Get {
                HttpRequest {
                    method,
                    path: format!("{url}?{form}"),
                    headers,
                    body: None,
                    parts: Vec::new(),
                }
            } else {
                headers.push(("content-type".to_string(), FORM_CONTENT_TYPE.to_string()));
                HttpRequest {
                    method,
                    path: url,
                    headers,
                    body: Some(form),
                    parts: Vec::new(),
                }
            }
        };
        tracing::trace!(
            method = method.as_str(),
            path = %request.path,
            body = %truncate_for_log(request.body.as_deref().unwrap_or_default(), self.config.max_log_size),
            parts = request.parts.len(),
            "framed request"
        );
        request
    }

    fn url(&self, endpoint: &str) -> String {
        let endpoint = endpoint.trim_start_matches('/');
        let suffix = if endpoint.ends_with(".api") { "" } else { ".api" };
        format!("{}/{endpoint}{suffix}", self.config.service)
    }
}
