//! Client configuration.
//!
//! # Design
//! Everything the request builder needs to know about the surrounding session
//! is passed in as a `ClientConfig` value; nothing is read from globals. The
//! transport/session layer owns login and fills in `authenticity_token` or
//! `api_key` before handing the config to `ApiClient`.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::encoder::Encoding;
use crate::error::ApiError;

pub const DEFAULT_SERVICE: &str = "http://localhost:3000";
pub const DEFAULT_API_VERSION: u32 = 1;
/// Upper bound on a single rendered log payload.
pub const DEFAULT_MAX_LOG_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the service, without a trailing slash.
    pub service: String,
    pub api_version: u32,
    pub application_name: Option<String>,
    pub user_agent: Option<String>,
    /// When set, every request authenticates with the key instead of a session.
    pub api_key: Option<String>,
    /// Session token required by the service for modifying requests.
    pub authenticity_token: Option<String>,
    pub audit_lifetime_days: Option<u32>,
    pub encoding: Encoding,
    pub max_log_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            service: DEFAULT_SERVICE.to_string(),
            api_version: DEFAULT_API_VERSION,
            application_name: None,
            user_agent: None,
            api_key: None,
            authenticity_token: None,
            audit_lifetime_days: None,
            encoding: Encoding::default(),
            max_log_size: DEFAULT_MAX_LOG_SIZE,
        }
    }
}

impl ClientConfig {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ApiError> {
        parse(contents).map_err(|e| ApiError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, ApiError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| ApiError::Config(format!("failed to read {}: {e}", path.display())))?;
        parse(&contents).map_err(|e| ApiError::Config(format!("failed to parse {}: {e}", path.display())))
    }
}

fn parse(contents: &str) -> Result<ClientConfig, toml::de::Error> {
    let mut config: ClientConfig = toml::from_str(contents)?;
    config.service = config.service.trim_end_matches('/').to_string();
    Ok(config)
}
