//! Toolkit configuration.
//!
//! Defaults, then an optional YAML file, then `CRMLENS_*` environment
//! overrides, in that order.

use std::path::{Path, PathBuf};

use request_interceptor::InterceptorConfig;
use serde::{Deserialize, Serialize};

use crate::errors::CrmLensResult;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolkitConfig {
    /// URL path segment identifying calls to the host API.
    pub api_path_segment: String,
    /// Header carrying the impersonated identity's id.
    pub header_name: String,
    /// Root directory for persisted session and history records.
    pub storage_dir: PathBuf,
    /// Default tracing filter when RUST_LOG is unset.
    pub log_filter: String,
}

impl Default for ToolkitConfig {
    fn default() -> Self {
        Self {
            api_path_segment: "/api/data/".to_string(),
            header_name: "MSCRMCallerID".to_string(),
            storage_dir: PathBuf::from(".crmlens"),
            log_filter: "info".to_string(),
        }
    }
}

impl ToolkitConfig {
    /// Loads configuration from an optional YAML file plus environment
    /// overrides.
    pub fn load(file: Option<&Path>) -> CrmLensResult<Self> {
        let mut config = match file {
            Some(path) if path.exists() => {
                let raw = std::fs::read_to_string(path)?;
                serde_yaml::from_str(&raw)?
            }
            _ => Self::default(),
        };

        if let Ok(segment) = std::env::var("CRMLENS_API_PATH_SEGMENT") {
            if !segment.trim().is_empty() {
                config.api_path_segment = segment;
            }
        }
        if let Ok(header) = std::env::var("CRMLENS_HEADER_NAME") {
            if !header.trim().is_empty() {
                config.header_name = header;
            }
        }
        if let Ok(dir) = std::env::var("CRMLENS_STORAGE_DIR") {
            if !dir.trim().is_empty() {
                config.storage_dir = PathBuf::from(dir);
            }
        }
        if let Ok(filter) = std::env::var("CRMLENS_LOG") {
            if !filter.trim().is_empty() {
                config.log_filter = filter;
            }
        }

        Ok(config)
    }

    pub fn interceptor(&self) -> InterceptorConfig {
        InterceptorConfig {
            api_path_segment: self.api_path_segment.clone(),
            header_name: self.header_name.clone(),
        }
    }
}
