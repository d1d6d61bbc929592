//! Configuration for the request interceptor.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InterceptorConfig {
    /// URL path segment identifying calls to the host API.
    pub api_path_segment: String,
    /// Header carrying the impersonated identity's id.
    pub header_name: String,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            api_path_segment: "/api/data/".to_string(),
            header_name: "MSCRMCallerID".to_string(),
        }
    }
}
