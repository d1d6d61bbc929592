use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum BridgeError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("directory query failed: {0}")]
    Directory(String),
    #[error("identity lookup failed: {0}")]
    Identity(String),
}

impl BridgeError {
    pub fn into_lens_error(self) -> crmlens_core_types::LensError {
        crmlens_core_types::LensError::new(self.to_string())
    }
}
