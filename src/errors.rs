//! Toolkit-level error type wrapping the member crates' failures.

use crmlens_core_types::LensError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CrmLensError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error(transparent)]
    Panel(#[from] selection_panel::PanelError),
    #[error("engine failure: {0}")]
    Engine(LensError),
}

impl From<LensError> for CrmLensError {
    fn from(err: LensError) -> Self {
        Self::Engine(err)
    }
}

/// Result type using CrmLensError
pub type CrmLensResult<T> = Result<T, CrmLensError>;
