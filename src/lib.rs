//! CrmLens library
//!
//! Exposes the toolkit configuration and demo wiring for integration testing

pub mod config;
pub mod demo;
pub mod errors;

// Re-export commonly used types for external use
pub use config::ToolkitConfig;
pub use crmlens_core_types as core_types;
pub use errors::{CrmLensError, CrmLensResult};
pub use impersonation_engine::{ImpersonationEngine, ImpersonationHandle, ImpersonationSession};
pub use selection_panel::SelectionPanel;
