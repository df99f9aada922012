//! Vitalink Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging, and error handling for the Vitalink workspace.
//!
//! # Overview
//!
//! - **Error Handling**: Workspace-wide error type and result alias
//! - **Logging**: Console/file/JSON tracing setup driven by `LOG_*` variables
//! - **Types**: Report classification and processing status shared by every crate
//!
//! # Example
//!
//! ```no_run
//! use vitalink_common::logging::{init_logging, LogConfig};
//! use vitalink_common::types::ReportType;
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!     let report_type: ReportType = "genetic".parse()?;
//!     tracing::info!(%report_type, "Ready");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{Result, VitalinkError};
pub use types::{ProcessingStatus, ReportType};
