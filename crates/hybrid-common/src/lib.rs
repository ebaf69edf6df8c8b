//! Common utilities for hybrid
//!
//! This crate provides the error type, model-name normalization and the
//! logging bootstrap shared by the hybrid crates.

pub mod error;
pub mod logging;
pub mod naming;

pub use error::{HybridError, Result};
pub use logging::{init_logging, DB_LOG_TARGET};
pub use naming::normalize_model_name;
