//! Process Cleanup common types, IDs, and errors.
//!
//! This crate provides foundational types shared across the pc-* crates:
//! - Process and pass identity types
//! - The process category taxonomy used by pattern tables
//! - Common error types with stable codes
//! - Output format specifications

pub mod categories;
pub mod error;
pub mod id;
pub mod output;

pub use categories::ProcessCategory;
pub use error::{Error, ErrorCategory, Result, StructuredError};
pub use id::{PassId, ProcessId};
pub use output::OutputFormat;

/// Schema version for reports and serialized snapshots.
pub const SCHEMA_VERSION: &str = "1.0.0";
