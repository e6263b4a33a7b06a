//! # Error Types
//!
//! Defines error types used across crates.

use thiserror::Error;

/// Errors raised by durable key-value storage backends.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),
}
