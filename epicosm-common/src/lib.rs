//! Common types and utilities shared across Epicosm crates.
//!
//! This crate holds the shared error type and the observability helpers used by
//! every binary and integration test in the workspace. It stays small so the
//! harvesting crates can depend on it without pulling in the HTTP or storage stacks.
//!
//! # Overview
//!
//! - [`observability`]: Centralised tracing/logging initialisation
//! - [`EpicosmError`] and [`Result`]: Shared error handling for configuration
//!   and seed-list problems
//!
//! # Examples
//!
//! ```rust
//! use epicosm_common::EpicosmError;
//!
//! let err = EpicosmError::Seeds("entry 3 has no id".into());
//! assert_eq!(err.to_string(), "Seed list error: entry 3 has no id");
//! ```

pub mod observability;

/// Error types shared across the Epicosm crates.
#[derive(thiserror::Error, Debug)]
pub enum EpicosmError {
    /// Configuration was incomplete or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The seed-user list could not be read or was malformed.
    #[error("Seed list error: {0}")]
    Seeds(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenient alias for results that use [`EpicosmError`].
pub type Result<T> = std::result::Result<T, EpicosmError>;
