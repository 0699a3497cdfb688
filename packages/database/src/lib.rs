#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Persistence for the macro database.
//!
//! A single `DuckDB` file holds indicator metadata, observations, forecasts,
//! and the append-only fetch log. [`store::Store`] is the only type that
//! touches it; writes require `&mut Store`, so one handle is always the
//! single writer.

pub mod paths;
pub mod store;

pub use store::Store;

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// `DuckDB` query or connection error.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// Filesystem error (creating the data directory, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored value could not be converted back into its Rust type.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}
