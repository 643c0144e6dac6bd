//! # Connections Module
//!
//! This module handles the persistent connection to the results store.
//! Everything above it talks to the store through the [`QueryExecutor`]
//! seam, so channel servers and rollups can be exercised against in-memory
//! executors in tests.

/// The executor traits, parameter values and row sets shared by all stores.
pub mod executor;

/// Module for PostgreSQL database connection pooling and management.
pub mod db_postgres;

pub use db_postgres::{mask_url_password, PgExecutor};
pub use executor::{column_i64, QueryExecutor, Row, RowSet, SqlValue, StoreConnection, StoreError};
