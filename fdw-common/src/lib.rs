//! # FDW Common Library
//!
//! Shared code for the flight data warehouse crates including:
//! - Database initialization and warehouse schema
//! - Persisted row models (pipeline runs, rejected records)
//! - Configuration loading
//! - Timestamp helpers

pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use error::{Error, Result};
