//! Library entrypoint for the CloudMusic document-store schema.
//!
//! The binary in `main.rs` only wires settings, logging and the MongoDB
//! store together; everything it runs lives here so integration tests under
//! `tests/` can drive the same bootstrap against the in-memory store.

pub mod config;
pub mod error;
pub mod models;

pub mod catalog;
pub mod validation;

pub mod services;
pub mod store;

pub use error::{BootstrapError, WriteError};
