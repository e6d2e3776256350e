//! modcat-indexer library interface
//!
//! Exposes the services for the binary and for integration testing

pub mod config;
pub mod error;
pub mod services;

pub use crate::error::{BackendError, RegistryError, RunError};
