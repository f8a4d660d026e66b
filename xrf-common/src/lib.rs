//! # XRF Common Library
//!
//! Shared code for the XRF inspection tooling:
//! - Error types
//! - Configuration loading and root folder resolution
//! - Ingest event types and the event bus

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
