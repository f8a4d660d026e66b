//! xrf-ingest library interface
//!
//! Normalizes freeform component/substrate names from XRF lead inspection
//! readings and classifies the readings per component/substrate group.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{IngestError, IngestResult};
