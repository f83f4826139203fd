//! NBA stats ingestion: fetch provider payloads, normalize their fields, resolve the entities
//! they mention and upsert them as typed statistical records under stable natural keys.

pub mod classify;
pub mod cli;
pub mod database_ops;
pub mod error;
pub mod fetch;
pub mod normalization;
pub mod orchestrator;
pub mod payload;
pub mod pipelines;
pub mod registry;
pub mod util;

pub use error::{EtlError, Result};
