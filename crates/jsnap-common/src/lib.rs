//! Shared foundation for the jsnap diagnostic snapshot agent.
//!
//! This crate provides the types every other jsnap crate depends on:
//! - The unified error type and `Result` alias
//! - The fixed data-type tag vocabulary used by the upload protocol
//! - The artifact file-naming convention

pub mod error;
pub mod tags;

pub use error::{Error, ErrorCategory, Result};
pub use tags::{unique_artifact_name, DataTag};
