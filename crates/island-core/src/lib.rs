//! Domain model shared by the island crates: chunks, thresholds, score results,
//! the error taxonomy, the embedding capability trait, corpus chunking and
//! configuration.

pub mod chunker;
pub mod config;
pub mod corpus;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{BuildFailure, Error, Operation, Result};
pub use traits::Embedder;
