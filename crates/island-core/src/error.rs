//! Error taxonomy shared by every island crate.
//!
//! World-scoped variants always carry the world id and the operation that
//! failed so callers can report or retry without string parsing.

use std::fmt;
use thiserror::Error;

/// The engine operation during which an error surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Build,
    Score,
    Status,
    /// Reading a published island back from durable storage.
    Load,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Build => "build",
            Operation::Score => "score",
            Operation::Status => "status",
            Operation::Load => "load",
        };
        f.write_str(name)
    }
}

/// Why a build attempt was abandoned. The previous artifact stays servable.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildFailure {
    #[error("corpus produced no chunks")]
    EmptyCorpus,

    #[error("corpus has {chunks} chunk(s); at least 2 are needed to calibrate")]
    TooFewChunks { chunks: usize },

    #[error("intra-corpus distances have no spread; thresholds cannot be ordered")]
    DegenerateDistances,

    #[error("invalid build parameters: {0}")]
    InvalidParams(String),

    #[error("embedding capability failed: {0}")]
    Embedding(String),

    #[error("another build for this world is in progress")]
    AlreadyBuilding,

    #[error("build was cancelled")]
    Cancelled,

    #[error("artifact could not be persisted: {0}")]
    Persist(String),

    #[error("internal build error: {0}")]
    Internal(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("build failed for world '{world_id}': {failure}")]
    Build { world_id: String, failure: BuildFailure },

    #[error("world '{world_id}' not found ({op})")]
    NotFound { world_id: String, op: Operation },

    #[error("configuration mismatch for world '{world_id}' ({op}): {reason}")]
    Config { world_id: String, op: Operation, reason: String },

    #[error("embedding failed for world '{world_id}' ({op}): {reason}")]
    Embedding { world_id: String, op: Operation, reason: String },

    #[error("storage failure for world '{world_id}' ({op}): {reason}")]
    Storage { world_id: String, op: Operation, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub fn build(world_id: impl Into<String>, failure: BuildFailure) -> Self {
        Error::Build { world_id: world_id.into(), failure }
    }

    pub fn not_found(world_id: impl Into<String>, op: Operation) -> Self {
        Error::NotFound { world_id: world_id.into(), op }
    }

    pub fn storage(world_id: impl Into<String>, op: Operation, reason: impl fmt::Display) -> Self {
        Error::Storage { world_id: world_id.into(), op, reason: reason.to_string() }
    }

    pub fn world_id(&self) -> Option<&str> {
        match self {
            Error::Build { world_id, .. }
            | Error::NotFound { world_id, .. }
            | Error::Config { world_id, .. }
            | Error::Embedding { world_id, .. }
            | Error::Storage { world_id, .. } => Some(world_id),
            Error::InvalidConfig(_) => None,
        }
    }

    pub fn operation(&self) -> Option<Operation> {
        match self {
            Error::Build { .. } => Some(Operation::Build),
            Error::NotFound { op, .. }
            | Error::Config { op, .. }
            | Error::Embedding { op, .. }
            | Error::Storage { op, .. } => Some(*op),
            Error::InvalidConfig(_) => None,
        }
    }

    /// Score-time embedding failures are the only errors worth retrying.
    /// The engine itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Embedding { op: Operation::Score, .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
