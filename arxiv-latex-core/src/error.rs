//! Error types for every stage of the cleaning pipeline.
//!
//! Per-entry failures ([`LoadError`], [`RecordError`]) are values that the
//! driver counts and logs; only [`CleanError`] ends a run.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failure of the external flattening tool.
#[derive(Debug, Error)]
pub enum FlattenError {
    /// The tool could not be started at all (missing binary, permissions).
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The tool ran but exited non-zero.
    #[error("{program} exited with {status}")]
    Exit { program: String, status: String },

    /// The tool did not finish in time and was killed.
    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    /// Scratch input/output files could not be written or read.
    #[error("flattener scratch file error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a single project entry was skipped.
#[derive(Debug, Error)]
pub enum LoadError {
    /// None of the document-source files satisfied the content filter.
    #[error("no source file matched the content filter")]
    FilterMiss,

    /// The nested archive holds no `.tex` file to flatten.
    #[error("no root .tex file found")]
    RootNotFound,

    /// The flattening subprocess failed.
    #[error("flattening failed: {0}")]
    Tool(#[from] FlattenError),

    /// The entry is neither a tar archive nor a gzip stream, or its nested
    /// archive is truncated or corrupt.
    #[error("unrecognized container format")]
    UnrecognizedContainer,

    /// No configured encoding could decode the flattened bytes.
    #[error("flattened text could not be decoded with any of {tried:?}")]
    Decode { tried: Vec<String> },

    /// Reading or unpacking the entry failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A private scratch directory could not be created. No forward progress
    /// is possible, so this ends the run.
    #[error("cannot create scratch directory in {dir}: {source}")]
    Workspace {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LoadError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, LoadError::Workspace { .. })
    }

    /// Short category label used in logs.
    pub fn category(&self) -> &'static str {
        match self {
            LoadError::FilterMiss => "filter_miss",
            LoadError::RootNotFound => "root_not_found",
            LoadError::Tool(_) => "tool_error",
            LoadError::UnrecognizedContainer => "unrecognized_container",
            LoadError::Decode { .. } => "decode_error",
            LoadError::Io(_) => "io_error",
            LoadError::Workspace { .. } => "workspace_error",
        }
    }
}

/// A raw identifier that does not follow either arXiv naming scheme.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid arxiv id: {0}")]
pub struct IdFormatError(pub String);

/// The record builder could not produce a record.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("macro expansion failed: {0}")]
    Macro(#[from] regex::Error),
}

/// Failure while opening a shard.
#[derive(Debug, Error)]
pub enum ShardError {
    /// The scratch directory for the shard could not be created.
    #[error("cannot create scratch directory in {dir}: {source}")]
    Workspace {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The shard itself is unreadable or not a tar archive.
    #[error("cannot unpack shard {shard}: {source}")]
    Unpack {
        shard: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure in the acquisition layer.
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("shard {0} not found in catalog")]
    NotFound(String),

    #[error("i/o error while acquiring shards: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Run-level failure. Everything else is contained per entry.
#[derive(Debug, Error)]
pub enum CleanError {
    #[error(transparent)]
    Workspace(#[from] ShardError),

    #[error("fatal entry error for {id}: {source}")]
    Entry {
        id: String,
        #[source]
        source: LoadError,
    },

    #[error("output error: {0}")]
    Output(#[from] std::io::Error),

    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
