//! # contract: seams and data shared between pipeline stages
//!
//! The traits here are the narrow interfaces the pipeline depends on:
//! - [`Flatten`]: the external LaTeX flattening tool, treated as a black box.
//! - [`ShardCatalog`]: the acquisition layer that lists and materialises shards.
//!
//! Both are annotated for `mockall` so tests can substitute deterministic
//! implementations and assert on call counts without spawning processes or
//! touching remote storage.
//!
//! The plain data types ([`EntryTask`], [`LoadedProject`], [`LoadedEntry`])
//! are what flows between the shard reader, the project loader and the
//! coordinator.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::error::{AcquireError, FlattenError};
use crate::shard::ShardWorkspace;

/// Expands `\input`/`\include` and strips comments from a LaTeX root file.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait Flatten: Send + Sync {
    /// Flatten the project rooted at `root`, returning the tool's output bytes
    /// with trailing whitespace removed.
    fn flatten(&self, root: &Path) -> Result<Vec<u8>, FlattenError>;

    /// Flatten an in-memory single-file document.
    ///
    /// The buffer is written to a scratch file inside `scratch_dir`, which is
    /// removed again before returning.
    fn flatten_buffer(&self, raw: &[u8], scratch_dir: &Path) -> Result<Vec<u8>, FlattenError> {
        let mut tmp = tempfile::Builder::new()
            .prefix("single-")
            .suffix(".tex")
            .tempfile_in(scratch_dir)?;
        tmp.write_all(raw)?;
        tmp.flush()?;
        self.flatten(tmp.path())
    }
}

/// Lists and materialises archive shards.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ShardCatalog: Send + Sync {
    /// All shard identifiers known to this catalog.
    async fn items(&self) -> Result<Vec<String>, AcquireError>;

    /// Make the shard available locally and return its path.
    async fn fetch(&self, item: &str) -> Result<PathBuf, AcquireError>;
}

/// Predicate over the raw bytes of a candidate `.tex` file.
///
/// A project is only flattened if at least one of its files satisfies it.
#[derive(Clone)]
pub struct ContentFilter(Arc<dyn Fn(&[u8]) -> bool + Send + Sync>);

impl ContentFilter {
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&[u8]) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(predicate))
    }

    /// Accepts everything.
    pub fn accept_all() -> Self {
        Self::new(|_| true)
    }

    /// Accepts files whose bytes match `pattern`.
    pub fn from_regex(pattern: regex::bytes::Regex) -> Self {
        Self::new(move |bytes| pattern.is_match(bytes))
    }

    pub fn matches(&self, bytes: &[u8]) -> bool {
        (self.0)(bytes)
    }
}

impl Default for ContentFilter {
    fn default() -> Self {
        Self::accept_all()
    }
}

impl fmt::Debug for ContentFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ContentFilter(..)")
    }
}

/// Character encodings tried, in order, on flattened output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextEncoding {
    #[serde(rename = "utf-8", alias = "utf8")]
    Utf8,
    #[serde(rename = "latin1", alias = "iso-8859-1")]
    Latin1,
}

impl TextEncoding {
    pub fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            TextEncoding::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_owned),
            TextEncoding::Latin1 => Some(bytes.iter().map(|&b| char::from(b)).collect()),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Latin1 => "latin1",
        }
    }
}

/// One compressed project entry cut from an unpacked shard.
///
/// The entry file lives inside the shard's scratch directory; holding the
/// workspace handle keeps that directory alive until the task is dropped.
#[derive(Debug, Clone)]
pub struct EntryTask {
    pub path: PathBuf,
    /// Parent directory name inside the shard, e.g. `0704`.
    pub yymm: String,
    /// File stem, e.g. `0704.0001` or `hep-th9901001`.
    pub raw_id: String,
    pub workspace: Arc<ShardWorkspace>,
}

/// A decoded, flattened project.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedProject {
    pub text: String,
    /// Entry modification time, seconds since the Unix epoch.
    pub timestamp: Option<f64>,
}

/// What the sequential driver yields per successfully loaded entry.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedEntry {
    pub text: String,
    pub yymm: String,
    pub raw_id: String,
    pub timestamp: Option<f64>,
}
