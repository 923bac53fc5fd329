//! Project loader: turns one compressed entry into decoded, flattened text.
//!
//! An entry is either a (gzipped) tar holding a multi-file project, or a
//! gzipped single document. Which one it is only becomes clear by trying:
//! [`open_container`] unpacks archives into a private scratch directory and
//! otherwise hands back the decompressed stream.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use flate2::read::MultiGzDecoder;
use tempfile::TempDir;
use tracing::{debug, error};

use crate::contract::{ContentFilter, Flatten, LoadedProject, TextEncoding};
use crate::error::LoadError;
use crate::shard::GZIP_MAGIC;
use crate::walk;

const SOURCE_SUFFIX: &str = ".tex";
const ROOT_MARKERS: [&[u8]; 2] = [b"\\documentclass", b"\\documentstyle"];

/// What an entry turned out to be.
#[derive(Debug, PartialEq, Eq)]
pub enum Container {
    /// A tar archive, already unpacked into the scratch directory.
    Archive,
    /// A single decompressed document.
    Stream(Vec<u8>),
}

/// Loads entries with a fixed flattener, filter and encoding list.
#[derive(Clone)]
pub struct ProjectLoader {
    flattener: Arc<dyn Flatten>,
    filter: ContentFilter,
    encodings: Vec<TextEncoding>,
    scratch_root: Option<PathBuf>,
}

impl ProjectLoader {
    pub fn new(flattener: Arc<dyn Flatten>) -> Self {
        Self {
            flattener,
            filter: ContentFilter::accept_all(),
            encodings: vec![TextEncoding::Utf8, TextEncoding::Latin1],
            scratch_root: None,
        }
    }

    pub fn with_filter(mut self, filter: ContentFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_encodings(mut self, encodings: Vec<TextEncoding>) -> Self {
        self.encodings = encodings;
        self
    }

    /// Create per-entry scratch directories under `root` instead of the
    /// system temp dir.
    pub fn with_scratch_root(mut self, root: Option<PathBuf>) -> Self {
        self.scratch_root = root;
        self
    }

    /// Load one entry. Every failure is logged with its category before it is
    /// returned; only [`LoadError::is_fatal`] errors should stop a run.
    pub fn load(&self, entry: &Path) -> Result<LoadedProject, LoadError> {
        let result = self.load_inner(entry);
        if let Err(e) = &result {
            match e {
                LoadError::FilterMiss => {
                    debug!(entry = %entry.display(), "No file matched the content filter, skipping");
                }
                other => {
                    error!(entry = %entry.display(), category = other.category(), error = %other, "Failed to load entry");
                }
            }
        }
        result
    }

    fn load_inner(&self, entry: &Path) -> Result<LoadedProject, LoadError> {
        let timestamp = modified_secs(entry);
        // Dropped on every return path below, taking its contents with it.
        let scratch = self.scratch_dir()?;

        let flattened = match open_container(entry, scratch.path())? {
            Container::Archive => {
                if !any_source_matches(scratch.path(), &self.filter)? {
                    return Err(LoadError::FilterMiss);
                }
                let root = find_root_file(scratch.path())?.ok_or(LoadError::RootNotFound)?;
                debug!(entry = %entry.display(), root = %root.display(), "Flattening project root");
                self.flattener.flatten(&root)?
            }
            Container::Stream(raw) => {
                if !self.filter.matches(&raw) {
                    return Err(LoadError::FilterMiss);
                }
                self.flattener.flatten_buffer(&raw, scratch.path())?
            }
        };

        let text = decode_text(&flattened, &self.encodings)?;
        Ok(LoadedProject { text, timestamp })
    }

    fn scratch_dir(&self) -> Result<TempDir, LoadError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("entry-");
        match &self.scratch_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|source| LoadError::Workspace {
            dir: self
                .scratch_root
                .clone()
                .unwrap_or_else(std::env::temp_dir),
            source,
        })
    }
}

/// Interpret `entry` as an archive (unpacked into `scratch`) or, failing
/// that, as a single gzip stream.
pub fn open_container(entry: &Path, scratch: &Path) -> Result<Container, LoadError> {
    let raw = fs::read(entry)?;

    let decompressed = if raw.starts_with(&GZIP_MAGIC) {
        let mut out = Vec::new();
        MultiGzDecoder::new(raw.as_slice())
            .read_to_end(&mut out)
            .map_err(|_| LoadError::UnrecognizedContainer)?;
        Some(out)
    } else {
        None
    };

    let payload = decompressed.as_deref().unwrap_or(raw.as_slice());
    if is_tar(payload) {
        // A readable first header followed by a broken body is still not a
        // usable container.
        tar::Archive::new(payload).unpack(scratch).map_err(|e| {
            debug!(entry = %entry.display(), error = %e, "Nested archive failed to unpack");
            LoadError::UnrecognizedContainer
        })?;
        return Ok(Container::Archive);
    }

    match decompressed {
        Some(document) => Ok(Container::Stream(document)),
        None => Err(LoadError::UnrecognizedContainer),
    }
}

/// A buffer counts as a tar archive if its first header parses.
fn is_tar(bytes: &[u8]) -> bool {
    let mut archive = tar::Archive::new(bytes);
    let first_ok = match archive.entries() {
        Ok(mut entries) => matches!(entries.next(), Some(Ok(_))),
        Err(_) => false,
    };
    first_ok
}

/// True if any `.tex` file under `dir` satisfies `filter`. Stops at the first
/// match.
pub fn any_source_matches(dir: &Path, filter: &ContentFilter) -> std::io::Result<bool> {
    for path in walk::files_with_suffix(dir, SOURCE_SUFFIX)? {
        if filter.matches(&fs::read(&path)?) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// The first `.tex` file declaring a document class/style, else the first
/// `.tex` file at all. `None` when there are no `.tex` files.
pub fn find_root_file(dir: &Path) -> std::io::Result<Option<PathBuf>> {
    let mut first = None;
    for path in walk::files_with_suffix(dir, SOURCE_SUFFIX)? {
        let content = fs::read(&path)?;
        if ROOT_MARKERS.iter().any(|m| contains(&content, m)) {
            return Ok(Some(path));
        }
        if first.is_none() {
            first = Some(path);
        }
    }
    Ok(first)
}

/// Decode with the first encoding that accepts the bytes.
pub fn decode_text(bytes: &[u8], encodings: &[TextEncoding]) -> Result<String, LoadError> {
    encodings
        .iter()
        .find_map(|encoding| encoding.decode(bytes))
        .ok_or_else(|| LoadError::Decode {
            tried: encodings.iter().map(|e| e.label().to_string()).collect(),
        })
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}

fn modified_secs(path: &Path) -> Option<f64> {
    fs::symlink_metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
}
