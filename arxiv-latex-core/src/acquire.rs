//! Acquisition: decide which shards to process and materialise them.
//!
//! Shard identifiers follow the bulk-archive naming `arXiv_src_YYMM_NNN`.
//! [`plan_shards`] filters a catalog's items (source shards only, not
//! excluded, not older than a cutoff, not already processed) and returns
//! them newest first, either fetched or as deferred fetches.
//!
//! "Already processed" is decided by looking at the output directory: an item
//! counts as done when an output file whose name starts with the item exists.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use crate::contract::ShardCatalog;
use crate::error::AcquireError;

const SOURCE_MARKER: &str = "_src_";

/// Filters applied when planning shards.
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    /// Reject shards whose month starts before this date.
    pub cutoff: Option<NaiveDate>,
    /// Skip items containing any of these substrings.
    pub exclude: Vec<String>,
    /// Directory holding finished outputs, used to skip processed shards.
    pub processed_dir: Option<PathBuf>,
    /// Return deferred fetches instead of fetching up front.
    pub lazy: bool,
}

/// A shard that is either already on disk or fetched on first use.
pub enum ShardInput {
    Ready { item: String, path: PathBuf },
    Deferred {
        item: String,
        fetch: BoxFuture<'static, Result<PathBuf, AcquireError>>,
    },
}

impl ShardInput {
    pub fn item(&self) -> &str {
        match self {
            ShardInput::Ready { item, .. } | ShardInput::Deferred { item, .. } => item,
        }
    }

    /// The local path, fetching first if needed.
    pub async fn resolve(self) -> Result<PathBuf, AcquireError> {
        match self {
            ShardInput::Ready { path, .. } => Ok(path),
            ShardInput::Deferred { item, fetch } => {
                info!(item = %item, "Fetching deferred shard");
                fetch.await
            }
        }
    }
}

impl fmt::Debug for ShardInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShardInput::Ready { item, path } => f
                .debug_struct("Ready")
                .field("item", item)
                .field("path", path)
                .finish(),
            ShardInput::Deferred { item, .. } => {
                f.debug_struct("Deferred").field("item", item).finish()
            }
        }
    }
}

/// Month a shard covers, parsed from `arXiv_src_YYMM_NNN`.
///
/// Two-digit years follow the POSIX `%y` pivot: 69-99 are 19xx, 00-68 are 20xx.
pub fn shard_date(item: &str) -> Option<NaiveDate> {
    let rest = item.split(SOURCE_MARKER).nth(1)?;
    let yymm = rest.split('_').next()?;
    if yymm.len() != 4 || !yymm.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let yy: i32 = yymm[..2].parse().ok()?;
    let mm: u32 = yymm[2..].parse().ok()?;
    let year = if yy >= 69 { 1900 + yy } else { 2000 + yy };
    NaiveDate::from_ymd_opt(year, mm, 1)
}

fn already_processed(item: &str, outputs: &HashSet<String>) -> bool {
    outputs.iter().any(|name| name.starts_with(item))
}

fn list_outputs(dir: &Path) -> std::io::Result<HashSet<String>> {
    if !dir.exists() {
        return Ok(HashSet::new());
    }
    std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect()
}

/// Select and order the catalog's shards.
pub async fn plan_shards<C>(
    catalog: Arc<C>,
    options: &PlanOptions,
) -> Result<Vec<ShardInput>, AcquireError>
where
    C: ShardCatalog + ?Sized + 'static,
{
    let outputs = match &options.processed_dir {
        Some(dir) => list_outputs(dir)?,
        None => HashSet::new(),
    };

    let mut selected: Vec<(String, NaiveDate)> = Vec::new();
    for item in catalog.items().await? {
        if !item.contains(SOURCE_MARKER) {
            debug!(item = %item, "Not a source shard, skipping");
            continue;
        }
        if options.exclude.iter().any(|ex| item.contains(ex.as_str())) {
            debug!(item = %item, "Excluded shard, skipping");
            continue;
        }
        let Some(date) = shard_date(&item) else {
            warn!(item = %item, "Cannot parse shard date, skipping");
            continue;
        };
        if options.cutoff.is_some_and(|cutoff| date < cutoff) {
            debug!(item = %item, %date, "Shard older than cutoff, skipping");
            continue;
        }
        if already_processed(&item, &outputs) {
            info!(item = %item, "Shard already processed, skipping");
            continue;
        }
        selected.push((item, date));
    }

    // Newest first; ties keep a stable name order.
    selected.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
    info!(count = selected.len(), lazy = options.lazy, "Planned shards");

    let mut inputs = Vec::with_capacity(selected.len());
    for (item, _) in selected {
        if options.lazy {
            let catalog = Arc::clone(&catalog);
            let name = item.clone();
            let fetch: BoxFuture<'static, _> =
                Box::pin(async move { catalog.fetch(&name).await });
            inputs.push(ShardInput::Deferred { item, fetch });
        } else {
            let path = catalog.fetch(&item).await?;
            inputs.push(ShardInput::Ready { item, path });
        }
    }
    Ok(inputs)
}

/// Shards stored in a local directory, either as `<item>.tar` files or as
/// `<item>/` directories of tar files.
#[derive(Debug, Clone)]
pub struct LocalCatalog {
    root: PathBuf,
}

impl LocalCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ShardCatalog for LocalCatalog {
    async fn items(&self) -> Result<Vec<String>, AcquireError> {
        let mut items = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            if path.is_dir() {
                items.push(name);
            } else if let Some(stem) = name.strip_suffix(".tar") {
                items.push(stem.to_string());
            }
        }
        items.sort();
        Ok(items)
    }

    async fn fetch(&self, item: &str) -> Result<PathBuf, AcquireError> {
        let dir = self.root.join(item);
        if dir.is_dir() {
            return Ok(dir);
        }
        let tar = self.root.join(format!("{item}.tar"));
        if tar.is_file() {
            return Ok(tar);
        }
        Err(AcquireError::NotFound(item.to_string()))
    }
}

/// Delete a processed shard, but only if it lives under `archive_root`.
pub fn release(path: &Path, archive_root: &Path) -> std::io::Result<bool> {
    if !path.starts_with(archive_root) || path == archive_root {
        debug!(path = %path.display(), "Shard outside archive root, keeping it");
        return Ok(false);
    }
    if path.is_dir() {
        std::fs::remove_dir_all(path)?;
    } else {
        std::fs::remove_file(path)?;
    }
    info!(path = %path.display(), "Released processed shard");
    Ok(true)
}
