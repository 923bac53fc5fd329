//! Pipeline driver: walks shards and their entries, loads each entry and
//! keeps the processed/failed counters.
//!
//! Two views over the same traversal:
//! - [`Pipeline::entries`] yields raw [`EntryTask`]s for the worker pool.
//! - [`Pipeline::iter`] loads entries in-process and yields [`LoadedEntry`]s,
//!   halting once the `max_files` cap is reached.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::contract::{EntryTask, LoadedEntry};
use crate::error::{CleanError, ShardError};
use crate::loader::ProjectLoader;
use crate::shard::ShardWorkspace;

const RELEASE_POLL: Duration = Duration::from_millis(20);

/// Best-effort run counters. Shared with worker-pool consumers.
#[derive(Debug, Default)]
pub struct PipelineStats {
    processed: AtomicUsize,
    failed: AtomicUsize,
}

impl PipelineStats {
    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    pub(crate) fn record_processed(&self) -> usize {
        self.processed.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn record_failed(&self) -> usize {
        self.failed.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    shards: Vec<PathBuf>,
    work_dir: Option<PathBuf>,
    max_files: Option<usize>,
    stats: Arc<PipelineStats>,
}

impl Pipeline {
    /// Drive the given shard files, in order. See [`expand_shard_paths`] for
    /// inputs that may be directories.
    pub fn new(shards: Vec<PathBuf>) -> Self {
        Self {
            shards,
            work_dir: None,
            max_files: None,
            stats: Arc::new(PipelineStats::default()),
        }
    }

    /// Every `*.tar` file directly inside `dir`, sorted by name.
    pub fn from_dir(dir: &Path) -> std::io::Result<Self> {
        Ok(Self::new(tar_files_in(dir)?))
    }

    pub fn with_work_dir(mut self, work_dir: Option<PathBuf>) -> Self {
        self.work_dir = work_dir;
        self
    }

    pub fn with_max_files(mut self, max_files: Option<usize>) -> Self {
        self.max_files = max_files;
        self
    }

    pub fn shards(&self) -> &[PathBuf] {
        &self.shards
    }

    pub fn max_files(&self) -> Option<usize> {
        self.max_files
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    /// Entry traversal. The next shard is only unpacked once every task of
    /// the previous one has been dropped, so holding on to tasks while
    /// pulling more blocks at a shard boundary (see
    /// [`Entries::cancel_when`]).
    pub fn entries(&self) -> Entries {
        Entries {
            shards: self.shards.clone().into_iter(),
            work_dir: self.work_dir.clone(),
            current: Vec::new().into_iter(),
            previous: Weak::new(),
            cancelled: None,
            done: false,
        }
    }

    pub fn iter<'a>(&self, loader: &'a ProjectLoader) -> Loaded<'a> {
        Loaded {
            entries: self.entries(),
            loader,
            max_files: self.max_files,
            stats: self.stats(),
            halted: false,
        }
    }
}

/// Shard-by-shard entry traversal.
///
/// Only one shard is unpacked at a time: the next one is opened once every
/// entry of the current one has been handed out and dropped. A shard that
/// cannot be unpacked is logged and skipped; failing to create scratch space
/// is fatal and ends the traversal.
pub struct Entries {
    shards: std::vec::IntoIter<PathBuf>,
    work_dir: Option<PathBuf>,
    current: std::vec::IntoIter<EntryTask>,
    previous: Weak<ShardWorkspace>,
    cancelled: Option<Box<dyn Fn() -> bool + Send>>,
    done: bool,
}

impl Entries {
    /// End the traversal instead of waiting for the previous shard's tasks
    /// once `cancelled` returns true.
    pub fn cancel_when<F>(mut self, cancelled: F) -> Self
    where
        F: Fn() -> bool + Send + 'static,
    {
        self.cancelled = Some(Box::new(cancelled));
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.as_ref().is_some_and(|cancelled| cancelled())
    }

    /// Block until the previous shard's scratch directory is gone. Returns
    /// false if cancelled first.
    fn wait_for_previous_shard(&self) -> bool {
        let mut logged = false;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let holders = self.previous.strong_count();
            if holders == 0 {
                return true;
            }
            if !logged {
                debug!(holders, "Waiting for in-flight entries of the previous shard");
                logged = true;
            }
            thread::sleep(RELEASE_POLL);
        }
    }
}

impl Iterator for Entries {
    type Item = Result<EntryTask, ShardError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            if let Some(task) = self.current.next() {
                return Some(Ok(task));
            }
            let Some(shard) = self.shards.next() else {
                self.done = true;
                return None;
            };
            if !self.wait_for_previous_shard() {
                info!(shard = %shard.display(), "Traversal cancelled before opening shard");
                self.done = true;
                return None;
            }

            info!(shard = %shard.display(), "Start processing shard");
            match ShardWorkspace::open(&shard, self.work_dir.as_deref()).and_then(|workspace| {
                self.previous = Arc::downgrade(&workspace);
                workspace.entries()
            }) {
                Ok(tasks) => self.current = tasks.into_iter(),
                Err(e @ ShardError::Workspace { .. }) => {
                    self.done = true;
                    return Some(Err(e));
                }
                Err(e) => {
                    error!(shard = %shard.display(), error = %e, "Skipping unreadable shard");
                }
            }
        }
    }
}

/// In-process loading view; see [`Pipeline::iter`].
pub struct Loaded<'a> {
    entries: Entries,
    loader: &'a ProjectLoader,
    max_files: Option<usize>,
    stats: Arc<PipelineStats>,
    halted: bool,
}

impl Iterator for Loaded<'_> {
    type Item = Result<LoadedEntry, CleanError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.halted {
                return None;
            }
            if let Some(cap) = self.max_files.filter(|&cap| self.stats.processed() >= cap) {
                info!(max_files = cap, "Reached max_files, halting traversal");
                self.halted = true;
                return None;
            }

            let task = match self.entries.next() {
                Some(Ok(task)) => task,
                Some(Err(e)) => {
                    self.halted = true;
                    return Some(Err(e.into()));
                }
                None => {
                    info!(
                        processed = self.stats.processed(),
                        failed = self.stats.failed(),
                        "Finished all shards"
                    );
                    self.halted = true;
                    return None;
                }
            };

            match self.loader.load(&task.path) {
                Ok(project) => {
                    self.stats.record_processed();
                    return Some(Ok(LoadedEntry {
                        text: project.text,
                        yymm: task.yymm,
                        raw_id: task.raw_id,
                        timestamp: project.timestamp,
                    }));
                }
                Err(e) if e.is_fatal() => {
                    self.halted = true;
                    return Some(Err(CleanError::Entry {
                        id: task.raw_id,
                        source: e,
                    }));
                }
                Err(_) => {
                    self.stats.record_failed();
                }
            }
        }
    }
}

/// Expand directories to the `*.tar` files inside them; files pass through.
pub fn expand_shard_paths(paths: &[PathBuf]) -> std::io::Result<Vec<PathBuf>> {
    let mut shards = Vec::new();
    for path in paths {
        if path.is_dir() {
            shards.extend(tar_files_in(path)?);
        } else {
            shards.push(path.clone());
        }
    }
    Ok(shards)
}

fn tar_files_in(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut tars = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "tar") {
            tars.push(path);
        }
    }
    tars.sort();
    Ok(tars)
}
