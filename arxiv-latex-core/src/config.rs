use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

use crate::contract::TextEncoding;
use crate::flatten::FlattenerConfig;

/// Settings for one cleaning run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanerConfig {
    /// Where finished output files are written.
    pub target_dir: PathBuf,
    /// Scratch root for unpacked shards and entries (system temp when `None`).
    pub work_dir: Option<PathBuf>,
    /// Stop after this many successfully loaded entries; `<= 0` means no cap.
    pub max_files: i64,
    /// Worker pool size; `None` means available parallelism.
    pub workers: Option<usize>,
    pub compress: bool,
    pub expand_macros: bool,
    pub encodings: Vec<TextEncoding>,
    pub flattener: FlattenerConfig,
    /// Show a progress bar over consumed entries.
    pub verbose: bool,
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self {
            target_dir: PathBuf::from("extracted"),
            work_dir: None,
            max_files: -1,
            workers: None,
            compress: false,
            expand_macros: true,
            encodings: vec![TextEncoding::Utf8, TextEncoding::Latin1],
            flattener: FlattenerConfig::default(),
            verbose: false,
        }
    }
}

impl CleanerConfig {
    pub fn max_files(&self) -> Option<usize> {
        usize::try_from(self.max_files).ok().filter(|&n| n > 0)
    }

    pub fn workers(&self) -> usize {
        self.workers
            .filter(|&n| n > 0)
            .or_else(|| std::thread::available_parallelism().ok().map(usize::from))
            .unwrap_or(1)
    }

    /// Create the target and scratch directories. Call once before any run.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.target_dir)?;
        if let Some(work_dir) = &self.work_dir {
            std::fs::create_dir_all(work_dir)?;
        }
        Ok(())
    }

    pub fn trace_loaded(&self) {
        info!(
            target_dir = %self.target_dir.display(),
            max_files = self.max_files,
            workers = self.workers(),
            compress = self.compress,
            "Loaded CleanerConfig"
        );
        debug!(?self, "CleanerConfig loaded (full debug)");
    }
}
