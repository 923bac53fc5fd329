//! Shard reader: unpacks one archive shard into a private scratch directory
//! and enumerates the per-project entries inside it.
//!
//! A bulk shard is a plain (or gzipped) tar whose members are laid out as
//! `<yymm>/<raw id>.gz`. Each `.gz` member is one project entry.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::read::GzDecoder;
use tempfile::TempDir;
use tracing::{debug, info};

use crate::contract::EntryTask;
use crate::error::ShardError;
use crate::walk;

pub(crate) const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Scratch directory holding one unpacked shard.
///
/// The directory is removed when the last handle is dropped. Entry tasks keep
/// an `Arc` to their workspace so in-flight work never loses its input.
#[derive(Debug)]
pub struct ShardWorkspace {
    shard: PathBuf,
    dir: TempDir,
}

impl ShardWorkspace {
    /// Unpack `shard` into a fresh directory under `work_dir` (system temp
    /// dir when `None`).
    pub fn open(shard: &Path, work_dir: Option<&Path>) -> Result<Arc<Self>, ShardError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("shard-");
        let dir = match work_dir {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|source| ShardError::Workspace {
            dir: work_dir.map_or_else(std::env::temp_dir, Path::to_path_buf),
            source,
        })?;

        info!(shard = %shard.display(), scratch = %dir.path().display(), "Unpacking shard");
        unpack_tar(shard, dir.path()).map_err(|source| ShardError::Unpack {
            shard: shard.to_path_buf(),
            source,
        })?;

        Ok(Arc::new(Self {
            shard: shard.to_path_buf(),
            dir,
        }))
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn shard(&self) -> &Path {
        &self.shard
    }

    /// Every `.gz` entry in the unpacked shard, in deterministic order.
    pub fn entries(self: &Arc<Self>) -> Result<Vec<EntryTask>, ShardError> {
        let paths = walk::files_with_suffix(self.path(), ".gz").map_err(|source| {
            ShardError::Unpack {
                shard: self.shard.clone(),
                source,
            }
        })?;

        let tasks: Vec<EntryTask> = paths
            .into_iter()
            .map(|path| {
                let yymm = path
                    .parent()
                    .and_then(Path::file_name)
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let raw_id = path
                    .file_stem()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                EntryTask {
                    path,
                    yymm,
                    raw_id,
                    workspace: Arc::clone(self),
                }
            })
            .collect();

        debug!(shard = %self.shard.display(), entries = tasks.len(), "Enumerated shard entries");
        Ok(tasks)
    }
}

impl Drop for ShardWorkspace {
    fn drop(&mut self) {
        debug!(shard = %self.shard.display(), scratch = %self.dir.path().display(), "Removing shard scratch directory");
    }
}

fn unpack_tar(shard: &Path, dest: &Path) -> std::io::Result<()> {
    let mut reader = BufReader::new(File::open(shard)?);
    let gzipped = reader.fill_buf()?.starts_with(&GZIP_MAGIC);
    let reader: Box<dyn Read> = if gzipped {
        Box::new(GzDecoder::new(reader))
    } else {
        Box::new(reader)
    };
    tar::Archive::new(reader).unpack(dest)
}
