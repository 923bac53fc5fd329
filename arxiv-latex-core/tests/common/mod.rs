#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arxiv_latex_core::contract::Flatten;
use arxiv_latex_core::error::FlattenError;
use flate2::write::GzEncoder;
use flate2::Compression;

/// 2007-03-27T12:53:20 UTC
pub const MTIME: u64 = 1_175_000_000;

pub const TIKZ_PAPER: &[u8] =
    b"\\documentclass{article}\n\\begin{document}\n\\begin{tikzpicture}\\end{tikzpicture}\n\\end{document}\n";
pub const PLAIN_PAPER: &[u8] =
    b"\\documentclass{article}\n\\begin{document}\nNo pictures here.\n\\end{document}\n";

pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

/// An uncompressed tar holding `files` (path, contents).
pub fn tar_of(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(MTIME);
        builder.append_data(&mut header, name, *data).unwrap();
    }
    builder.into_inner().unwrap()
}

/// A gzipped multi-file project entry.
pub fn project_entry(files: &[(&str, &[u8])]) -> Vec<u8> {
    gzip(&tar_of(files))
}

/// A gzipped single-document entry.
pub fn single_entry(tex: &[u8]) -> Vec<u8> {
    gzip(tex)
}

/// Write a shard tar at `<dir>/<name>` whose members are `entries`
/// (`<yymm>/<id>.gz`, bytes).
pub fn write_shard(dir: &Path, name: &str, entries: &[(&str, Vec<u8>)]) -> PathBuf {
    let files: Vec<(&str, &[u8])> = entries
        .iter()
        .map(|(path, bytes)| (*path, bytes.as_slice()))
        .collect();
    let path = dir.join(name);
    fs::write(&path, tar_of(&files)).unwrap();
    path
}

/// Write an entry file directly (outside any shard).
pub fn write_entry(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, bytes).unwrap();
    path
}

/// Stand-in flattener: returns the root file's bytes and counts calls.
#[derive(Debug, Default, Clone)]
pub struct CatFlatten {
    calls: Arc<AtomicUsize>,
}

impl CatFlatten {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Flatten for CatFlatten {
    fn flatten(&self, root: &Path) -> Result<Vec<u8>, FlattenError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut bytes = fs::read(root)?;
        let trimmed = bytes.trim_ascii_end().len();
        bytes.truncate(trimmed);
        Ok(bytes)
    }
}

pub fn dir_is_empty(dir: &Path) -> bool {
    fs::read_dir(dir).unwrap().next().is_none()
}
