use std::fs;
use std::path::{Path, PathBuf};

/// Recursively collect files under `dir` whose name ends with `suffix`.
///
/// Traversal is top-down and deterministic: within a directory, files come
/// first in name order, then each subdirectory in name order.
pub(crate) fn files_with_suffix(dir: &Path, suffix: &str) -> std::io::Result<Vec<PathBuf>> {
    let mut results = Vec::new();
    visit_dir(dir, suffix, &mut results)?;
    Ok(results)
}

fn visit_dir(dir: &Path, suffix: &str, results: &mut Vec<PathBuf>) -> std::io::Result<()> {
    let mut files = Vec::new();
    let mut subdirs = Vec::new();
    for entry_res in fs::read_dir(dir)? {
        let entry = entry_res?;
        let file_type = entry.file_type()?;
        let path = entry.path();
        if file_type.is_dir() {
            subdirs.push(path);
        } else if file_type.is_file() {
            let matches = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(suffix));
            if matches {
                files.push(path);
            }
        }
    }
    files.sort();
    subdirs.sort();
    results.extend(files);
    for sub in subdirs {
        visit_dir(&sub, suffix, results)?;
    }
    Ok(())
}
