//! Filesystem utilities.

use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use glob::Pattern;
use walkdir::WalkDir;

/// Ensure a directory exists, creating it if necessary.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("failed to create directory: {}", path.display()))?;
    }
    Ok(())
}

/// Read a file to string, with nice error messages.
pub fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read file: {}", path.display()))
}

/// Write a string to a file, creating parent directories if needed.
///
/// The content is written to a sibling temporary file first and renamed
/// into place, so readers never observe a half-written state file.
pub fn write_string(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, contents)
        .with_context(|| format!("failed to write file: {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("failed to move {} into place", path.display()))
}

/// Remove a file if it exists. Returns whether something was removed.
pub fn remove_file_if_exists(path: &Path) -> Result<bool> {
    if path.is_file() {
        fs::remove_file(path)
            .with_context(|| format!("failed to remove file: {}", path.display()))?;
        return Ok(true);
    }
    Ok(false)
}

/// Remove a directory and all its contents, if it exists.
pub fn remove_dir_all_if_exists(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path)
            .with_context(|| format!("failed to remove directory: {}", path.display()))?;
    }
    Ok(())
}

/// List every regular file below `root`, as paths relative to `root`.
///
/// Directories whose name is in `skip_dirs` are not descended into.
/// The result is sorted.
pub fn walk_files(root: &Path, skip_dirs: &[&str]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    let walker = WalkDir::new(root).follow_links(false).into_iter();
    for entry in walker.filter_entry(|e| {
        e.depth() == 0
            || !(e.file_type().is_dir()
                && skip_dirs
                    .iter()
                    .any(|skip| e.file_name().to_str() == Some(*skip)))
    }) {
        let entry =
            entry.with_context(|| format!("failed to walk directory: {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_path_buf();
        files.push(relative);
    }

    files.sort();
    Ok(files)
}

/// Compile glob patterns, failing on the first invalid one.
pub fn compile_patterns(patterns: &[String]) -> Result<Vec<Pattern>> {
    patterns
        .iter()
        .map(|p| Pattern::new(p).with_context(|| format!("invalid glob pattern: {}", p)))
        .collect()
}

/// Make `path` absolute by joining it onto `base` when it is relative.
pub fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Resolve `.` and `..` components without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
