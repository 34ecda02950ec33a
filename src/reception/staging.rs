//! Flat staging directory for the fragments of the current cycle.

use crate::error::{AdapterError, Result};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info};

fn directory_prefix() -> &'static Regex {
    static PREFIX: OnceLock<Regex> = OnceLock::new();
    PREFIX.get_or_init(|| Regex::new(r"[^/\\]*[/\\]").expect("static pattern"))
}

/// Strip every directory component from a fragment name.
///
/// Returns `None` when nothing usable is left (empty, `.` or `..`).
pub fn sanitize_file_name(name: &str) -> Option<String> {
    let stripped = directory_prefix().replace_all(name, "");
    let stripped = stripped.trim();
    match stripped {
        "" | "." | ".." => None,
        _ => Some(stripped.to_string()),
    }
}

pub struct StagingArea {
    dir: PathBuf,
}

impl StagingArea {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    /// Write one fragment under its sanitized name.
    ///
    /// Each fragment is its own file, so concurrent writers never share one.
    pub fn write_fragment(&self, file_name: &str, content: &[u8]) -> Result<PathBuf> {
        let name = sanitize_file_name(file_name).ok_or_else(|| {
            AdapterError::Transport(format!("unusable fragment name {:?}", file_name))
        })?;
        let path = self.dir.join(name);
        fs::write(&path, content)?;
        debug!(path = %path.display(), bytes = content.len(), "fragment staged");
        Ok(path)
    }

    /// Names of the files currently staged, sorted.
    pub fn staged_files(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Delete every staged file. Returns how many were removed.
    pub fn purge(&self) -> Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        info!(dir = %self.dir.display(), removed, "staging area cleared");
        Ok(removed)
    }
}
