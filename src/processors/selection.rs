//! Sample file selection by file-name keyword.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use thiserror::Error;

use crate::config::MatchMode;

/// Errors that can occur during file selection.
#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("Failed to read directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File name is not valid UTF-8: {}", .path.display())]
    NonUtf8Name { path: PathBuf },

    #[error("Invalid file name pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Result type for selection operations.
pub type Result<T> = std::result::Result<T, SelectionError>;

/// Compiled file-name matcher.
#[derive(Debug, Clone)]
pub enum NameMatcher {
    Substring(String),
    Regex(Regex),
}

impl NameMatcher {
    /// Build a matcher for `keyword` in the given mode.
    pub fn new(keyword: &str, mode: MatchMode) -> Result<Self> {
        match mode {
            MatchMode::Substring => Ok(Self::Substring(keyword.to_string())),
            MatchMode::Regex => Regex::new(keyword)
                .map(Self::Regex)
                .map_err(|source| SelectionError::InvalidPattern {
                    pattern: keyword.to_string(),
                    source,
                }),
        }
    }

    #[inline]
    pub fn is_match(&self, name: &str) -> bool {
        match self {
            Self::Substring(keyword) => name.contains(keyword.as_str()),
            Self::Regex(re) => re.is_match(name),
        }
    }
}

/// Keep the names that match, sorted.
pub fn filter_names<I, S>(names: I, matcher: &NameMatcher) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut selected: Vec<String> = names
        .into_iter()
        .map(Into::into)
        .filter(|name| matcher.is_match(name))
        .collect();
    selected.sort();
    selected
}

/// List the files in `dir` whose names match `keyword`.
///
/// Only regular files are considered, including symlinks to regular files.
/// Subdirectories are skipped even when their names match. The returned names are bare file names (not paths),
/// sorted so that samples are processed in a stable order.
///
/// # Arguments
///
/// * `dir` - Directory holding the sample tables
/// * `keyword` - Substring (or regex, in `MatchMode::Regex`) to look for
/// * `mode` - How `keyword` is matched
///
/// # Errors
///
/// Returns an error if the directory or one of its entries cannot be read,
/// a file name is not valid UTF-8, or the regex is invalid.
/// An empty selection is not an error.
pub fn select_files(dir: &Path, keyword: &str, mode: MatchMode) -> Result<Vec<String>> {
    let matcher = NameMatcher::new(keyword, mode)?;

    let entries = fs::read_dir(dir).map_err(|source| SelectionError::ReadDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| SelectionError::ReadDir {
            path: dir.to_path_buf(),
            source,
        })?;
        // Follows symlinks; dangling links are skipped
        if !entry.path().is_file() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(raw) => {
                return Err(SelectionError::NonUtf8Name {
                    path: dir.join(raw),
                })
            }
        }
    }

    let selected = filter_names(names, &matcher);
    log::debug!(
        "{}: {} files match {:?}",
        dir.display(),
        selected.len(),
        keyword
    );
    Ok(selected)
}
