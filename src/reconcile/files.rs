//! Matching legacy attachment paths to files physically present on disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use walkdir::WalkDir;

use crate::error::Result;

static THUMBNAIL_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-\d+x\d+(\.[^./]+)$").expect("valid regex"));

/// `(year, month)` bucket of an upload path.
pub type YearMonth = (u16, u8);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateFilePath {
    pub path: PathBuf,
    pub year_month: Option<YearMonth>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(CandidateFilePath),
    /// No file on disk carries the requested name.
    Missing,
    /// Files share the name but none sits in the requested year/month.
    NoDateMatch(Vec<CandidateFilePath>),
    Ambiguous(Vec<CandidateFilePath>),
}

fn segments(path: &str) -> Vec<&str> {
    path.split(['/', '\\']).filter(|s| !s.is_empty()).collect()
}

fn is_year(segment: &str) -> bool {
    segment.len() == 4 && segment.bytes().all(|b| b.is_ascii_digit())
}

fn is_month(segment: &str) -> bool {
    (1..=2).contains(&segment.len())
        && segment.bytes().all(|b| b.is_ascii_digit())
        && segment.parse::<u8>().is_ok_and(|m| (1..=12).contains(&m))
}

fn year_month_index(parts: &[&str]) -> Option<usize> {
    parts
        .windows(2)
        .position(|pair| is_year(pair[0]) && is_month(pair[1]))
}

/// First `YYYY/M(M)` segment pair in a path or URL.
pub fn extract_year_month(path: &str) -> Option<YearMonth> {
    let parts = segments(strip_query(path));
    let at = year_month_index(&parts)?;
    Some((parts[at].parse().ok()?, parts[at + 1].parse().ok()?))
}

fn strip_query(value: &str) -> &str {
    value
        .split_once(['?', '#'])
        .map_or(value, |(path, _)| path)
}

/// `photo-300x200.jpg` -> `photo.jpg`; `None` when there is no size suffix.
pub fn strip_thumbnail_suffix(filename: &str) -> Option<String> {
    THUMBNAIL_SUFFIX
        .is_match(filename)
        .then(|| THUMBNAIL_SUFFIX.replace(filename, "$1").into_owned())
}

/// Everything from the year segment on (`.../uploads/2014/01/x.jpg` ->
/// `2014/01/x.jpg`), optionally with the thumbnail size removed from the
/// file name.
pub fn extract_path_from_year(value: &str, strip_dimensions: bool) -> Option<String> {
    let parts = segments(strip_query(value));
    let at = year_month_index(&parts)?;
    let mut tail: Vec<String> = parts[at..].iter().map(|s| s.to_string()).collect();
    if tail.len() < 3 {
        return None;
    }
    if strip_dimensions
        && let Some(last) = tail.last_mut()
        && let Some(stripped) = strip_thumbnail_suffix(last)
    {
        *last = stripped;
    }
    Some(tail.join("/"))
}

/// `2014/12/01235537/x.jpg` -> `2014/12/x.jpg`.
pub fn without_hash_dir(path: &str) -> Option<String> {
    let parts = segments(path);
    if parts.len() < 4 || !parts[2].bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let mut kept = parts;
    kept.remove(2);
    Some(kept.join("/"))
}

fn file_name(path: &str) -> &str {
    segments(path).last().copied().unwrap_or("")
}

/// Resolves legacy attachment paths against a directory of copied uploads.
/// The directory is walked once, on first use.
pub struct FileResolver {
    root: PathBuf,
    index: Option<HashMap<String, Vec<PathBuf>>>,
}

impl FileResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            index: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn index(&mut self) -> Result<&HashMap<String, Vec<PathBuf>>> {
        let index = match self.index.take() {
            Some(index) => index,
            None => scan(&self.root)?,
        };
        Ok(self.index.insert(index))
    }

    pub fn file_count(&mut self) -> Result<usize> {
        Ok(self.index()?.values().map(Vec::len).sum())
    }

    /// Files named `base_filename`; falls back to the un-sized original when
    /// no exact thumbnail file exists.
    pub fn find_candidates(&mut self, base_filename: &str) -> Result<Vec<CandidateFilePath>> {
        let fallback = strip_thumbnail_suffix(base_filename);
        let root = self.root.clone();
        let index = self.index()?;
        let paths = match index.get(base_filename) {
            Some(paths) => Some(paths),
            None => fallback.as_deref().and_then(|name| index.get(name)),
        };
        Ok(paths
            .into_iter()
            .flatten()
            .map(|path| {
                let relative = path.strip_prefix(&root).unwrap_or(path);
                CandidateFilePath {
                    year_month: extract_year_month(&relative.to_string_lossy()),
                    path: path.clone(),
                }
            })
            .collect())
    }

    /// Pick the single candidate whose year/month equals the legacy path's.
    pub fn resolve(&mut self, legacy_relative_path: &str) -> Result<Resolution> {
        let candidates = self.find_candidates(file_name(legacy_relative_path))?;
        if candidates.is_empty() {
            return Ok(Resolution::Missing);
        }
        let Some(wanted) = extract_year_month(legacy_relative_path) else {
            return Ok(Resolution::NoDateMatch(candidates));
        };
        let mut matching: Vec<CandidateFilePath> = candidates
            .iter()
            .filter(|c| c.year_month == Some(wanted))
            .cloned()
            .collect();
        Ok(match matching.len() {
            0 => Resolution::NoDateMatch(candidates),
            1 => Resolution::Resolved(matching.remove(0)),
            _ => Resolution::Ambiguous(matching),
        })
    }
}

fn scan(root: &Path) -> Result<HashMap<String, Vec<PathBuf>>> {
    let mut index: HashMap<String, Vec<PathBuf>> = HashMap::new();
    if !root.exists() {
        tracing::warn!(root = %root.display(), "upload directory does not exist");
        return Ok(index);
    }
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        index.entry(name).or_default().push(entry.into_path());
    }
    tracing::debug!(
        root = %root.display(),
        names = index.len(),
        "indexed upload directory"
    );
    Ok(index)
}
