//! File scanner for discovering and filtering source files.
//!
//! This module walks a releases directory, selects files by extension and
//! size, derives each file's release tag from its path, and samples the
//! result when a sample size is configured.

use crate::config::Sampling;
use crate::error::FileReadError;
use crate::models::FileRecord;
use anyhow::Result;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Release tag for files outside any recognizable release directory.
pub const UNKNOWN_RELEASE: &str = "unknown";

/// Configuration for file scanning.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// File extensions to include (e.g., ["py"])
    pub extensions: Vec<String>,
    /// Directory names to skip (e.g., ["__pycache__", ".git"])
    pub excludes: Vec<String>,
    /// File name fragments to skip (e.g., ["test_"])
    pub skip_patterns: Vec<String>,
    /// Maximum file size in bytes; larger files are skipped, not truncated
    pub max_file_size: u64,
    /// A path segment matching this is a release tag
    pub release_pattern: Regex,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["py".to_string()],
            excludes: vec![".git", "__pycache__", ".venv", "venv", "node_modules"]
                .into_iter()
                .map(String::from)
                .collect(),
            skip_patterns: vec!["test_".to_string(), "_test.".to_string()],
            max_file_size: 50_000,
            release_pattern: Regex::new(r"v?\d+(\.\d+)+").expect("valid default pattern"),
        }
    }
}

/// File scanner for discovering source files.
pub struct FileScanner {
    config: ScanConfig,
    root: PathBuf,
}

impl FileScanner {
    /// Create a new file scanner.
    pub fn new(root: PathBuf, config: ScanConfig) -> Self {
        Self { config, root }
    }

    /// Scan for all matching files, in sorted walk order.
    pub fn scan(&self) -> Result<Vec<FileRecord>> {
        let mut files = Vec::new();

        let walker = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !self.is_excluded_entry(e));

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    debug!("Cannot read directory entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file() || !self.matches_name(entry.path()) {
                continue;
            }

            let size = match entry.metadata() {
                Ok(m) => m.len(),
                Err(e) => {
                    warn!("Cannot stat {}: {}", entry.path().display(), e);
                    continue;
                }
            };

            let rel_path = entry.path().strip_prefix(&self.root).unwrap_or(entry.path());

            if size > self.config.max_file_size {
                warn!(
                    "Skipping oversized file {} ({} bytes > {})",
                    rel_path.display(),
                    size,
                    self.config.max_file_size
                );
                continue;
            }

            files.push(FileRecord {
                path: rel_path.to_string_lossy().replace('\\', "/"),
                release_tag: release_tag(rel_path, &self.config.release_pattern),
                size,
            });
        }

        Ok(files)
    }

    /// Read a scanned file's content.
    pub async fn read(&self, file: &FileRecord) -> Result<String, FileReadError> {
        let path = self.root.join(&file.path);
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| FileReadError { path, source })
    }

    /// Check extension and skip patterns for a file path.
    fn matches_name(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };

        if name.starts_with('.') {
            return false;
        }

        if self.config.skip_patterns.iter().any(|p| name.contains(p.as_str())) {
            return false;
        }

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        self.config.extensions.iter().any(|e| e == ext)
    }

    /// Hidden and explicitly excluded directories are not descended into.
    fn is_excluded_entry(&self, entry: &DirEntry) -> bool {
        if !entry.file_type().is_dir() {
            return false;
        }
        let name = entry.file_name().to_string_lossy();
        name.starts_with('.') || self.config.excludes.iter().any(|p| name == p.as_str())
    }
}

/// The topmost directory segment of `rel_path` that looks like a release.
pub fn release_tag(rel_path: &Path, pattern: &Regex) -> String {
    let mut dirs: Vec<_> = rel_path.components().collect();
    dirs.pop(); // file name

    dirs.into_iter()
        .filter_map(|c| c.as_os_str().to_str())
        .find(|segment| pattern.is_match(segment))
        .map(String::from)
        .unwrap_or_else(|| UNKNOWN_RELEASE.to_string())
}

/// Number of files per release tag.
pub fn files_per_release(files: &[FileRecord]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for file in files {
        *counts.entry(file.release_tag.clone()).or_insert(0) += 1;
    }
    counts
}

/// Reduce `files` to at most `sample_size` entries.
pub fn sample_files(
    files: Vec<FileRecord>,
    sample_size: Option<usize>,
    strategy: Sampling,
) -> Vec<FileRecord> {
    let Some(n) = sample_size else {
        return files;
    };
    if files.len() <= n {
        return files;
    }

    match strategy {
        Sampling::First => files.into_iter().take(n).collect(),
        Sampling::Balanced => sample_balanced(files, n),
    }
}

/// Spread `n` files evenly across releases, remainder to the first ones.
fn sample_balanced(files: Vec<FileRecord>, n: usize) -> Vec<FileRecord> {
    let mut by_release: BTreeMap<String, Vec<FileRecord>> = BTreeMap::new();
    for file in files {
        by_release
            .entry(file.release_tag.clone())
            .or_default()
            .push(file);
    }

    let releases = by_release.len();
    if releases == 0 {
        return Vec::new();
    }

    let per_release = n / releases;
    let remainder = n % releases;

    let mut sampled = Vec::with_capacity(n);
    for (idx, (release, available)) in by_release.into_iter().enumerate() {
        let target = per_release + usize::from(idx < remainder);
        let count = target.min(available.len());
        debug!(
            "Release {}: {} files (out of {} available)",
            release,
            count,
            available.len()
        );
        sampled.extend(available.into_iter().take(count));
    }

    sampled
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, bytes: usize) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "x".repeat(bytes)).unwrap();
    }

    fn record(path: &str, release: &str) -> FileRecord {
        FileRecord {
            path: path.to_string(),
            release_tag: release.to_string(),
            size: 1,
        }
    }

    #[test]
    fn test_scan_filters_extensions_and_excludes() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "1.0.0/app/models.py", 10);
        write(dir.path(), "1.0.0/app/readme.md", 10);
        write(dir.path(), "1.0.0/app/test_models.py", 10);
        write(dir.path(), "1.0.0/__pycache__/models.py", 10);
        write(dir.path(), "1.0.0/.hidden/models.py", 10);

        let scanner = FileScanner::new(dir.path().to_path_buf(), ScanConfig::default());
        let files = scanner.scan().unwrap();

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "1.0.0/app/models.py");
        assert_eq!(files[0].release_tag, "1.0.0");
        assert_eq!(files[0].size, 10);
    }

    #[test]
    fn test_size_boundary() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "2.0/at_limit.py", 100);
        write(dir.path(), "2.0/over_limit.py", 101);

        let config = ScanConfig {
            max_file_size: 100,
            ..ScanConfig::default()
        };
        let files = FileScanner::new(dir.path().to_path_buf(), config)
            .scan()
            .unwrap();

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "2.0/at_limit.py");
    }

    #[test]
    fn test_scan_order_is_sorted() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "2.0/b.py", 1);
        write(dir.path(), "1.0/z.py", 1);
        write(dir.path(), "1.0/a.py", 1);

        let files = FileScanner::new(dir.path().to_path_buf(), ScanConfig::default())
            .scan()
            .unwrap();
        let paths: Vec<_> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["1.0/a.py", "1.0/z.py", "2.0/b.py"]);
    }

    #[tokio::test]
    async fn test_read_missing_file_is_file_read_error() {
        let dir = TempDir::new().unwrap();
        let scanner = FileScanner::new(dir.path().to_path_buf(), ScanConfig::default());
        let err = scanner.read(&record("gone.py", "unknown")).await.unwrap_err();
        assert!(err.to_string().contains("gone.py"));
    }

    #[test]
    fn test_release_tag_uses_topmost_matching_segment() {
        let pattern = ScanConfig::default().release_pattern;
        assert_eq!(
            release_tag(Path::new("django-4.2/v1.0/core/x.py"), &pattern),
            "django-4.2"
        );
        assert_eq!(release_tag(Path::new("src/v2.1/x.py"), &pattern), "v2.1");
        assert_eq!(release_tag(Path::new("src/x.py"), &pattern), UNKNOWN_RELEASE);
        // The file name itself never counts
        assert_eq!(release_tag(Path::new("1.2.py"), &pattern), UNKNOWN_RELEASE);
    }

    #[test]
    fn test_sample_first() {
        let files = vec![record("a", "1.0"), record("b", "1.0"), record("c", "2.0")];
        let sampled = sample_files(files.clone(), Some(2), Sampling::First);
        assert_eq!(sampled, files[..2].to_vec());

        assert_eq!(sample_files(files.clone(), None, Sampling::First).len(), 3);
        assert_eq!(sample_files(files, Some(10), Sampling::First).len(), 3);
    }

    #[test]
    fn test_sample_balanced() {
        let files = vec![
            record("a1", "1.0"),
            record("a2", "1.0"),
            record("a3", "1.0"),
            record("b1", "2.0"),
            record("b2", "2.0"),
            record("c1", "3.0"),
        ];

        let sampled = sample_files(files, Some(4), Sampling::Balanced);
        let paths: Vec<_> = sampled.iter().map(|f| f.path.as_str()).collect();
        // 4 / 3 = 1 each, remainder 1 to the first release
        assert_eq!(paths, vec!["a1", "a2", "b1", "c1"]);
    }

    #[test]
    fn test_sample_balanced_caps_at_available() {
        let files = vec![
            record("a1", "1.0"),
            record("b1", "2.0"),
            record("b2", "2.0"),
            record("b3", "2.0"),
        ];
        let sampled = sample_files(files, Some(3), Sampling::Balanced);
        let paths: Vec<_> = sampled.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["a1", "b1"]);
    }

    #[test]
    fn test_files_per_release() {
        let files = vec![record("a", "1.0"), record("b", "1.0"), record("c", "2.0")];
        let counts = files_per_release(&files);
        assert_eq!(counts.get("1.0"), Some(&2));
        assert_eq!(counts.get("2.0"), Some(&1));
    }
}
