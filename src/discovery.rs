use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::parsers::{open_file, CaseParser};

/// Leading comment or blank lines tolerated before the header
const HEADER_SCAN_LINES: usize = 64;

/// Finds patient case files among the given files and directories
pub struct CaseDiscovery {
    recursive: bool,
}

impl CaseDiscovery {
    pub fn new(recursive: bool) -> Self {
        Self { recursive }
    }

    /// Explicit files are kept as given; directories are scanned for case files
    pub fn discover(&self, paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        for path in paths {
            if path.is_file() {
                files.push(path.clone());
            } else if path.is_dir() {
                files.extend(self.discover_in_directory(path)?);
            }
        }

        // Remove duplicates while preserving order
        let mut seen = HashSet::new();
        files.retain(|path| seen.insert(path.clone()));

        Ok(files)
    }

    fn discover_in_directory(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        if self.recursive {
            for entry in WalkDir::new(dir)
                .follow_links(true)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let path = entry.path();
                if path.is_file() && self.is_case_file(path) {
                    files.push(path.to_path_buf());
                }
            }
        } else {
            let entries = fs::read_dir(dir)
                .with_context(|| format!("Failed to read directory: {}", dir.display()))?;

            let mut paths = Vec::new();
            for entry in entries {
                let entry = entry.with_context(|| {
                    format!("Failed to read directory entry in: {}", dir.display())
                })?;
                paths.push(entry.path());
            }
            paths.sort();

            for path in paths {
                if path.is_file() && self.is_case_file(&path) {
                    files.push(path);
                }
            }
        }

        Ok(files)
    }

    fn is_case_file(&self, path: &Path) -> bool {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let tabular = [".csv", ".tsv", ".txt"].iter().any(|ext| {
            name.ends_with(ext)
                || [".gz", ".bz2", ".xz"]
                    .iter()
                    .any(|z| name.ends_with(&format!("{}{}", ext, z)))
        });
        if !tabular {
            return false;
        }

        // Panel sheets often sit next to case files; only keep cell,reaction tables
        let Ok(reader) = open_file(path) else {
            return false;
        };
        let header = reader
            .lines()
            .take(HEADER_SCAN_LINES)
            .map_while(|line| line.ok())
            .find(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with('#')
            });
        header
            .map(|line| CaseParser::new().looks_like_case(&line))
            .unwrap_or(false)
    }
}
