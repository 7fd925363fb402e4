use anyhow::{Context, Result};
use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use lazy_static::lazy_static;
use regex::Regex;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use xz2::read::XzDecoder;

pub mod case;
pub mod panel;

pub use case::CaseParser;
pub use panel::PanelParser;

lazy_static! {
    static ref CELL_LABEL: Regex = Regex::new(r"(?i)^\s*(?:cell\s*#?\s*)?(\d{1,2})\s*$").unwrap();
    static ref NUMERIC_ONE: Regex = Regex::new(r"^1(?:\.0*)?$").unwrap();
}

/// Opens a plain or compressed text file, choosing the decoder by extension
pub fn open_file(path: &Path) -> Result<Box<dyn BufRead>> {
    let file =
        File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;

    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let reader: Box<dyn BufRead> = match ext.as_str() {
        "gz" => Box::new(BufReader::new(GzDecoder::new(file))),
        "bz2" => Box::new(BufReader::new(BzDecoder::new(file))),
        "xz" => Box::new(BufReader::new(XzDecoder::new(file))),
        _ => Box::new(BufReader::new(file)),
    };

    Ok(reader)
}

/// Guesses the field delimiter from a header line
pub fn detect_delimiter(line: &str) -> u8 {
    let tabs = line.matches('\t').count();
    let commas = line.matches(',').count();
    let semicolons = line.matches(';').count();

    if tabs >= commas && tabs >= semicolons && tabs > 0 {
        b'\t'
    } else if semicolons > commas {
        b';'
    } else {
        b','
    }
}

/// First line that is neither blank nor a `#` comment
pub fn first_table_line(content: &str) -> Option<&str> {
    content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
}

/// Spreadsheet marker to presence; anything unrecognised counts as absent
pub fn coerce_marker(value: &str) -> bool {
    let value = value.trim().to_lowercase();
    matches!(value.as_str(), "+" | "pos" | "true") || NUMERIC_ONE.is_match(&value)
}

/// Reads "3", "Cell 3" or "cell#3" as a cell id
pub fn parse_cell_label(label: &str) -> Option<u8> {
    CELL_LABEL
        .captures(label)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// File stem without compression and table extensions
pub(crate) fn file_id(path: &Path) -> String {
    let mut stem = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string();
    for suffix in [".gz", ".bz2", ".xz", ".csv", ".tsv", ".txt"] {
        if let Some(stripped) = stem.strip_suffix(suffix) {
            stem = stripped.to_string();
        }
    }
    stem
}
