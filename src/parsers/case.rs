use anyhow::{anyhow, Context, Result};
use csv::ReaderBuilder;
use std::io::Read;
use std::path::Path;

use crate::parsers::{detect_delimiter, file_id, first_table_line, open_file, parse_cell_label};
use crate::types::*;

/// Reads a patient work-up file: one `cell,reaction` row per panel cell
/// plus an optional `AC` row carrying the autocontrol result.
pub struct CaseParser;

impl CaseParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, path: &Path) -> Result<Case> {
        let mut reader = open_file(path)?;
        let mut content = String::new();
        reader
            .read_to_string(&mut content)
            .with_context(|| format!("Failed to read case file {}", path.display()))?;

        self.parse_str(&file_id(path), &content)
            .with_context(|| format!("Invalid case file {}", path.display()))
    }

    pub fn parse_str(&self, case_id: &str, content: &str) -> Result<Case> {
        let header_line = first_table_line(content).unwrap_or_default();
        let delimiter = detect_delimiter(header_line);

        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());

        let mut entries = Vec::new();
        let mut autocontrol = AutoControl::Negative;
        let mut seen_data = false;

        for record in reader.records() {
            let record = record?;
            let line = record.position().map_or(0, |p| p.line());
            let key = record.get(0).unwrap_or_default();
            let value = record.get(1).unwrap_or_default();

            if key.is_empty() {
                continue;
            }
            if !seen_data && key.eq_ignore_ascii_case("cell") {
                continue;
            }
            seen_data = true;

            if key.eq_ignore_ascii_case("ac") || key.eq_ignore_ascii_case("autocontrol") {
                autocontrol = value.parse()?;
                continue;
            }

            let cell_id = parse_cell_label(key)
                .ok_or_else(|| anyhow!("Unrecognised cell label '{}' on line {}", key, line))?;
            let grade: ReactionGrade = value.parse()?;
            entries.push((cell_id, grade));
        }

        let reactions = Reactions::from_keyed(&entries)?;
        Ok(Case::new(case_id, reactions, autocontrol))
    }

    /// True when the first table line (after blank and `#` lines) is a case header
    pub fn looks_like_case(&self, head: &str) -> bool {
        first_table_line(head)
            .map(|line| {
                let lower = line.to_lowercase();
                lower.starts_with("cell") && lower.contains("reaction")
            })
            .unwrap_or(false)
    }
}

impl Default for CaseParser {
    fn default() -> Self {
        Self::new()
    }
}
