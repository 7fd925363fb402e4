use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::AnalysisError;
use crate::parsers::{coerce_marker, detect_delimiter, open_file};
use crate::types::*;

fn is_workbook(path: &Path) -> bool {
    path.extension()
        .map(|e| {
            let ext = e.to_string_lossy().to_lowercase();
            ext == "xlsx" || ext == "xls"
        })
        .unwrap_or(false)
}

/// Reads an antigram sheet (one row per cell, one column per antigen)
pub struct PanelParser;

impl PanelParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, path: &Path) -> Result<Panel> {
        if is_workbook(path) {
            return self
                .parse_workbook(path)
                .with_context(|| format!("Invalid panel workbook {}", path.display()));
        }

        let mut reader = open_file(path)?;
        let mut content = String::new();
        reader
            .read_to_string(&mut content)
            .with_context(|| format!("Failed to read panel file {}", path.display()))?;

        self.parse_str(&content)
            .with_context(|| format!("Invalid panel file {}", path.display()))
    }

    pub fn parse_str(&self, content: &str) -> Result<Panel> {
        let first_line = content.lines().next().unwrap_or_default();
        let delimiter = detect_delimiter(first_line);

        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .from_reader(content.as_bytes());

        let headers = reader.headers()?.clone();
        let records = reader.records().collect::<Result<Vec<_>, _>>()?;
        self.build_panel(&headers, records)
    }

    /// Reads the first worksheet of an `.xlsx`/`.xls` antigram
    #[cfg(feature = "excel")]
    fn parse_workbook(&self, path: &Path) -> Result<Panel> {
        use calamine::{open_workbook_auto, Reader};

        let mut workbook = open_workbook_auto(path)
            .with_context(|| format!("Failed to open workbook {}", path.display()))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| anyhow::anyhow!("Workbook has no worksheets"))??;

        let mut rows = range
            .rows()
            .map(|row| StringRecord::from(row.iter().map(|cell| cell.to_string()).collect::<Vec<_>>()));
        let headers = rows.next().unwrap_or_default();
        self.build_panel(&headers, rows.collect())
    }

    #[cfg(not(feature = "excel"))]
    fn parse_workbook(&self, path: &Path) -> Result<Panel> {
        anyhow::bail!(
            "{} is a spreadsheet workbook; rebuild with the `excel` feature or export it as CSV",
            path.display()
        )
    }

    fn build_panel(&self, headers: &StringRecord, records: Vec<StringRecord>) -> Result<Panel> {
        let columns = self.map_columns(headers);

        let mut phenotypes = Vec::with_capacity(PANEL_SIZE);
        let mut extra_rows = 0usize;

        for record in &records {
            if record.iter().all(|field| field.trim().is_empty()) {
                continue;
            }
            if phenotypes.len() == PANEL_SIZE {
                extra_rows += 1;
                continue;
            }
            phenotypes.push(self.parse_row(record, &columns));
        }

        if extra_rows > 0 {
            warn!(
                "Panel sheet has {} rows beyond the first {}; extra rows ignored",
                extra_rows, PANEL_SIZE
            );
        }

        if phenotypes.len() < PANEL_SIZE {
            return Err(AnalysisError::WrongCellCount {
                expected: PANEL_SIZE,
                found: phenotypes.len(),
            }
            .into());
        }

        Ok(Panel::from_phenotypes(phenotypes)?)
    }

    /// Header position of each registry antigen; missing columns stay `None`
    fn map_columns(&self, headers: &StringRecord) -> Vec<(Antigen, Option<usize>)> {
        ANTIGEN_ORDER
            .iter()
            .map(|&antigen| {
                let idx = headers
                    .iter()
                    .position(|h| h.trim() == antigen.symbol());
                if idx.is_none() {
                    debug!("Panel sheet has no {} column; treated as absent", antigen);
                }
                (antigen, idx)
            })
            .collect()
    }

    fn parse_row(&self, record: &StringRecord, columns: &[(Antigen, Option<usize>)]) -> Phenotype {
        let mut phenotype = Phenotype::new();
        for &(antigen, idx) in columns {
            let present = idx
                .and_then(|i| record.get(i))
                .map(coerce_marker)
                .unwrap_or(false);
            phenotype.set(antigen, present);
        }
        phenotype
    }

    /// Writes an all-negative 11-cell sheet to fill in by hand
    pub fn write_template(&self, path: &Path) -> Result<()> {
        let mut wtr = WriterBuilder::new()
            .delimiter(if path.extension().map(|e| e == "tsv").unwrap_or(false) {
                b'\t'
            } else {
                b','
            })
            .from_path(path)
            .with_context(|| format!("Failed to create panel template {}", path.display()))?;

        let mut header = vec!["Cell ID".to_string()];
        header.extend(ANTIGEN_ORDER.iter().map(|a| a.symbol().to_string()));
        wtr.write_record(&header)?;

        for id in 1..=PANEL_SIZE {
            let mut row = vec![format!("Cell {}", id)];
            row.extend(ANTIGEN_ORDER.iter().map(|_| "0".to_string()));
            wtr.write_record(&row)?;
        }

        wtr.flush()?;
        Ok(())
    }
}

impl Default for PanelParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet(header: &str, rows: &[&str]) -> String {
        let mut content = format!("{}\n", header);
        for row in rows {
            content.push_str(row);
            content.push('\n');
        }
        content
    }

    #[test]
    fn test_parse_sparse_sheet() {
        let mut rows = vec!["Cell 1,+,0,pos,1"];
        rows.extend(std::iter::repeat("Cell n,0,0,0,0").take(10));
        let content = sheet("Cell ID, K ,k,Fya,Lua", &rows);

        let panel = PanelParser::new().parse_str(&content).unwrap();
        let first = &panel.cells()[0].phenotype;
        assert_eq!(first.antigens(), vec![Antigen::BigK, Antigen::Fya]);
        assert!(panel.cells()[5].phenotype.antigens().is_empty());
    }

    #[test]
    fn test_malformed_values_are_absent() {
        let rows: Vec<&str> = std::iter::repeat("abc\t2\t-1").take(11).collect();
        let content = sheet("D\tC\tc", &rows);
        let panel = PanelParser::new().parse_str(&content).unwrap();
        assert!(panel.cells().iter().all(|c| c.phenotype.antigens().is_empty()));
    }

    #[test]
    fn test_short_sheet_is_rejected() {
        let rows: Vec<&str> = std::iter::repeat("1,0").take(5).collect();
        let err = PanelParser::new()
            .parse_str(&sheet("D,C", &rows))
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<AnalysisError>(),
            Some(&AnalysisError::WrongCellCount {
                expected: 11,
                found: 5
            })
        );
    }

    #[test]
    fn test_extra_rows_are_ignored() {
        let mut rows: Vec<&str> = std::iter::repeat("0,0").take(11).collect();
        rows.push("1,1");
        let panel = PanelParser::new().parse_str(&sheet("D,C", &rows)).unwrap();
        assert_eq!(panel.cells().len(), 11);
        assert!(!panel.cells()[10].phenotype.has(Antigen::D));
    }

    #[test]
    fn test_workbook_extension() {
        assert!(is_workbook(Path::new("antigram.xlsx")));
        assert!(is_workbook(Path::new("ANTIGRAM.XLS")));
        assert!(!is_workbook(Path::new("antigram.csv")));
    }

    #[cfg(not(feature = "excel"))]
    #[test]
    fn test_workbook_needs_excel_feature() {
        let err = PanelParser::new()
            .parse(Path::new("antigram.xlsx"))
            .unwrap_err();
        assert!(format!("{:#}", err).contains("excel"));
    }

    #[cfg(feature = "excel")]
    #[test]
    fn test_unreadable_workbook_is_an_error() -> Result<()> {
        let temp_dir = tempfile::TempDir::new()?;
        let path = temp_dir.path().join("antigram.xlsx");
        std::fs::write(&path, "Cell ID,D\n")?;
        assert!(PanelParser::new().parse(&path).is_err());
        Ok(())
    }
}
