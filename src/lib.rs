//! # Antibody Identification Toolkit
//!
//! Identification of red-cell alloantibodies from an 11-cell reaction panel.
//!
//! ## Features
//!
//! - Dosage-aware rule-out: only homozygous antigen expression on a non-reactive
//!   cell excludes an antibody specificity
//! - Rule-in by matching each surviving candidate against every reactive cell
//! - Autocontrol safety gate that suspends alloantibody logic
//! - Antigram (panel sheet) import from xlsx/xls workbooks or CSV/TSV, case file
//!   import from CSV/TSV, text files optionally compressed
//! - Parallel batch analysis of many cases against one panel
//! - Multiple output formats (text, HTML, CSV, JSON, TSV)

pub mod analysis;
pub mod config;
pub mod discovery;
pub mod error;
pub mod output;
pub mod parsers;
pub mod types;

// Re-export key types
pub use analysis::{is_homozygous, AntibodyIdentifier, ExclusionEngine, InclusionEngine};
pub use config::Settings;
pub use discovery::CaseDiscovery;
pub use error::AnalysisError;
pub use output::{ReportFormat, ReportGenerator};
pub use parsers::{CaseParser, PanelParser};
pub use types::*;
