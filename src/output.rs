use anyhow::{Context, Result};
use chrono::Local;
use csv::WriterBuilder;
use serde::{Deserialize, Serialize};
use serde_json::to_string_pretty;
use std::fs;
use std::path::{Path, PathBuf};
use tera::Tera;

use crate::types::*;

/// Supported report formats
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Text,
    Html,
    Csv,
    Json,
    Tsv,
    All,
}

/// Flattened view of one case, shared by the tabular and HTML writers
#[derive(Debug, Clone, Serialize)]
struct ReportRow {
    case_id: String,
    autocontrol: String,
    reactions: String,
    status: String,
    matches: String,
    candidates: String,
    excluded: String,
    warnings: Vec<String>,
    exclusion_log: Vec<String>,
    recommendations: Vec<String>,
}

impl ReportRow {
    fn from_report(report: &CaseReport) -> Self {
        let result = &report.result;
        Self {
            case_id: report.case_id.clone(),
            autocontrol: report.autocontrol.to_string(),
            reactions: report
                .reactions
                .iter()
                .map(|g| g.label())
                .collect::<Vec<_>>()
                .join(" "),
            status: result.status.label().to_string(),
            matches: result.antibody_names().join(" + "),
            candidates: join_antigens(&result.candidates),
            excluded: join_antigens(&result.excluded),
            warnings: result.warnings.clone(),
            exclusion_log: result.exclusion_log.clone(),
            recommendations: result.recommendations.clone(),
        }
    }
}

fn join_antigens(antigens: &[Antigen]) -> String {
    antigens
        .iter()
        .map(|a| a.symbol())
        .collect::<Vec<_>>()
        .join(" ")
}

const HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Antibody Identification Report</title>
    <style>
        body { font-family: Arial, sans-serif; margin: 40px; background-color: #f5f5f5; }
        .container { max-width: 1100px; margin: 0 auto; background-color: white; padding: 30px; border-radius: 10px; }
        h1, h2 { color: #7b1e1e; }
        table { width: 100%; border-collapse: collapse; margin: 12px 0; }
        th, td { border: 1px solid #ddd; padding: 8px; text-align: left; }
        th { background-color: #a83232; color: white; }
        .identified { background-color: #d4edda; }
        .ambiguous { background-color: #fff3cd; }
        .inconclusive { background-color: #e2e3e5; }
        .suspended { background-color: #f8d7da; }
    </style>
</head>
<body>
<div class="container">
    <h1>Antibody Identification Report</h1>
    <p>Generated on: {{ generated }}</p>
    <h2>Summary</h2>
    <table>
        <tr><th>Case</th><th>Autocontrol</th><th>Status</th><th>Identified</th><th>Candidates</th></tr>
        {% for row in rows %}
        <tr class="{{ row.css }}"><td>{{ row.case_id }}</td><td>{{ row.autocontrol }}</td><td>{{ row.status }}</td><td>{{ row.matches }}</td><td>{{ row.candidates }}</td></tr>
        {% endfor %}
    </table>
    {% for row in rows %}
    <h2>{{ row.case_id }}</h2>
    <p>Reactions (cells 1-11): {{ row.reactions }}</p>
    {% if row.recommendations %}<h3>Next steps</h3><ul>{% for r in row.recommendations %}<li>{{ r }}</li>{% endfor %}</ul>{% endif %}
    {% if row.warnings %}<h3>Warnings</h3><ul>{% for w in row.warnings %}<li>{{ w }}</li>{% endfor %}</ul>{% endif %}
    {% if row.exclusion_log %}<h3>Exclusion log</h3><ul>{% for l in row.exclusion_log %}<li>{{ l }}</li>{% endfor %}</ul>{% endif %}
    {% endfor %}
</div>
</body>
</html>
"#;

/// Report generator for analysis results
pub struct ReportGenerator {
    output_dir: PathBuf,
}

impl ReportGenerator {
    pub fn new(output_dir: &Path) -> Result<Self> {
        if !output_dir.exists() {
            fs::create_dir_all(output_dir).with_context(|| {
                format!("Failed to create output directory {}", output_dir.display())
            })?;
        }

        Ok(Self {
            output_dir: output_dir.to_path_buf(),
        })
    }

    /// Writes reports in the requested format(s) and returns the created paths
    pub fn generate(&self, reports: &[CaseReport], format: ReportFormat) -> Result<Vec<PathBuf>> {
        let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();
        let mut written = Vec::new();

        match format {
            ReportFormat::Text => written.push(self.generate_text_report(reports, &timestamp)?),
            ReportFormat::Html => written.push(self.generate_html_report(reports, &timestamp)?),
            ReportFormat::Csv => written.push(self.generate_table_report(reports, &timestamp, b',')?),
            ReportFormat::Json => written.push(self.generate_json_report(reports, &timestamp)?),
            ReportFormat::Tsv => {
                written.push(self.generate_table_report(reports, &timestamp, b'\t')?)
            }
            ReportFormat::All => {
                written.push(self.generate_text_report(reports, &timestamp)?);
                written.push(self.generate_html_report(reports, &timestamp)?);
                written.push(self.generate_table_report(reports, &timestamp, b',')?);
                written.push(self.generate_json_report(reports, &timestamp)?);
                written.push(self.generate_table_report(reports, &timestamp, b'\t')?);
            }
        }

        Ok(written)
    }

    fn generate_text_report(&self, reports: &[CaseReport], timestamp: &str) -> Result<PathBuf> {
        let filename = self.output_dir.join(format!("report_{}.txt", timestamp));

        let content = reports
            .iter()
            .map(render_text)
            .collect::<Vec<_>>()
            .join("\n");
        fs::write(&filename, content)
            .with_context(|| format!("Failed to write text report to {}", filename.display()))?;

        Ok(filename)
    }

    fn generate_html_report(&self, reports: &[CaseReport], timestamp: &str) -> Result<PathBuf> {
        let filename = self.output_dir.join(format!("report_{}.html", timestamp));

        let html_content = self.create_html_content(reports)?;
        fs::write(&filename, html_content)
            .with_context(|| format!("Failed to write HTML report to {}", filename.display()))?;

        Ok(filename)
    }

    fn create_html_content(&self, reports: &[CaseReport]) -> Result<String> {
        let rows: Vec<serde_json::Value> = reports
            .iter()
            .map(|report| -> Result<serde_json::Value> {
                let mut value = serde_json::to_value(ReportRow::from_report(report))?;
                value["css"] = css_class(report.result.status).into();
                Ok(value)
            })
            .collect::<Result<_>>()?;

        let mut context = tera::Context::new();
        context.insert("generated", &Local::now().format("%Y-%m-%d %H:%M:%S").to_string());
        context.insert("rows", &rows);

        Tera::one_off(HTML_TEMPLATE, &context, true).context("Failed to render HTML report")
    }

    fn generate_table_report(
        &self,
        reports: &[CaseReport],
        timestamp: &str,
        delimiter: u8,
    ) -> Result<PathBuf> {
        let ext = if delimiter == b'\t' { "tsv" } else { "csv" };
        let filename = self
            .output_dir
            .join(format!("antibody_identification_{}.{}", timestamp, ext));

        let mut wtr = WriterBuilder::new()
            .delimiter(delimiter)
            .from_path(&filename)
            .with_context(|| format!("Failed to create writer for {}", filename.display()))?;

        wtr.write_record([
            "case_id",
            "autocontrol",
            "reactions",
            "status",
            "matches",
            "candidates",
            "excluded",
            "warnings",
        ])?;

        for report in reports {
            let row = ReportRow::from_report(report);
            wtr.write_record([
                row.case_id.as_str(),
                row.autocontrol.as_str(),
                row.reactions.as_str(),
                row.status.as_str(),
                row.matches.as_str(),
                row.candidates.as_str(),
                row.excluded.as_str(),
                row.warnings.join("; ").as_str(),
            ])?;
        }

        wtr.flush()?;
        Ok(filename)
    }

    fn generate_json_report(&self, reports: &[CaseReport], timestamp: &str) -> Result<PathBuf> {
        let filename = self.output_dir.join(format!("report_{}.json", timestamp));

        let json_content =
            to_string_pretty(reports).with_context(|| "Failed to serialize results to JSON")?;

        fs::write(&filename, json_content)
            .with_context(|| format!("Failed to write JSON report to {}", filename.display()))?;

        Ok(filename)
    }
}

fn css_class(status: AnalysisStatus) -> &'static str {
    match status {
        AnalysisStatus::Identified => "identified",
        AnalysisStatus::Ambiguous => "ambiguous",
        AnalysisStatus::Suspended => "suspended",
        AnalysisStatus::InconclusiveNoCandidates | AnalysisStatus::InconclusiveNoMatches => {
            "inconclusive"
        }
    }
}

/// Plain-text rendering of one case, also used for terminal output
pub fn render_text(report: &CaseReport) -> String {
    let result = &report.result;
    let mut out = String::new();

    out.push_str(&format!("Case: {}\n", report.case_id));
    out.push_str(&format!("Autocontrol: {}\n", report.autocontrol));
    out.push_str(&format!("Status: {}\n", result.status));

    if result.status.is_identified() {
        out.push_str(&format!(
            "Identified: {}\n",
            result.antibody_names().join(" + ")
        ));
    }
    if result.status != AnalysisStatus::Suspended {
        out.push_str(&format!(
            "Candidates: {}\n",
            join_antigens(&result.candidates)
        ));
    }

    for (title, lines) in [
        ("Next steps", &result.recommendations),
        ("Warnings", &result.warnings),
        ("Exclusion log", &result.exclusion_log),
    ] {
        if lines.is_empty() {
            continue;
        }
        out.push_str(&format!("{}:\n", title));
        for line in lines {
            out.push_str(&format!("  - {}\n", line));
        }
    }

    out
}
