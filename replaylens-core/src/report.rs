// Report rendering for analysis row sets

use crate::attribution::AttributionRow;
use crate::batch::DirectoryErrorRow;
use crate::compare::{JsComparisonRow, ListenerSummary};
use crate::reconcile::ReconciliationRecord;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
    Csv,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            "csv" => Some(ReportFormat::Csv),
            _ => None,
        }
    }
}

/// A row that can be laid out as a table.
pub trait TabularRow: Serialize {
    fn columns() -> &'static [&'static str];
    fn cells(&self) -> Vec<String>;
}

impl TabularRow for ReconciliationRecord {
    fn columns() -> &'static [&'static str] {
        &[
            "directory",
            "url",
            "source",
            "annotation",
            "request_site",
            "page_site",
            "page_origin",
            "third_party",
        ]
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.directory.clone(),
            self.url.clone(),
            self.source.to_string(),
            self.annotation.clone(),
            self.request_site.clone(),
            self.page_site.clone(),
            self.page_origin.clone(),
            self.third_party.to_string(),
        ]
    }
}

impl TabularRow for JsComparisonRow {
    fn columns() -> &'static [&'static str] {
        &["origin", "call", "js", "graph", "har_js", "warc_js"]
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.origin.clone(),
            self.call.clone(),
            self.js.to_string(),
            self.graph.to_string(),
            self.har_js.to_string(),
            self.warc_js.to_string(),
        ]
    }
}

impl TabularRow for ListenerSummary {
    fn columns() -> &'static [&'static str] {
        &[
            "origin",
            "graph_handlers",
            "logged_inline",
            "logged_programmatic",
            "logged_on_attribute",
            "har_inline",
            "warc_inline",
        ]
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.origin.clone(),
            self.graph_handlers.to_string(),
            self.logged_inline.to_string(),
            self.logged_programmatic.to_string(),
            self.logged_on_attribute.to_string(),
            self.har_inline.to_string(),
            self.warc_inline.to_string(),
        ]
    }
}

impl TabularRow for AttributionRow {
    fn columns() -> &'static [&'static str] {
        &["origin", "url", "edge_type", "requester", "chain", "error"]
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.origin.clone(),
            self.url.clone(),
            self.edge_type.clone(),
            self.requester.clone(),
            self.chain.as_ref().map(|c| c.to_string()).unwrap_or_default(),
            self.error.clone().unwrap_or_default(),
        ]
    }
}

impl TabularRow for DirectoryErrorRow {
    fn columns() -> &'static [&'static str] {
        &["directory", "class", "error"]
    }

    fn cells(&self) -> Vec<String> {
        vec![self.directory.clone(), self.class.clone(), self.error.clone()]
    }
}

pub fn render_report<R: TabularRow>(
    format: ReportFormat,
    title: &str,
    rows: &[R],
    errors: &[DirectoryErrorRow],
) -> Result<String, serde_json::Error> {
    match format {
        ReportFormat::Text => Ok(generate_text_report(title, rows, errors)),
        ReportFormat::Json => generate_json_report(title, rows, errors),
        ReportFormat::Csv => Ok(generate_csv_report(rows)),
    }
}

pub fn generate_text_report<R: TabularRow>(title: &str, rows: &[R], errors: &[DirectoryErrorRow]) -> String {
    let mut report = String::new();

    report.push_str(RULE);
    report.push_str(&format!("  {}\n", title.to_uppercase()));
    report.push_str(RULE);
    report.push('\n');
    report.push_str(&format!("Rows:         {}\n", rows.len()));
    report.push_str(&format!("Failed dirs:  {}\n\n", errors.len()));

    if !rows.is_empty() {
        report.push_str(&render_table(R::columns(), rows.iter().map(|r| r.cells())));
        report.push('\n');
    }

    if !errors.is_empty() {
        report.push_str(RULE);
        report.push_str("DIRECTORY ERRORS\n");
        report.push_str(RULE);
        report.push('\n');
        report.push_str(&render_table(
            DirectoryErrorRow::columns(),
            errors.iter().map(|e| e.cells()),
        ));
        report.push('\n');
    }

    report
}

pub fn generate_json_report<R: TabularRow>(
    title: &str,
    rows: &[R],
    errors: &[DirectoryErrorRow],
) -> Result<String, serde_json::Error> {
    let json_report = serde_json::json!({
        "report": {
            "metadata": {
                "generator": "Replaylens",
                "version": env!("CARGO_PKG_VERSION"),
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "title": title,
            },
            "summary": {
                "rows": rows.len(),
                "failed_directories": errors.len(),
            },
            "rows": rows,
            "errors": errors,
        }
    });

    serde_json::to_string_pretty(&json_report)
}

pub fn generate_csv_report<R: TabularRow>(rows: &[R]) -> String {
    let mut out = String::new();
    out.push_str(&csv_line(R::columns().iter().map(|c| c.to_string())));
    for row in rows {
        out.push_str(&csv_line(row.cells().into_iter()));
    }
    out
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

fn csv_line(cells: impl Iterator<Item = String>) -> String {
    let mut line = cells.map(|c| csv_escape(&c)).collect::<Vec<_>>().join(",");
    line.push('\n');
    line
}

fn csv_escape(cell: &str) -> String {
    if cell.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

fn render_table(columns: &[&str], rows: impl Iterator<Item = Vec<String>>) -> String {
    let rows: Vec<Vec<String>> = rows.collect();
    let mut widths: Vec<usize> = columns.iter().map(|c| c.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }

    let format_row = |cells: Vec<String>| -> String {
        let line = cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<width$}", c, width = *w))
            .collect::<Vec<_>>()
            .join("  ");
        format!("{}\n", line.trim_end())
    };

    let mut table = format_row(columns.iter().map(|c| c.to_string()).collect());
    table.push_str(&format_row(widths.iter().map(|w| "─".repeat(*w)).collect()));
    for row in rows {
        table.push_str(&format_row(row));
    }
    table
}
