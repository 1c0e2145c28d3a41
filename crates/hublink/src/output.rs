use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// A command result that prints as one JSON object or as labelled rows.
pub trait Report: Serialize {
    fn rows(&self) -> Vec<(&'static str, String)>;
}

pub fn print_report<R: Report>(report: &R, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(report).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            for (label, value) in report.rows() {
                table.add_row(vec![label.to_string(), value]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let rows = report.rows();
            let width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or(0);
            for (label, value) in rows {
                println!("{:<width$}  {value}", format!("{label}:"), width = width + 1);
            }
        }
    }
}

/// Signed nanoseconds rendered as milliseconds with microsecond precision.
pub fn millis(nanos: i64) -> String {
    format!("{:.3}ms", nanos as f64 / 1_000_000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_keeps_sign_and_precision() {
        assert_eq!(millis(1_234_567), "1.235ms");
        assert_eq!(millis(-2_500_000), "-2.500ms");
        assert_eq!(millis(0), "0.000ms");
    }
}
