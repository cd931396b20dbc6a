/*============================================================
  Project: apkd
  Module: apkd::render
  ------------------------------------------------------------
  Purpose:
    Present batch reports as terminal tables and drive live
    progress bars for in-flight downloads.

  Security / Safety Notes:
    Output only; download URLs are never rendered.

  Dependencies:
    comfy-table for tables, indicatif for progress bars.

  Operational Scope:
    Used by the binary entry point after and during a batch.

  Revision History:
    2026-09-09  Added table rendering and progress bars.
    2026-10-16  Exposed the bar region to the logger.
  ------------------------------------------------------------
  Principles Observed:
    - Rows arrive pre-sorted; rendering never reorders
    - Unresolved packages are shown, never hidden
============================================================*/

use std::time::Duration;

use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{ContentArrangement, Table};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::app::AppVersion;
use crate::download::ProgressObserver;
use crate::runner::{BatchReport, Operation, ProgressFactory, Row};

const NOT_AVAILABLE: &str = "N/A";

/// Render `report` as the table matching `operation`.
pub fn render_report(report: &BatchReport, operation: &Operation) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);

    match operation {
        Operation::ListVersions { .. } => {
            table.set_header(vec![
                "Package",
                "Source",
                "Version name",
                "Version code",
                "Update date",
                "Size",
            ]);
        }
        Operation::ListDevelopers => {
            table.set_header(vec!["Package", "Source", "Developer ID"]);
        }
        Operation::Download { .. } => {
            table.set_header(vec!["Package", "Source", "Version code", "File", "Size"]);
        }
    }

    for row in &report.rows {
        table.add_row(cells(row, operation));
    }
    table.to_string()
}

fn cells(row: &Row, operation: &Operation) -> Vec<String> {
    match row {
        Row::Version {
            package,
            source,
            name,
            code,
            update_date,
            size,
        } => vec![
            package.clone(),
            source.to_string(),
            name.clone(),
            code.to_string(),
            update_date.clone().unwrap_or_else(|| NOT_AVAILABLE.into()),
            format_size(*size),
        ],
        Row::Developer {
            package,
            source,
            developer,
        } => vec![package.clone(), source.to_string(), developer.clone()],
        Row::Downloaded {
            package,
            source,
            code,
            path,
            bytes,
        } => vec![
            package.clone(),
            source.to_string(),
            code.to_string(),
            path.display().to_string(),
            format_size(*bytes),
        ],
        Row::Unavailable { package, .. } => {
            let width = match operation {
                Operation::ListVersions { .. } => 6,
                Operation::ListDevelopers => 3,
                Operation::Download { .. } => 5,
            };
            let mut cells = vec![package.clone()];
            cells.resize(width, NOT_AVAILABLE.to_string());
            cells
        }
    }
}

/// Human size in MiB; unknown (zero) sizes render as `N/A`.
pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return NOT_AVAILABLE.to_string();
    }
    format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
}

/// Progress bars stacked in one terminal region, one per download.
pub struct TerminalProgress {
    bars: MultiProgress,
}

impl TerminalProgress {
    pub fn new() -> Self {
        Self {
            bars: MultiProgress::new(),
        }
    }

    /// Handle to the bar region, for printing above it.
    pub fn bars(&self) -> MultiProgress {
        self.bars.clone()
    }
}

impl Default for TerminalProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressFactory for TerminalProgress {
    fn observer(&self, package: &str, version: &AppVersion) -> Box<dyn ProgressObserver> {
        let bar = self.bars.add(ProgressBar::new(version.size));
        bar.set_style(byte_style());
        bar.set_message(format!("{package} ver. {} ({})", version.code, version.source));
        bar.enable_steady_tick(Duration::from_millis(120));
        Box::new(BarObserver { bar })
    }
}

struct BarObserver {
    bar: ProgressBar,
}

impl ProgressObserver for BarObserver {
    fn on_start(&mut self, total: u64) {
        self.bar.set_length(total);
    }

    fn on_chunk(&mut self, written: u64) {
        self.bar.set_position(written);
    }

    fn on_end(&mut self, written: u64) {
        self.bar.set_position(written);
        self.bar.finish();
    }
}

impl Drop for BarObserver {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.abandon();
        }
    }
}

fn byte_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{msg} [{bar:30.cyan/dim}] {bytes}/{total_bytes} {binary_bytes_per_sec} ({eta})",
    )
    .map(|style| style.progress_chars("━╸━"))
    .unwrap_or_else(|_| ProgressStyle::default_bar())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::SourceId;
    use crate::task::{Task, TaskState};
    use crate::runner::TaskOutcome;

    fn report(rows: Vec<Row>) -> BatchReport {
        BatchReport {
            rows,
            outcomes: vec![TaskOutcome {
                task: Task::newest("org.example"),
                state: TaskState::Done,
                error: None,
            }],
            peak_in_flight: 1,
        }
    }

    #[test]
    fn version_table_includes_unavailable_rows() {
        let rows = vec![
            Row::Version {
                package: "org.example".into(),
                source: SourceId::new("F-Droid"),
                name: "1.4.2".into(),
                code: 142,
                update_date: Some("2026-01-03".into()),
                size: 3 * 1024 * 1024,
            },
            Row::Unavailable {
                package: "org.missing".into(),
                reason: "Package `org.missing` not found".into(),
            },
        ];
        let rendered = render_report(
            &report(rows),
            &Operation::ListVersions {
                versions_limit: None,
            },
        );
        assert!(rendered.contains("Version code"));
        assert!(rendered.contains("F-Droid"));
        assert!(rendered.contains("3.00 MB"));
        assert!(rendered.contains("org.missing"));
        assert!(rendered.contains("N/A"));
    }

    #[test]
    fn unknown_size_is_not_available() {
        assert_eq!(format_size(0), "N/A");
        assert_eq!(format_size(1536 * 1024), "1.50 MB");
    }
}
