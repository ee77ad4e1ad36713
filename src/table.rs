//! Plain-text tables for the `detect` report.

use std::borrow::Cow;
use std::fmt::Write as _;

use crate::section::{Classification, SectionKind};

const COLUMN_GAP: &str = "  ";

/// Left-aligned columns separated by two spaces, with a dashed rule under
/// the header. Line breaks inside cells are flattened.
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths = headers
        .iter()
        .map(|header| header.chars().count().max(3))
        .collect::<Vec<_>>();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(flatten(cell).chars().count());
        }
    }

    let mut output = String::new();
    let header_cells = headers.iter().map(|h| h.to_string()).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&header_cells, &widths));
    let rule = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&rule, &widths));
    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths));
    }
    output
}

fn format_row(cells: &[String], widths: &[usize]) -> String {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{:<width$}", flatten(cell), width = *width))
        .collect::<Vec<_>>()
        .join(COLUMN_GAP);
    line.trim_end().to_string()
}

fn flatten(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}

/// One line per classified sheet: winning section, score, acceptance and
/// the per-kind scores.
pub fn render_classifications(decisions: &[Classification]) -> String {
    let mut headers = vec!["sheet", "section", "score", "accepted"];
    headers.extend(SectionKind::ALL.iter().map(|kind| kind.as_str()));
    let rows = decisions
        .iter()
        .map(|decision| {
            let mut row = vec![
                decision.table.clone(),
                decision.kind.to_string(),
                decision.score.to_string(),
                if decision.accepted() { "yes" } else { "no" }.to_string(),
            ];
            row.extend(decision.scores.iter().map(|(_, score)| score.to_string()));
            row
        })
        .collect::<Vec<_>>();
    render_table(&headers, &rows)
}
