//! Plain-text tables for console output.
//!
//! Columns whose cells are all numeric are right-aligned so counts and rates
//! line up.

use std::borrow::Cow;
use std::fmt::Write as _;

pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let column_count = headers.len();
    let mut widths = headers.iter().map(|h| display_width(h)).collect::<Vec<_>>();
    let mut numeric = vec![!rows.is_empty(); column_count];

    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(display_width(cell));
            numeric[idx] &= is_numeric(cell);
        }
    }

    for width in &mut widths {
        *width = (*width).max(3);
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(headers, &widths, &numeric));

    let separator = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&separator, &widths, &numeric));

    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths, &numeric));
    }

    output
}

pub fn print_table(headers: &[String], rows: &[Vec<String>]) {
    print!("{}", render_table(headers, rows));
}

fn format_row(values: &[String], widths: &[usize], numeric: &[bool]) -> String {
    let mut cells = Vec::with_capacity(values.len());
    for (idx, value) in values.iter().enumerate().take(widths.len()) {
        let sanitized = sanitize_cell(value);
        let padding = " ".repeat(widths[idx].saturating_sub(display_width(&sanitized)));
        let cell = if numeric[idx] {
            format!("{padding}{sanitized}")
        } else {
            format!("{sanitized}{padding}")
        };
        cells.push(cell);
    }
    cells.join("  ").trim_end().to_string()
}

fn is_numeric(value: &str) -> bool {
    value.trim().parse::<f64>().is_ok()
}

fn display_width(value: &str) -> usize {
    value.chars().count()
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}
