use std::io::{self, IsTerminal, Write};
use std::time::Duration;

use anyhow::Result;
use calltree_core::model::{CallTree, FunctionSummary};
use calltree_core::views::{format_percentage, percentage};
use calltree_protocol::{CallTreeSettings, RowKind, ViewRow};

const HIGHLIGHT_ON: &str = "\x1b[7m";
const HIGHLIGHT_OFF: &str = "\x1b[0m";

/// Human-readable duration with a unit that keeps three significant digits.
fn format_duration(d: Duration) -> String {
    let us = d.as_secs_f64() * 1e6;
    if us >= 1e6 {
        format!("{:.2}s", us / 1e6)
    } else if us >= 1e3 {
        format!("{:.2}ms", us / 1e3)
    } else {
        format!("{us:.0}µs")
    }
}

fn row_name(row: &ViewRow, highlight: bool) -> String {
    if row.kind == RowKind::Placeholder {
        return "…".to_owned();
    }
    let name = row.name.as_str();
    let Some((before, inside, after)) = row.search_match.and_then(|span| span.split(name)) else {
        return name.to_owned();
    };
    if highlight {
        format!("{before}{HIGHLIGHT_ON}{inside}{HIGHLIGHT_OFF}{after}")
    } else {
        format!("{before}[{inside}]{after}")
    }
}

fn format_row(row: &ViewRow, highlight: bool) -> String {
    let indent = "  ".repeat(row.depth as usize);
    let fold = match (row.has_children, row.is_expanded) {
        (false, _) => ' ',
        (true, true) => '-',
        (true, false) => '+',
    };
    let mark = if row.is_marked { '*' } else { ' ' };
    let module = match (&row.module, row.kind) {
        (Some(module), RowKind::CallTree | RowKind::Caller | RowKind::Callee) => {
            format!("  ({module})")
        }
        _ => String::new(),
    };
    let numbers = match row.kind {
        RowKind::Placeholder => format!("{:>8} {:>8} {:>10}", "", "", ""),
        RowKind::Header | RowKind::CallTree | RowKind::Caller | RowKind::Callee => format!(
            "{:>8} {:>8} {:>10}",
            format_percentage(row.percentage),
            format_percentage(row.exclusive_percentage),
            format_duration(row.weight),
        ),
    };
    format!(
        "{numbers} {mark}{indent}{fold} {}{module}",
        row_name(row, highlight)
    )
}

/// Write one line per row to stdout.
pub fn write_rows(rows: &[ViewRow]) -> Result<()> {
    let stdout = io::stdout();
    let highlight = stdout.is_terminal();
    let mut out = stdout.lock();
    writeln!(out, "{:>8} {:>8} {:>10}  Name", "Total", "Self", "Time")?;
    for row in rows {
        writeln!(out, "{}", format_row(row, highlight))?;
    }
    Ok(())
}

pub fn write_status(status: &str) -> Result<()> {
    writeln!(io::stdout().lock(), "\nSearch: {status}")?;
    Ok(())
}

/// Write the `limit` heaviest functions by exclusive time.
pub fn write_top_functions(
    calls: &CallTree,
    summaries: &[FunctionSummary],
    limit: usize,
    settings: &CallTreeSettings,
) -> Result<()> {
    let total = calls.total_weight();
    let mut out = io::stdout().lock();
    writeln!(out, "{:>8} {:>10} {:>10}  Function", "Self", "Self time", "Total")?;
    for summary in summaries.iter().take(limit) {
        let name = calls
            .function(summary.function)
            .map(|f| f.display_name(settings.prepend_module).to_string())
            .unwrap_or_default();
        writeln!(
            out,
            "{:>8} {:>10} {:>10}  {name}",
            format_percentage(percentage(summary.exclusive_weight, total)),
            format_duration(summary.exclusive_weight),
            format_duration(summary.weight),
        )?;
    }
    Ok(())
}
