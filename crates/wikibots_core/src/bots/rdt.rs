//! Offline conversion of `{{BS-table}}` route diagram rows to `{{Routemap}}`.

use std::io::{BufRead, Write};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

static BS_ROW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\{\{BS([0-9]*)$").expect("BS row regex is valid"));

/// Convert one `{{BSn|icon...|param...}}` row. `n` defaults to one icon
/// cell. Lines that are not BS rows come back as they were.
pub fn convert_row(line: &str) -> String {
    let body = line.strip_suffix("}}").unwrap_or(line);
    let mut cells = body.split('|');
    let head = cells.next().unwrap_or_default();
    let Some(caps) = BS_ROW.captures(head) else {
        return line.to_string();
    };
    let width = caps[1].parse::<usize>().unwrap_or(1);

    let cells: Vec<&str> = cells.collect();
    let (icons, params) = cells.split_at(width.min(cells.len()));
    let mut icons = icons.to_vec();
    let mut params = params.to_vec();

    while params.last() == Some(&"") {
        params.pop();
    }
    // Blank icon cells are only dropped in pairs from both edges.
    while icons.first() == Some(&"") && icons.last() == Some(&"") {
        icons.remove(0);
        icons.pop();
    }

    let icon_cell = icons.join("\\");
    std::iter::once(icon_cell.as_str())
        .chain(params)
        // A blank cell would turn `~~~~` into a signature.
        .map(|cell| if cell.is_empty() { " " } else { cell })
        .collect::<Vec<_>>()
        .join("~~")
}

/// Filter a whole diagram, one row per line, wrapped in `{{Routemap|map=...}}`.
pub fn convert<R, W>(input: R, mut output: W) -> Result<()>
where
    R: BufRead,
    W: Write,
{
    writeln!(output, "{{{{Routemap|map=")?;
    for line in input.lines() {
        let line = line.context("failed to read route diagram")?;
        writeln!(output, "{}", convert_row(line.trim()))?;
    }
    writeln!(output, "}}}}")?;
    output.flush().context("failed to write route diagram")?;
    Ok(())
}
