use std::io::{self, Write};

use colored::{Color, Colorize};
use similar::{ChangeTag, TextDiff};

use crate::page::PageInfo;
use crate::stats::RunStats;

/// Title in cyan, size in green, on a line of its own.
pub fn page_heading(info: &PageInfo) {
    let length = info
        .length
        .map_or_else(|| "new".to_string(), |length| format!("{length} bytes"));
    println!("\n{} ({})", info.title.cyan().bold(), length.green());
}

/// Single-character progress mark for unattended runs.
pub fn progress(mark: char) {
    let mut stdout = io::stdout();
    let _ = write!(stdout, "{mark}");
    let _ = stdout.flush();
}

pub fn keyword_lines<'t>(text: &'t str, keywords: &[String]) -> Vec<&'t str> {
    text.lines()
        .filter(|line| keywords.iter().any(|keyword| line.contains(keyword.as_str())))
        .collect()
}

/// Print every line that mentions one of `keywords`, marked with `prefix`.
pub fn preview_lines(text: &str, keywords: &[String], prefix: &str, color: Color) {
    for line in keyword_lines(text, keywords) {
        println!("{}", format!("{prefix} {line}").color(color));
    }
}

pub fn print_diff(old: &str, new: &str) {
    let diff = TextDiff::from_lines(old, new);
    for group in diff.grouped_ops(2) {
        println!("{}", "@@".cyan());
        for op in group {
            for change in diff.iter_changes(&op) {
                let line = change.to_string_lossy();
                let line = line.trim_end_matches('\n');
                match change.tag() {
                    ChangeTag::Delete => println!("{}", format!("-{line}").red()),
                    ChangeTag::Insert => println!("{}", format!("+{line}").green()),
                    ChangeTag::Equal => println!(" {line}"),
                }
            }
        }
    }
}

/// Search snippets come back as HTML with `searchmatch` spans around hits.
pub fn highlight_snippet(snippet: &str) -> String {
    const OPEN: &str = "<span class=\"searchmatch\">";
    const CLOSE: &str = "</span>";

    let mut out = String::with_capacity(snippet.len());
    let mut rest = snippet;
    while let Some(start) = rest.find(OPEN) {
        out.push_str(&unescape_html(&rest[..start]));
        let after = &rest[start + OPEN.len()..];
        let end = after.find(CLOSE).unwrap_or(after.len());
        out.push_str(&unescape_html(&after[..end]).magenta().to_string());
        rest = after.get(end + CLOSE.len()..).unwrap_or("");
    }
    out.push_str(&unescape_html(rest));
    out
}

fn unescape_html(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&#039;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

pub fn print_stats(stats: &RunStats) {
    println!("\n{}", stats.to_string().red());
}

pub fn print_option(key: &str, label: &str) {
    println!("{} {label}", format!("[{key}]").yellow());
}

pub fn invalid(choice: &str) {
    println!("{} {choice:?}", "Invalid operation".red());
}
