use anyhow::{Context, Result};
use regex::Regex;

use crate::api::WikiWriteApi;
use crate::bots::{announce, load_page};
use crate::confirm::Editor;
use crate::prompt::Prompter;

/// Point links at `src` to `dest`, keeping what readers see:
/// `[[src]]` becomes `[[dest|src]]`, `[[src|dest]]` becomes `[[dest]]` and
/// `[[src|label]]` becomes `[[dest|label]]`.
pub fn relink(text: &str, src: &str, dest: &str) -> Result<String> {
    let src_pattern = regex::escape(src);
    let dest_pattern = regex::escape(dest);
    let dest_literal = dest.replace('$', "$$");

    let rules = [
        (format!(r"\[\[({src_pattern})\]\]"), format!("[[{dest_literal}|${{1}}]]")),
        (
            format!(r"\[\[{src_pattern}\|({dest_pattern})\]\]"),
            "[[${1}]]".to_string(),
        ),
        (
            format!(r"\[\[{src_pattern}\|([^\]|]+)\]\]"),
            format!("[[{dest_literal}|${{1}}]]"),
        ),
    ];

    let mut contents = text.to_string();
    for (pattern, replacement) in rules {
        let regex = Regex::new(&pattern).with_context(|| format!("failed to build link rule {pattern}"))?;
        contents = regex
            .replace_all(&contents, replacement.as_str())
            .into_owned();
    }
    Ok(contents)
}

/// Rewrite links on a single page after `src` was moved to `dest`.
pub fn run<A, P>(editor: &mut Editor<'_, A, P>, title: &str, src: &str, dest: &str) -> Result<()>
where
    A: WikiWriteApi + ?Sized,
    P: Prompter,
{
    let Some(page) = load_page(editor, title) else {
        return Ok(());
    };
    announce(editor, &page.info);
    let proposed = relink(&page.content, src, dest)?;
    editor.review(&page, proposed);
    Ok(())
}
