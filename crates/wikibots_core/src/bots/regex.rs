use anyhow::{Context, Result};
use regex::Regex;

use crate::api::WikiWriteApi;
use crate::bots::{announce, load_page};
use crate::confirm::Editor;
use crate::page::{NS_MAIN, NS_TEMPLATE, template_title};
use crate::prompt::Prompter;
use crate::source::PageSource;

/// A compiled pattern with its replacement template.
#[derive(Debug, Clone)]
pub struct RegexRule {
    regex: Regex,
    replacement: String,
}

impl RegexRule {
    /// `replacement` uses `\1` / `\g<name>` group references. Lookaround
    /// and backreferences in `pattern` are rejected.
    pub fn new(pattern: &str, replacement: &str) -> Result<Self> {
        let regex = Regex::new(pattern).with_context(|| {
            format!("invalid regex (lookaround and backreferences are not supported): {pattern}")
        })?;
        Ok(Self {
            regex,
            replacement: backslash_replacement(replacement),
        })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    pub fn apply(&self, text: &str) -> String {
        self.regex
            .replace_all(text, self.replacement.as_str())
            .into_owned()
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

/// Rewrite a backslash-style replacement into `regex` expansion syntax.
pub fn backslash_replacement(replacement: &str) -> String {
    let mut out = String::with_capacity(replacement.len() + 8);
    let mut chars = replacement.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '$' => out.push_str("$$"),
            '\\' => match chars.peek().copied() {
                Some(digit) if digit.is_ascii_digit() => {
                    let mut group = String::new();
                    while let Some(next) = chars.peek().copied()
                        && next.is_ascii_digit()
                        && group.len() < 2
                    {
                        group.push(next);
                        chars.next();
                    }
                    out.push_str(&format!("${{{group}}}"));
                }
                Some('g') => {
                    chars.next();
                    if chars.peek() == Some(&'<') {
                        chars.next();
                        let name: String = chars.by_ref().take_while(|c| *c != '>').collect();
                        out.push_str(&format!("${{{name}}}"));
                    } else {
                        out.push_str("\\g");
                    }
                }
                Some('\\') => {
                    chars.next();
                    out.push('\\');
                }
                Some('n') => {
                    chars.next();
                    out.push('\n');
                }
                Some('t') => {
                    chars.next();
                    out.push('\t');
                }
                _ => out.push('\\'),
            },
            other => out.push(other),
        }
    }
    out
}

#[derive(Debug, Clone)]
pub struct RegexOptions {
    /// Template name without namespace.
    pub template: String,
    pub rule: RegexRule,
}

/// Offer the substitution on every article or template that transcludes
/// `Template:<template>` and matches the pattern.
pub fn run<A, P>(editor: &mut Editor<'_, A, P>, options: &RegexOptions) -> Result<()>
where
    A: WikiWriteApi + ?Sized,
    P: Prompter,
{
    editor.set_keywords([format!("{{{{{}", options.template)]);
    let pages = PageSource::EmbeddedIn(template_title(&options.template)).fetch(editor.api())?;

    for info in pages {
        if editor.should_stop() {
            break;
        }
        if info.namespace != NS_MAIN && info.namespace != NS_TEMPLATE {
            editor.skip();
            continue;
        }
        let Some(page) = load_page(editor, &info.title) else {
            continue;
        };
        if !options.rule.is_match(&page.content) {
            editor.skip();
            continue;
        }
        announce(editor, &page.info);
        let proposed = options.rule.apply(&page.content);
        editor.review(&page, proposed);
    }
    Ok(())
}
