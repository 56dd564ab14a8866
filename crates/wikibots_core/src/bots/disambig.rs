use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::{Captures, Regex};

use crate::api::WikiWriteApi;
use crate::bots::load_page;
use crate::confirm::Editor;
use crate::console;
use crate::page::{PageInfo, RedirectFilter};
use crate::prompt::Prompter;
use crate::source::redirect_variants;

static FIRST_LINK_IN_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[^\[\n]*\[\[([^\]|]+)[^\]]*\]\]").expect("first link regex is valid")
});

/// Candidate link targets offered in the menu. Entry 0 is a placeholder
/// meaning "leave this page alone".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkOptions {
    defaults: Vec<String>,
    links: Vec<String>,
}

impl LinkOptions {
    /// First link of every line of the disambiguation page, skipping file
    /// and category links.
    pub fn from_page(page_title: &str, content: &str) -> Self {
        let mut defaults = vec![format!("{page_title}?")];
        defaults.extend(
            FIRST_LINK_IN_LINE
                .captures_iter(content)
                .map(|caps| caps[1].trim().to_string())
                .filter(|target| !target.starts_with("File:") && !target.starts_with("Category:")),
        );
        Self {
            links: defaults.clone(),
            defaults,
        }
    }

    pub fn links(&self) -> &[String] {
        &self.links
    }

    pub fn reset(&mut self) {
        self.links = self.defaults.clone();
    }

    fn edit(&mut self, op: EditOp, index: usize, text: Option<String>) {
        match (op, text) {
            (EditOp::Delete, _) => {
                self.links.remove(index);
            }
            (EditOp::Substitute, Some(text)) => self.links[index] = text,
            (EditOp::Insert, Some(text)) => self.links.insert(index, text),
            (EditOp::Append, Some(text)) => self.links.insert(index + 1, text),
            (_, None) => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOp {
    Insert,
    Append,
    Delete,
    Substitute,
}

impl EditOp {
    fn parse(input: &str) -> Option<Self> {
        match input {
            "i" => Some(Self::Insert),
            "a" => Some(Self::Append),
            "d" => Some(Self::Delete),
            "s" => Some(Self::Substitute),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Insert => "i",
            Self::Append => "a",
            Self::Delete => "d",
            Self::Substitute => "s",
        }
    }
}

/// What the operator picked for one backlink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Triage {
    Relink(String),
    Unlink,
    Skip,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Menu {
    Main { show: bool },
    EditMode { show: bool },
    EditPosition { op: EditOp, show: bool },
}

fn print_links(links: &[String]) {
    for (index, link) in links.iter().enumerate() {
        console::print_option(&index.to_string(), link);
    }
}

/// Run the menu until the operator settles on an action for the page.
pub fn triage<A, P>(editor: &mut Editor<'_, A, P>, options: &mut LinkOptions) -> Triage
where
    A: WikiWriteApi + ?Sized,
    P: Prompter,
{
    let mut menu = Menu::Main { show: true };
    loop {
        menu = match menu {
            Menu::Main { show } => {
                if show {
                    print_links(options.links());
                    console::print_option("-", "Remove links");
                    console::print_option("e", "Edit link options");
                    console::print_option("q", "Quit");
                }
                let Some(input) = editor.ask("--> ") else {
                    return Triage::Quit;
                };
                let choice = input.trim().to_lowercase();
                match choice.as_str() {
                    "-" => return Triage::Unlink,
                    "e" => Menu::EditMode { show: true },
                    "q" => return Triage::Quit,
                    _ => match choice.parse::<usize>() {
                        Ok(0) => return Triage::Skip,
                        Ok(index) if index < options.links().len() => {
                            return Triage::Relink(options.links()[index].clone());
                        }
                        _ => {
                            console::invalid(&choice);
                            Menu::Main { show: false }
                        }
                    },
                }
            }
            Menu::EditMode { show } => {
                if show {
                    console::print_option("i", "Insert");
                    console::print_option("a", "Append");
                    console::print_option("d", "Delete");
                    console::print_option("s", "Substitute");
                    console::print_option("r", "Reset");
                    console::print_option("q", "Back");
                }
                let Some(input) = editor.ask("e > ") else {
                    return Triage::Quit;
                };
                let choice = input.trim().to_lowercase();
                match choice.as_str() {
                    "r" => {
                        options.reset();
                        println!("Resetting to default... Done.");
                        Menu::Main { show: true }
                    }
                    "q" => Menu::Main { show: true },
                    other => match EditOp::parse(other) {
                        Some(op) => Menu::EditPosition { op, show: true },
                        None => {
                            console::invalid(other);
                            Menu::EditMode { show: false }
                        }
                    },
                }
            }
            Menu::EditPosition { op, show } => {
                if show {
                    print_links(options.links());
                    console::print_option("q", "Back");
                }
                let Some(input) = editor.ask(&format!("{} > ", op.key())) else {
                    return Triage::Quit;
                };
                let choice = input.trim().to_lowercase();
                if choice == "q" {
                    Menu::Main { show: true }
                } else {
                    match choice.parse::<usize>() {
                        Ok(index)
                            if index < options.links().len()
                                && !(op == EditOp::Delete && index == 0) =>
                        {
                            let text = if op == EditOp::Delete {
                                None
                            } else {
                                let Some(text) =
                                    editor.ask(&format!("{}{index} > ", op.key()))
                                else {
                                    return Triage::Quit;
                                };
                                Some(text.trim().to_string())
                            };
                            options.edit(op, index, text);
                            Menu::EditPosition { op, show: true }
                        }
                        _ => {
                            console::invalid(&choice);
                            Menu::EditPosition { op, show: false }
                        }
                    }
                }
            }
        };
    }
}

/// Rewrite every link to one of `variants`. With a target the link points
/// there and keeps its visible text; without one the link becomes plain text.
pub fn reroute(text: &str, variants: &[String], target: Option<&str>) -> Result<String> {
    if variants.is_empty() {
        return Ok(text.to_string());
    }
    let alternatives = variants
        .iter()
        .map(|variant| regex::escape(variant))
        .collect::<Vec<_>>()
        .join("|");
    let pattern = format!(r"\[\[({alternatives})(?:\|([^\]]*))?\]\]");
    let regex = Regex::new(&pattern).context("failed to build disambiguation link pattern")?;

    Ok(regex
        .replace_all(text, |caps: &Captures<'_>| {
            let label = caps.get(2).map_or(&caps[1], |label| label.as_str());
            match target {
                Some(target) if label == target => format!("[[{target}]]"),
                Some(target) => format!("[[{target}|{label}]]"),
                None => label.to_string(),
            }
        })
        .into_owned())
}

/// Walk the non-redirect backlinks of a disambiguation page and let the
/// operator point each at the intended article.
pub fn run<A, P>(editor: &mut Editor<'_, A, P>, title: &str) -> Result<()>
where
    A: WikiWriteApi + ?Sized,
    P: Prompter,
{
    let api = editor.api();
    let (origin, variants) = redirect_variants(api, title)?;
    let origin_text = api
        .page_text(&origin.title)
        .with_context(|| format!("failed to read {}", origin.title))?;
    let mut options = LinkOptions::from_page(origin.page_title(), &origin_text.content);
    let backlinks = api.backlinks(&origin.title, RedirectFilter::NonRedirects)?;

    for info in backlinks {
        if editor.should_stop() {
            break;
        }
        triage_page(editor, &info, &variants, &mut options)?;
    }
    Ok(())
}

fn triage_page<A, P>(
    editor: &mut Editor<'_, A, P>,
    info: &PageInfo,
    variants: &[String],
    options: &mut LinkOptions,
) -> Result<()>
where
    A: WikiWriteApi + ?Sized,
    P: Prompter,
{
    let Some(page) = load_page(editor, &info.title) else {
        return Ok(());
    };
    console::page_heading(&page.info);
    println!();

    match triage(editor, options) {
        Triage::Relink(target) => {
            let proposed = reroute(&page.content, variants, Some(&target))?;
            editor.review(&page, proposed);
        }
        Triage::Unlink => {
            let proposed = reroute(&page.content, variants, None)?;
            editor.review(&page, proposed);
        }
        Triage::Skip => {
            editor.skip();
        }
        Triage::Quit => {
            editor.quit();
        }
    }
    Ok(())
}
