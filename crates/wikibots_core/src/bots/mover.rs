use std::sync::LazyLock;

use anyhow::{Context, Result, bail};
use colored::Colorize;
use regex::{NoExpand, Regex};

use crate::api::WikiWriteApi;
use crate::bots::{announce, load_page};
use crate::confirm::{Editor, Outcome};
use crate::page::{PageInfo, RedirectFilter};
use crate::prompt::Prompter;
use crate::source::dialects;

pub const DELETION_REQUEST: &str = "{{d|R3|G10}}";

static PARENTHETICAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\S+) \((\S+)\S\)$").expect("parenthetical regex is valid"));

/// Earlier spellings of `corrected`, each with one more character cut from
/// the end of the parenthetical.
pub fn trailing_candidates(corrected: &str) -> Result<Vec<String>> {
    if !PARENTHETICAL.is_match(corrected) {
        bail!("the title {corrected} is not parenthetical");
    }
    let mut candidates = Vec::new();
    let mut current = corrected.to_string();
    loop {
        let shorter = PARENTHETICAL.replace(&current, "${1} (${2})").into_owned();
        if shorter == current {
            return Ok(candidates);
        }
        candidates.push(shorter.clone());
        current = shorter;
    }
}

/// Matches the source title in either spelling, spaces or underscores.
pub fn link_pattern(names: &[String]) -> Result<Regex> {
    let alternatives: Vec<String> = names
        .iter()
        .flat_map(|name| [regex::escape(&name.replace(' ', "_")), regex::escape(name)])
        .collect();
    Regex::new(&format!(r"\b({})", alternatives.join("|"))).context("invalid link pattern")
}

/// Move the page found under an earlier spelling of `corrected`, rewrite
/// the links to it and request deletion of the leftover redirect.
pub fn run<A, P>(editor: &mut Editor<'_, A, P>, corrected: &str) -> Result<()>
where
    A: WikiWriteApi + ?Sized,
    P: Prompter,
{
    let Some(source) = inspect(editor, corrected)? else {
        return Ok(());
    };
    if editor.should_stop() {
        return Ok(());
    }
    move_links(editor, &source.title, corrected)?;
    if editor.should_stop() {
        return Ok(());
    }
    request_deletion(editor, &source.title);
    Ok(())
}

/// Find the source page and move it unless the redirect state says the
/// move is already done or someone else got there first.
fn inspect<A, P>(editor: &mut Editor<'_, A, P>, corrected: &str) -> Result<Option<PageInfo>>
where
    A: WikiWriteApi + ?Sized,
    P: Prompter,
{
    let api = editor.api();
    let candidates = trailing_candidates(corrected)?;
    let target = api.page_info(corrected)?;

    let mut source = None;
    for candidate in &candidates {
        let info = api.page_info(candidate)?;
        if info.exists {
            source = Some(info);
            break;
        }
    }
    let Some(source) = source else {
        println!("Failed to inspect the incorrect previous title.");
        editor.skip();
        return Ok(None);
    };
    println!("{}", format!("{} -> {}", source.title, target.title).cyan());

    if target.exists && !target.redirect {
        let source_target = if source.redirect {
            api.redirect_target(&source.title)?
        } else {
            None
        };
        if source_target.as_deref() == Some(target.title.as_str()) {
            println!("The page is already moved to the target name.");
            return Ok(Some(source));
        }
        if source.redirect {
            println!("The source page redirects to somewhere else now!");
        } else {
            println!("Neither page is a redirect page!");
        }
        editor.skip();
        return Ok(None);
    }
    if target.redirect
        && api.redirect_target(&target.title)?.as_deref() != Some(source.title.as_str())
    {
        println!("The target page redirects to somewhere else now!");
        editor.skip();
        return Ok(None);
    }

    match editor.review_move(&source, &target.title) {
        Outcome::Saved => Ok(Some(source)),
        _ => Ok(None),
    }
}

fn move_links<A, P>(editor: &mut Editor<'_, A, P>, source: &str, dest: &str) -> Result<()>
where
    A: WikiWriteApi + ?Sized,
    P: Prompter,
{
    let api = editor.api();
    let names = dialects(api, source)?;
    let pattern = link_pattern(&names)?;
    let mut keywords: Vec<String> = names
        .iter()
        .flat_map(|name| [name.replace(' ', "_"), name.clone()])
        .collect();
    keywords.push(dest.to_string());
    editor.set_keywords(keywords);

    for info in api.backlinks(source, RedirectFilter::NonRedirects)? {
        if editor.should_stop() {
            return Ok(());
        }
        let Some(page) = load_page(editor, &info.title) else {
            continue;
        };
        let proposed = pattern.replace_all(&page.content, NoExpand(dest)).into_owned();
        announce(editor, &page.info);
        editor.review(&page, proposed);
    }

    let remaining: Vec<String> = api
        .backlinks(source, RedirectFilter::All)?
        .into_iter()
        .map(|info| info.title)
        .collect();
    if remaining.is_empty() {
        println!("Backlinks clear.");
    } else {
        println!("Backlinks left behind: {}", remaining.join(" "));
    }
    Ok(())
}

fn request_deletion<A, P>(editor: &mut Editor<'_, A, P>, source: &str)
where
    A: WikiWriteApi + ?Sized,
    P: Prompter,
{
    println!("{} -> {}", source.cyan(), "DELETE".red());
    editor.set_keywords(Vec::<String>::new());
    if let Some(page) = load_page(editor, source) {
        editor.review(&page, DELETION_REQUEST.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::{link_pattern, run, trailing_candidates};
    use crate::confirm::Mode;
    use crate::testing::{MockWiki, editor};

    #[test]
    fn candidates_drop_one_character_at_a_time() {
        assert_eq!(
            trailing_candidates("Foo (singer)").expect("candidates"),
            vec!["Foo (singe)", "Foo (sing)", "Foo (sin)", "Foo (si)", "Foo (s)"]
        );
        assert_eq!(
            trailing_candidates("甲 (歌手)").expect("candidates"),
            vec!["甲 (歌)"]
        );
        assert!(trailing_candidates("Foo bar (singer)").is_err());
        assert!(trailing_candidates("Foo").is_err());
    }

    #[test]
    fn link_pattern_accepts_underscores() {
        let pattern = link_pattern(&["Foo (singe)".to_string()]).expect("pattern");
        assert!(pattern.is_match("[[Foo_(singe)]]"));
        assert!(pattern.is_match("[[Foo (singe)|x]]"));
        assert!(!pattern.is_match("[[Foobar]]"));
    }

    #[test]
    fn move_rewrites_links_and_requests_deletion() {
        let wiki = MockWiki::new()
            .with_page("Foo (singe)", "article")
            .with_page("Bar", "See [[Foo (singe)]] and [[Foo_(singe)|him]].")
            .with_backlinks("Foo (singe)", &["Bar"]);
        let mut editor = editor(&wiki, Mode::Automatic, &[]);

        run(&mut editor, "Foo (singer)").expect("run");

        assert_eq!(
            wiki.moves(),
            vec![("Foo (singe)".to_string(), "Foo (singer)".to_string())]
        );
        assert_eq!(wiki.content("Foo (singer)").as_deref(), Some("article"));
        assert_eq!(
            wiki.content("Bar").as_deref(),
            Some("See [[Foo (singer)]] and [[Foo (singer)|him]].")
        );
        assert_eq!(wiki.content("Foo (singe)").as_deref(), Some("{{d|R3|G10}}"));
        assert_eq!(editor.finish().edited, 3);
    }

    #[test]
    fn already_moved_page_skips_the_move() {
        let wiki = MockWiki::new()
            .with_page("Foo (singer)", "article")
            .with_redirect("Foo (singe)", "Foo (singer)");
        let mut editor = editor(&wiki, Mode::Automatic, &[]);

        run(&mut editor, "Foo (singer)").expect("run");

        assert!(wiki.moves().is_empty());
        assert_eq!(wiki.content("Foo (singe)").as_deref(), Some("{{d|R3|G10}}"));
    }

    #[test]
    fn two_articles_are_left_alone() {
        let wiki = MockWiki::new()
            .with_page("Foo (singer)", "article")
            .with_page("Foo (sing)", "another article");
        let mut editor = editor(&wiki, Mode::Automatic, &[]);

        run(&mut editor, "Foo (singer)").expect("run");

        assert!(wiki.moves().is_empty());
        assert!(wiki.edits().is_empty());
        assert_eq!(editor.finish().ignored, 1);
    }

    #[test]
    fn declined_move_stops_there() {
        let wiki = MockWiki::new().with_page("Foo (singe)", "article");
        let mut editor = editor(&wiki, Mode::Interactive, &["n"]);

        run(&mut editor, "Foo (singer)").expect("run");

        assert!(wiki.moves().is_empty());
        assert!(wiki.edits().is_empty());
    }
}
