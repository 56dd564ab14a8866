use anyhow::{Result, bail};

use crate::api::WikiWriteApi;
use crate::bots::{announce, load_page};
use crate::confirm::{Editor, Mode};
use crate::console;
use crate::page::NS_MAIN;
use crate::prompt::Prompter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaceOptions {
    pub pattern: String,
    pub replacement: String,
    /// Pages containing any of these words are left alone.
    pub blacklist: Vec<String>,
    pub article_only: bool,
}

impl ReplaceOptions {
    pub fn new(pattern: &str, replacement: &str) -> Result<Self> {
        if pattern.is_empty() {
            bail!("search pattern must not be empty");
        }
        Ok(Self {
            pattern: pattern.to_string(),
            replacement: replacement.to_string(),
            blacklist: Vec::new(),
            article_only: false,
        })
    }

    pub fn replace_in(&self, text: &str) -> String {
        text.replace(&self.pattern, &self.replacement)
    }

    fn excludes(&self, text: &str) -> bool {
        self.blacklist.iter().any(|word| text.contains(word.as_str()))
    }
}

/// Search for the literal phrase and offer every hit for replacement.
pub fn run<A, P>(editor: &mut Editor<'_, A, P>, options: &ReplaceOptions) -> Result<()>
where
    A: WikiWriteApi + ?Sized,
    P: Prompter,
{
    editor.set_keywords([options.pattern.clone(), options.replacement.clone()]);
    let hits = editor
        .api()
        .search(&format!("\"{}\"", options.pattern), &[NS_MAIN])?;

    for hit in hits {
        if editor.should_stop() {
            break;
        }
        let Some(page) = load_page(editor, &hit.title) else {
            continue;
        };
        if (options.article_only && !page.info.is_article()) || options.excludes(&page.content) {
            editor.skip();
            continue;
        }

        announce(editor, &page.info);
        if editor.settings().mode == Mode::Interactive {
            println!("{}", console::highlight_snippet(&hit.snippet));
        }
        let proposed = options.replace_in(&page.content);
        editor.review(&page, proposed);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{ReplaceOptions, run};
    use crate::confirm::Mode;
    use crate::testing::{MockWiki, editor};

    #[test]
    fn empty_pattern_is_rejected() {
        assert!(ReplaceOptions::new("", "x").is_err());
    }

    #[test]
    fn single_occurrence_is_replaced_and_counted() {
        let wiki = MockWiki::new()
            .with_page("Alpha", "他任然在这里。")
            .with_search("\"任然\"", &["Alpha"]);
        let mut editor = editor(&wiki, Mode::Interactive, &["y"]);
        let options = ReplaceOptions::new("任然", "仍然").expect("options");

        run(&mut editor, &options).expect("run");

        let content = wiki.content("Alpha").expect("content");
        assert_eq!(content.matches("任然").count(), 0);
        assert_eq!(content.matches("仍然").count(), 1);
        let stats = editor.finish();
        assert_eq!(stats.edited, 1);
        assert_eq!(stats.visited(), 1);
    }

    #[test]
    fn quit_stops_before_later_hits() {
        let wiki = MockWiki::new()
            .with_page("Alpha", "任然")
            .with_page("Beta", "任然")
            .with_search("\"任然\"", &["Alpha", "Beta"]);
        let mut editor = editor(&wiki, Mode::Interactive, &["q"]);
        let options = ReplaceOptions::new("任然", "仍然").expect("options");

        run(&mut editor, &options).expect("run");

        assert!(wiki.edits().is_empty());
        let stats = editor.finish();
        assert_eq!(stats.edited, 0);
        assert_eq!(stats.ignored, 1);
    }

    #[test]
    fn blacklisted_pages_are_ignored() {
        let wiki = MockWiki::new()
            .with_page("Alpha", "丶 is a 部首")
            .with_search("\"丶\"", &["Alpha"]);
        let mut editor = editor(&wiki, Mode::Automatic, &[]);
        let mut options = ReplaceOptions::new("丶", "、").expect("options");
        options.blacklist = vec!["部首".to_string()];

        run(&mut editor, &options).expect("run");

        assert!(wiki.edits().is_empty());
        assert_eq!(editor.finish().ignored, 1);
    }
}
