use anyhow::Result;

use crate::api::WikiWriteApi;
use crate::bots::load_page;
use crate::bots::regex::RegexRule;
use crate::confirm::Editor;
use crate::page::{NS_MAIN, NS_TEMPLATE};
use crate::prompt::Prompter;
use crate::source::PageSource;

/// Regex search across the wiki with unattended saves.
pub fn run<A, P>(editor: &mut Editor<'_, A, P>, rule: &RegexRule) -> Result<()>
where
    A: WikiWriteApi + ?Sized,
    P: Prompter,
{
    let source = PageSource::Search {
        query: format!("insource:/{}/", rule.as_str()),
        namespaces: vec![NS_MAIN],
    };
    for info in source.fetch(editor.api())? {
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
        if !rule.is_match(&page.content) {
            editor.skip();
            continue;
        }
        let proposed = rule.apply(&page.content);
        editor.apply(&page, proposed);
    }
    Ok(())
}
