use std::sync::{LazyLock, Mutex};

use anyhow::Result;
use regex::Regex;
use tracing::info;

use crate::api::WikiWriteApi;
use crate::confirm::Editor;
use crate::page::PageInfo;
use crate::pool::{for_each_bounded, lock_shared};
use crate::prompt::Prompter;

pub const TEMPLATE: &str = "Template:Infobox Airport";

static CODE_PATTERNS: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        Regex::new(r"\bIATA\s*=\s*([A-Z]{3})\b").expect("IATA regex is valid"),
        Regex::new(r"\bICAO\s*=\s*([A-Z]{4})\b").expect("ICAO regex is valid"),
    ]
});

/// IATA and ICAO codes declared in an airport infobox, in that order.
pub fn airport_codes(text: &str) -> Vec<String> {
    CODE_PATTERNS
        .iter()
        .filter_map(|pattern| pattern.captures(text))
        .map(|caps| caps[1].to_string())
        .collect()
}

pub fn redirect_text(title: &str) -> String {
    format!("#REDIRECT [[{title}]]")
}

/// Create a redirect at every unused airport code, through the worker pool.
pub fn run<A, P>(editor: &mut Editor<'_, A, P>, workers: usize) -> Result<()>
where
    A: WikiWriteApi + Sync + ?Sized,
    P: Prompter + Send,
{
    let api = editor.api();
    let pages = api.embedded_in(TEMPLATE)?;
    info!(pages = pages.len(), workers, "airport started");
    let stop = editor.stop_signal().clone();
    let shared = Mutex::new(editor);

    for_each_bounded(pages, workers, &stop, |info: PageInfo| {
        if !info.is_article() {
            lock_shared(&shared).skip();
            return;
        }
        let article = match api.page_text(&info.title) {
            Ok(article) => article,
            Err(error) => {
                lock_shared(&shared).fail(&info.title, &error);
                return;
            }
        };
        let codes = airport_codes(&article.content);
        if codes.is_empty() {
            lock_shared(&shared).skip();
            return;
        }
        for code in codes {
            let code_page = match api.page_text(&code) {
                Ok(page) => page,
                Err(error) => {
                    lock_shared(&shared).fail(&code, &error);
                    continue;
                }
            };
            if code_page.info.exists {
                lock_shared(&shared).skip();
                continue;
            }
            lock_shared(&shared).apply(&code_page, redirect_text(&info.title));
        }
    });
    Ok(())
}
