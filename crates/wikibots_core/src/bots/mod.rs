//! One module per bot. Each exposes a `run` that composes a page source, a
//! text transform and the shared [`Editor`].

pub mod airport;
pub mod backlink;
pub mod banner;
pub mod banner_rail;
pub mod destain;
pub mod disambig;
pub mod mover;
pub mod punctuation;
pub mod railway;
pub mod rdt;
pub mod regex;
pub mod regex_replace;
pub mod replace;
pub mod revert;

use crate::api::WikiWriteApi;
use crate::confirm::{Editor, Mode};
use crate::console;
use crate::page::{PageInfo, PageText};
use crate::prompt::Prompter;

/// Fetch page text, counting a failed read as a page error.
pub(crate) fn load_page<A, P>(editor: &mut Editor<'_, A, P>, title: &str) -> Option<PageText>
where
    A: WikiWriteApi + ?Sized,
    P: Prompter,
{
    match editor.api().page_text(title) {
        Ok(page) => Some(page),
        Err(error) => {
            editor.fail(title, &error.context(format!("failed to read {title}")));
            None
        }
    }
}

pub(crate) fn announce<A, P>(editor: &Editor<'_, A, P>, info: &PageInfo)
where
    A: WikiWriteApi + ?Sized,
    P: Prompter,
{
    if editor.settings().mode == Mode::Interactive {
        console::page_heading(info);
    }
}
