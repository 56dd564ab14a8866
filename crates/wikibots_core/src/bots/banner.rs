use anyhow::{Result, bail};

use crate::api::WikiWriteApi;
use crate::bots::{announce, load_page};
use crate::confirm::Editor;
use crate::page::{talk_title, template_title};
use crate::prompt::Prompter;
use crate::source::variants_of;

/// Prepend `{{banner}}` unless one of the banner's names is already used.
/// The last variant is the canonical template name.
pub fn with_banner(content: &str, variants: &[String]) -> Option<String> {
    let canonical = variants.last()?;
    if has_banner(content, variants) {
        return None;
    }
    Some(prepend_banner(content, canonical))
}

pub fn prepend_banner(content: &str, banner: &str) -> String {
    format!("{{{{{banner}}}}}\n{content}")
}

pub fn has_banner(content: &str, variants: &[String]) -> bool {
    variants
        .iter()
        .any(|variant| content.contains(&format!("{{{{{variant}")))
}

/// Every name the banner template goes by, canonical name last.
pub fn banner_variants<A>(api: &A, banner: &str) -> Result<Vec<String>>
where
    A: WikiWriteApi + ?Sized,
{
    let page = api.page_info(&template_title(banner))?;
    if !page.exists {
        bail!("banner template {} does not exist", page.title);
    }
    variants_of(api, &page)
}

/// Add the banner to the talk pages of articles using any of `templates`.
pub fn run<A, P>(editor: &mut Editor<'_, A, P>, templates: &[String], banner: &str) -> Result<()>
where
    A: WikiWriteApi + ?Sized,
    P: Prompter,
{
    let variants = banner_variants(editor.api(), banner)?;

    for template in templates {
        let pages = editor.api().embedded_in(&template_title(template))?;
        for info in pages {
            if editor.should_stop() {
                return Ok(());
            }
            if !info.is_article() {
                editor.skip();
                continue;
            }
            let Some(talk) = load_page(editor, &talk_title(&info.title)) else {
                continue;
            };
            match with_banner(&talk.content, &variants) {
                Some(proposed) => {
                    announce(editor, &talk.info);
                    editor.review(&talk, proposed);
                }
                None => {
                    editor.skip();
                }
            }
        }
    }
    Ok(())
}
