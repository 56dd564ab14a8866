use anyhow::{Result, bail};
use tracing::debug;

use crate::api::WikiReadApi;
use crate::page::{PageInfo, RedirectFilter};

const MAX_REDIRECT_HOPS: usize = 10;

/// Variants a title is converted to when matching Chinese text.
pub const VARIANTS: &[&str] = &["zh-cn", "zh-tw", "zh-hk"];

/// Where a bot gets its candidate pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageSource {
    /// Pages transcluding a template (full title, `Template:` included).
    EmbeddedIn(String),
    Backlinks {
        title: String,
        filter: RedirectFilter,
    },
    Search {
        query: String,
        namespaces: Vec<i32>,
    },
}

impl PageSource {
    pub fn fetch<A>(&self, api: &A) -> Result<Vec<PageInfo>>
    where
        A: WikiReadApi + ?Sized,
    {
        let pages = match self {
            Self::EmbeddedIn(template) => api.embedded_in(template)?,
            Self::Backlinks { title, filter } => api.backlinks(title, *filter)?,
            Self::Search { query, namespaces } => api
                .search(query, namespaces)?
                .into_iter()
                .map(|hit| PageInfo {
                    title: hit.title,
                    namespace: hit.namespace,
                    page_id: None,
                    exists: true,
                    redirect: false,
                    length: None,
                })
                .collect(),
        };
        debug!(source = ?self, pages = pages.len(), "fetched candidate pages");
        Ok(pages)
    }
}

/// Follow redirects from `title` to the page that finally holds content.
pub fn resolve_redirect_chain<A>(api: &A, title: &str) -> Result<String>
where
    A: WikiReadApi + ?Sized,
{
    let mut current = title.to_string();
    for _ in 0..MAX_REDIRECT_HOPS {
        match api.redirect_target(&current)? {
            Some(next) if next != current => current = next,
            _ => return Ok(current),
        }
    }
    bail!("redirect chain from {title} is longer than {MAX_REDIRECT_HOPS} hops")
}

/// Titles that lead to `origin`: every redirect pointing at it, then the
/// origin itself, all without namespace prefix.
pub fn variants_of<A>(api: &A, origin: &PageInfo) -> Result<Vec<String>>
where
    A: WikiReadApi + ?Sized,
{
    let mut variants: Vec<String> = api
        .backlinks(&origin.title, RedirectFilter::Redirects)?
        .iter()
        .map(|page| page.page_title().to_string())
        .collect();
    let own = origin.page_title().to_string();
    variants.retain(|variant| *variant != own);
    variants.push(own);
    Ok(variants)
}

/// Resolve `title` to its target and collect every name it goes by.
pub fn redirect_variants<A>(api: &A, title: &str) -> Result<(PageInfo, Vec<String>)>
where
    A: WikiReadApi + ?Sized,
{
    let origin_title = resolve_redirect_chain(api, title)?;
    let origin = api.page_info(&origin_title)?;
    if !origin.exists {
        bail!("{origin_title} does not exist");
    }
    let variants = variants_of(api, &origin)?;
    Ok((origin, variants))
}

/// `text` as written in each Chinese variant, then as given, without
/// duplicates.
pub fn dialects<A>(api: &A, text: &str) -> Result<Vec<String>>
where
    A: WikiReadApi + ?Sized,
{
    let mut forms: Vec<String> = Vec::with_capacity(VARIANTS.len() + 1);
    for variant in VARIANTS {
        let converted = api.convert_title(text, variant)?;
        if !forms.contains(&converted) {
            forms.push(converted);
        }
    }
    if !forms.iter().any(|form| form == text) {
        forms.push(text.to_string());
    }
    Ok(forms)
}
