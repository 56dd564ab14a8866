use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Result, bail};

use crate::api::{EditRequest, WikiReadApi, WikiWriteApi};
use crate::confirm::{EditSettings, Editor, Mode, RetryPolicy};
use crate::error::WikiError;
use crate::page::{
    NS_CATEGORY, NS_FILE, NS_MAIN, NS_TALK, NS_TEMPLATE, PageInfo, PageText, RedirectFilter,
    Revision, SearchHit,
};
use crate::prompt::ScriptedPrompter;
use crate::signal::StopSignal;

pub(crate) fn settings(mode: Mode) -> EditSettings {
    EditSettings {
        summary: "test edit".to_string(),
        minor: false,
        mode,
        retry: RetryPolicy {
            max_retries: 2,
            delay: Duration::ZERO,
        },
    }
}

pub(crate) fn editor<'a>(
    wiki: &'a MockWiki,
    mode: Mode,
    answers: &[&str],
) -> Editor<'a, MockWiki, ScriptedPrompter> {
    Editor::new(
        wiki,
        settings(mode),
        ScriptedPrompter::new(answers),
        StopSignal::new(),
    )
}

#[derive(Debug, Clone)]
struct MockPage {
    page_id: i64,
    content: String,
    redirect_to: Option<String>,
    timestamp: String,
}

#[derive(Debug, Default)]
struct MockState {
    pages: BTreeMap<String, MockPage>,
    embedded_in: BTreeMap<String, Vec<String>>,
    backlinks: BTreeMap<String, Vec<String>>,
    search: BTreeMap<String, Vec<String>>,
    conversions: BTreeMap<(String, String), String>,
    revisions: BTreeMap<String, Vec<Revision>>,
    edit_failures: VecDeque<WikiError>,
    edits: Vec<EditRequest>,
    moves: Vec<(String, String)>,
    edit_attempts: usize,
    request_count: usize,
    username: Option<String>,
    clock: u32,
    next_page_id: i64,
}

impl MockState {
    fn stamp(&mut self) -> String {
        self.clock += 1;
        format!(
            "2026-01-01T{:02}:{:02}:{:02}Z",
            self.clock / 3600,
            (self.clock / 60) % 60,
            self.clock % 60
        )
    }

    fn put(&mut self, title: &str, content: &str, redirect_to: Option<String>) {
        let timestamp = self.stamp();
        let page_id = match self.pages.get(title) {
            Some(page) => page.page_id,
            None => {
                self.next_page_id += 1;
                self.next_page_id
            }
        };
        self.pages.insert(
            title.to_string(),
            MockPage {
                page_id,
                content: content.to_string(),
                redirect_to,
                timestamp,
            },
        );
    }

    fn info(&self, title: &str) -> PageInfo {
        let namespace = namespace_of(title);
        match self.pages.get(title) {
            Some(page) => PageInfo {
                title: title.to_string(),
                namespace,
                page_id: Some(page.page_id),
                exists: true,
                redirect: page.redirect_to.is_some(),
                length: Some(page.content.len() as u64),
            },
            None => PageInfo {
                namespace,
                ..PageInfo::missing(title)
            },
        }
    }
}

/// In-memory wiki with scripted failures.
#[derive(Debug, Default)]
pub(crate) struct MockWiki {
    state: Mutex<MockState>,
}

impl MockWiki {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn with_page(self, title: &str, content: &str) -> Self {
        self.state().put(title, content, None);
        self
    }

    pub(crate) fn with_redirect(self, title: &str, target: &str) -> Self {
        self.state().put(
            title,
            &format!("#REDIRECT [[{target}]]"),
            Some(target.to_string()),
        );
        self
    }

    pub(crate) fn with_embedded_in(self, template: &str, titles: &[&str]) -> Self {
        self.state().embedded_in.insert(
            template.to_string(),
            titles.iter().map(ToString::to_string).collect(),
        );
        self
    }

    pub(crate) fn with_backlinks(self, title: &str, titles: &[&str]) -> Self {
        self.state().backlinks.insert(
            title.to_string(),
            titles.iter().map(ToString::to_string).collect(),
        );
        self
    }

    pub(crate) fn with_search(self, query: &str, titles: &[&str]) -> Self {
        self.state().search.insert(
            query.to_string(),
            titles.iter().map(ToString::to_string).collect(),
        );
        self
    }

    pub(crate) fn with_conversion(self, title: &str, variant: &str, converted: &str) -> Self {
        self.state().conversions.insert(
            (title.to_string(), variant.to_string()),
            converted.to_string(),
        );
        self
    }

    /// The newest revision also becomes the page's current timestamp.
    pub(crate) fn with_revisions(self, title: &str, revisions: Vec<Revision>) -> Self {
        {
            let mut state = self.state();
            if let (Some(page), Some(latest)) = (state.pages.get_mut(title), revisions.first()) {
                page.timestamp = latest.timestamp.clone();
            }
            state.revisions.insert(title.to_string(), revisions);
        }
        self
    }

    pub(crate) fn with_username(self, username: &str) -> Self {
        self.state().username = Some(username.to_string());
        self
    }

    pub(crate) fn fail_next_edits(self, errors: Vec<WikiError>) -> Self {
        self.state().edit_failures.extend(errors);
        self
    }

    /// Simulates a concurrent edit by someone else.
    pub(crate) fn set_content(&self, title: &str, content: &str) {
        self.state().put(title, content, None);
    }

    pub(crate) fn content(&self, title: &str) -> Option<String> {
        self.state()
            .pages
            .get(title)
            .map(|page| page.content.clone())
    }

    pub(crate) fn edits(&self) -> Vec<EditRequest> {
        self.state().edits.clone()
    }

    pub(crate) fn moves(&self) -> Vec<(String, String)> {
        self.state().moves.clone()
    }

    pub(crate) fn edit_attempts(&self) -> usize {
        self.state().edit_attempts
    }
}

fn namespace_of(title: &str) -> i32 {
    match title.split_once(':').map(|(prefix, _)| prefix) {
        Some("Talk") => NS_TALK,
        Some("File") => NS_FILE,
        Some("Template") => NS_TEMPLATE,
        Some("Category") => NS_CATEGORY,
        _ => NS_MAIN,
    }
}

impl WikiReadApi for MockWiki {
    fn page_info(&self, title: &str) -> Result<PageInfo> {
        let mut state = self.state();
        state.request_count += 1;
        Ok(state.info(title))
    }

    fn page_text(&self, title: &str) -> Result<PageText> {
        let mut state = self.state();
        state.request_count += 1;
        let info = state.info(title);
        let page = state.pages.get(title);
        Ok(PageText {
            info,
            content: page.map(|page| page.content.clone()).unwrap_or_default(),
            timestamp: page.map(|page| page.timestamp.clone()),
        })
    }

    fn redirect_target(&self, title: &str) -> Result<Option<String>> {
        let mut state = self.state();
        state.request_count += 1;
        Ok(state
            .pages
            .get(title)
            .and_then(|page| page.redirect_to.clone()))
    }

    fn embedded_in(&self, template: &str) -> Result<Vec<PageInfo>> {
        let mut state = self.state();
        state.request_count += 1;
        let titles = state.embedded_in.get(template).cloned().unwrap_or_default();
        Ok(titles.iter().map(|title| state.info(title)).collect())
    }

    fn backlinks(&self, title: &str, filter: RedirectFilter) -> Result<Vec<PageInfo>> {
        let mut state = self.state();
        state.request_count += 1;
        let titles = state.backlinks.get(title).cloned().unwrap_or_default();
        Ok(titles
            .iter()
            .map(|title| state.info(title))
            .filter(|info| match filter {
                RedirectFilter::All => true,
                RedirectFilter::Redirects => info.redirect,
                RedirectFilter::NonRedirects => !info.redirect,
            })
            .collect())
    }

    fn search(&self, query: &str, namespaces: &[i32]) -> Result<Vec<SearchHit>> {
        let mut state = self.state();
        state.request_count += 1;
        let titles = state.search.get(query).cloned().unwrap_or_default();
        Ok(titles
            .into_iter()
            .map(|title| SearchHit {
                namespace: namespace_of(&title),
                snippet: format!("<span class=\"searchmatch\">{query}</span>"),
                title,
            })
            .filter(|hit| namespaces.is_empty() || namespaces.contains(&hit.namespace))
            .collect())
    }

    fn convert_title(&self, title: &str, variant: &str) -> Result<String> {
        let mut state = self.state();
        state.request_count += 1;
        Ok(state
            .conversions
            .get(&(title.to_string(), variant.to_string()))
            .cloned()
            .unwrap_or_else(|| title.to_string()))
    }

    fn revisions(&self, title: &str, limit: usize) -> Result<Vec<Revision>> {
        let mut state = self.state();
        state.request_count += 1;
        let mut revisions = state.revisions.get(title).cloned().unwrap_or_default();
        revisions.truncate(limit);
        Ok(revisions)
    }

    fn request_count(&self) -> usize {
        self.state().request_count
    }
}

impl WikiWriteApi for MockWiki {
    fn login(&self, username: &str, _password: &str) -> Result<()> {
        self.state().username = Some(username.to_string());
        Ok(())
    }

    fn username(&self) -> Option<String> {
        self.state().username.clone()
    }

    fn edit_page(&self, request: &EditRequest) -> Result<()> {
        let mut state = self.state();
        state.edit_attempts += 1;
        if let Some(error) = state.edit_failures.pop_front() {
            return Err(error.into());
        }
        let current = state.pages.get(&request.title).cloned();
        if request.create_only && current.is_some() {
            return Err(WikiError::api("articleexists", "The page already exists").into());
        }
        if let (Some(base), Some(page)) = (&request.base_timestamp, &current)
            && *base != page.timestamp
        {
            return Err(WikiError::api("editconflict", "Edit conflict").into());
        }
        let redirect_to = redirect_of(&request.text);
        state.put(&request.title, &request.text, redirect_to);
        state.edits.push(request.clone());
        Ok(())
    }

    fn move_page(&self, from: &str, to: &str, _reason: &str) -> Result<()> {
        let mut state = self.state();
        let Some(page) = state.pages.get(from).cloned() else {
            bail!(WikiError::api("missingtitle", "The page you specified doesn't exist"));
        };
        if let Some(existing) = state.pages.get(to)
            && existing.redirect_to.as_deref() != Some(from)
        {
            bail!(WikiError::api("articleexists", "The destination already exists"));
        }
        state.put(to, &page.content, page.redirect_to.clone());
        state.put(from, &format!("#REDIRECT [[{to}]]"), Some(to.to_string()));
        state.moves.push((from.to_string(), to.to_string()));
        Ok(())
    }
}

fn redirect_of(text: &str) -> Option<String> {
    let rest = text.strip_prefix("#REDIRECT [[")?;
    rest.split_once("]]").map(|(target, _)| target.to_string())
}
