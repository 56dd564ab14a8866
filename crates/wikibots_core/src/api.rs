use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread::sleep;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use reqwest::Url;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::BotConfig;
use crate::error::{ErrorKind, WikiError, api_code};
use crate::page::{PageInfo, PageText, RedirectFilter, Revision, SearchHit};

pub trait WikiReadApi {
    fn page_info(&self, title: &str) -> Result<PageInfo>;
    fn page_text(&self, title: &str) -> Result<PageText>;
    /// Where a redirect page points, `None` when the page is not a redirect.
    fn redirect_target(&self, title: &str) -> Result<Option<String>>;
    fn embedded_in(&self, template: &str) -> Result<Vec<PageInfo>>;
    fn backlinks(&self, title: &str, filter: RedirectFilter) -> Result<Vec<PageInfo>>;
    fn search(&self, query: &str, namespaces: &[i32]) -> Result<Vec<SearchHit>>;
    /// Title as displayed under a language variant such as `zh-cn`.
    fn convert_title(&self, title: &str, variant: &str) -> Result<String>;
    /// Newest first.
    fn revisions(&self, title: &str, limit: usize) -> Result<Vec<Revision>>;
    fn request_count(&self) -> usize;
}

pub trait WikiWriteApi: WikiReadApi {
    fn login(&self, username: &str, password: &str) -> Result<()>;
    fn username(&self) -> Option<String>;
    fn edit_page(&self, request: &EditRequest) -> Result<()>;
    fn move_page(&self, from: &str, to: &str, reason: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditRequest {
    pub title: String,
    pub text: String,
    pub summary: String,
    pub minor: bool,
    /// Revision timestamp the text was derived from; the wiki reports an
    /// edit conflict when the page changed since.
    pub base_timestamp: Option<String>,
    /// Fail with `articleexists` instead of overwriting.
    pub create_only: bool,
}

#[derive(Debug, Clone)]
pub struct MediaWikiClientConfig {
    pub api_url: String,
    pub user_agent: String,
    pub timeout_ms: u64,
    pub rate_limit_read_ms: u64,
    pub rate_limit_write_ms: u64,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl MediaWikiClientConfig {
    pub fn from_config(config: &BotConfig) -> Self {
        Self {
            api_url: config.api_url(),
            user_agent: config.user_agent(),
            timeout_ms: config.bot.http_timeout_ms.unwrap_or(30_000),
            rate_limit_read_ms: config.bot.rate_limit_read_ms.unwrap_or(0),
            rate_limit_write_ms: config.bot.rate_limit_write_ms.unwrap_or(1_000),
            max_retries: config.bot.http_retries.unwrap_or(2),
            retry_delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestKind {
    Read,
    Write,
}

/// Blocking Action API client. Reads retry inside the client; writes are
/// sent once and left to the caller's save loop. All state is behind
/// interior locks so one client can serve a worker pool.
#[derive(Debug)]
pub struct MediaWikiClient {
    client: Client,
    api_url: Url,
    config: MediaWikiClientConfig,
    last_request_at: Mutex<Option<Instant>>,
    request_count: AtomicUsize,
    csrf_token: Mutex<Option<String>>,
    username: Mutex<Option<String>>,
}

impl MediaWikiClient {
    pub fn new(config: MediaWikiClientConfig) -> Result<Self> {
        let api_url = Url::parse(&config.api_url)
            .with_context(|| format!("invalid MediaWiki API URL: {}", config.api_url))?;
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .cookie_store(true)
            .build()
            .context("failed to build MediaWiki HTTP client")?;

        Ok(Self {
            client,
            api_url,
            config,
            last_request_at: Mutex::new(None),
            request_count: AtomicUsize::new(0),
            csrf_token: Mutex::new(None),
            username: Mutex::new(None),
        })
    }

    pub fn api_url(&self) -> &str {
        self.api_url.as_str()
    }

    fn request_json(
        &self,
        params: &[(&str, String)],
        post: bool,
        kind: RequestKind,
    ) -> Result<Value> {
        let max_retries = match kind {
            RequestKind::Read => self.config.max_retries,
            RequestKind::Write => 0,
        };
        let mut pairs = Vec::with_capacity(params.len() + 2);
        pairs.push(("format", "json".to_string()));
        pairs.push(("formatversion", "2".to_string()));
        pairs.extend(params.iter().map(|(key, value)| (*key, value.clone())));

        for attempt in 0..=max_retries {
            self.apply_rate_limit(kind);
            debug!(
                action = action_of(params),
                attempt,
                post,
                "MediaWiki API request"
            );
            let request = if post {
                self.client.post(self.api_url.clone()).form(&pairs)
            } else {
                self.client.get(self.api_url.clone()).query(&pairs)
            };

            let error = match request.send() {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let payload: Value = response
                            .json()
                            .context("failed to decode MediaWiki API JSON response")?;
                        match api_error(&payload) {
                            Some(error) => error,
                            None => return Ok(payload),
                        }
                    } else {
                        WikiError::Http(status)
                    }
                }
                Err(error) => WikiError::Network(error),
            };

            if attempt < max_retries && error.kind() == ErrorKind::Transient {
                debug!(attempt, %error, "retrying MediaWiki API request");
                self.wait_before_retry(attempt);
                continue;
            }
            return Err(error.into());
        }

        bail!("MediaWiki API request exhausted retry budget")
    }

    fn get(&self, params: &[(&str, String)]) -> Result<Value> {
        self.request_json(params, false, RequestKind::Read)
    }

    fn post_write(&self, params: &[(&str, String)]) -> Result<Value> {
        self.request_json(params, true, RequestKind::Write)
    }

    /// Runs a query and follows `continue` until the wiki stops sending it.
    fn query_all(
        &self,
        params: &[(&str, String)],
        mut each: impl FnMut(QueryPayload),
    ) -> Result<()> {
        let mut continuation: BTreeMap<String, String> = BTreeMap::new();
        loop {
            let mut request: Vec<(&str, String)> = params.to_vec();
            for (key, value) in &continuation {
                request.push((key.as_str(), value.clone()));
            }
            let response = self.get(&request)?;
            let parsed: QueryResponse = serde_json::from_value(response).with_context(|| {
                format!("failed to decode {} API response", action_of(params))
            })?;
            each(parsed.query);

            match parsed.continuation {
                Some(next) => continuation = continuation_params(&next),
                None => return Ok(()),
            }
        }
    }

    fn apply_rate_limit(&self, kind: RequestKind) {
        let delay = match kind {
            RequestKind::Read => Duration::from_millis(self.config.rate_limit_read_ms),
            RequestKind::Write => Duration::from_millis(self.config.rate_limit_write_ms),
        };
        let mut last = self
            .last_request_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < delay {
                sleep(delay - elapsed);
            }
        }
        *last = Some(Instant::now());
        self.request_count.fetch_add(1, Ordering::Relaxed);
    }

    fn wait_before_retry(&self, attempt: usize) {
        let exponent = u32::try_from(attempt).unwrap_or(16);
        let base = self
            .config
            .retry_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent));
        let jitter = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| u64::from(duration.subsec_millis() % 100))
            .unwrap_or(0);
        sleep(Duration::from_millis(base.saturating_add(jitter)));
    }

    fn ensure_csrf_token(&self) -> Result<String> {
        if let Some(token) = self
            .csrf_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            return Ok(token.clone());
        }
        let response = self.get(&[
            ("action", "query".to_string()),
            ("meta", "tokens".to_string()),
        ])?;
        let parsed: TokenQueryResponse =
            serde_json::from_value(response).context("failed to decode csrf token response")?;
        let token = parsed
            .query
            .tokens
            .and_then(|tokens| tokens.csrftoken)
            .ok_or_else(|| anyhow::anyhow!("failed to get MediaWiki csrf token"))?;
        *self
            .csrf_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(token.clone());
        Ok(token)
    }

    fn post_with_token(&self, mut params: Vec<(&str, String)>) -> Result<Value> {
        params.push(("token", self.ensure_csrf_token()?));
        let result = self.post_write(&params);
        if let Err(error) = &result
            && api_code(error) == Some("badtoken")
        {
            *self
                .csrf_token
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = None;
        }
        result
    }

    fn single_page(&self, params: &[(&str, String)], title: &str) -> Result<PageQueryItem> {
        let response = self.get(params)?;
        let parsed: QueryResponse = serde_json::from_value(response)
            .with_context(|| format!("failed to decode page query for {title}"))?;
        parsed
            .query
            .pages
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("page not returned by API: {title}"))
    }
}

impl WikiReadApi for MediaWikiClient {
    fn page_info(&self, title: &str) -> Result<PageInfo> {
        let page = self.single_page(
            &[
                ("action", "query".to_string()),
                ("titles", title.to_string()),
                ("prop", "info".to_string()),
            ],
            title,
        )?;
        Ok(page.to_info())
    }

    fn page_text(&self, title: &str) -> Result<PageText> {
        let page = self.single_page(
            &[
                ("action", "query".to_string()),
                ("titles", title.to_string()),
                ("prop", "info|revisions".to_string()),
                ("rvprop", "content|timestamp".to_string()),
                ("rvslots", "main".to_string()),
            ],
            title,
        )?;
        Ok(page.into_text())
    }

    fn redirect_target(&self, title: &str) -> Result<Option<String>> {
        let response = self.get(&[
            ("action", "query".to_string()),
            ("titles", title.to_string()),
            ("redirects", "1".to_string()),
        ])?;
        let parsed: QueryResponse =
            serde_json::from_value(response).context("failed to decode redirect response")?;
        Ok(parsed.query.redirects.into_iter().next().map(|item| item.to))
    }

    fn embedded_in(&self, template: &str) -> Result<Vec<PageInfo>> {
        let mut pages = Vec::new();
        self.query_all(
            &[
                ("action", "query".to_string()),
                ("generator", "embeddedin".to_string()),
                ("geititle", template.to_string()),
                ("geilimit", "max".to_string()),
                ("prop", "info".to_string()),
            ],
            |payload| pages.extend(payload.pages.iter().map(PageQueryItem::to_info)),
        )?;
        Ok(pages)
    }

    fn backlinks(&self, title: &str, filter: RedirectFilter) -> Result<Vec<PageInfo>> {
        let mut pages = Vec::new();
        self.query_all(
            &[
                ("action", "query".to_string()),
                ("generator", "backlinks".to_string()),
                ("gbltitle", title.to_string()),
                ("gblfilterredir", filter.as_str().to_string()),
                ("gbllimit", "max".to_string()),
                ("prop", "info".to_string()),
            ],
            |payload| pages.extend(payload.pages.iter().map(PageQueryItem::to_info)),
        )?;
        Ok(pages)
    }

    fn search(&self, query: &str, namespaces: &[i32]) -> Result<Vec<SearchHit>> {
        let namespace_filter = namespaces
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("|");
        let mut hits = Vec::new();
        self.query_all(
            &[
                ("action", "query".to_string()),
                ("list", "search".to_string()),
                ("srsearch", query.to_string()),
                ("srnamespace", namespace_filter),
                ("srprop", "snippet".to_string()),
                ("srlimit", "max".to_string()),
            ],
            |payload| {
                hits.extend(payload.search.into_iter().map(|item| SearchHit {
                    title: item.title,
                    namespace: item.ns,
                    snippet: item.snippet,
                }));
            },
        )?;
        Ok(hits)
    }

    fn convert_title(&self, title: &str, variant: &str) -> Result<String> {
        let response = self.get(&[
            ("action", "parse".to_string()),
            ("title", title.to_string()),
            ("text", title.to_string()),
            ("contentmodel", "wikitext".to_string()),
            ("prop", "displaytitle".to_string()),
            ("variant", variant.to_string()),
            ("uselang", variant.to_string()),
        ])?;
        let parsed: ParseResponse =
            serde_json::from_value(response).context("failed to decode parse response")?;
        Ok(strip_tags(&parsed.parse.displaytitle))
    }

    fn revisions(&self, title: &str, limit: usize) -> Result<Vec<Revision>> {
        let page = self.single_page(
            &[
                ("action", "query".to_string()),
                ("titles", title.to_string()),
                ("prop", "revisions".to_string()),
                ("rvprop", "ids|user|timestamp|content".to_string()),
                ("rvslots", "main".to_string()),
                ("rvlimit", limit.to_string()),
            ],
            title,
        )?;
        Ok(page
            .revisions
            .into_iter()
            .map(|revision| Revision {
                revision_id: revision.revid,
                user: revision.user,
                timestamp: revision.timestamp,
                content: revision
                    .slots
                    .and_then(|slots| slots.main)
                    .map(|slot| slot.content)
                    .unwrap_or_default(),
            })
            .collect())
    }

    fn request_count(&self) -> usize {
        self.request_count.load(Ordering::Relaxed)
    }
}

impl WikiWriteApi for MediaWikiClient {
    fn login(&self, username: &str, password: &str) -> Result<()> {
        let token_response = self.get(&[
            ("action", "query".to_string()),
            ("meta", "tokens".to_string()),
            ("type", "login".to_string()),
        ])?;
        let token_payload: TokenQueryResponse = serde_json::from_value(token_response)
            .context("failed to decode login token response")?;
        let login_token = token_payload
            .query
            .tokens
            .and_then(|tokens| tokens.logintoken)
            .ok_or_else(|| anyhow::anyhow!("failed to get MediaWiki login token"))?;

        let login_response = self.post_write(&[
            ("action", "login".to_string()),
            ("lgname", username.to_string()),
            ("lgpassword", password.to_string()),
            ("lgtoken", login_token),
        ])?;
        let login_payload: LoginResponse =
            serde_json::from_value(login_response).context("failed to decode login response")?;
        match login_payload.login.result.as_deref() {
            Some("Success") => {
                let name = login_payload
                    .login
                    .lgusername
                    .unwrap_or_else(|| username.to_string());
                info!(user = %name, "signed in");
                *self
                    .csrf_token
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = None;
                *self.username.lock().unwrap_or_else(PoisonError::into_inner) = Some(name);
                Ok(())
            }
            other => bail!(
                "MediaWiki login failed: {}",
                login_payload
                    .login
                    .reason
                    .or_else(|| other.map(ToString::to_string))
                    .unwrap_or_else(|| "unknown error".to_string())
            ),
        }
    }

    fn username(&self) -> Option<String> {
        self.username
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn edit_page(&self, request: &EditRequest) -> Result<()> {
        let mut params = vec![
            ("action", "edit".to_string()),
            ("title", request.title.clone()),
            ("text", request.text.clone()),
            ("summary", request.summary.clone()),
            ("bot", "1".to_string()),
        ];
        params.push(if request.minor {
            ("minor", "1".to_string())
        } else {
            ("notminor", "1".to_string())
        });
        if let Some(timestamp) = &request.base_timestamp {
            params.push(("basetimestamp", timestamp.clone()));
            params.push(("nocreate", "1".to_string()));
        }
        if request.create_only {
            params.push(("createonly", "1".to_string()));
        }

        let response = self.post_with_token(params)?;
        let edit_payload: EditResponse =
            serde_json::from_value(response).context("failed to decode edit response")?;
        let edit = edit_payload
            .edit
            .ok_or_else(|| anyhow::anyhow!("missing edit payload in API response"))?;
        if edit.result.as_deref() != Some("Success") {
            return Err(WikiError::api(
                "edit-failure",
                format!(
                    "edit of {} was not accepted: {}",
                    request.title,
                    edit.result.unwrap_or_else(|| "unknown".to_string())
                ),
            )
            .into());
        }
        Ok(())
    }

    fn move_page(&self, from: &str, to: &str, reason: &str) -> Result<()> {
        let response = self.post_with_token(vec![
            ("action", "move".to_string()),
            ("from", from.to_string()),
            ("to", to.to_string()),
            ("reason", reason.to_string()),
            ("movetalk", "1".to_string()),
        ])?;
        if response.get("move").is_none() {
            bail!("missing move payload in API response for {from}");
        }
        Ok(())
    }
}

fn api_error(payload: &Value) -> Option<WikiError> {
    let error = payload.get("error")?;
    let code = error
        .get("code")
        .and_then(Value::as_str)
        .unwrap_or("unknown_error");
    let info = error
        .get("info")
        .and_then(Value::as_str)
        .unwrap_or("unknown info");
    Some(WikiError::api(code, info))
}

fn action_of<'a>(params: &'a [(&'a str, String)]) -> &'a str {
    params
        .iter()
        .find(|(key, _)| *key == "list" || *key == "generator")
        .or_else(|| params.iter().find(|(key, _)| *key == "action"))
        .map_or("unknown", |(_, value)| value.as_str())
}

fn continuation_params(next: &BTreeMap<String, Value>) -> BTreeMap<String, String> {
    next.iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            (key.clone(), value)
        })
        .collect()
}

pub(crate) fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out.trim().to_string()
}

#[derive(Debug, Deserialize, Default)]
struct QueryResponse {
    #[serde(default)]
    query: QueryPayload,
    #[serde(default, rename = "continue")]
    continuation: Option<BTreeMap<String, Value>>,
}

#[derive(Debug, Deserialize, Default)]
struct QueryPayload {
    #[serde(default)]
    pages: Vec<PageQueryItem>,
    #[serde(default)]
    search: Vec<SearchQueryItem>,
    #[serde(default)]
    redirects: Vec<RedirectItem>,
}

#[derive(Debug, Deserialize)]
struct PageQueryItem {
    pageid: Option<i64>,
    #[serde(default)]
    ns: i32,
    title: String,
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    invalid: bool,
    #[serde(default)]
    redirect: bool,
    length: Option<u64>,
    #[serde(default)]
    revisions: Vec<RevisionQueryItem>,
}

impl PageQueryItem {
    fn to_info(&self) -> PageInfo {
        PageInfo {
            title: self.title.clone(),
            namespace: self.ns,
            page_id: self.pageid,
            exists: !self.missing && !self.invalid,
            redirect: self.redirect,
            length: self.length,
        }
    }

    fn into_text(self) -> PageText {
        let info = self.to_info();
        let revision = self.revisions.into_iter().next();
        let timestamp = revision.as_ref().map(|revision| revision.timestamp.clone());
        let content = revision
            .and_then(|revision| revision.slots)
            .and_then(|slots| slots.main)
            .map(|slot| slot.content)
            .unwrap_or_default();
        PageText {
            info,
            content,
            timestamp,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RevisionQueryItem {
    #[serde(default)]
    revid: i64,
    #[serde(default)]
    user: String,
    timestamp: String,
    slots: Option<RevisionSlotContainer>,
}

#[derive(Debug, Deserialize)]
struct RevisionSlotContainer {
    main: Option<RevisionMainSlot>,
}

#[derive(Debug, Deserialize)]
struct RevisionMainSlot {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct SearchQueryItem {
    title: String,
    #[serde(default)]
    ns: i32,
    #[serde(default)]
    snippet: String,
}

#[derive(Debug, Deserialize)]
struct RedirectItem {
    to: String,
}

#[derive(Debug, Deserialize, Default)]
struct ParseResponse {
    #[serde(default)]
    parse: ParsePayload,
}

#[derive(Debug, Deserialize, Default)]
struct ParsePayload {
    #[serde(default)]
    displaytitle: String,
}

#[derive(Debug, Deserialize, Default)]
struct TokenQueryResponse {
    #[serde(default)]
    query: TokenQueryPayload,
}

#[derive(Debug, Deserialize, Default)]
struct TokenQueryPayload {
    tokens: Option<TokenPayload>,
}

#[derive(Debug, Deserialize, Default)]
struct TokenPayload {
    logintoken: Option<String>,
    csrftoken: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct LoginResponse {
    #[serde(default)]
    login: LoginPayload,
}

#[derive(Debug, Deserialize, Default)]
struct LoginPayload {
    result: Option<String>,
    reason: Option<String>,
    lgusername: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct EditResponse {
    edit: Option<EditPayload>,
}

#[derive(Debug, Deserialize, Default)]
struct EditPayload {
    result: Option<String>,
}
