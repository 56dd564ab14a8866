use std::io::{self, Write};
use std::thread::sleep;
use std::time::Duration;

use anyhow::Result;
use colored::{Color, Colorize};
use tracing::{info, warn};

use crate::api::{EditRequest, WikiWriteApi};
use crate::config::BotConfig;
use crate::console;
use crate::error::{ErrorKind, classify};
use crate::page::{PageInfo, PageText};
use crate::prompt::Prompter;
use crate::signal::StopSignal;
use crate::stats::RunStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Automatic,
    Interactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditDecision {
    Apply,
    Skip,
    Abort,
}

impl EditDecision {
    /// `None` for anything that is not a recognised answer.
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "" | "y" | "yes" => Some(Self::Apply),
            "n" | "no" => Some(Self::Skip),
            "q" | "quit" => Some(Self::Abort),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Saved,
    Skipped,
    Failed,
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingChange {
    Edit {
        text: String,
        base_timestamp: Option<String>,
        create_only: bool,
    },
    Move {
        to: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &BotConfig) -> Self {
        Self {
            max_retries: config.max_save_retries(),
            delay: Duration::from_millis(config.retry_delay_ms()),
        }
    }

    /// Wait before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: usize) -> Duration {
        self.delay
            .saturating_mul(u32::try_from(attempt).unwrap_or(u32::MAX))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditSettings {
    pub summary: String,
    pub minor: bool,
    pub mode: Mode,
    pub retry: RetryPolicy,
}

/// Shows proposed changes, asks the operator when interactive, commits
/// with retry and keeps the run tally.
pub struct Editor<'a, A: ?Sized, P> {
    api: &'a A,
    settings: EditSettings,
    prompter: P,
    stats: RunStats,
    stop: StopSignal,
    keywords: Vec<String>,
    aborted: bool,
}

impl<'a, A, P> Editor<'a, A, P>
where
    A: WikiWriteApi + ?Sized,
    P: Prompter,
{
    pub fn new(api: &'a A, settings: EditSettings, prompter: P, stop: StopSignal) -> Self {
        Self {
            api,
            settings,
            prompter,
            stats: RunStats::default(),
            stop,
            keywords: Vec::new(),
            aborted: false,
        }
    }

    pub fn api(&self) -> &'a A {
        self.api
    }

    pub fn settings(&self) -> &EditSettings {
        &self.settings
    }

    /// Interactive previews show only lines containing one of these instead
    /// of a full diff. An empty list restores the diff.
    pub fn set_keywords<I, S>(&mut self, keywords: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords
            .into_iter()
            .map(Into::into)
            .filter(|keyword: &String| !keyword.is_empty())
            .collect();
    }

    pub fn stats(&self) -> RunStats {
        self.stats
    }

    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    pub fn should_stop(&self) -> bool {
        self.aborted || self.stop.is_raised()
    }

    pub fn finish(self) -> RunStats {
        self.stats
    }

    /// Run `bot` to the end and hand back the tally with its result. A bot
    /// that fails partway still reports the pages it already handled.
    pub fn run<F>(mut self, bot: F) -> (RunStats, Result<()>)
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        let result = bot(&mut self);
        (self.finish(), result)
    }

    /// Read one free-form line from the operator. End of input stops the run.
    pub fn ask(&mut self, prompt: &str) -> Option<String> {
        let line = self.prompter.read_line(prompt);
        if line.is_none() {
            self.aborted = true;
        }
        line
    }

    pub fn skip(&mut self) -> Outcome {
        if self.settings.mode == Mode::Automatic {
            console::progress('.');
        }
        self.stats.record(Outcome::Skipped);
        Outcome::Skipped
    }

    pub fn fail(&mut self, title: &str, error: &anyhow::Error) -> Outcome {
        warn!(title, error = %format!("{error:#}"), "page failed");
        println!("\n{} {title}: {error:#}", "Error".red());
        self.stats.record(Outcome::Failed);
        Outcome::Failed
    }

    /// Offer `proposed` as the new text of `page`, prompting in interactive
    /// mode.
    pub fn review(&mut self, page: &PageText, proposed: String) -> Outcome {
        if proposed == page.content {
            return self.unchanged();
        }
        if self.settings.mode == Mode::Interactive {
            self.preview(&page.content, &proposed);
            match self.decide("Replace? [Y/n/q]: ") {
                EditDecision::Apply => {}
                EditDecision::Skip => return self.skip(),
                EditDecision::Abort => return self.quit(),
            }
        }
        self.commit(page.title(), edit_of(page, proposed))
    }

    /// Like `review`, but never prompts.
    pub fn apply(&mut self, page: &PageText, proposed: String) -> Outcome {
        if proposed == page.content {
            return self.unchanged();
        }
        self.commit(page.title(), edit_of(page, proposed))
    }

    pub fn review_move(&mut self, page: &PageInfo, to: &str) -> Outcome {
        if self.settings.mode == Mode::Interactive {
            println!("{} -> {}", page.title.red(), to.green());
            match self.decide("Move? [Y/n/q]: ") {
                EditDecision::Apply => {}
                EditDecision::Skip => return self.skip(),
                EditDecision::Abort => return self.quit(),
            }
        }
        self.commit(&page.title, PendingChange::Move { to: to.to_string() })
    }

    fn unchanged(&mut self) -> Outcome {
        if self.settings.mode == Mode::Interactive {
            println!("{}", "No changes.".yellow());
        }
        self.skip()
    }

    /// Stop the run at the operator's request, counting the current page
    /// as ignored.
    pub fn quit(&mut self) -> Outcome {
        self.aborted = true;
        self.stats.record(Outcome::Aborted);
        Outcome::Aborted
    }

    fn preview(&self, current: &str, proposed: &str) {
        if self.keywords.is_empty() {
            console::print_diff(current, proposed);
        } else {
            console::preview_lines(current, &self.keywords, "-", Color::Red);
            console::preview_lines(proposed, &self.keywords, "+", Color::Green);
        }
    }

    fn decide(&mut self, prompt: &str) -> EditDecision {
        let prompt = prompt.yellow().to_string();
        loop {
            let Some(input) = self.prompter.read_line(&prompt) else {
                return EditDecision::Abort;
            };
            if self.stop.is_raised() {
                return EditDecision::Abort;
            }
            match EditDecision::parse(&input) {
                Some(decision) => return decision,
                None => console::invalid(&input),
            }
        }
    }

    fn commit(&mut self, title: &str, change: PendingChange) -> Outcome {
        let interactive = self.settings.mode == Mode::Interactive;
        if interactive {
            print!("Saving... ");
            let _ = io::stdout().flush();
        }

        let mut attempt = 0;
        loop {
            let result = match &change {
                PendingChange::Edit {
                    text,
                    base_timestamp,
                    create_only,
                } => self.api.edit_page(&EditRequest {
                    title: title.to_string(),
                    text: text.clone(),
                    summary: self.settings.summary.clone(),
                    minor: self.settings.minor,
                    base_timestamp: base_timestamp.clone(),
                    create_only: *create_only,
                }),
                PendingChange::Move { to } => {
                    self.api.move_page(title, to, &self.settings.summary)
                }
            };

            match result {
                Ok(()) => {
                    info!(title, attempt, "saved");
                    if interactive {
                        println!("{}", "Done.".green());
                    } else {
                        console::progress(mark_for(&change));
                    }
                    self.stats.record(Outcome::Saved);
                    return Outcome::Saved;
                }
                Err(error) => {
                    if classify(&error) == ErrorKind::Transient
                        && attempt < self.settings.retry.max_retries
                    {
                        attempt += 1;
                        let delay = self.settings.retry.backoff(attempt);
                        warn!(
                            title,
                            attempt,
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            error = %error,
                            "save failed, retrying"
                        );
                        sleep(delay);
                        continue;
                    }
                    return self.fail(title, &error);
                }
            }
        }
    }
}

fn edit_of(page: &PageText, proposed: String) -> PendingChange {
    PendingChange::Edit {
        text: proposed,
        base_timestamp: page.timestamp.clone(),
        create_only: !page.info.exists,
    }
}

fn mark_for(change: &PendingChange) -> char {
    match change {
        PendingChange::Edit {
            create_only: true, ..
        } => '#',
        PendingChange::Edit { .. } => '*',
        PendingChange::Move { .. } => '>',
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use reqwest::StatusCode;

    use super::{EditDecision, Editor, Mode, Outcome, RetryPolicy};
    use crate::api::WikiReadApi;
    use crate::error::WikiError;
    use crate::prompt::ScriptedPrompter;
    use crate::signal::StopSignal;
    use crate::testing::{MockWiki, settings};

    #[test]
    fn decisions_parse_case_insensitively() {
        assert_eq!(EditDecision::parse(""), Some(EditDecision::Apply));
        assert_eq!(EditDecision::parse("YES"), Some(EditDecision::Apply));
        assert_eq!(EditDecision::parse("n"), Some(EditDecision::Skip));
        assert_eq!(EditDecision::parse(" quit "), Some(EditDecision::Abort));
        assert_eq!(EditDecision::parse("maybe"), None);
    }

    #[test]
    fn backoff_grows_with_attempt() {
        let policy = RetryPolicy {
            max_retries: 3,
            delay: Duration::from_millis(100),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(3), Duration::from_millis(300));
    }

    #[test]
    fn automatic_save_writes_previewed_text_with_base_timestamp() {
        let wiki = MockWiki::new().with_page("Alpha", "old text");
        let mut editor = Editor::new(
            &wiki,
            settings(Mode::Automatic),
            ScriptedPrompter::default(),
            StopSignal::new(),
        );
        let page = wiki.page_text("Alpha").expect("page");
        let outcome = editor.review(&page, "new text".to_string());

        assert_eq!(outcome, Outcome::Saved);
        let edits = wiki.edits();
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].text, "new text");
        assert_eq!(edits[0].base_timestamp, page.timestamp);
        assert!(!edits[0].create_only);
        assert_eq!(editor.finish().edited, 1);
    }

    #[test]
    fn unchanged_text_is_ignored_without_write() {
        let wiki = MockWiki::new().with_page("Alpha", "same");
        let mut editor = Editor::new(
            &wiki,
            settings(Mode::Interactive),
            ScriptedPrompter::default(),
            StopSignal::new(),
        );
        let page = wiki.page_text("Alpha").expect("page");
        assert_eq!(editor.review(&page, "same".to_string()), Outcome::Skipped);
        assert!(wiki.edits().is_empty());
        assert_eq!(editor.stats().ignored, 1);
    }

    #[test]
    fn invalid_answer_prompts_again() {
        let wiki = MockWiki::new().with_page("Alpha", "old");
        let mut editor = Editor::new(
            &wiki,
            settings(Mode::Interactive),
            ScriptedPrompter::new(&["what", "n"]),
            StopSignal::new(),
        );
        let page = wiki.page_text("Alpha").expect("page");
        assert_eq!(editor.review(&page, "new".to_string()), Outcome::Skipped);
        assert!(!editor.should_stop());
        assert!(wiki.edits().is_empty());
    }

    #[test]
    fn quit_at_first_prompt_aborts_without_edits() {
        let wiki = MockWiki::new().with_page("Alpha", "old");
        let mut editor = Editor::new(
            &wiki,
            settings(Mode::Interactive),
            ScriptedPrompter::new(&["q"]),
            StopSignal::new(),
        );
        let page = wiki.page_text("Alpha").expect("page");
        assert_eq!(editor.review(&page, "new".to_string()), Outcome::Aborted);
        assert!(editor.should_stop());
        let stats = editor.finish();
        assert_eq!(stats.edited, 0);
        assert_eq!(stats.ignored, 1);
        assert_eq!(stats.visited(), 1);
    }

    #[test]
    fn end_of_input_counts_as_abort() {
        let wiki = MockWiki::new().with_page("Alpha", "old");
        let mut editor = Editor::new(
            &wiki,
            settings(Mode::Interactive),
            ScriptedPrompter::default(),
            StopSignal::new(),
        );
        let page = wiki.page_text("Alpha").expect("page");
        assert_eq!(editor.review(&page, "new".to_string()), Outcome::Aborted);
    }

    #[test]
    fn interrupt_during_prompt_aborts() {
        let wiki = MockWiki::new().with_page("Alpha", "old");
        let stop = StopSignal::new();
        let mut editor = Editor::new(
            &wiki,
            settings(Mode::Interactive),
            ScriptedPrompter::new(&["y"]),
            stop.clone(),
        );
        let page = wiki.page_text("Alpha").expect("page");
        stop.raise();
        assert_eq!(editor.review(&page, "new".to_string()), Outcome::Aborted);
        assert!(wiki.edits().is_empty());
        assert_eq!(editor.finish().ignored, 1);
    }

    #[test]
    fn tally_survives_a_bot_that_fails_partway() {
        let wiki = MockWiki::new()
            .with_page("Alpha", "old")
            .with_page("Beta", "old");
        let editor = Editor::new(
            &wiki,
            settings(Mode::Automatic),
            ScriptedPrompter::default(),
            StopSignal::new(),
        );
        let (stats, result) = editor.run(|editor| {
            let page = editor.api().page_text("Alpha")?;
            editor.apply(&page, "new".to_string());
            anyhow::bail!("failed to list pages transcluding Template:Beta")
        });

        assert!(result.is_err());
        assert_eq!(stats.edited, 1);
        assert_eq!(wiki.content("Alpha").as_deref(), Some("new"));
    }

    #[test]
    fn transient_failures_retry_then_save() {
        let wiki = MockWiki::new()
            .with_page("Alpha", "old")
            .fail_next_edits(vec![
                WikiError::api("ratelimited", "slow down"),
                WikiError::api("maxlag", "lagged"),
            ]);
        let mut editor = Editor::new(
            &wiki,
            settings(Mode::Automatic),
            ScriptedPrompter::default(),
            StopSignal::new(),
        );
        let page = wiki.page_text("Alpha").expect("page");
        assert_eq!(editor.apply(&page, "new".to_string()), Outcome::Saved);
        assert_eq!(wiki.edit_attempts(), 3);
    }

    #[test]
    fn http_and_api_failures_share_the_retry_bound() {
        let wiki = MockWiki::new()
            .with_page("Alpha", "old")
            .fail_next_edits(vec![
                WikiError::Http(StatusCode::SERVICE_UNAVAILABLE),
                WikiError::Http(StatusCode::NOT_IMPLEMENTED),
            ]);
        let mut editor = Editor::new(
            &wiki,
            settings(Mode::Automatic),
            ScriptedPrompter::default(),
            StopSignal::new(),
        );
        let page = wiki.page_text("Alpha").expect("page");
        assert_eq!(editor.apply(&page, "new".to_string()), Outcome::Saved);
        assert_eq!(wiki.edit_attempts(), 3);

        let wiki = MockWiki::new()
            .with_page("Alpha", "old")
            .fail_next_edits(vec![WikiError::Http(StatusCode::FORBIDDEN)]);
        let mut editor = Editor::new(
            &wiki,
            settings(Mode::Automatic),
            ScriptedPrompter::default(),
            StopSignal::new(),
        );
        let page = wiki.page_text("Alpha").expect("page");
        assert_eq!(editor.apply(&page, "new".to_string()), Outcome::Failed);
        assert_eq!(wiki.edit_attempts(), 1);
    }

    #[test]
    fn transient_failures_beyond_bound_fail() {
        let wiki = MockWiki::new()
            .with_page("Alpha", "old")
            .fail_next_edits(vec![
                WikiError::api("ratelimited", "1"),
                WikiError::api("ratelimited", "2"),
                WikiError::api("ratelimited", "3"),
                WikiError::api("ratelimited", "4"),
            ]);
        let mut editor = Editor::new(
            &wiki,
            settings(Mode::Automatic),
            ScriptedPrompter::default(),
            StopSignal::new(),
        );
        let page = wiki.page_text("Alpha").expect("page");
        assert_eq!(editor.apply(&page, "new".to_string()), Outcome::Failed);
        assert_eq!(wiki.edit_attempts(), 3);
        assert_eq!(wiki.content("Alpha").as_deref(), Some("old"));
        assert_eq!(editor.finish().errors, 1);
    }

    #[test]
    fn permanent_failure_is_not_retried() {
        let wiki = MockWiki::new()
            .with_page("Alpha", "old")
            .fail_next_edits(vec![WikiError::api("protectedpage", "locked")]);
        let mut editor = Editor::new(
            &wiki,
            settings(Mode::Automatic),
            ScriptedPrompter::default(),
            StopSignal::new(),
        );
        let page = wiki.page_text("Alpha").expect("page");
        assert_eq!(editor.apply(&page, "new".to_string()), Outcome::Failed);
        assert_eq!(wiki.edit_attempts(), 1);
    }

    #[test]
    fn stale_base_timestamp_is_rejected_as_conflict() {
        let wiki = MockWiki::new().with_page("Alpha", "old");
        let stale = wiki.page_text("Alpha").expect("page");
        wiki.set_content("Alpha", "someone else edited");

        let mut editor = Editor::new(
            &wiki,
            settings(Mode::Automatic),
            ScriptedPrompter::default(),
            StopSignal::new(),
        );
        assert_eq!(editor.apply(&stale, "new".to_string()), Outcome::Failed);
        assert_eq!(
            wiki.content("Alpha").as_deref(),
            Some("someone else edited")
        );
    }

    #[test]
    fn missing_page_is_created_only_if_absent() {
        let wiki = MockWiki::new();
        let mut editor = Editor::new(
            &wiki,
            settings(Mode::Automatic),
            ScriptedPrompter::default(),
            StopSignal::new(),
        );
        let page = wiki.page_text("PEK").expect("page");
        assert_eq!(
            editor.apply(&page, "#REDIRECT [[Beijing]]".to_string()),
            Outcome::Saved
        );
        assert!(wiki.edits()[0].create_only);
    }

    #[test]
    fn move_is_confirmed_then_committed() {
        let wiki = MockWiki::new().with_page("A (bx)", "text");
        let mut editor = Editor::new(
            &wiki,
            settings(Mode::Interactive),
            ScriptedPrompter::new(&["y"]),
            StopSignal::new(),
        );
        let info = wiki.page_info("A (bx)").expect("info");
        assert_eq!(editor.review_move(&info, "A (b)"), Outcome::Saved);
        assert_eq!(
            wiki.moves(),
            vec![("A (bx)".to_string(), "A (b)".to_string())]
        );
    }

    #[test]
    fn raised_stop_signal_stops_the_run() {
        let wiki = MockWiki::new();
        let stop = StopSignal::new();
        let editor = Editor::new(
            &wiki,
            settings(Mode::Automatic),
            ScriptedPrompter::default(),
            stop.clone(),
        );
        assert!(!editor.should_stop());
        stop.raise();
        assert!(editor.should_stop());
    }
}
