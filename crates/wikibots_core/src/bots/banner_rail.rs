use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::api::WikiWriteApi;
use crate::bots::banner::{banner_variants, has_banner, prepend_banner};
use crate::confirm::{Editor, Outcome};
use crate::page::{PageInfo, talk_title};
use crate::pool::{for_each_bounded, lock_shared};
use crate::prompt::Prompter;
use crate::source::dialects;

pub const TEMPLATE: &str = "Template:Infobox rail system-route";
pub const DEFAULT_LOG: &str = "banner_rail.log";
pub const FALLBACK_PROJECT: &str = "鐵道專題";

/// WikiProjects in priority order with the title keywords that select them.
pub const PROJECTS: &[(&str, &str)] = &[
    ("鐵道專題", "客運專線,高速鐵路"),
    ("城市軌道交通專題", "捷運,地鐵,輕軌,電車,軌道交通"),
    ("巴士專題", "巴士,公交,BRT"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectKeywords {
    pub project: String,
    pub keywords: Vec<String>,
}

/// Pick the project whose keyword appears in `title`. The flag is false when
/// nothing matched and the fallback was used.
pub fn choose_project<'k>(title: &str, projects: &'k [ProjectKeywords]) -> (&'k str, bool) {
    projects
        .iter()
        .find(|entry| entry.keywords.iter().any(|keyword| title.contains(keyword.as_str())))
        .map_or((FALLBACK_PROJECT, false), |entry| (entry.project.as_str(), true))
}

/// Expand each project's keywords into their Chinese variants.
pub fn project_keywords<A>(api: &A) -> Result<Vec<ProjectKeywords>>
where
    A: WikiWriteApi + ?Sized,
{
    let mut projects = Vec::with_capacity(PROJECTS.len());
    for (project, keys) in PROJECTS {
        print!("Parsing keyword variants...");
        let mut keywords = Vec::new();
        for key in keys.split(',') {
            print!(" {key}");
            for form in dialects(api, key)? {
                if !keywords.contains(&form) {
                    keywords.push(form);
                }
            }
        }
        println!(" Done.");
        projects.push(ProjectKeywords {
            project: (*project).to_string(),
            keywords,
        });
    }
    Ok(projects)
}

/// Banner every rail route article's talk page with a guessed WikiProject,
/// saving unattended through the worker pool. Guesses that fell back to the
/// default project are appended to `log_path` for review.
pub fn run<A, P>(
    editor: &mut Editor<'_, A, P>,
    workers: usize,
    log_path: &Path,
) -> Result<()>
where
    A: WikiWriteApi + Sync + ?Sized,
    P: Prompter + Send,
{
    let api = editor.api();
    let mut variants = Vec::new();
    for (project, _) in PROJECTS {
        variants.extend(banner_variants(api, project)?);
    }
    let projects = project_keywords(api)?;
    let log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("failed to open {}", log_path.display()))?;
    let log = Mutex::new(log);

    let pages = api.embedded_in(TEMPLATE)?;
    info!(pages = pages.len(), workers, "banner-rail started");
    let stop = editor.stop_signal().clone();
    let shared = Mutex::new(editor);

    for_each_bounded(pages, workers, &stop, |info: PageInfo| {
        if !info.is_article() || info.redirect {
            lock_shared(&shared).skip();
            return;
        }
        let talk_name = talk_title(&info.title);
        let talk = match api.page_text(&talk_name) {
            Ok(talk) => talk,
            Err(error) => {
                lock_shared(&shared).fail(&talk_name, &error);
                return;
            }
        };
        if talk.info.redirect {
            lock_shared(&shared).skip();
            return;
        }
        if has_banner(&talk.content, &variants) {
            lock_shared(&shared).skip();
            return;
        }
        let (project, sure) = choose_project(&info.title, &projects);
        let proposed = prepend_banner(&talk.content, project);

        let outcome = lock_shared(&shared).apply(&talk, proposed);
        if outcome == Outcome::Saved && !sure {
            append_line(&log, info.page_title());
        }
    });
    Ok(())
}

fn append_line(log: &Mutex<File>, line: &str) {
    if let Err(error) = writeln!(lock_shared(log), "{line}") {
        warn!(line, %error, "failed to record uncertain title");
    }
}
