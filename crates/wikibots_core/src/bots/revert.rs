use anyhow::{Context, Result};

use crate::api::WikiWriteApi;
use crate::confirm::Editor;
use crate::page::{PageInfo, PageText, Revision};
use crate::prompt::Prompter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevertTarget {
    /// Content of the revision before the bot's edit.
    Restore(String),
    /// Someone else edited last.
    Skip { revision_id: i64, user: String },
    NothingToRestore,
}

/// Decide from the newest-first history what reverting the bot's last edit
/// means.
pub fn revert_target(revisions: &[Revision], username: &str) -> RevertTarget {
    let Some(latest) = revisions.first() else {
        return RevertTarget::NothingToRestore;
    };
    if latest.user != username {
        return RevertTarget::Skip {
            revision_id: latest.revision_id,
            user: latest.user.clone(),
        };
    }
    revisions
        .get(1)
        .map_or(RevertTarget::NothingToRestore, |previous| {
            RevertTarget::Restore(previous.content.clone())
        })
}

/// Read titles from the operator until end of input and undo the bot's
/// latest edit on each.
pub fn run<A, P>(editor: &mut Editor<'_, A, P>) -> Result<()>
where
    A: WikiWriteApi + ?Sized,
    P: Prompter,
{
    let username = editor
        .api()
        .username()
        .context("revert needs a logged-in bot account")?;

    while !editor.should_stop() {
        let Some(line) = editor.ask("> ") else {
            break;
        };
        let title = line.trim();
        if title.is_empty() {
            continue;
        }
        if let Err(error) = revert_page(editor, title, &username) {
            editor.fail(title, &error);
        }
    }
    Ok(())
}

fn revert_page<A, P>(editor: &mut Editor<'_, A, P>, title: &str, username: &str) -> Result<()>
where
    A: WikiWriteApi + ?Sized,
    P: Prompter,
{
    let api = editor.api();
    let revisions = api
        .revisions(title, 2)
        .with_context(|| format!("failed to read history of {title}"))?;

    match revert_target(&revisions, username) {
        RevertTarget::Skip { revision_id, user } => {
            println!("Skip page \"{title}\" (last revision {revision_id} by {user}).");
            editor.skip();
        }
        RevertTarget::NothingToRestore => {
            println!("Nothing to restore on \"{title}\".");
            editor.skip();
        }
        RevertTarget::Restore(content) => {
            let page = as_of_latest(api.page_info(title)?, &revisions)
                .with_context(|| format!("history of {title} is empty"))?;
            editor.apply(&page, content);
        }
    }
    Ok(())
}

/// The page as the inspected history left it, so the save conflicts if
/// anyone edited after the history was read.
fn as_of_latest(info: PageInfo, revisions: &[Revision]) -> Option<PageText> {
    revisions.first().map(|latest| PageText {
        info,
        content: latest.content.clone(),
        timestamp: Some(latest.timestamp.clone()),
    })
}
