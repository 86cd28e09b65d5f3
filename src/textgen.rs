//! Text-generation collaborator and the prompts this crate sends to it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::git::FileChange;

/// Opaque text-in/text-out generator (an LLM behind some provider)
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, provider: &str) -> AppResult<String>;
}

/// Minimal view of a pull request handed to the report prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrActivity {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

fn describe_changes(changes: &[FileChange]) -> String {
    if changes.is_empty() {
        return "(no file list available)".to_string();
    }
    changes
        .iter()
        .map(|c| match &c.old_path {
            Some(old) => format!("- {:?}: {} -> {}", c.status, old, c.path),
            None => format!("- {:?}: {}", c.status, c.path),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn commit_message_prompt(change_description: &str, changes: &[FileChange]) -> String {
    format!(
        "Write a concise git commit message in the Conventional Commits style \
         (a single subject line under 72 characters, optionally followed by a blank line and a short body).\n\
         Reply with the commit message only.\n\n\
         Description of the change:\n{}\n\nChanged files:\n{}",
        change_description.trim(),
        describe_changes(changes)
    )
}

pub fn pr_title_prompt(change_description: &str, commit_message: &str) -> String {
    format!(
        "Write a short pull request title (under 72 characters) for the change below. \
         Reply with the title only.\n\n\
         Description:\n{}\n\nCommit message:\n{}",
        change_description.trim(),
        commit_message.trim()
    )
}

pub fn pr_body_prompt(change_description: &str, changes: &[FileChange]) -> String {
    format!(
        "Write a pull request description in Markdown with a \"Summary\" section and a \
         \"Changes\" bullet list. Reply with the description only.\n\n\
         Description of the change:\n{}\n\nChanged files:\n{}",
        change_description.trim(),
        describe_changes(changes)
    )
}

pub fn weekly_report_prompt(
    activities: &[PrActivity],
    start: &DateTime<Utc>,
    end: &DateTime<Utc>,
) -> AppResult<String> {
    let activity_json = serde_json::to_string_pretty(activities)?;
    Ok(format!(
        "Write a weekly engineering report covering {} to {}. Group the pull requests \
         below by theme, summarize what was delivered, and list each pull request with its link.\n\n\
         Pull requests (JSON):\n{}",
        start.format("%Y-%m-%d"),
        end.format("%Y-%m-%d"),
        activity_json
    ))
}

async fn generate_trimmed(
    generator: &dyn TextGenerator,
    prompt: &str,
    provider: &str,
    what: &str,
) -> AppResult<String> {
    let text = generator.generate(prompt, provider).await?;
    let text = text.trim();
    if text.is_empty() {
        return Err(AppError::Generation(format!(
            "{} returned an empty {}",
            provider, what
        )));
    }
    Ok(text.to_string())
}

/// Draft a commit message. Callers pass the result to the publish pipeline.
pub async fn draft_commit_message(
    generator: &dyn TextGenerator,
    provider: &str,
    change_description: &str,
    changes: &[FileChange],
) -> AppResult<String> {
    if change_description.trim().is_empty() {
        return Err(AppError::InvalidInput(
            "change description cannot be empty".into(),
        ));
    }
    let prompt = commit_message_prompt(change_description, changes);
    generate_trimmed(generator, &prompt, provider, "commit message").await
}

pub async fn draft_pr_title(
    generator: &dyn TextGenerator,
    provider: &str,
    change_description: &str,
    commit_message: &str,
) -> AppResult<String> {
    let prompt = pr_title_prompt(change_description, commit_message);
    let title = generate_trimmed(generator, &prompt, provider, "pull request title").await?;
    // Models like to wrap one-liners in quotes
    Ok(title.trim_matches('"').to_string())
}

pub async fn draft_pr_body(
    generator: &dyn TextGenerator,
    provider: &str,
    change_description: &str,
    changes: &[FileChange],
) -> AppResult<String> {
    let prompt = pr_body_prompt(change_description, changes);
    generate_trimmed(generator, &prompt, provider, "pull request body").await
}
