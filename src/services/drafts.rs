use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::db::{get_repository_by_id, DbPool};
use crate::error::AppResult;
use crate::git::{working_tree_changes, CommandRunner, FileChange};
use crate::services::settings::SettingsStore;
use crate::textgen::{draft_commit_message, draft_pr_body, draft_pr_title, TextGenerator};

#[derive(Debug, Clone, Deserialize)]
pub struct DraftRequest {
    pub repository_id: i64,
    pub change_description: String,
    /// Falls back to the configured draft provider
    pub provider: Option<String>,
}

/// Everything the publish form needs, drafted in one go
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishDraft {
    pub changes: Vec<FileChange>,
    pub commit_message: String,
    pub pr_title: String,
    pub pr_body: String,
    pub provider: String,
}

/// Drafts commit and pull-request text from the working tree and a description
pub struct Drafter {
    db: DbPool,
    runner: Arc<dyn CommandRunner>,
    settings: SettingsStore,
    generator: Arc<dyn TextGenerator>,
}

impl Drafter {
    pub fn new(
        db: DbPool,
        runner: Arc<dyn CommandRunner>,
        settings: SettingsStore,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            db,
            runner,
            settings,
            generator,
        }
    }

    /// Uncommitted changes of a registered repository
    pub async fn changes(&self, repository_id: i64) -> AppResult<Vec<FileChange>> {
        let repository = get_repository_by_id(&self.db, repository_id)?;
        working_tree_changes(self.runner.as_ref(), Path::new(&repository.local_path)).await
    }

    pub async fn commit_message(&self, request: &DraftRequest) -> AppResult<String> {
        let provider = self.provider(request)?;
        let changes = self.changes(request.repository_id).await?;
        draft_commit_message(
            self.generator.as_ref(),
            &provider,
            &request.change_description,
            &changes,
        )
        .await
    }

    /// Commit message, PR title and PR body for the current working tree
    pub async fn publish_draft(&self, request: &DraftRequest) -> AppResult<PublishDraft> {
        let provider = self.provider(request)?;
        let changes = self.changes(request.repository_id).await?;
        let generator = self.generator.as_ref();

        let commit_message =
            draft_commit_message(generator, &provider, &request.change_description, &changes)
                .await?;
        let pr_title = draft_pr_title(
            generator,
            &provider,
            &request.change_description,
            &commit_message,
        )
        .await?;
        let pr_body =
            draft_pr_body(generator, &provider, &request.change_description, &changes).await?;

        Ok(PublishDraft {
            changes,
            commit_message,
            pr_title,
            pr_body,
            provider,
        })
    }

    fn provider(&self, request: &DraftRequest) -> AppResult<String> {
        match request
            .provider
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
        {
            Some(provider) => Ok(provider.to_string()),
            None => Ok(self.settings.get()?.draft_provider),
        }
    }
}
