//! Commit-and-publish pipeline.
//!
//! One run stages the working tree, commits, pushes the checked-out branch,
//! opens a pull request and refreshes the local pull-request cache. Steps run
//! strictly in sequence; the first failure ends the run and nothing that
//! already happened is undone. A failed push, for example, leaves the local
//! commit in place for the user to deal with.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, OwnedMutexGuard};

use crate::db::{get_repository_by_id, DbPool, GitRepository};
use crate::error::{AppError, AppResult};
use crate::git::{current_branch, CommandRunner, GitCommand};
use crate::host::{HostContext, HostPullRequest, NewPullRequest};
use crate::services::pulls::PullRequestStore;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommitAndPrParams {
    pub repository_id: i64,
    pub change_description: String,
    /// Used verbatim; draft it beforehand if it should be generated
    pub commit_message: String,
    /// Defaults to the commit message
    pub pr_title: Option<String>,
    /// Defaults to the change description
    pub pr_body: Option<String>,
    pub target_branch: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    Idle,
    Staging,
    Committing,
    Pushing,
    #[serde(rename = "creating_pr")]
    CreatingPR,
    SyncingRecords,
    Done,
    Failed,
}

#[derive(Debug, Serialize)]
pub struct PipelineRun {
    pub repository_id: i64,
    pub change_description: String,
    pub commit_message: String,
    pub pr_title: String,
    pub target_branch: String,
    pub current_step: PipelineStep,
    /// Set only when `current_step` is `Failed`
    pub failed_step: Option<PipelineStep>,
    pub error: Option<AppError>,
    pub completed_steps: Vec<PipelineStep>,
    pub pull_request: Option<HostPullRequest>,
    pub synced_count: Option<usize>,
}

impl PipelineRun {
    fn new(params: &CommitAndPrParams) -> Self {
        let pr_title = params
            .pr_title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(&params.commit_message)
            .to_string();

        Self {
            repository_id: params.repository_id,
            change_description: params.change_description.clone(),
            commit_message: params.commit_message.clone(),
            pr_title,
            target_branch: params.target_branch.trim().to_string(),
            current_step: PipelineStep::Idle,
            failed_step: None,
            error: None,
            completed_steps: Vec::new(),
            pull_request: None,
            synced_count: None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.current_step == PipelineStep::Done
    }

    pub fn is_failed(&self) -> bool {
        self.current_step == PipelineStep::Failed
    }

    fn enter(&mut self, step: PipelineStep, progress: Option<&watch::Sender<PipelineStep>>) {
        if self.current_step != PipelineStep::Idle {
            self.completed_steps.push(self.current_step);
        }
        self.current_step = step;
        tracing::info!("Repository {}: {:?}", self.repository_id, step);
        if let Some(progress) = progress {
            progress.send_replace(step);
        }
    }

    fn fail(&mut self, error: AppError, progress: Option<&watch::Sender<PipelineStep>>) {
        tracing::error!(
            "Repository {}: {:?} failed: {}",
            self.repository_id,
            self.current_step,
            error
        );
        self.failed_step = Some(self.current_step);
        self.current_step = PipelineStep::Failed;
        self.error = Some(error);
        if let Some(progress) = progress {
            progress.send_replace(PipelineStep::Failed);
        }
    }
}

/// Per-repository mutex so two runs never touch one working tree at once
#[derive(Clone, Default)]
pub struct RepoLocks {
    locks: Arc<Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>>,
}

impl RepoLocks {
    fn lock_for(&self, repository_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // An entry only the map references has no holder and no waiter
        locks.retain(|id, lock| *id == repository_id || Arc::strong_count(lock) > 1);
        locks.entry(repository_id).or_default().clone()
    }

    pub async fn acquire(&self, repository_id: i64) -> OwnedMutexGuard<()> {
        self.lock_for(repository_id).lock_owned().await
    }
}

fn require(value: &str, field: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::PreconditionFailed(format!("{} is required", field)));
    }
    Ok(())
}

#[derive(Clone)]
pub struct Publisher {
    db: DbPool,
    runner: Arc<dyn CommandRunner>,
    host: HostContext,
    pulls: PullRequestStore,
    locks: RepoLocks,
}

impl Publisher {
    pub fn new(
        db: DbPool,
        runner: Arc<dyn CommandRunner>,
        host: HostContext,
        pulls: PullRequestStore,
    ) -> Self {
        Self {
            db,
            runner,
            host,
            pulls,
            locks: RepoLocks::default(),
        }
    }

    pub async fn run(&self, params: CommitAndPrParams) -> AppResult<PipelineRun> {
        self.run_with_progress(params, None).await
    }

    /// Run the pipeline, publishing each step entered on `progress`.
    ///
    /// Unmet preconditions return `Err` before any step starts. Once a step
    /// has started the result is always `Ok`, and a failure is reported
    /// through `PipelineRun::current_step == Failed`.
    pub async fn run_with_progress(
        &self,
        params: CommitAndPrParams,
        progress: Option<&watch::Sender<PipelineStep>>,
    ) -> AppResult<PipelineRun> {
        require(&params.change_description, "change description")?;
        require(&params.commit_message, "commit message")?;
        require(&params.target_branch, "target branch")?;
        let token = self.host.token()?;
        let repository = get_repository_by_id(&self.db, params.repository_id)?;

        let _guard = self.locks.acquire(repository.id).await;

        let mut run = PipelineRun::new(&params);
        let body = params
            .pr_body
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .unwrap_or(&params.change_description)
            .to_string();

        match self
            .execute_steps(&mut run, &repository, token, body, progress)
            .await
        {
            Ok(()) => {
                run.enter(PipelineStep::Done, progress);
                tracing::info!(
                    "Published {} to {}/{}",
                    run.commit_message.lines().next().unwrap_or_default(),
                    repository.github_owner,
                    repository.github_repo
                );
            }
            Err(e) => run.fail(e, progress),
        }

        Ok(run)
    }

    async fn execute_steps(
        &self,
        run: &mut PipelineRun,
        repository: &GitRepository,
        token: &str,
        body: String,
        progress: Option<&watch::Sender<PipelineStep>>,
    ) -> AppResult<()> {
        let work_tree = Path::new(&repository.local_path);

        run.enter(PipelineStep::Staging, progress);
        self.git(&GitCommand::add_all(), work_tree, None).await?;

        run.enter(PipelineStep::Committing, progress);
        self.git(&GitCommand::commit(&run.commit_message), work_tree, None)
            .await?;

        run.enter(PipelineStep::Pushing, progress);
        let branch = current_branch(self.runner.as_ref(), work_tree).await?;
        self.git(&GitCommand::push(&branch), work_tree, Some(token))
            .await?;

        run.enter(PipelineStep::CreatingPR, progress);
        let request = NewPullRequest {
            owner: repository.github_owner.clone(),
            repo: repository.github_repo.clone(),
            head: branch,
            base: run.target_branch.clone(),
            title: run.pr_title.clone(),
            body,
        };
        let pull = self
            .host
            .client()
            .create_pull_request(token, &request)
            .await?;
        tracing::info!("Opened pull request #{}: {}", pull.number, pull.html_url);
        run.pull_request = Some(pull);

        run.enter(PipelineStep::SyncingRecords, progress);
        let summary = self.pulls.sync(repository.id).await?;
        run.synced_count = Some(summary.count);

        Ok(())
    }

    async fn git(
        &self,
        command: &GitCommand,
        work_tree: &Path,
        token: Option<&str>,
    ) -> AppResult<String> {
        self.runner
            .execute(command, work_tree, token)
            .await
            .into_result(command)
    }
}
