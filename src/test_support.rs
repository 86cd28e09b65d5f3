//! Stub collaborators and fixtures shared by unit tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tempfile::TempDir;

use crate::db::{init_database, DbPool, NewGitRepository, PrState};
use crate::error::{AppError, AppResult};
use crate::git::{CommandOutput, CommandRunner, GitCommand};
use crate::host::{HostPullRequest, HostRepo, NewPullRequest, SourceHostClient};
use crate::textgen::TextGenerator;

/// Ordered log of collaborator calls, shareable between stubs
pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn test_pool() -> (TempDir, DbPool) {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(Some(&dir.path().join("test.db"))).unwrap();
    (dir, pool)
}

/// A directory that looks like a git working tree
pub fn fake_work_tree() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join(".git")).unwrap();
    dir
}

pub fn new_repo(local_path: &str) -> NewGitRepository {
    NewGitRepository {
        name: "app".into(),
        local_path: local_path.into(),
        github_owner: "octo".into(),
        github_repo: "app".into(),
        default_branch: "main".into(),
    }
}

pub fn ts(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value).unwrap().with_timezone(&Utc)
}

pub fn host_pull(id: i64, number: i64, created_at: &str) -> HostPullRequest {
    HostPullRequest {
        id,
        number,
        title: format!("PR {}", number),
        state: PrState::Open,
        html_url: format!("https://github.com/octo/app/pull/{}", number),
        created_at: ts(created_at),
        closed_at: None,
        merged_at: None,
        author: "mona".into(),
        base_branch: "main".into(),
        head_branch: format!("feature-{}", number),
    }
}

#[derive(Debug, Clone)]
pub struct RecordedCommand {
    pub command: GitCommand,
    pub working_dir: PathBuf,
    pub token: Option<String>,
}

/// Command runner answering by git subcommand; unscripted commands succeed with no output
#[derive(Default)]
pub struct ScriptedRunner {
    responses: HashMap<String, CommandOutput>,
    calls: Mutex<Vec<RecordedCommand>>,
    journal: Journal,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, subcommand: &str, output: CommandOutput) -> Self {
        self.responses.insert(subcommand.to_string(), output);
        self
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    pub fn calls(&self) -> Vec<RecordedCommand> {
        self.calls.lock().unwrap().clone()
    }

    pub fn ran(&self, subcommand: &str) -> bool {
        self.calls()
            .iter()
            .any(|c| c.command.subcommand() == Some(subcommand))
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn execute(
        &self,
        command: &GitCommand,
        working_dir: &Path,
        token: Option<&str>,
    ) -> CommandOutput {
        let subcommand = command.subcommand().unwrap_or_default().to_string();
        self.journal
            .lock()
            .unwrap()
            .push(format!("git {}", subcommand));
        self.calls.lock().unwrap().push(RecordedCommand {
            command: command.clone(),
            working_dir: working_dir.to_path_buf(),
            token: token.map(String::from),
        });

        self.responses
            .get(&subcommand)
            .cloned()
            .unwrap_or_else(|| CommandOutput::succeeded(""))
    }
}

/// In-memory source host. Created pull requests show up in later listings.
#[derive(Default)]
pub struct StubHost {
    pulls: Mutex<Vec<HostPullRequest>>,
    repos: Vec<HostRepo>,
    branches: Vec<String>,
    create_error: Option<String>,
    list_error: Option<String>,
    created: Mutex<Vec<NewPullRequest>>,
    tokens: Mutex<Vec<String>>,
    journal: Journal,
}

impl StubHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pulls(self, pulls: Vec<HostPullRequest>) -> Self {
        *self.pulls.lock().unwrap() = pulls;
        self
    }

    pub fn with_repos(mut self, repos: Vec<HostRepo>) -> Self {
        self.repos = repos;
        self
    }

    pub fn with_branches(mut self, branches: &[&str]) -> Self {
        self.branches = branches.iter().map(|b| b.to_string()).collect();
        self
    }

    pub fn failing_create(mut self, message: &str) -> Self {
        self.create_error = Some(message.to_string());
        self
    }

    pub fn failing_list(mut self, message: &str) -> Self {
        self.list_error = Some(message.to_string());
        self
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    pub fn created(&self) -> Vec<NewPullRequest> {
        self.created.lock().unwrap().clone()
    }

    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap().clone()
    }

    fn record(&self, token: &str, call: &str) {
        self.tokens.lock().unwrap().push(token.to_string());
        self.journal.lock().unwrap().push(format!("host {}", call));
    }
}

#[async_trait]
impl SourceHostClient for StubHost {
    async fn list_repos(&self, token: &str) -> AppResult<Vec<HostRepo>> {
        self.record(token, "list_repos");
        Ok(self.repos.clone())
    }

    async fn list_branches(&self, token: &str, _owner: &str, _repo: &str) -> AppResult<Vec<String>> {
        self.record(token, "list_branches");
        Ok(self.branches.clone())
    }

    async fn create_pull_request(
        &self,
        token: &str,
        request: &NewPullRequest,
    ) -> AppResult<HostPullRequest> {
        self.record(token, "create_pull_request");
        if let Some(ref message) = self.create_error {
            return Err(AppError::host_api(message.clone(), Some(422)));
        }

        self.created.lock().unwrap().push(request.clone());
        let mut pulls = self.pulls.lock().unwrap();
        let number = pulls.len() as i64 + 1;
        let pull = HostPullRequest {
            id: 1000 + number,
            number,
            title: request.title.clone(),
            state: PrState::Open,
            html_url: format!(
                "https://github.com/{}/{}/pull/{}",
                request.owner, request.repo, number
            ),
            created_at: Utc::now(),
            closed_at: None,
            merged_at: None,
            author: "mona".into(),
            base_branch: request.base.clone(),
            head_branch: request.head.clone(),
        };
        pulls.push(pull.clone());
        Ok(pull)
    }

    async fn list_pull_requests(
        &self,
        token: &str,
        _owner: &str,
        _repo: &str,
    ) -> AppResult<Vec<HostPullRequest>> {
        self.record(token, "list_pull_requests");
        if let Some(ref message) = self.list_error {
            return Err(AppError::host_api(message.clone(), Some(502)));
        }
        Ok(self.pulls.lock().unwrap().clone())
    }
}

/// Text generator returning a fixed answer and recording `(prompt, provider)` pairs
pub struct CannedGenerator {
    answer: Result<String, String>,
    calls: Mutex<Vec<(String, String)>>,
}

impl CannedGenerator {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: Ok(answer.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            answer: Err(message.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for CannedGenerator {
    async fn generate(&self, prompt: &str, provider: &str) -> AppResult<String> {
        self.calls
            .lock()
            .unwrap()
            .push((prompt.to_string(), provider.to_string()));
        self.answer.clone().map_err(AppError::Generation)
    }
}
