//! Source-host (GitHub-shaped) collaborator.
//!
//! The engine only talks to the host through [`SourceHostClient`]; the
//! bundled [`GitHubClient`] is the default implementation.

mod github;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use github::{GitHubClient, DEFAULT_API_URL};

use crate::db::{GitRepository, PrRecord, PrState};
use crate::error::{AppError, AppResult};

/// Repository visible to the authenticated user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRepo {
    pub id: i64,
    pub owner: String,
    pub name: String,
    pub full_name: String,
    pub private: bool,
    pub default_branch: Option<String>,
    pub html_url: String,
}

/// Pull request as reported by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPullRequest {
    pub id: i64,
    pub number: i64,
    pub title: String,
    pub state: PrState,
    pub html_url: String,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
    pub author: String,
    pub base_branch: String,
    pub head_branch: String,
}

impl HostPullRequest {
    pub fn into_record(self, repository_id: i64) -> PrRecord {
        PrRecord {
            id: self.id,
            repository_id,
            title: self.title,
            number: self.number,
            state: self.state,
            html_url: self.html_url,
            created_at: self.created_at,
            closed_at: self.closed_at,
            merged_at: self.merged_at,
            author: self.author,
            base_branch: self.base_branch,
            head_branch: self.head_branch,
        }
    }
}

/// Parameters for opening a pull request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewPullRequest {
    pub owner: String,
    pub repo: String,
    pub head: String,
    pub base: String,
    pub title: String,
    pub body: String,
}

#[async_trait]
pub trait SourceHostClient: Send + Sync {
    async fn list_repos(&self, token: &str) -> AppResult<Vec<HostRepo>>;

    async fn list_branches(&self, token: &str, owner: &str, repo: &str) -> AppResult<Vec<String>>;

    async fn create_pull_request(
        &self,
        token: &str,
        request: &NewPullRequest,
    ) -> AppResult<HostPullRequest>;

    /// All pull requests of a repository, open and closed
    async fn list_pull_requests(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
    ) -> AppResult<Vec<HostPullRequest>>;
}

/// Source-host client paired with the token it authenticates with
#[derive(Clone)]
pub struct HostContext {
    client: Arc<dyn SourceHostClient>,
    token: Option<String>,
}

impl HostContext {
    pub fn new(client: Arc<dyn SourceHostClient>, token: Option<String>) -> Self {
        // A blank token is as good as none
        let token = token.filter(|t| !t.trim().is_empty());
        Self { client, token }
    }

    pub fn client(&self) -> &dyn SourceHostClient {
        self.client.as_ref()
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    pub fn token(&self) -> AppResult<&str> {
        self.token.as_deref().ok_or_else(|| {
            AppError::PreconditionFailed("GitHub token is not configured".into())
        })
    }

    /// Repositories the token's owner can see
    pub async fn list_repositories(&self) -> AppResult<Vec<HostRepo>> {
        let token = self.token()?;
        self.client.list_repos(token).await
    }

    /// Remote branches of a registered repository, for picking a PR target
    pub async fn list_branches(&self, repository: &GitRepository) -> AppResult<Vec<String>> {
        let token = self.token()?;
        self.client
            .list_branches(token, &repository.github_owner, &repository.github_repo)
            .await
    }
}
