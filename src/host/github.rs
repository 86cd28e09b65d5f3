//! GitHub REST v3 client.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{HostPullRequest, HostRepo, NewPullRequest, SourceHostClient};
use crate::db::PrState;
use crate::error::{AppError, AppResult};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

const PER_PAGE: usize = 100;
/// Listings longer than this many pages fail instead of returning a partial result
const MAX_PAGES: u32 = 50;

#[derive(Debug, Deserialize)]
struct GitHubUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct GitHubRef {
    #[serde(rename = "ref")]
    ref_name: String,
}

#[derive(Debug, Deserialize)]
struct GitHubPull {
    id: i64,
    number: i64,
    title: String,
    state: String,
    html_url: String,
    created_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    merged_at: Option<DateTime<Utc>>,
    user: Option<GitHubUser>,
    base: GitHubRef,
    head: GitHubRef,
}

impl From<GitHubPull> for HostPullRequest {
    fn from(pull: GitHubPull) -> Self {
        // GitHub reports merged pulls as "closed" with a merge timestamp
        let state = if pull.merged_at.is_some() {
            PrState::Merged
        } else if pull.state == "closed" {
            PrState::Closed
        } else {
            PrState::Open
        };

        HostPullRequest {
            id: pull.id,
            number: pull.number,
            title: pull.title,
            state,
            html_url: pull.html_url,
            created_at: pull.created_at,
            closed_at: pull.closed_at,
            merged_at: pull.merged_at,
            author: pull.user.map(|u| u.login).unwrap_or_default(),
            base_branch: pull.base.ref_name,
            head_branch: pull.head.ref_name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GitHubRepo {
    id: i64,
    name: String,
    full_name: String,
    owner: GitHubUser,
    #[serde(default)]
    private: bool,
    default_branch: Option<String>,
    html_url: String,
}

impl From<GitHubRepo> for HostRepo {
    fn from(repo: GitHubRepo) -> Self {
        HostRepo {
            id: repo.id,
            owner: repo.owner.login,
            name: repo.name,
            full_name: repo.full_name,
            private: repo.private,
            default_branch: repo.default_branch,
            html_url: repo.html_url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GitHubBranch {
    name: String,
}

#[derive(Debug, Serialize)]
struct CreatePullBody<'a> {
    title: &'a str,
    head: &'a str,
    base: &'a str,
    body: &'a str,
}

#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: Client,
    base_url: Url,
    max_pages: u32,
}

impl GitHubClient {
    pub fn new(api_url: &str, timeout: Duration) -> AppResult<Self> {
        // Url::join drops the last segment unless the base ends with a slash
        let normalized = format!("{}/", api_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalized)
            .map_err(|e| AppError::Config(format!("Invalid GitHub API URL {}: {}", api_url, e)))?;

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            header::HeaderValue::from_static("2022-11-28"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .user_agent(concat!("git-project-manager/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            max_pages: MAX_PAGES,
        })
    }

    #[cfg(test)]
    fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages;
        self
    }

    fn endpoint(&self, path: &str) -> AppResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| AppError::Internal(format!("Invalid endpoint {}: {}", path, e)))
    }

    fn authorized(&self, request: RequestBuilder, token: &str) -> RequestBuilder {
        request.bearer_auth(token)
    }

    async fn handle_response<T: DeserializeOwned>(
        response: Response,
        endpoint: &str,
    ) -> AppResult<T> {
        let status = response.status();

        if status.is_success() {
            return response.json::<T>().await.map_err(|e| {
                AppError::host_api(
                    format!("Failed to parse response from {}: {}", endpoint, e),
                    Some(status.as_u16()),
                )
            });
        }

        let rate_limited = response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .map(|v| v == "0")
            .unwrap_or(false);
        let body = response.text().await.unwrap_or_default();

        Err(describe_failure(status, rate_limited, &body, endpoint))
    }

    /// GET every page of a listing endpoint.
    ///
    /// A page that is still full at the page limit is an error; the caller never
    /// sees a silently truncated listing.
    async fn get_all_pages<T: DeserializeOwned>(
        &self,
        token: &str,
        path: &str,
        query: &[(&str, &str)],
    ) -> AppResult<Vec<T>> {
        let url = self.endpoint(path)?;
        let mut all = Vec::new();

        for page in 1..=self.max_pages {
            let request = self
                .client
                .get(url.clone())
                .query(query)
                .query(&[("per_page", PER_PAGE.to_string()), ("page", page.to_string())]);

            let response = self.authorized(request, token).send().await?;
            let items: Vec<T> = Self::handle_response(response, path).await?;
            let received = items.len();
            all.extend(items);

            if received < PER_PAGE {
                return Ok(all);
            }
        }

        tracing::warn!("Stopped paging {} after {} pages", path, self.max_pages);
        Err(AppError::host_api(
            format!(
                "Listing {} exceeds {} pages of {} items; refusing a partial result",
                path, self.max_pages, PER_PAGE
            ),
            None,
        ))
    }
}

/// Turn a non-2xx response into a `HostApi` error
fn describe_failure(status: StatusCode, rate_limited: bool, body: &str, endpoint: &str) -> AppError {
    let body_message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from));

    let message = match (status, body_message) {
        (StatusCode::UNAUTHORIZED, _) => "Authentication rejected: check the GitHub token".to_string(),
        (StatusCode::FORBIDDEN, _) | (StatusCode::TOO_MANY_REQUESTS, _) if rate_limited => {
            "Rate limit exceeded".to_string()
        }
        (StatusCode::FORBIDDEN, Some(msg)) => format!("Access denied: {}", msg),
        (StatusCode::NOT_FOUND, _) => format!("Resource not found: {}", endpoint),
        (_, Some(msg)) => msg,
        _ => format!("Request to {} failed ({})", endpoint, status.as_u16()),
    };

    tracing::error!("GitHub API error on {}: {} ({})", endpoint, message, status);
    AppError::host_api(message, Some(status.as_u16()))
}

#[async_trait]
impl SourceHostClient for GitHubClient {
    async fn list_repos(&self, token: &str) -> AppResult<Vec<HostRepo>> {
        let repos: Vec<GitHubRepo> = self
            .get_all_pages(token, "user/repos", &[("sort", "updated")])
            .await?;
        Ok(repos.into_iter().map(HostRepo::from).collect())
    }

    async fn list_branches(&self, token: &str, owner: &str, repo: &str) -> AppResult<Vec<String>> {
        let path = format!("repos/{}/{}/branches", owner, repo);
        let branches: Vec<GitHubBranch> = self.get_all_pages(token, &path, &[]).await?;
        Ok(branches.into_iter().map(|b| b.name).collect())
    }

    async fn create_pull_request(
        &self,
        token: &str,
        request: &NewPullRequest,
    ) -> AppResult<HostPullRequest> {
        let path = format!("repos/{}/{}/pulls", request.owner, request.repo);
        let url = self.endpoint(&path)?;

        let body = CreatePullBody {
            title: &request.title,
            head: &request.head,
            base: &request.base,
            body: &request.body,
        };

        let response = self
            .authorized(self.client.post(url), token)
            .json(&body)
            .send()
            .await?;
        let pull: GitHubPull = Self::handle_response(response, &path).await?;

        tracing::info!("Opened pull request #{} at {}", pull.number, pull.html_url);
        Ok(pull.into())
    }

    async fn list_pull_requests(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
    ) -> AppResult<Vec<HostPullRequest>> {
        let path = format!("repos/{}/{}/pulls", owner, repo);
        let pulls: Vec<GitHubPull> = self
            .get_all_pages(token, &path, &[("state", "all")])
            .await?;
        Ok(pulls.into_iter().map(HostPullRequest::from).collect())
    }
}
