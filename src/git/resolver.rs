use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::remote::parse_remote_url;
use super::{CommandRunner, GitCommand};

pub const FALLBACK_BRANCH: &str = "main";

static HEAD_BRANCH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"HEAD branch:\s*(\S+)").unwrap());

/// Reasons auto-detection produced an incomplete result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveWarning {
    RemoteNotFound,
    UnsupportedRemoteHost,
    OnlyGitHubFullySupported,
    DefaultBranchFallback,
}

impl std::fmt::Display for ResolveWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolveWarning::RemoteNotFound => write!(f, "remote not found"),
            ResolveWarning::UnsupportedRemoteHost => write!(f, "unsupported remote host"),
            ResolveWarning::OnlyGitHubFullySupported => write!(f, "only GitHub fully supported"),
            ResolveWarning::DefaultBranchFallback => write!(
                f,
                "default branch detection failed, falling back to {}",
                FALLBACK_BRANCH
            ),
        }
    }
}

/// Detected remote identity. Owner and repo are `None` when the user has to enter them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedRemote {
    pub host: Option<String>,
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub default_branch: String,
    pub warnings: Vec<ResolveWarning>,
}

impl ResolvedRemote {
    fn unresolved(warning: ResolveWarning) -> Self {
        Self {
            host: None,
            owner: None,
            repo: None,
            default_branch: FALLBACK_BRANCH.to_string(),
            warnings: vec![warning],
        }
    }
}

/// Auto-detects the GitHub identity and default branch of a working tree.
///
/// Never fails: every git invocation is tried on its own and a failure only
/// degrades the result, so registration can always continue with manual entry.
pub struct RemoteResolver<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> RemoteResolver<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    pub async fn resolve(&self, local_path: &Path) -> ResolvedRemote {
        let url = match self.run(&GitCommand::remote_origin_url(), local_path).await {
            Some(url) if !url.is_empty() => url,
            _ => {
                tracing::warn!("No origin remote configured in {:?}", local_path);
                return ResolvedRemote::unresolved(ResolveWarning::RemoteNotFound);
            }
        };

        let Some(remote) = parse_remote_url(&url) else {
            tracing::warn!("Unsupported remote URL for {:?}: {}", local_path, url);
            return ResolvedRemote::unresolved(ResolveWarning::UnsupportedRemoteHost);
        };

        let mut warnings = Vec::new();
        if !remote.is_github() {
            tracing::warn!("Remote host {} is not GitHub", remote.host);
            warnings.push(ResolveWarning::OnlyGitHubFullySupported);
        }

        let default_branch = match self.detect_default_branch(local_path).await {
            Some(branch) => branch,
            None => {
                tracing::warn!(
                    "Could not detect default branch for {:?}, using {}",
                    local_path,
                    FALLBACK_BRANCH
                );
                warnings.push(ResolveWarning::DefaultBranchFallback);
                FALLBACK_BRANCH.to_string()
            }
        };

        tracing::info!(
            "Resolved {:?} to {}/{} on {} (default branch {})",
            local_path,
            remote.owner,
            remote.repo,
            remote.host,
            default_branch
        );

        ResolvedRemote {
            host: Some(remote.host),
            owner: Some(remote.owner),
            repo: Some(remote.repo),
            default_branch,
            warnings,
        }
    }

    async fn detect_default_branch(&self, local_path: &Path) -> Option<String> {
        if let Some(head) = self.run(&GitCommand::origin_head(), local_path).await {
            let branch = head.rsplit('/').next().unwrap_or_default();
            if !branch.is_empty() {
                return Some(branch.to_string());
            }
        }

        let details = self
            .run(&GitCommand::remote_show_origin(), local_path)
            .await?;
        parse_head_branch(&details)
    }

    /// Trimmed stdout on success; failures are logged and swallowed
    async fn run(&self, command: &GitCommand, local_path: &Path) -> Option<String> {
        let output = self.runner.execute(command, local_path, None).await;
        if output.success {
            Some(output.stdout.trim().to_string())
        } else {
            tracing::debug!("`{}` failed: {}", command, output.failure_message());
            None
        }
    }
}

/// Extract the `HEAD branch:` value from `git remote show origin`
pub fn parse_head_branch(remote_show_output: &str) -> Option<String> {
    let caps = HEAD_BRANCH.captures(remote_show_output)?;
    let branch = caps.get(1)?.as_str();
    // Reported when the remote HEAD is ambiguous or unreachable
    if branch == "(unknown)" {
        return None;
    }
    Some(branch.to_string())
}
