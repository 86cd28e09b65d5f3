use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{ErrorCode, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::db::queries::{repository_from_row, REPOSITORY_COLUMNS};
use crate::db::{format_timestamp, get_repository_by_id, DbPool, GitRepository, NewGitRepository};
use crate::error::{AppError, AppResult};
use crate::git::{CommandRunner, RemoteResolver, ResolveWarning};

/// Registration request; explicit fields override auto-detected ones
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterRepositoryRequest {
    pub local_path: String,
    pub name: Option<String>,
    pub github_owner: Option<String>,
    pub github_repo: Option<String>,
    pub default_branch: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub repository: GitRepository,
    pub warnings: Vec<ResolveWarning>,
}

/// Locally tracked repositories
#[derive(Clone)]
pub struct RepositoryRegistry {
    db: DbPool,
}

fn require_non_empty(value: &str, field: &str) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidInput(format!("{} cannot be empty", field)));
    }
    Ok(trimmed.to_string())
}

/// Non-empty trimmed value of an optional override
fn provided(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(String::from)
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

/// Canonical path of a directory holding a git repository
fn validate_work_tree(local_path: &str) -> AppResult<PathBuf> {
    let local_path = require_non_empty(local_path, "local_path")?;

    let path = std::fs::canonicalize(&local_path)
        .map_err(|_| AppError::InvalidInput(format!("Path does not exist: {}", local_path)))?;

    if !path.is_dir() {
        return Err(AppError::InvalidInput(format!(
            "Path is not a directory: {}",
            local_path
        )));
    }
    // `.git` is a file for linked worktrees and submodules
    if !path.join(".git").exists() {
        return Err(AppError::InvalidInput(format!(
            "Not a git repository: {}",
            local_path
        )));
    }
    Ok(path)
}

fn directory_name(path: &Path) -> Option<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
}

impl RepositoryRegistry {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Insert a repository. Remote detection is the caller's job (see [`Self::register`]).
    pub fn add(&self, input: NewGitRepository) -> AppResult<GitRepository> {
        let local_path = require_non_empty(&input.local_path, "local_path")?;
        let name = require_non_empty(&input.name, "name")?;
        let github_owner = require_non_empty(&input.github_owner, "github_owner")?;
        let github_repo = require_non_empty(&input.github_repo, "github_repo")?;
        let default_branch = require_non_empty(&input.default_branch, "default_branch")?;

        if self.get_by_path(&local_path)?.is_some() {
            return Err(AppError::Duplicate(format!(
                "Repository at {} is already registered",
                local_path
            )));
        }

        let conn = self.db.get()?;
        let now = format_timestamp(&Utc::now());

        let inserted = conn.execute(
            "INSERT INTO repositories (name, local_path, github_owner, github_repo, default_branch,
                                       created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            rusqlite::params![name, local_path, github_owner, github_repo, default_branch, now],
        );

        match inserted {
            Ok(_) => {}
            // Lost a race with a concurrent add of the same path
            Err(e) if is_unique_violation(&e) => {
                return Err(AppError::Duplicate(format!(
                    "Repository at {} is already registered",
                    local_path
                )));
            }
            Err(e) => return Err(e.into()),
        }

        let id = conn.last_insert_rowid();
        drop(conn);

        tracing::info!("Registered repository {} ({}) as id {}", name, local_path, id);
        self.get_by_id(id)
    }

    /// Validate the working tree, detect its remote, then [`Self::add`] it.
    pub async fn register(
        &self,
        runner: &dyn CommandRunner,
        request: RegisterRepositoryRequest,
    ) -> AppResult<Registration> {
        let path = validate_work_tree(&request.local_path)?;
        let local_path = path.to_string_lossy().into_owned();

        if self.get_by_path(&local_path)?.is_some() {
            return Err(AppError::Duplicate(format!(
                "Repository at {} is already registered",
                local_path
            )));
        }

        let resolved = RemoteResolver::new(runner).resolve(&path).await;

        let github_owner = provided(request.github_owner.as_ref()).or(resolved.owner);
        let github_repo = provided(request.github_repo.as_ref()).or(resolved.repo);

        let (Some(github_owner), Some(github_repo)) = (github_owner, github_repo) else {
            if resolved.warnings.contains(&ResolveWarning::UnsupportedRemoteHost) {
                return Err(AppError::RemoteParse(
                    "origin is not a recognized remote URL; enter owner and repository manually"
                        .into(),
                ));
            }
            let reason = resolved
                .warnings
                .first()
                .map(|w| w.to_string())
                .unwrap_or_else(|| "remote not found".to_string());
            return Err(AppError::InvalidInput(format!(
                "Could not detect the GitHub repository ({}); enter owner and repository manually",
                reason
            )));
        };

        let name = provided(request.name.as_ref())
            .or_else(|| directory_name(&path))
            .unwrap_or_else(|| github_repo.clone());
        let default_branch =
            provided(request.default_branch.as_ref()).unwrap_or(resolved.default_branch);

        let repository = self.add(NewGitRepository {
            name,
            local_path,
            github_owner,
            github_repo,
            default_branch,
        })?;

        Ok(Registration {
            repository,
            warnings: resolved.warnings,
        })
    }

    pub fn list(&self) -> AppResult<Vec<GitRepository>> {
        let conn = self.db.get()?;

        let sql = format!(
            "SELECT {} FROM repositories ORDER BY created_at DESC, id DESC",
            REPOSITORY_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;

        let repos = stmt
            .query_map([], repository_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(repos)
    }

    pub fn get_by_id(&self, id: i64) -> AppResult<GitRepository> {
        get_repository_by_id(&self.db, id)
    }

    pub fn get_by_path(&self, local_path: &str) -> AppResult<Option<GitRepository>> {
        let conn = self.db.get()?;

        let sql = format!(
            "SELECT {} FROM repositories WHERE local_path = ?1",
            REPOSITORY_COLUMNS
        );
        let repo = conn
            .query_row(&sql, [local_path], repository_from_row)
            .optional()?;

        Ok(repo)
    }

    /// Remove a repository together with its cached pull requests
    pub fn delete(&self, id: i64) -> AppResult<()> {
        let mut conn = self.db.get()?;
        let tx = conn.transaction()?;

        let removed_pulls = tx.execute("DELETE FROM pull_requests WHERE repository_id = ?1", [id])?;
        let affected = tx.execute("DELETE FROM repositories WHERE id = ?1", [id])?;

        if affected == 0 {
            // Dropping the transaction rolls it back
            return Err(AppError::NotFound(format!(
                "Repository with id {} not found",
                id
            )));
        }

        tx.commit()?;
        tracing::info!(
            "Deleted repository {} and {} cached pull requests",
            id,
            removed_pulls
        );
        Ok(())
    }

    pub fn rename(&self, id: i64, name: &str) -> AppResult<GitRepository> {
        let name = require_non_empty(name, "name")?;
        self.update_column(id, "name", &name)
    }

    pub fn set_default_branch(&self, id: i64, branch: &str) -> AppResult<GitRepository> {
        let branch = require_non_empty(branch, "default_branch")?;
        self.update_column(id, "default_branch", &branch)
    }

    fn update_column(&self, id: i64, column: &'static str, value: &str) -> AppResult<GitRepository> {
        let conn = self.db.get()?;

        let sql = format!(
            "UPDATE repositories SET {} = ?1, updated_at = ?2 WHERE id = ?3",
            column
        );
        let affected = conn.execute(
            &sql,
            rusqlite::params![value, format_timestamp(&Utc::now()), id],
        )?;
        drop(conn);

        if affected == 0 {
            return Err(AppError::NotFound(format!(
                "Repository with id {} not found",
                id
            )));
        }
        self.get_by_id(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::CommandOutput;
    use crate::test_support::{fake_work_tree, new_repo, test_pool, ScriptedRunner};

    #[test]
    fn test_add_and_get() {
        let (_dir, pool) = test_pool();
        let registry = RepositoryRegistry::new(pool);

        let repo = registry.add(new_repo("/work/app")).unwrap();

        assert_eq!(repo.local_path, "/work/app");
        assert_eq!(repo.created_at, repo.updated_at);
        assert_eq!(registry.get_by_id(repo.id).unwrap(), repo);
        assert_eq!(registry.list().unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_path_is_rejected() {
        let (_dir, pool) = test_pool();
        let registry = RepositoryRegistry::new(pool);

        registry.add(new_repo("/work/app")).unwrap();
        let err = registry.add(new_repo("/work/app")).unwrap_err();

        assert!(matches!(err, AppError::Duplicate(_)));
        assert_eq!(registry.list().unwrap().len(), 1);
    }

    #[test]
    fn test_empty_path_is_rejected() {
        let (_dir, pool) = test_pool();
        let registry = RepositoryRegistry::new(pool);

        let err = registry.add(new_repo("   ")).unwrap_err();

        assert!(matches!(err, AppError::InvalidInput(_)));
        assert!(registry.list().unwrap().is_empty());
    }

    #[test]
    fn test_get_unknown_id_is_not_found() {
        let (_dir, pool) = test_pool();
        let registry = RepositoryRegistry::new(pool);

        assert!(matches!(registry.get_by_id(42), Err(AppError::NotFound(_))));
        assert!(matches!(registry.delete(42), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_delete_cascades_to_pull_requests() {
        let (_dir, pool) = test_pool();
        let registry = RepositoryRegistry::new(pool.clone());
        let repo = registry.add(new_repo("/work/app")).unwrap();
        let other = registry.add(new_repo("/work/other")).unwrap();

        let conn = pool.get().unwrap();
        for (repository_id, id) in [(repo.id, 1), (repo.id, 2), (repo.id, 3), (other.id, 4)] {
            conn.execute(
                "INSERT INTO pull_requests (repository_id, id, number, title, state, html_url,
                    author, base_branch, head_branch, created_at)
                 VALUES (?1, ?2, ?2, 'title', 'open', 'url', 'mona', 'main', 'topic',
                    '2024-01-01T00:00:00Z')",
                rusqlite::params![repository_id, id],
            )
            .unwrap();
        }
        drop(conn);

        registry.delete(repo.id).unwrap();

        let conn = pool.get().unwrap();
        let remaining: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM pull_requests WHERE repository_id = ?1",
                [repo.id],
                |row| row.get(0),
            )
            .unwrap();
        let others: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM pull_requests WHERE repository_id = ?1",
                [other.id],
                |row| row.get(0),
            )
            .unwrap();

        assert_eq!(remaining, 0);
        assert_eq!(others, 1);
        assert!(matches!(registry.get_by_id(repo.id), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_rename_and_change_branch() {
        let (_dir, pool) = test_pool();
        let registry = RepositoryRegistry::new(pool);
        let repo = registry.add(new_repo("/work/app")).unwrap();

        let renamed = registry.rename(repo.id, "  Frontend ").unwrap();
        assert_eq!(renamed.name, "Frontend");

        let rebranched = registry.set_default_branch(repo.id, "develop").unwrap();
        assert_eq!(rebranched.default_branch, "develop");
        assert_eq!(rebranched.name, "Frontend");

        assert!(matches!(
            registry.rename(repo.id, ""),
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            registry.set_default_branch(999, "main"),
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_register_uses_detected_remote() {
        let (_dir, pool) = test_pool();
        let registry = RepositoryRegistry::new(pool);
        let work_tree = fake_work_tree();
        let runner = ScriptedRunner::new()
            .respond("config", CommandOutput::succeeded("git@github.com:octo/widgets.git\n"))
            .respond("symbolic-ref", CommandOutput::succeeded("origin/develop\n"));

        let registration = registry
            .register(
                &runner,
                RegisterRepositoryRequest {
                    local_path: work_tree.path().to_string_lossy().into_owned(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let repo = registration.repository;
        assert_eq!(repo.github_owner, "octo");
        assert_eq!(repo.github_repo, "widgets");
        assert_eq!(repo.default_branch, "develop");
        assert!(registration.warnings.is_empty());
        assert_eq!(
            Path::new(&repo.local_path),
            std::fs::canonicalize(work_tree.path()).unwrap()
        );
    }

    #[tokio::test]
    async fn test_register_without_remote_needs_manual_identity() {
        let (_dir, pool) = test_pool();
        let registry = RepositoryRegistry::new(pool);
        let work_tree = fake_work_tree();
        let runner = ScriptedRunner::new().respond("config", CommandOutput::failed(""));
        let local_path = work_tree.path().to_string_lossy().into_owned();

        let err = registry
            .register(
                &runner,
                RegisterRepositoryRequest {
                    local_path: local_path.clone(),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(ref m) if m.contains("remote not found")));

        let registration = registry
            .register(
                &runner,
                RegisterRepositoryRequest {
                    local_path,
                    name: Some("Widgets".into()),
                    github_owner: Some("octo".into()),
                    github_repo: Some("widgets".into()),
                    default_branch: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(registration.repository.name, "Widgets");
        assert_eq!(registration.repository.default_branch, "main");
        assert_eq!(registration.warnings, vec![ResolveWarning::RemoteNotFound]);
    }

    #[tokio::test]
    async fn test_register_with_unparseable_remote() {
        let (_dir, pool) = test_pool();
        let registry = RepositoryRegistry::new(pool);
        let work_tree = fake_work_tree();
        let runner = ScriptedRunner::new()
            .respond("config", CommandOutput::succeeded("/srv/git/app.git\n"));

        let err = registry
            .register(
                &runner,
                RegisterRepositoryRequest {
                    local_path: work_tree.path().to_string_lossy().into_owned(),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::RemoteParse(_)));
        assert!(registry.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_register_rejects_non_repository_and_duplicates() {
        let (_dir, pool) = test_pool();
        let registry = RepositoryRegistry::new(pool);
        let plain_dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new()
            .respond("config", CommandOutput::succeeded("https://github.com/octo/app.git"));

        let err = registry
            .register(
                &runner,
                RegisterRepositoryRequest {
                    local_path: plain_dir.path().to_string_lossy().into_owned(),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert!(runner.calls().is_empty());

        let work_tree = fake_work_tree();
        let request = RegisterRepositoryRequest {
            local_path: work_tree.path().to_string_lossy().into_owned(),
            ..Default::default()
        };
        registry.register(&runner, request.clone()).await.unwrap();
        let err = registry.register(&runner, request).await.unwrap_err();

        assert!(matches!(err, AppError::Duplicate(_)));
        assert_eq!(registry.list().unwrap().len(), 1);
    }
}
