use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::error::AppResult;
use crate::git::{CommandRunner, ProcessCommandRunner};
use crate::host::{GitHubClient, HostContext, HostRepo, SourceHostClient};
use crate::services::{
    Drafter, Publisher, PullRequestStore, RegisterRepositoryRequest, Registration,
    ReportGenerator, RepositoryRegistry, SettingsStore,
};
use crate::textgen::TextGenerator;

/// Every service wired to one database and one set of collaborators
pub struct AppState {
    pub db: DbPool,
    pub registry: RepositoryRegistry,
    pub settings: SettingsStore,
    pub pulls: PullRequestStore,
    pub publisher: Publisher,
    pub reports: ReportGenerator,
    pub drafter: Drafter,
    runner: Arc<dyn CommandRunner>,
    host: HostContext,
}

impl AppState {
    /// Create application state from explicit collaborators
    pub fn new(
        db: DbPool,
        runner: Arc<dyn CommandRunner>,
        host_client: Arc<dyn SourceHostClient>,
        github_token: Option<String>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        let host = HostContext::new(host_client, github_token);
        let registry = RepositoryRegistry::new(db.clone());
        let settings = SettingsStore::new(db.clone());
        let pulls = PullRequestStore::new(db.clone(), host.clone());
        let publisher = Publisher::new(db.clone(), runner.clone(), host.clone(), pulls.clone());
        let reports = ReportGenerator::new(pulls.clone(), settings.clone(), generator.clone());
        let drafter = Drafter::new(db.clone(), runner.clone(), settings.clone(), generator);

        Self {
            db,
            registry,
            settings,
            pulls,
            publisher,
            reports,
            drafter,
            runner,
            host,
        }
    }

    /// Initialize from environment configuration
    pub fn init(generator: Arc<dyn TextGenerator>) -> AppResult<Self> {
        Self::init_with_config(AppConfig::from_env()?, generator)
    }

    /// Initialize with the local git binary and the GitHub REST API
    pub fn init_with_config(config: AppConfig, generator: Arc<dyn TextGenerator>) -> AppResult<Self> {
        let db = crate::db::init_database(config.db_path.as_deref())?;
        let runner = Arc::new(ProcessCommandRunner::new(config.command_timeout));
        let client = Arc::new(GitHubClient::new(&config.github_api_url, config.http_timeout)?);

        if config.github_token.is_none() {
            tracing::warn!("GITHUB_TOKEN is not set; publishing and sync are disabled");
        }

        Ok(Self::new(db, runner, client, config.github_token, generator))
    }

    /// Validate a local working tree, detect its remote and register it
    pub async fn register_repository(
        &self,
        request: RegisterRepositoryRequest,
    ) -> AppResult<Registration> {
        self.registry.register(self.runner.as_ref(), request).await
    }

    pub async fn list_host_repositories(&self) -> AppResult<Vec<HostRepo>> {
        self.host.list_repositories().await
    }

    /// Remote branches of a registered repository
    pub async fn list_remote_branches(&self, repository_id: i64) -> AppResult<Vec<String>> {
        let repository = self.registry.get_by_id(repository_id)?;
        self.host.list_branches(&repository).await
    }
}
