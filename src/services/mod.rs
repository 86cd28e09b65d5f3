// Repository-level workflows built on the db, git and host layers
pub mod drafts;
pub mod publish;
pub mod pulls;
pub mod report;
pub mod repositories;
pub mod settings;

pub use drafts::{DraftRequest, Drafter, PublishDraft};
pub use publish::{CommitAndPrParams, PipelineRun, PipelineStep, Publisher, RepoLocks};
pub use pulls::{PullRequestStore, SyncSummary};
pub use report::{ReportGenerator, WeeklyReportRequest, WeeklyReportResult};
pub use repositories::{RegisterRepositoryRequest, Registration, RepositoryRegistry};
pub use settings::{SettingsStore, UpdateSettingsRequest};
