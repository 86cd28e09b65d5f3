use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::services::pulls::PullRequestStore;
use crate::services::settings::SettingsStore;
use crate::textgen::{weekly_report_prompt, PrActivity, TextGenerator};

#[derive(Debug, Clone, Deserialize)]
pub struct WeeklyReportRequest {
    pub repository_ids: BTreeSet<i64>,
    /// Inclusive
    pub start_time: DateTime<Utc>,
    /// Inclusive
    pub end_time: DateTime<Utc>,
    pub selected_pr_ids: BTreeSet<i64>,
    /// Falls back to the configured report provider
    pub provider: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeeklyReportResult {
    pub report: String,
    pub provider: String,
}

pub struct ReportGenerator {
    pulls: PullRequestStore,
    settings: SettingsStore,
    generator: Arc<dyn TextGenerator>,
}

impl ReportGenerator {
    pub fn new(
        pulls: PullRequestStore,
        settings: SettingsStore,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            pulls,
            settings,
            generator,
        }
    }

    /// Generate a report from the selected cached pull requests.
    ///
    /// Selected ids that are not in the cached range are dropped silently.
    /// The generated text is returned as is.
    pub async fn generate(&self, request: WeeklyReportRequest) -> AppResult<WeeklyReportResult> {
        if request.selected_pr_ids.is_empty() {
            return Err(AppError::NoSelection);
        }

        let repository_ids: Vec<i64> = request.repository_ids.iter().copied().collect();
        let records = self.pulls.get_by_time_range(
            &repository_ids,
            &request.start_time,
            &request.end_time,
        )?;

        let activities: Vec<PrActivity> = records
            .into_iter()
            .filter(|record| request.selected_pr_ids.contains(&record.id))
            .map(|record| PrActivity {
                id: record.id,
                title: record.title,
                url: record.html_url,
                author: record.author,
                created_at: record.created_at,
                closed_at: record.closed_at,
            })
            .collect();

        if activities.len() < request.selected_pr_ids.len() {
            tracing::debug!(
                "{} of {} selected pull requests were not in the cached range",
                request.selected_pr_ids.len() - activities.len(),
                request.selected_pr_ids.len()
            );
        }

        let provider = match request
            .provider
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
        {
            Some(provider) => provider.to_string(),
            None => self.settings.get()?.report_provider,
        };

        let prompt = weekly_report_prompt(&activities, &request.start_time, &request.end_time)?;
        let report = self.generator.generate(&prompt, &provider).await?;

        tracing::info!(
            "Generated weekly report from {} pull requests with {}",
            activities.len(),
            provider
        );
        Ok(WeeklyReportResult { report, provider })
    }
}
