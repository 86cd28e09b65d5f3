use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    pub id: i64,
    pub draft_provider: String,
    pub report_provider: String,
    pub created_at: String,
    pub updated_at: String,
}

/// A locally registered git working tree and the GitHub repository it publishes to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitRepository {
    pub id: i64,
    pub name: String,
    pub local_path: String,
    pub github_owner: String,
    pub github_repo: String,
    pub default_branch: String,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGitRepository {
    pub name: String,
    pub local_path: String,
    pub github_owner: String,
    pub github_repo: String,
    pub default_branch: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PrState {
    Open,
    Closed,
    Merged,
}

impl std::fmt::Display for PrState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrState::Open => write!(f, "open"),
            PrState::Closed => write!(f, "closed"),
            PrState::Merged => write!(f, "merged"),
        }
    }
}

impl std::str::FromStr for PrState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(PrState::Open),
            "closed" => Ok(PrState::Closed),
            "merged" => Ok(PrState::Merged),
            _ => Err(format!("Unknown pull request state: {}", s)),
        }
    }
}

/// Cached copy of a pull request. The source host stays authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrRecord {
    pub id: i64,
    pub repository_id: i64,
    pub title: String,
    pub number: i64,
    pub state: PrState,
    pub html_url: String,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
    pub author: String,
    pub base_branch: String,
    pub head_branch: String,
}

/// Stored instants use a fixed-width UTC form so that text order matches time order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Utc))
}
