use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row};

use crate::db::models::parse_timestamp;
use crate::db::{DbPool, GitRepository, PrRecord, PrState};
use crate::error::AppError;

pub(crate) const REPOSITORY_COLUMNS: &str = "id, name, local_path, github_owner, github_repo,
        default_branch, last_synced_at, created_at, updated_at";

pub(crate) const PULL_REQUEST_COLUMNS: &str = "id, repository_id, title, number, state, html_url,
        created_at, closed_at, merged_at, author, base_branch, head_branch";

fn conversion_error(idx: usize, err: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}

fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let value: String = row.get(idx)?;
    parse_timestamp(&value).map_err(|e| conversion_error(idx, e))
}

fn optional_timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let value: Option<String> = row.get(idx)?;
    value
        .map(|v| parse_timestamp(&v).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

/// Map a row selected with [`REPOSITORY_COLUMNS`]
pub(crate) fn repository_from_row(row: &Row<'_>) -> rusqlite::Result<GitRepository> {
    Ok(GitRepository {
        id: row.get(0)?,
        name: row.get(1)?,
        local_path: row.get(2)?,
        github_owner: row.get(3)?,
        github_repo: row.get(4)?,
        default_branch: row.get(5)?,
        last_synced_at: optional_timestamp_at(row, 6)?,
        created_at: timestamp_at(row, 7)?,
        updated_at: timestamp_at(row, 8)?,
    })
}

/// Map a row selected with [`PULL_REQUEST_COLUMNS`]
pub(crate) fn pull_request_from_row(row: &Row<'_>) -> rusqlite::Result<PrRecord> {
    let state_str: String = row.get(4)?;
    let state: PrState = state_str.parse().map_err(|e: String| {
        conversion_error(4, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })?;

    Ok(PrRecord {
        id: row.get(0)?,
        repository_id: row.get(1)?,
        title: row.get(2)?,
        number: row.get(3)?,
        state,
        html_url: row.get(5)?,
        created_at: timestamp_at(row, 6)?,
        closed_at: optional_timestamp_at(row, 7)?,
        merged_at: optional_timestamp_at(row, 8)?,
        author: row.get(9)?,
        base_branch: row.get(10)?,
        head_branch: row.get(11)?,
    })
}

/// Get repository by ID from database
pub fn get_repository_by_id(db: &DbPool, id: i64) -> Result<GitRepository, AppError> {
    let conn = db.get()?;

    let sql = format!("SELECT {} FROM repositories WHERE id = ?1", REPOSITORY_COLUMNS);
    conn.query_row(&sql, [id], repository_from_row)
        .optional()?
        .ok_or_else(|| AppError::NotFound(format!("Repository with id {} not found", id)))
}
