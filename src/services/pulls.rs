use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;

use crate::db::queries::{pull_request_from_row, PULL_REQUEST_COLUMNS};
use crate::db::{format_timestamp, get_repository_by_id, DbPool, PrRecord};
use crate::error::{AppError, AppResult};
use crate::host::HostContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub repository_id: i64,
    pub count: usize,
}

/// Local cache of host pull requests. The host stays authoritative.
#[derive(Clone)]
pub struct PullRequestStore {
    db: DbPool,
    host: HostContext,
}

impl PullRequestStore {
    pub fn new(db: DbPool, host: HostContext) -> Self {
        Self { db, host }
    }

    /// Fetch every pull request of a repository and upsert it into the cache.
    ///
    /// Records that vanished upstream are left in place.
    pub async fn sync(&self, repository_id: i64) -> AppResult<SyncSummary> {
        let repository = get_repository_by_id(&self.db, repository_id)?;
        let token = self.host.token()?;

        let pulls = self
            .host
            .client()
            .list_pull_requests(token, &repository.github_owner, &repository.github_repo)
            .await?;
        let records: Vec<PrRecord> = pulls
            .into_iter()
            .map(|pull| pull.into_record(repository_id))
            .collect();

        let count = self.upsert(repository_id, &records)?;

        tracing::info!(
            "Synced {} pull requests for {}/{}",
            count,
            repository.github_owner,
            repository.github_repo
        );
        Ok(SyncSummary {
            repository_id,
            count,
        })
    }

    /// Sync several repositories concurrently. Results keep the order of `repository_ids`.
    pub async fn sync_many(&self, repository_ids: &[i64]) -> Vec<AppResult<SyncSummary>> {
        let results = join_all(repository_ids.iter().map(|&id| self.sync(id))).await;

        for (id, result) in repository_ids.iter().zip(&results) {
            if let Err(e) = result {
                tracing::warn!("Sync of repository {} failed: {}", id, e);
            }
        }
        results
    }

    fn upsert(&self, repository_id: i64, records: &[PrRecord]) -> AppResult<usize> {
        let mut conn = self.db.get()?;
        let tx = conn.transaction()?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO pull_requests (repository_id, id, number, title, state, html_url,
                                            author, base_branch, head_branch,
                                            created_at, closed_at, merged_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                 ON CONFLICT(repository_id, id) DO UPDATE SET
                    number = excluded.number,
                    title = excluded.title,
                    state = excluded.state,
                    html_url = excluded.html_url,
                    author = excluded.author,
                    base_branch = excluded.base_branch,
                    head_branch = excluded.head_branch,
                    created_at = excluded.created_at,
                    closed_at = excluded.closed_at,
                    merged_at = excluded.merged_at",
            )?;

            for record in records {
                stmt.execute(rusqlite::params![
                    repository_id,
                    record.id,
                    record.number,
                    record.title,
                    record.state.to_string(),
                    record.html_url,
                    record.author,
                    record.base_branch,
                    record.head_branch,
                    format_timestamp(&record.created_at),
                    record.closed_at.as_ref().map(format_timestamp),
                    record.merged_at.as_ref().map(format_timestamp),
                ])?;
            }
        }

        tx.execute(
            "UPDATE repositories SET last_synced_at = ?1 WHERE id = ?2",
            rusqlite::params![format_timestamp(&Utc::now()), repository_id],
        )?;
        tx.commit()?;

        Ok(records.len())
    }

    /// Cached records of one repository, newest first
    pub fn get_by_repository(&self, repository_id: i64) -> AppResult<Vec<PrRecord>> {
        get_repository_by_id(&self.db, repository_id)?;
        let conn = self.db.get()?;

        let sql = format!(
            "SELECT {} FROM pull_requests WHERE repository_id = ?1
             ORDER BY created_at DESC, id DESC",
            PULL_REQUEST_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map([repository_id], pull_request_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Cached records of the given repositories created within `[start, end]`, newest first.
    ///
    /// Reads the cache only; call [`Self::sync`] first when freshness matters.
    pub fn get_by_time_range(
        &self,
        repository_ids: &[i64],
        start: &DateTime<Utc>,
        end: &DateTime<Utc>,
    ) -> AppResult<Vec<PrRecord>> {
        if start > end {
            return Err(AppError::InvalidInput(format!(
                "start time {} is after end time {}",
                start, end
            )));
        }
        if repository_ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.db.get()?;

        // Timestamps are stored as fixed-width UTC text, so text order is time order
        let placeholders = (0..repository_ids.len())
            .map(|i| format!("?{}", i + 3))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {} FROM pull_requests
             WHERE created_at BETWEEN ?1 AND ?2
               AND repository_id IN ({})
             ORDER BY created_at DESC, id DESC",
            PULL_REQUEST_COLUMNS, placeholders
        );

        let bounds = [format_timestamp(start), format_timestamp(end)];
        let mut params: Vec<&dyn rusqlite::ToSql> = vec![&bounds[0], &bounds[1]];
        params.extend(repository_ids.iter().map(|id| id as &dyn rusqlite::ToSql));

        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(rusqlite::params_from_iter(params), pull_request_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::db::PrState;
    use crate::services::RepositoryRegistry;
    use crate::test_support::{host_pull, new_repo, test_pool, ts, StubHost};

    fn store_with(pool: &DbPool, host: StubHost) -> PullRequestStore {
        PullRequestStore::new(
            pool.clone(),
            HostContext::new(Arc::new(host), Some("token".into())),
        )
    }

    #[tokio::test]
    async fn test_sync_upserts_and_stamps_repository() {
        let (_dir, pool) = test_pool();
        let registry = RepositoryRegistry::new(pool.clone());
        let repo = registry.add(new_repo("/work/app")).unwrap();

        let mut merged = host_pull(2, 2, "2024-03-02T10:00:00Z");
        merged.state = PrState::Merged;
        merged.merged_at = Some(ts("2024-03-03T10:00:00Z"));
        let store = store_with(
            &pool,
            StubHost::new().with_pulls(vec![host_pull(1, 1, "2024-03-01T10:00:00Z"), merged]),
        );

        let summary = store.sync(repo.id).await.unwrap();
        assert_eq!(summary.count, 2);

        // A second sync updates in place instead of duplicating
        store.sync(repo.id).await.unwrap();
        let records = store.get_by_repository(repo.id).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, 2);
        assert_eq!(records[0].state, PrState::Merged);
        assert_eq!(records[0].merged_at, Some(ts("2024-03-03T10:00:00Z")));
        assert!(registry.get_by_id(repo.id).unwrap().last_synced_at.is_some());
    }

    #[tokio::test]
    async fn test_sync_keeps_records_missing_upstream() {
        let (_dir, pool) = test_pool();
        let repo = RepositoryRegistry::new(pool.clone())
            .add(new_repo("/work/app"))
            .unwrap();

        store_with(
            &pool,
            StubHost::new().with_pulls(vec![host_pull(1, 1, "2024-03-01T10:00:00Z")]),
        )
        .sync(repo.id)
        .await
        .unwrap();
        let summary = store_with(&pool, StubHost::new()).sync(repo.id).await.unwrap();

        assert_eq!(summary.count, 0);
        assert_eq!(
            store_with(&pool, StubHost::new())
                .get_by_repository(repo.id)
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_sync_propagates_host_errors() {
        let (_dir, pool) = test_pool();
        let repo = RepositoryRegistry::new(pool.clone())
            .add(new_repo("/work/app"))
            .unwrap();
        let store = store_with(&pool, StubHost::new().failing_list("bad gateway"));

        let err = store.sync(repo.id).await.unwrap_err();

        assert!(matches!(
            err,
            AppError::HostApi {
                status_code: Some(502),
                ..
            }
        ));
        assert!(matches!(store.sync(999).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_sync_many_isolates_failures() {
        let (_dir, pool) = test_pool();
        let repo = RepositoryRegistry::new(pool.clone())
            .add(new_repo("/work/app"))
            .unwrap();
        let store = store_with(
            &pool,
            StubHost::new().with_pulls(vec![host_pull(1, 1, "2024-03-01T10:00:00Z")]),
        );

        let results = store.sync_many(&[999, repo.id]).await;

        assert!(matches!(results[0], Err(AppError::NotFound(_))));
        assert_eq!(results[1].as_ref().unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_time_range_filters_and_sorts() {
        let (_dir, pool) = test_pool();
        let registry = RepositoryRegistry::new(pool.clone());
        let repo_a = registry.add(new_repo("/work/a")).unwrap();
        let repo_b = registry.add(new_repo("/work/b")).unwrap();
        let repo_c = registry.add(new_repo("/work/c")).unwrap();

        store_with(
            &pool,
            StubHost::new().with_pulls(vec![
                host_pull(10, 1, "2024-02-28T23:59:59Z"),
                host_pull(11, 2, "2024-03-01T00:00:00Z"),
                host_pull(12, 3, "2024-03-05T12:00:00Z"),
            ]),
        )
        .sync(repo_a.id)
        .await
        .unwrap();
        store_with(
            &pool,
            StubHost::new().with_pulls(vec![
                host_pull(20, 1, "2024-03-07T23:59:59Z"),
                host_pull(21, 2, "2024-03-08T00:00:01Z"),
            ]),
        )
        .sync(repo_b.id)
        .await
        .unwrap();
        store_with(
            &pool,
            StubHost::new().with_pulls(vec![host_pull(30, 1, "2024-03-04T00:00:00Z")]),
        )
        .sync(repo_c.id)
        .await
        .unwrap();

        let store = store_with(&pool, StubHost::new());
        let records = store
            .get_by_time_range(
                &[repo_a.id, repo_b.id],
                &ts("2024-03-01T00:00:00Z"),
                &ts("2024-03-07T23:59:59Z"),
            )
            .unwrap();

        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![20, 12, 11]);
    }

    #[test]
    fn test_time_range_edge_cases() {
        let (_dir, pool) = test_pool();
        let store = store_with(&pool, StubHost::new());

        assert!(store
            .get_by_time_range(&[], &ts("2024-03-01T00:00:00Z"), &ts("2024-03-02T00:00:00Z"))
            .unwrap()
            .is_empty());
        assert!(matches!(
            store.get_by_time_range(
                &[1],
                &ts("2024-03-02T00:00:00Z"),
                &ts("2024-03-01T00:00:00Z")
            ),
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            store.get_by_repository(42),
            Err(AppError::NotFound(_))
        ));
    }
}
