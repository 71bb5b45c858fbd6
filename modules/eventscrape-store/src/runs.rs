use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use eventscrape_common::types::{Run, RunErrorEntry, RunStatus};

use crate::error::{Result, StoreError};

#[derive(Debug, Clone, sqlx::FromRow)]
struct RunRowDb {
    id: Uuid,
    source_id: Option<Uuid>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    status: String,
    pages_crawled: i32,
    events_found: i32,
    errors: serde_json::Value,
    parent_run_id: Option<Uuid>,
    metadata: Option<serde_json::Value>,
}

impl RunRowDb {
    fn into_domain(self) -> Result<Run> {
        Ok(Run {
            id: self.id,
            source_id: self.source_id,
            started_at: self.started_at,
            finished_at: self.finished_at,
            status: self.status.parse::<RunStatus>().map_err(StoreError::Decode)?,
            pages_crawled: self.pages_crawled,
            events_found: self.events_found,
            errors: serde_json::from_value(self.errors)
                .map_err(|e| StoreError::Decode(format!("run errors: {e}")))?,
            parent_run_id: self.parent_run_id,
            metadata: self.metadata,
        })
    }
}

/// Derive a parent run's status from its children (spec'd aggregation):
/// any pending child → running; any error/partial among finished → partial;
/// all success → success.
pub fn derive_parent_status(children: &[RunStatus]) -> RunStatus {
    if children.iter().any(|s| !s.is_terminal()) {
        return RunStatus::Running;
    }
    if children
        .iter()
        .any(|s| matches!(s, RunStatus::Error | RunStatus::Partial))
    {
        return RunStatus::Partial;
    }
    RunStatus::Success
}

pub struct RunRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> RunRepo<'a> {
    pub(crate) fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        source_id: Option<Uuid>,
        parent_run_id: Option<Uuid>,
        metadata: Option<serde_json::Value>,
    ) -> Result<Run> {
        let row = sqlx::query_as::<_, RunRowDb>(
            r#"
            INSERT INTO runs (source_id, parent_run_id, metadata, status)
            VALUES ($1, $2, $3, 'queued')
            RETURNING *
            "#,
        )
        .bind(source_id)
        .bind(parent_run_id)
        .bind(metadata)
        .fetch_one(self.pool)
        .await?;
        row.into_domain()
    }

    pub async fn get(&self, id: Uuid) -> Result<Run> {
        let row = sqlx::query_as::<_, RunRowDb>("SELECT * FROM runs WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("run", id))?;
        row.into_domain()
    }

    pub async fn list(&self, source_id: Option<Uuid>, limit: i64) -> Result<Vec<Run>> {
        let rows = match source_id {
            Some(sid) => {
                sqlx::query_as::<_, RunRowDb>(
                    "SELECT * FROM runs WHERE source_id = $1 ORDER BY started_at DESC LIMIT $2",
                )
                .bind(sid)
                .bind(limit)
                .fetch_all(self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, RunRowDb>(
                    "SELECT * FROM runs ORDER BY started_at DESC LIMIT $1",
                )
                .bind(limit)
                .fetch_all(self.pool)
                .await?
            }
        };
        rows.into_iter().map(RunRowDb::into_domain).collect()
    }

    pub async fn children(&self, parent_run_id: Uuid) -> Result<Vec<Run>> {
        let rows = sqlx::query_as::<_, RunRowDb>(
            "SELECT * FROM runs WHERE parent_run_id = $1 ORDER BY started_at ASC",
        )
        .bind(parent_run_id)
        .fetch_all(self.pool)
        .await?;
        rows.into_iter().map(RunRowDb::into_domain).collect()
    }

    /// queued → running. No-op if the run already left `queued`, so retried
    /// jobs don't rewind state.
    pub async fn mark_running(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE runs SET status = 'running', started_at = now() WHERE id = $1 AND status = 'queued'",
        )
        .bind(id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Terminal transition. Guarded so a finished run is never overwritten:
    /// the status is set exactly once at job completion.
    pub async fn finish(
        &self,
        id: Uuid,
        status: RunStatus,
        pages_crawled: i32,
        events_found: i32,
        errors: &[RunErrorEntry],
    ) -> Result<()> {
        debug_assert!(status.is_terminal());
        let errors_json = serde_json::to_value(errors)
            .map_err(|e| StoreError::Decode(format!("run errors: {e}")))?;
        sqlx::query(
            r#"
            UPDATE runs
            SET status = $2, pages_crawled = $3, events_found = $4, errors = $5,
                finished_at = now()
            WHERE id = $1 AND status IN ('queued', 'running')
            "#,
        )
        .bind(id)
        .bind(status.to_string())
        .bind(pages_crawled)
        .bind(events_found)
        .bind(errors_json)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Merge a flag into the run's metadata (e.g. `cancelled: true`).
    pub async fn merge_metadata(&self, id: Uuid, patch: serde_json::Value) -> Result<()> {
        sqlx::query(
            "UPDATE runs SET metadata = COALESCE(metadata, '{}'::jsonb) || $2 WHERE id = $1",
        )
        .bind(id)
        .bind(patch)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Recompute a parent run from its children: metric sums plus the derived
    /// status. Called on every child transition. The parent finishes when the
    /// last child does.
    pub async fn aggregate_parent(&self, parent_run_id: Uuid) -> Result<Run> {
        let children = self.children(parent_run_id).await?;
        let statuses: Vec<RunStatus> = children.iter().map(|c| c.status).collect();
        let status = derive_parent_status(&statuses);
        let pages: i32 = children.iter().map(|c| c.pages_crawled).sum();
        let events: i32 = children.iter().map(|c| c.events_found).sum();

        let row = sqlx::query_as::<_, RunRowDb>(
            r#"
            UPDATE runs
            SET status = $2, pages_crawled = $3, events_found = $4,
                finished_at = CASE WHEN $5 THEN COALESCE(finished_at, now()) ELSE NULL END
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(parent_run_id)
        .bind(status.to_string())
        .bind(pages)
        .bind(events)
        .bind(status.is_terminal())
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("run", parent_run_id))?;
        row.into_domain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_running_while_any_child_pending() {
        let children = vec![RunStatus::Success, RunStatus::Running];
        assert_eq!(derive_parent_status(&children), RunStatus::Running);

        let children = vec![RunStatus::Queued, RunStatus::Error];
        assert_eq!(derive_parent_status(&children), RunStatus::Running);
    }

    #[test]
    fn parent_partial_when_any_finished_child_failed() {
        let children = vec![RunStatus::Success, RunStatus::Error];
        assert_eq!(derive_parent_status(&children), RunStatus::Partial);

        let children = vec![RunStatus::Partial, RunStatus::Success, RunStatus::Success];
        assert_eq!(derive_parent_status(&children), RunStatus::Partial);
    }

    #[test]
    fn parent_success_when_all_children_succeed() {
        let children = vec![RunStatus::Success, RunStatus::Success];
        assert_eq!(derive_parent_status(&children), RunStatus::Success);
    }

    #[test]
    fn parent_with_no_children_is_success() {
        // An empty batch (no accounts in scope) finishes clean.
        assert_eq!(derive_parent_status(&[]), RunStatus::Success);
    }
}
