use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use eventscrape_common::types::MatchStatus;

use crate::error::{Result, StoreError};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MatchRow {
    pub id: Uuid,
    pub raw_id_a: Uuid,
    pub raw_id_b: Uuid,
    pub score: f64,
    pub reason: serde_json::Value,
    pub status: String,
    pub raw_a_content_hash: String,
    pub raw_b_content_hash: String,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
}

impl MatchRow {
    pub fn status(&self) -> Result<MatchStatus> {
        self.status.parse().map_err(StoreError::Decode)
    }
}

/// A scored candidate pair ready to be proposed.
#[derive(Debug, Clone)]
pub struct MatchProposal {
    pub raw_id_a: Uuid,
    pub raw_id_b: Uuid,
    pub score: f64,
    pub reason: serde_json::Value,
    pub raw_a_content_hash: String,
    pub raw_b_content_hash: String,
}

pub struct MatchRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> MatchRepo<'a> {
    pub(crate) fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Record a proposal for an unordered pair (stored ordered). Skipped when
    /// the pair already has a row — unless that row is a rejection whose
    /// stored content hashes both went stale, in which case the pair is
    /// legitimately back on the table and the row reopens.
    pub async fn propose(&self, p: &MatchProposal) -> Result<Option<MatchRow>> {
        let (a, b, hash_a, hash_b) = if p.raw_id_a < p.raw_id_b {
            (p.raw_id_a, p.raw_id_b, &p.raw_a_content_hash, &p.raw_b_content_hash)
        } else {
            (p.raw_id_b, p.raw_id_a, &p.raw_b_content_hash, &p.raw_a_content_hash)
        };

        let row = sqlx::query_as::<_, MatchRow>(
            r#"
            INSERT INTO matches
                (raw_id_a, raw_id_b, score, reason, status, raw_a_content_hash, raw_b_content_hash)
            VALUES ($1, $2, $3, $4, 'open', $5, $6)
            ON CONFLICT (raw_id_a, raw_id_b)
            DO UPDATE SET
                score = EXCLUDED.score,
                reason = EXCLUDED.reason,
                status = 'open',
                raw_a_content_hash = EXCLUDED.raw_a_content_hash,
                raw_b_content_hash = EXCLUDED.raw_b_content_hash
            WHERE matches.status = 'rejected'
              AND (matches.raw_a_content_hash IS DISTINCT FROM EXCLUDED.raw_a_content_hash
                   OR matches.raw_b_content_hash IS DISTINCT FROM EXCLUDED.raw_b_content_hash)
            RETURNING *
            "#,
        )
        .bind(a)
        .bind(b)
        .bind(p.score)
        .bind(&p.reason)
        .bind(hash_a)
        .bind(hash_b)
        .fetch_optional(self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get(&self, id: Uuid) -> Result<MatchRow> {
        sqlx::query_as::<_, MatchRow>("SELECT * FROM matches WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("match", id))
    }

    pub async fn list(&self, status: Option<MatchStatus>, limit: i64) -> Result<Vec<MatchRow>> {
        let rows = match status {
            Some(s) => {
                sqlx::query_as::<_, MatchRow>(
                    "SELECT * FROM matches WHERE status = $1 ORDER BY score DESC, created_at DESC LIMIT $2",
                )
                .bind(s.to_string())
                .bind(limit)
                .fetch_all(self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, MatchRow>(
                    "SELECT * FROM matches ORDER BY score DESC, created_at DESC LIMIT $1",
                )
                .bind(limit)
                .fetch_all(self.pool)
                .await?
            }
        };
        Ok(rows)
    }

    pub async fn set_status(
        &self,
        id: Uuid,
        status: MatchStatus,
        actor: Option<&str>,
    ) -> Result<MatchRow> {
        sqlx::query_as::<_, MatchRow>(
            "UPDATE matches SET status = $2, created_by = COALESCE($3, created_by) WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(status.to_string())
        .bind(actor)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("match", id))
    }
}
