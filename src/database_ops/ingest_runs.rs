// --------- Ingest run observability helpers ---------

use serde_json::Value;
use tracing::instrument;

use super::db::Db;
use crate::error::Result;

#[instrument(skip(db, meta))]
pub async fn ingest_run_start(db: &Db, command: &str, meta: Option<Value>) -> Result<i64> {
    let meta = meta.map(|m| m.to_string());
    let id: i64 =
        sqlx::query_scalar("INSERT INTO ingest_runs (command, meta) VALUES (?, ?) RETURNING id")
            .bind(command)
            .bind(meta)
            .fetch_one(&db.pool)
            .await?;
    Ok(id)
}

#[instrument(skip(db, summary))]
pub async fn ingest_run_finish(db: &Db, run_id: i64, status: &str, summary: &Value) -> Result<()> {
    sqlx::query(
        "UPDATE ingest_runs SET status = ?, summary = ?, finished_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(status)
    .bind(summary.to_string())
    .bind(run_id)
    .execute(&db.pool)
    .await?;
    Ok(())
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IngestRun {
    pub id: i64,
    pub command: String,
    pub status: String,
    pub summary: Option<String>,
}

pub async fn recent_runs(db: &Db, limit: i64) -> Result<Vec<IngestRun>> {
    Ok(sqlx::query_as::<_, IngestRun>(
        "SELECT id, command, status, summary FROM ingest_runs ORDER BY id DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(&db.pool)
    .await?)
}
