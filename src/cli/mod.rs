//! Command implementations behind the `nbapex` binary. Each takes a config struct and runs to
//! completion; the binary only parses flags.

pub mod counts;
pub mod ingest;
pub mod seasons;

use anyhow::{Context, Result};

use crate::database_ops::Db;
use crate::util::env as env_util;

/// Open the store named by `database_url` (or the environment) and bring its schema up to date.
pub async fn connect(database_url: Option<&str>) -> Result<Db> {
    let url = database_url
        .map(str::to_string)
        .unwrap_or_else(env_util::db_url);
    let max_conns = env_util::env_parse("DB_MAX_CONNS", 5u32);
    let db = Db::connect(&url, max_conns)
        .await
        .context("connecting to the database")?;
    db.migrate().await.context("applying migrations")?;
    Ok(db)
}
