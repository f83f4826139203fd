//! Coaches and their season records, scraped from the reference site's `data-stat` tables.

use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

use super::{IngestContext, UnitOutcome};
use crate::database_ops::entities::{upsert_coach, Coach};
use crate::error::{EtlError, Result};
use crate::fetch::{extract_table, TableRow};
use crate::normalization::season::season_year;
use crate::orchestrator::RunState;
use crate::payload::Row;

pub const COACH_LIST_PAGE: &str = "coaches/NBA_stats.html";
const COACH_LIST_TABLE: &str = "coaches";
const COACH_STATS_TABLE: &str = "coach-stats";

const COACH_SEASON_FIELDS: &[&str] = &[
    "team_id",
    "g",
    "wins",
    "losses",
    "win_loss_pct",
    "g_playoffs",
    "wins_playoffs",
    "losses_playoffs",
    "win_loss_pct_playoffs",
];

pub fn coach_page(coach_key: &str) -> String {
    format!("coaches/{coach_key}.html")
}

/// "/coaches/popovgr99c.html" → "popovgr99c".
fn coach_key_from_href(href: &str) -> Option<&str> {
    href.rsplit('/')
        .next()
        .and_then(|file| file.strip_suffix(".html"))
        .filter(|key| !key.is_empty())
}

/// Integers, then decimals (".622"), otherwise the text as-is.
fn cell_value(text: &str) -> Value {
    if let Ok(n) = text.parse::<i64>() {
        return Value::from(n);
    }
    match text.parse::<f64>() {
        Ok(f) => Value::from(f),
        Err(_) => Value::String(text.to_string()),
    }
}

async fn fetch_table(ctx: &mut IngestContext, url: &str, table: &str) -> Result<Vec<TableRow>> {
    let html = ctx.html_source()?;
    ctx.enter(RunState::Fetching)?;
    let page = html.fetch_html(url).await?;
    extract_table(&page, table)
}

/// Create or refresh every coach listed on the index page.
#[instrument(skip(ctx))]
pub async fn sync_coach_list(ctx: &mut IngestContext) -> Result<UnitOutcome> {
    let rows = fetch_table(ctx, COACH_LIST_PAGE, COACH_LIST_TABLE).await?;

    ctx.enter(RunState::Upserting)?;
    let mut outcome = UnitOutcome::default();
    for row in &rows {
        // Mid-table header rows have no linked coach cell.
        let (Some(name), Some(key)) = (
            row.get("coach"),
            row.link("coach").and_then(coach_key_from_href),
        ) else {
            outcome.skipped_rows += 1;
            continue;
        };
        let mut attributes = Map::new();
        for stat in ["year_min", "year_max", "years"] {
            if let Some(text) = row.get(stat) {
                attributes.insert(stat.to_string(), cell_value(text));
            }
        }
        upsert_coach(&ctx.db, key, name, &attributes).await?;
        outcome.record(false);
    }
    info!(coaches = outcome.updated, "coach list synced");
    Ok(outcome)
}

/// Head-coaching seasons for one coach. Assistant seasons carry no team and are skipped.
#[instrument(skip(ctx, coach), fields(coach = %coach.coach_key))]
pub async fn coach_seasons(ctx: &mut IngestContext, coach: &Coach) -> Result<UnitOutcome> {
    let url = coach_page(&coach.coach_key);
    let rows = fetch_table(ctx, &url, COACH_STATS_TABLE).await?;

    ctx.enter(RunState::NormalizingRows)?;
    let mut outcome = UnitOutcome::default();
    let mut staged = Vec::with_capacity(rows.len());
    for row in &rows {
        let (Some(season), Some(_)) = (row.get("season"), row.get("team_id")) else {
            outcome.skipped_rows += 1;
            continue;
        };
        let season = season_year(season)?;
        let mut fields = Row::new();
        for stat in COACH_SEASON_FIELDS {
            if let Some(text) = row.get(stat) {
                let value = if *stat == "team_id" {
                    Value::String(text.to_string())
                } else {
                    cell_value(text)
                };
                fields.insert((*stat).to_string(), value);
            }
        }
        fields.insert("season".into(), Value::from(season));
        staged.push(fields);
    }
    debug!(seasons = staged.len(), "coach seasons staged");

    ctx.enter(RunState::Resolving)?;
    for fields in &mut staged {
        fields.insert("coach".into(), Value::from(coach.id));
    }

    ctx.enter(RunState::Upserting)?;
    let registry = ctx.registry.clone();
    let kind = registry
        .by_name("CoachSeason")
        .ok_or_else(|| EtlError::Configuration("record kind CoachSeason is not registered".into()))?;
    for fields in &staged {
        let created = ctx.store_as(kind, fields, &url).await?;
        outcome.record(created);
    }
    Ok(outcome)
}
