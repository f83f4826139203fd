//! Season aggregates: player careers (`playercareerstats`) and team year-by-year lines
//! (`teamyearbyyearstats`).

use serde_json::Value;
use tracing::{debug, instrument};

use super::{
    absorb_row_error, optional_id, params_row, IngestContext, SeasonScope, UnitOutcome,
};
use crate::error::{EtlError, Result};
use crate::fetch::combination_label;
use crate::fetch::endpoints::{
    player_career_params, team_seasons_params, PLAYER_CAREER, TEAM_SEASONS,
};
use crate::normalization::season::season_year;
use crate::normalization::NormalizeOptions;
use crate::orchestrator::RunState;
use crate::payload::{value_as_string, Row};

/// Result sets that are not season lines.
const SKIPPED_CAREER_SETS: &[&str] = &["Rankings", "College"];

/// Year-by-year columns renamed onto the split vocabulary before normalization.
const TEAM_SEASON_RENAMES: &[(&str, &str)] = &[
    ("WINS", "W"),
    ("LOSSES", "L"),
    ("WIN_PCT", "W_PCT"),
    ("PO_WINS", "PLAYOFF_WINS"),
    ("PO_LOSSES", "PLAYOFF_LOSSES"),
];

/// Every season and career line of one player for one per-mode.
///
/// The season type comes from the result-set name ("SeasonTotalsPostSeason"); career sets are
/// stored under season 0.
#[instrument(skip(ctx))]
pub async fn player_career(
    ctx: &mut IngestContext,
    player_id: i64,
    per_mode: &str,
) -> Result<UnitOutcome> {
    let params = player_career_params(player_id, per_mode);
    let combination = combination_label(PLAYER_CAREER, &params);
    let Some(payload) = ctx.fetch(PLAYER_CAREER, &params).await? else {
        return Ok(UnitOutcome::unavailable());
    };

    ctx.enter(RunState::NormalizingRows)?;
    let options = NormalizeOptions::new().ignore_keys(["SEASON_ID"]);
    let mut staged = Vec::new();
    for set in &payload.result_sets {
        if SKIPPED_CAREER_SETS.iter().any(|skip| set.name.contains(skip)) {
            continue;
        }
        let career = set.name.starts_with("Career");
        for mut raw in set.rows() {
            let season = if career {
                0
            } else {
                let label = raw
                    .get("SEASON_ID")
                    .and_then(value_as_string)
                    .ok_or_else(|| EtlError::payload(format!("{} row has no SEASON_ID", set.name)))?;
                season_year(&label)?
            };
            raw.insert("SEASON".into(), Value::from(season));
            raw.insert("SEASON_TYPE".into(), Value::String(set.name.clone()));
            raw.insert("PER_MODE".into(), Value::String(per_mode.to_string()));
            let fields = ctx.normalizer.normalize(&raw, &options);
            staged.push((raw, fields));
        }
    }
    debug!(rows = staged.len(), "career rows staged");

    ctx.enter(RunState::Resolving)?;
    let mut outcome = UnitOutcome::default();
    let mut resolved = Vec::with_capacity(staged.len());
    for (raw, mut fields) in staged {
        match resolve_career_row(ctx, &raw).await {
            Ok((player, team)) => {
                fields.insert("player".into(), Value::from(player));
                fields.insert("team".into(), Value::from(team));
                resolved.push(fields);
            }
            Err(err) => absorb_row_error(&mut outcome, &combination, &raw, err)?,
        }
    }

    ctx.enter(RunState::Upserting)?;
    let request = params_row(&params);
    for fields in &resolved {
        let created = ctx.store(PLAYER_CAREER, &request, fields, &combination).await?;
        outcome.record(created);
    }
    Ok(outcome)
}

/// Career totals spell the team column `Team_ID`; traded-season totals use team 0.
async fn resolve_career_row(ctx: &mut IngestContext, raw: &Row) -> Result<(i64, Option<i64>)> {
    let player = ctx.player_ref(raw, "PLAYER_ID").await?;
    let team_id = optional_id(raw, "TEAM_ID").or_else(|| optional_id(raw, "Team_ID"));
    let team = match team_id {
        Some(team_id) => Some(ctx.entities.resolve_team_strict(team_id).await?.id),
        None => None,
    };
    Ok((player, team))
}

/// One team's line for one season.
#[instrument(skip(ctx, scope), fields(season = scope.season))]
pub async fn team_seasons(
    ctx: &mut IngestContext,
    team_id: i64,
    scope: &SeasonScope,
    per_mode: &str,
) -> Result<UnitOutcome> {
    let params = team_seasons_params(team_id, &scope.season_type, per_mode);
    let combination = combination_label(TEAM_SEASONS, &params);
    let Some(payload) = ctx.fetch(TEAM_SEASONS, &params).await? else {
        return Ok(UnitOutcome::unavailable());
    };

    ctx.enter(RunState::NormalizingRows)?;
    let options = NormalizeOptions::new()
        .override_keys(["CONF_RANK", "DIV_RANK", "W", "L"])
        .ignore_keys(
            ["YEAR"]
                .into_iter()
                .chain(TEAM_SEASON_RENAMES.iter().map(|(from, _)| *from)),
        );
    let mut staged = Vec::new();
    for mut raw in payload.rows(0)? {
        let year = raw
            .get("YEAR")
            .and_then(value_as_string)
            .ok_or_else(|| EtlError::payload("team season row has no YEAR"))?;
        if season_year(&year)? != scope.season {
            continue;
        }
        for (from, to) in TEAM_SEASON_RENAMES {
            if let Some(value) = raw.get(*from).cloned() {
                raw.insert((*to).to_string(), value);
            }
        }
        let finals = raw
            .get("NBA_FINALS_APPEARANCE")
            .and_then(value_as_string)
            .is_some_and(|s| s != "N/A");
        raw.insert("NBA_FINALS_APPEARANCE".into(), Value::Bool(finals));
        raw.insert("SEASON".into(), Value::from(scope.season));
        raw.insert("SEASON_TYPE".into(), Value::String(scope.season_type.clone()));
        raw.insert("PER_MODE".into(), Value::String(per_mode.to_string()));
        let fields = ctx.normalizer.normalize(&raw, &options);
        staged.push((raw, fields));
    }

    ctx.enter(RunState::Resolving)?;
    let mut outcome = UnitOutcome::default();
    let mut resolved = Vec::with_capacity(staged.len());
    for (raw, mut fields) in staged {
        match ctx.team_ref(&raw, "TEAM_ID").await {
            Ok(team) => {
                fields.insert("team".into(), Value::from(team));
                resolved.push(fields);
            }
            Err(err) => absorb_row_error(&mut outcome, &combination, &raw, err)?,
        }
    }

    ctx.enter(RunState::Upserting)?;
    let request = params_row(&params);
    for fields in &resolved {
        let created = ctx.store(TEAM_SEASONS, &request, fields, &combination).await?;
        outcome.record(created);
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::records::records_of_kind;
    use crate::fetch::scripted::{envelope, ScriptedSource};
    use crate::normalization::season::REGULAR_SEASON;
    use crate::pipelines::test_support::{context, seed_player, seed_team};
    use serde_json::json;

    #[tokio::test]
    async fn career_sets_become_player_seasons() {
        let season_headers = vec!["PLAYER_ID", "SEASON_ID", "LEAGUE_ID", "TEAM_ID", "GP", "PTS"];
        let career = envelope(
            PLAYER_CAREER,
            vec![
                (
                    "SeasonTotalsRegularSeason",
                    season_headers.clone(),
                    vec![
                        json!([2544, "2016-17", "00", 1610612739, 74, 1954]),
                        json!([2544, "2017-18", "00", 1610612739, 82, 2251]),
                    ],
                ),
                (
                    "CareerTotalsRegularSeason",
                    vec!["PLAYER_ID", "LEAGUE_ID", "Team_ID", "GP", "PTS"],
                    vec![json!([2544, "00", 0, 156, 4205])],
                ),
                (
                    "SeasonTotalsCollegeSeason",
                    season_headers.clone(),
                    vec![json!([2544, "2002-03", "00", 0, 0, 0])],
                ),
                (
                    "SeasonRankingsRegularSeason",
                    season_headers,
                    vec![json!([2544, "2016-17", "00", 1610612739, null, 3])],
                ),
            ],
        );
        let mut ctx = context(ScriptedSource::new().respond(PLAYER_CAREER, &[], career)).await;
        let team = seed_team(&ctx, 1610612739, "CLE").await;
        seed_player(&ctx, 2544, "LeBron James").await;

        let outcome = player_career(&mut ctx, 2544, "Totals").await.unwrap();
        assert_eq!(outcome.created, 3);

        let seasons = records_of_kind(&ctx.db, "PlayerSeason").await.unwrap();
        let first = seasons.iter().find(|r| r.season == Some(2016)).unwrap();
        assert_eq!(first.team_ref, Some(team));
        assert_eq!(first.field("season_type"), Some(&json!("Regular")));
        let total = seasons.iter().find(|r| r.season == Some(0)).unwrap();
        assert_eq!(total.team_ref, None);
        assert_eq!(total.field("career_flag"), Some(&json!(true)));
        assert_eq!(total.field("pts"), Some(&json!(4205)));
    }

    #[tokio::test]
    async fn team_season_keeps_the_requested_year() {
        let years = envelope(
            TEAM_SEASONS,
            vec![(
                "TeamStats",
                vec![
                    "TEAM_ID",
                    "YEAR",
                    "WINS",
                    "LOSSES",
                    "WIN_PCT",
                    "CONF_RANK",
                    "DIV_RANK",
                    "PO_WINS",
                    "PO_LOSSES",
                    "NBA_FINALS_APPEARANCE",
                    "PTS_RANK",
                ],
                vec![
                    json!([1610612739, "2015-16", 57, 25, 0.695, 1, 1, 16, 5, "LEAGUE CHAMPION", 3]),
                    json!([1610612739, "2016-17", 51, 31, 0.622, 2, 1, 12, 6, "FINALS APPEARANCE", 4]),
                ],
            )],
        );
        let mut ctx = context(ScriptedSource::new().respond(TEAM_SEASONS, &[], years)).await;
        let team = seed_team(&ctx, 1610612739, "CLE").await;
        let scope = SeasonScope::new(2016, REGULAR_SEASON);

        let outcome = team_seasons(&mut ctx, 1610612739, &scope, "Totals").await.unwrap();
        assert_eq!(outcome.created, 1);

        let rows = records_of_kind(&ctx.db, "TeamSeason").await.unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.team_ref, Some(team));
        assert_eq!(row.field("w"), Some(&json!(51)));
        assert_eq!(row.field("l"), Some(&json!(31)));
        assert_eq!(row.field("w_pct"), Some(&json!(0.622)));
        assert_eq!(row.field("conf_rank"), Some(&json!(2)));
        assert_eq!(row.field("playoff_wins"), Some(&json!(12)));
        assert_eq!(row.field("nba_finals_appearance"), Some(&json!(true)));
        assert!(row.field("pts_rank").is_none());
        assert!(row.field("wins").is_none());
        assert!(row.field("year").is_none());
    }
}
