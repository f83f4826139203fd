//! Per-player game logs for a season (`leaguegamelog`).

use serde_json::Value;
use tracing::{debug, instrument};

use super::{absorb_row_error, params_row, required_id, IngestContext, SeasonScope, UnitOutcome};
use crate::error::{EtlError, Result};
use crate::fetch::combination_label;
use crate::fetch::endpoints::{game_log_params, LEAGUE_GAME_LOG};
use crate::normalization::convert::parse_provider_date;
use crate::normalization::season::season_for_date;
use crate::normalization::NormalizeOptions;
use crate::orchestrator::RunState;
use crate::payload::{value_as_string, Row};

/// Logs only attach to games the game-day pipeline already created; rows for unknown games are
/// skipped, unknown players fail the row.
#[instrument(skip(ctx, scope), fields(season = scope.season))]
pub async fn game_logs(ctx: &mut IngestContext, scope: &SeasonScope) -> Result<UnitOutcome> {
    let params = game_log_params(&scope.label(), &scope.season_type);
    let combination = combination_label(LEAGUE_GAME_LOG, &params);
    let Some(payload) = ctx.fetch(LEAGUE_GAME_LOG, &params).await? else {
        return Ok(UnitOutcome::unavailable());
    };

    ctx.enter(RunState::NormalizingRows)?;
    let options = NormalizeOptions::new().ignore_keys(["WL", "SEASON_ID"]);
    let mut staged = Vec::new();
    for mut raw in payload.rows(0)? {
        let date = raw
            .get("GAME_DATE")
            .and_then(value_as_string)
            .ok_or_else(|| EtlError::payload("game log row has no GAME_DATE"))?;
        let date = parse_provider_date(&date)?;
        raw.insert("GAME_DATE".into(), Value::String(date.to_string()));
        raw.insert("SEASON".into(), Value::from(season_for_date(date)));
        raw.insert("SEASON_TYPE".into(), Value::String(scope.season_type.clone()));
        let won = raw.get("WL").and_then(Value::as_str) == Some("W");
        let mut fields = ctx.normalizer.normalize(&raw, &options);
        fields.insert("win_flag".into(), Value::Bool(won));
        staged.push((raw, fields));
    }

    ctx.enter(RunState::Resolving)?;
    let mut outcome = UnitOutcome::default();
    let mut resolved: Vec<Row> = Vec::with_capacity(staged.len());
    for (raw, mut fields) in staged {
        match resolve_log(ctx, &raw).await {
            Ok(Some((game, player, team))) => {
                fields.insert("game".into(), Value::from(game));
                fields.insert("player".into(), Value::from(player));
                fields.insert("team".into(), Value::from(team));
                resolved.push(fields);
            }
            Ok(None) => outcome.skipped_rows += 1,
            Err(err) => absorb_row_error(&mut outcome, &combination, &raw, err)?,
        }
    }
    debug!(rows = resolved.len(), skipped = outcome.skipped_rows, "game logs resolved");

    ctx.enter(RunState::Upserting)?;
    let request = params_row(&params);
    for fields in &resolved {
        let created = ctx
            .store(LEAGUE_GAME_LOG, &request, fields, &combination)
            .await?;
        outcome.record(created);
    }
    Ok(outcome)
}

async fn resolve_log(ctx: &mut IngestContext, raw: &Row) -> Result<Option<(i64, i64, i64)>> {
    let game_id = required_id(raw, "GAME_ID")?;
    let game = match ctx.entities.resolve_game_strict(game_id).await {
        Ok(game) => game.id,
        Err(EtlError::EntityResolution { .. }) => {
            debug!(game_id, "game log for an unknown game; skipping");
            return Ok(None);
        }
        Err(err) => return Err(err),
    };
    let player = ctx.player_ref(raw, "PLAYER_ID").await?;
    let team = ctx.team_ref(raw, "TEAM_ID").await?;
    Ok(Some((game, player, team)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::{json, Map};

    use crate::database_ops::entities::{ensure_game, GameHeader};
    use crate::database_ops::records::records_of_kind;
    use crate::fetch::scripted::{envelope, ScriptedSource};
    use crate::normalization::season::REGULAR_SEASON;
    use crate::pipelines::test_support::{context, seed_player, seed_team};

    #[tokio::test]
    async fn logs_attach_to_known_games_only() {
        let log = envelope(
            LEAGUE_GAME_LOG,
            vec![(
                "LeagueGameLog",
                vec![
                    "SEASON_ID",
                    "PLAYER_ID",
                    "PLAYER_NAME",
                    "TEAM_ID",
                    "GAME_ID",
                    "GAME_DATE",
                    "MATCHUP",
                    "WL",
                    "PTS",
                ],
                vec![
                    json!(["22016", 2544, "LeBron James", 1610612739, "0021600001", "2016-10-25", "CLE vs. NYK", "W", 19]),
                    json!(["22016", 2544, "LeBron James", 1610612739, "0021600099", "2016-11-02", "CLE vs. HOU", "L", 30]),
                ],
            )],
        );
        let mut ctx = context(ScriptedSource::new().respond(LEAGUE_GAME_LOG, &[], log)).await;
        let team = seed_team(&ctx, 1610612739, "CLE").await;
        let visitor = seed_team(&ctx, 1610612752, "NYK").await;
        let player = seed_player(&ctx, 2544, "LeBron James").await;
        let (game, _) = ensure_game(
            &ctx.db,
            &GameHeader {
                game_id: 21600001,
                game_date: NaiveDate::from_ymd_opt(2016, 10, 25).unwrap(),
                game_sequence: Some(1),
                home_team_ref: team,
                visitor_team_ref: visitor,
                season: 2016,
                season_type: REGULAR_SEASON.to_string(),
                attributes: Map::new(),
            },
        )
        .await
        .unwrap();

        let scope = SeasonScope::new(2016, REGULAR_SEASON);
        let outcome = game_logs(&mut ctx, &scope).await.unwrap();
        assert_eq!(outcome.created, 1);
        assert_eq!(outcome.skipped_rows, 1);

        let logs = records_of_kind(&ctx.db, "PlayerGameLog").await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].game_ref, Some(game.id));
        assert_eq!(logs[0].player_ref, Some(player));
        assert_eq!(logs[0].season, Some(2016));
        assert_eq!(logs[0].field("win_flag"), Some(&json!(true)));
        assert_eq!(logs[0].field("matchup"), Some(&json!("CLE vs. NYK")));
    }
}
