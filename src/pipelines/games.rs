//! Game days: scoreboard → games, then per game the summary, eight box-score families and
//! play-by-play, written with one bulk insert per game.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use super::{
    absorb_row_error, optional_id, required_id, IngestContext, RowFailure, UnitOutcome,
};
use crate::classify::{apply_family_quirks, classify, family_for, hustle_available};
use crate::database_ops::entities::{
    ensure_game, ensure_official, game_has_dependents, latest_game_date, merge_game_attributes,
    Game, GameHeader, Team,
};
use crate::database_ops::records::{bulk_insert, PreparedRecord};
use crate::database_ops::Db;
use crate::error::{EtlError, Result};
use crate::fetch::combination_label;
use crate::fetch::endpoints::{
    box_score_params, play_by_play_params, scoreboard_params, summary_params, BOX_SCORE_ENDPOINTS,
    BOX_SUMMARY, PLAY_BY_PLAY, SCOREBOARD,
};
use crate::normalization::convert::{duration_from_clock, minutes_from_clock, parse_provider_date};
use crate::normalization::season::{season_label, LeagueSeason, REGULAR_SEASON};
use crate::normalization::tracking::tracking_box_fields;
use crate::normalization::{FieldNormalizer, NormalizeOptions};
use crate::orchestrator::RunState;
use crate::payload::{value_as_i64, value_as_string, Row, StatPayload};
use crate::registry::{unique_key, Family, Registry, Suffix};

/// Scoreboard columns that become game columns instead of attributes.
const HEADER_COLUMNS: &[&str] = &["GAME_ID", "GAME_DATE_EST", "GAME_SEQUENCE", "SEASON"];

/// Which entity references a staged row still needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowRefs {
    Team,
    BoxPlayer,
    Official,
    PlayByPlay,
}

#[derive(Debug, Clone)]
struct StagedRow {
    resource: &'static str,
    /// Kinds outside the measure-family registry are addressed by name.
    named: Option<&'static str>,
    refs: RowRefs,
    raw: Row,
    fields: Row,
}

#[derive(Debug, Clone)]
struct ScheduledGame {
    game: Game,
    home: Team,
    visitor: Team,
}

impl ScheduledGame {
    /// "vs. BOS" for the home side, "@ CLE" for the visitors.
    fn matchup(&self, home_side: bool) -> String {
        let abbreviation = |team: &Team| team.abbreviation.clone().unwrap_or_default();
        if home_side {
            format!("vs. {}", abbreviation(&self.visitor))
        } else {
            format!("@ {}", abbreviation(&self.home))
        }
    }
}

fn text(raw: &Row, key: &str) -> Option<String> {
    raw.get(key)
        .and_then(value_as_string)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Dates still to ingest for a season: from the latest stored game date (or the regular-season
/// start) through the end of the playoffs or `today`, whichever comes first.
///
/// The latest stored date is revisited because games on it may lack dependents.
pub async fn pending_game_dates(
    db: &Db,
    season: &LeagueSeason,
    today: NaiveDate,
) -> Result<Vec<NaiveDate>> {
    let start = latest_game_date(db, i64::from(season.year))
        .await?
        .unwrap_or(season.regular_season_start);
    let end = season.playoffs_end.map_or(today, |end| end.min(today));
    Ok(start.iter_days().take_while(|day| *day <= end).collect())
}

/// Create the date's games and ingest the dependents of every game that has none yet.
#[instrument(skip(ctx, season), fields(season = season.year))]
pub async fn games_for_date(
    ctx: &mut IngestContext,
    date: NaiveDate,
    season: &LeagueSeason,
) -> Result<UnitOutcome> {
    let season_type = season.season_type_for_date(date)?;
    let params = scoreboard_params(date);
    let combination = combination_label(SCOREBOARD, &params);
    let Some(payload) = ctx.fetch(SCOREBOARD, &params).await? else {
        return Ok(UnitOutcome::unavailable());
    };

    ctx.enter(RunState::NormalizingRows)?;
    let options = NormalizeOptions::for_game().ignore_keys(HEADER_COLUMNS.iter().copied());
    let headers: Vec<(Row, Row)> = payload
        .rows(0)?
        .into_iter()
        .map(|raw| {
            let attributes = ctx.normalizer.normalize(&raw, &options);
            (raw, attributes)
        })
        .collect();

    ctx.enter(RunState::Resolving)?;
    let mut outcome = UnitOutcome::default();
    let mut pending = Vec::with_capacity(headers.len());
    for (raw, attributes) in headers {
        match game_header(ctx, &raw, attributes, date, season.year, season_type).await {
            Ok(header) => pending.push(header),
            Err(err) => absorb_row_error(&mut outcome, &combination, &raw, err)?,
        }
    }

    ctx.enter(RunState::Upserting)?;
    let mut scheduled = Vec::with_capacity(pending.len());
    for (header, home, visitor) in pending {
        let (game, created) = ensure_game(&ctx.db, &header).await?;
        if created {
            info!(game_id = game.game_id, %date, "created game");
        }
        ctx.entities.remember_game(game.clone());
        scheduled.push(ScheduledGame {
            game,
            home,
            visitor,
        });
    }

    for game in &scheduled {
        match ingest_game(ctx, game).await {
            Ok(game_outcome) => outcome.merge(game_outcome),
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                warn!(
                    game_id = game.game.game_id,
                    category = err.category(),
                    error = %err,
                    "game ingestion failed; continuing with the next game"
                );
                outcome.row_failures.push(RowFailure {
                    combination: format!("game {}", game.game.game_id),
                    category: err.category().to_string(),
                    message: err.to_string(),
                });
                ctx.abandon_step()?;
            }
        }
    }
    Ok(outcome)
}

async fn game_header(
    ctx: &mut IngestContext,
    raw: &Row,
    attributes: Row,
    date: NaiveDate,
    season: i32,
    season_type: &str,
) -> Result<(GameHeader, Team, Team)> {
    let game_id = required_id(raw, "GAME_ID")?;
    let home = ctx
        .entities
        .resolve_team_strict(required_id(raw, "HOME_TEAM_ID")?)
        .await?;
    let visitor = ctx
        .entities
        .resolve_team_strict(required_id(raw, "VISITOR_TEAM_ID")?)
        .await?;
    let game_date = match text(raw, "GAME_DATE_EST") {
        Some(raw_date) => parse_provider_date(&raw_date)?,
        None => date,
    };
    let header = GameHeader {
        game_id,
        game_date,
        game_sequence: raw.get("GAME_SEQUENCE").and_then(value_as_i64),
        home_team_ref: home.id,
        visitor_team_ref: visitor.id,
        season: i64::from(season),
        season_type: season_type.to_string(),
        attributes,
    };
    Ok((header, home, visitor))
}

#[instrument(skip(ctx, scheduled), fields(game_id = scheduled.game.game_id))]
async fn ingest_game(ctx: &mut IngestContext, scheduled: &ScheduledGame) -> Result<UnitOutcome> {
    let game = &scheduled.game;
    let mut outcome = UnitOutcome::default();
    if game_has_dependents(&ctx.db, game.id).await? {
        debug!("game already has dependents; skipping");
        outcome.skipped_rows += 1;
        return Ok(outcome);
    }
    let season = season_label(game.season.unwrap_or_default() as i32);
    let season_type = game
        .season_type
        .clone()
        .unwrap_or_else(|| REGULAR_SEASON.to_string());

    let summary = ctx.fetch(BOX_SUMMARY, &summary_params(game.game_id)).await?;
    let mut boxes = Vec::with_capacity(BOX_SCORE_ENDPOINTS.len());
    for endpoint in BOX_SCORE_ENDPOINTS {
        let params = box_score_params(game.game_id, &season, &season_type);
        if let Some(payload) = ctx.fetch(endpoint, &params).await? {
            boxes.push((*endpoint, payload));
        }
    }
    let play_by_play = ctx
        .fetch(
            PLAY_BY_PLAY,
            &play_by_play_params(game.game_id, &season, &season_type),
        )
        .await?;

    ctx.enter(RunState::NormalizingRows)?;
    let mut staged = Vec::new();
    let mut attributes = Map::new();
    let mut points = HashMap::new();
    if let Some(summary) = &summary {
        stage_summary(&ctx.normalizer, summary, &mut staged, &mut attributes, &mut points)?;
    }
    let home_win = match (
        points.get(&scheduled.home.team_id),
        points.get(&scheduled.visitor.team_id),
    ) {
        (Some(home), Some(visitor)) => Some(home > visitor),
        _ => None,
    };
    for (endpoint, payload) in &boxes {
        stage_box_scores(&ctx.normalizer, *endpoint, payload, scheduled, home_win, &mut staged)?;
    }
    if let Some(play_by_play) = &play_by_play {
        stage_play_by_play(&ctx.normalizer, play_by_play, &mut staged)?;
    }

    ctx.enter(RunState::Resolving)?;
    let registry = ctx.registry.clone();
    let mut records = Vec::with_capacity(staged.len());
    for row in &staged {
        match resolve_staged(ctx, &registry, row, game).await {
            Ok(record) => records.push(record),
            Err(err) => {
                let combination = format!("{} game {}", row.resource, game.game_id);
                absorb_row_error(&mut outcome, &combination, &row.raw, err)?;
            }
        }
    }

    ctx.enter(RunState::Upserting)?;
    if !attributes.is_empty() {
        merge_game_attributes(&ctx.db, game.id, &attributes).await?;
    }
    outcome.created += bulk_insert(&ctx.db, &records).await?;
    info!(records = records.len(), "game dependents stored");
    Ok(outcome)
}

/// Other stats (set 1), officials (set 2), game info (set 4) and line scores (set 5).
fn stage_summary(
    normalizer: &FieldNormalizer,
    summary: &StatPayload,
    staged: &mut Vec<StagedRow>,
    attributes: &mut Map<String, Value>,
    points: &mut HashMap<i64, i64>,
) -> Result<()> {
    let options = NormalizeOptions::new();
    let set_rows = |index: usize| {
        summary
            .result_sets
            .get(index)
            .map(|set| set.rows())
            .unwrap_or_default()
    };

    for raw in set_rows(1) {
        let fields = normalizer.normalize(&raw, &options);
        staged.push(StagedRow {
            resource: BOX_SUMMARY,
            named: Some("GameOtherStats"),
            refs: RowRefs::Team,
            raw,
            fields,
        });
    }
    for raw in set_rows(2) {
        let fields = normalizer.normalize(&raw, &options);
        staged.push(StagedRow {
            resource: BOX_SUMMARY,
            named: Some("GameOfficialXref"),
            refs: RowRefs::Official,
            raw,
            fields,
        });
    }
    if let Some(info) = set_rows(4).into_iter().next() {
        if let Some(attendance) = info.get("ATTENDANCE").and_then(value_as_i64) {
            attributes.insert("attendance".into(), Value::from(attendance));
        }
        if let Some(clock) = text(&info, "GAME_TIME") {
            if let Some(duration) = duration_from_clock(&clock)? {
                attributes.insert("game_time_minutes".into(), Value::from(duration.num_minutes()));
            }
        }
    }
    for mut raw in set_rows(5) {
        if let (Some(team_id), Some(pts)) = (
            optional_id(&raw, "TEAM_ID"),
            raw.get("PTS").and_then(value_as_i64),
        ) {
            points.insert(team_id, pts);
        }
        if let Some(raw_date) = text(&raw, "GAME_DATE_EST") {
            let date = parse_provider_date(&raw_date)?;
            raw.insert("GAME_DATE_EST".into(), Value::String(date.to_string()));
        }
        let fields = normalizer.normalize(&raw, &options);
        staged.push(StagedRow {
            resource: BOX_SUMMARY,
            named: Some("LineScore"),
            refs: RowRefs::Team,
            raw,
            fields,
        });
    }
    Ok(())
}

/// Player rows then team rows of one box-score family. Hustle payloads carry an availability
/// flag in set 0 and their rows in sets 1 and 2.
fn stage_box_scores(
    normalizer: &FieldNormalizer,
    endpoint: &'static str,
    payload: &StatPayload,
    scheduled: &ScheduledGame,
    home_win: Option<bool>,
    staged: &mut Vec<StagedRow>,
) -> Result<()> {
    let family = family_for(endpoint, Suffix::BoxScore, &Row::new())
        .ok_or_else(|| EtlError::classification(endpoint, "unknown box-score family"))?;
    let (player_set, team_set, minutes_key) = if family == Family::Hustle {
        if !hustle_available(payload) {
            debug!(game_id = scheduled.game.game_id, "hustle stats not available");
            return Ok(());
        }
        (1, 2, "MINUTES")
    } else {
        (0, 1, "MIN")
    };

    let options = NormalizeOptions::new();
    for (index, player_rows) in [(player_set, true), (team_set, false)] {
        for row in payload.rows(index)? {
            let mut raw = if family == Family::Tracking {
                tracking_box_fields(&row, player_rows)
            } else {
                row
            };
            if let Some(clock) = raw.get(minutes_key) {
                let minutes = minutes_from_clock(clock)?;
                raw.insert(minutes_key.into(), Value::from(minutes));
            }
            apply_family_quirks(family, &mut raw);

            let home_side = optional_id(&raw, "TEAM_ID") == Some(scheduled.home.team_id);
            let mut fields = normalizer.normalize(&raw, &options);
            fields.insert("matchup".into(), Value::String(scheduled.matchup(home_side)));
            if let Some(home_win) = home_win {
                fields.insert("win_flag".into(), Value::Bool(home_win == home_side));
            }
            staged.push(StagedRow {
                resource: endpoint,
                named: None,
                refs: if player_rows {
                    RowRefs::BoxPlayer
                } else {
                    RowRefs::Team
                },
                raw,
                fields,
            });
        }
    }
    Ok(())
}

fn stage_play_by_play(
    normalizer: &FieldNormalizer,
    payload: &StatPayload,
    staged: &mut Vec<StagedRow>,
) -> Result<()> {
    let options = NormalizeOptions::new();
    for mut raw in payload.rows(0)? {
        if raw.get("SCOREMARGIN").and_then(Value::as_str) == Some("TIE") {
            raw.insert("SCOREMARGIN".into(), Value::from(0));
        }
        let fields = normalizer.normalize(&raw, &options);
        staged.push(StagedRow {
            resource: PLAY_BY_PLAY,
            named: Some("PlayByPlayEvent"),
            refs: RowRefs::PlayByPlay,
            raw,
            fields,
        });
    }
    Ok(())
}

/// Box-score and summary teams are created on sight; the provider knows them even when the
/// team list has not been seeded.
async fn game_team(ctx: &mut IngestContext, raw: &Row) -> Result<i64> {
    let team_id = required_id(raw, "TEAM_ID")?;
    let fallback = text(raw, "TEAM_NAME").or_else(|| text(raw, "TEAM_ABBREVIATION"));
    let team = ctx
        .entities
        .resolve_team_or_create(team_id, fallback.as_deref())
        .await?;
    Ok(team.id)
}

async fn optional_team(ctx: &mut IngestContext, raw: &Row, key: &str) -> Result<Option<i64>> {
    let Some(team_id) = optional_id(raw, key) else {
        return Ok(None);
    };
    match ctx.entities.resolve_team_strict(team_id).await {
        Ok(team) => Ok(Some(team.id)),
        Err(EtlError::EntityResolution { .. }) => Ok(None),
        Err(err) => Err(err),
    }
}

async fn resolve_staged(
    ctx: &mut IngestContext,
    registry: &Registry,
    row: &StagedRow,
    game: &Game,
) -> Result<PreparedRecord> {
    let raw = &row.raw;
    let mut fields = row.fields.clone();
    fields.insert("game".into(), Value::from(game.id));
    fields.insert("season".into(), Value::from(game.season));

    match row.refs {
        RowRefs::Team => {
            let team = game_team(ctx, raw).await?;
            fields.insert("team".into(), Value::from(team));
        }
        RowRefs::BoxPlayer => {
            let team = game_team(ctx, raw).await?;
            let player = ctx
                .player_ref_or_create(raw, "PLAYER_ID", "PLAYER_NAME", Some(team))
                .await?;
            fields.insert("team".into(), Value::from(team));
            fields.insert("player".into(), Value::from(player));
        }
        RowRefs::Official => {
            let official_id = required_id(raw, "OFFICIAL_ID")?;
            let (official, _) = ensure_official(
                &ctx.db,
                official_id,
                text(raw, "FIRST_NAME").as_deref(),
                text(raw, "LAST_NAME").as_deref(),
                text(raw, "JERSEY_NUM").as_deref(),
            )
            .await?;
            fields.insert("official".into(), Value::from(official));
        }
        RowRefs::PlayByPlay => {
            for n in 1..=3 {
                let team = optional_team(ctx, raw, &format!("PLAYER{n}_TEAM_ID")).await?;
                fields.insert(format!("player{n}_team"), Value::from(team));
                let name_key = format!("PLAYER{n}_NAME");
                // Team events put the team id in PLAYERn_ID and leave the name empty.
                if text(raw, &name_key).is_none() {
                    fields.insert(format!("player{n}"), Value::Null);
                    continue;
                }
                let player = ctx
                    .player_ref_or_create(raw, &format!("PLAYER{n}_ID"), &name_key, team)
                    .await?;
                fields.insert(format!("player{n}"), Value::from(player));
            }
        }
    }

    let kind = match row.named {
        Some(name) => registry.by_name(name).ok_or_else(|| {
            EtlError::Configuration(format!("record kind {name} is not registered"))
        })?,
        None => classify(registry, row.resource, &Row::new(), &fields)?,
    };
    let key = unique_key(kind, &fields)?;
    Ok(PreparedRecord {
        kind: kind.name.clone(),
        key,
        fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::database_ops::entities::{find_game, find_player};
    use crate::database_ops::records::{count_records, records_of_kind};
    use crate::fetch::endpoints::LEAGUE_GAME_LOG;
    use crate::fetch::scripted::{envelope, ScriptedSource};
    use crate::normalization::season::PLAYOFFS;
    use crate::pipelines::game_logs::game_logs;
    use crate::pipelines::test_support::{seed_player, seed_team};
    use crate::pipelines::SeasonScope;
    use serde_json::json;

    const CLE: i64 = 1610612739;
    const BOS: i64 = 1610612738;
    const GAME: &str = "0021600001";

    fn season_2016() -> LeagueSeason {
        let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();
        LeagueSeason {
            year: 2016,
            pre_season_start: date(2016, 9, 30),
            regular_season_start: date(2016, 10, 25),
            playoffs_start: date(2017, 4, 15),
            playoffs_end: Some(date(2017, 6, 20)),
        }
    }

    fn scripted() -> ScriptedSource {
        let scoreboard = envelope(
            SCOREBOARD,
            vec![(
                "GameHeader",
                vec![
                    "GAME_DATE_EST",
                    "GAME_SEQUENCE",
                    "GAME_ID",
                    "GAME_STATUS_TEXT",
                    "HOME_TEAM_ID",
                    "VISITOR_TEAM_ID",
                    "SEASON",
                ],
                vec![json!(["2016-10-25T00:00:00", 1, GAME, "Final", CLE, BOS, "2016"])],
            )],
        );
        let summary = envelope(
            BOX_SUMMARY,
            vec![
                ("GameSummary", vec!["GAME_ID"], vec![json!([GAME])]),
                (
                    "OtherStats",
                    vec!["TEAM_ID", "TEAM_ABBREVIATION", "PTS_PAINT", "PTS_2ND_CHANCE"],
                    vec![json!([CLE, "CLE", 48, 12]), json!([BOS, "BOS", 40, 9])],
                ),
                (
                    "Officials",
                    vec!["OFFICIAL_ID", "FIRST_NAME", "LAST_NAME", "JERSEY_NUM"],
                    vec![json!([1153, "Ken", "Mauer", "41"])],
                ),
                ("InactivePlayers", vec!["PLAYER_ID"], vec![]),
                (
                    "GameInfo",
                    vec!["GAME_DATE", "ATTENDANCE", "GAME_TIME"],
                    vec![json!(["TUESDAY, OCTOBER 25, 2016", 20562, "2:21"])],
                ),
                (
                    "LineScore",
                    vec!["GAME_DATE_EST", "GAME_ID", "TEAM_ID", "TEAM_ABBREVIATION", "PTS"],
                    vec![
                        json!(["2016-10-25T00:00:00", GAME, CLE, "CLE", 117]),
                        json!(["2016-10-25T00:00:00", GAME, BOS, "BOS", 88]),
                    ],
                ),
            ],
        );
        let traditional = envelope(
            "boxscoretraditionalv2",
            vec![
                (
                    "PlayerStats",
                    vec!["GAME_ID", "TEAM_ID", "PLAYER_ID", "PLAYER_NAME", "MIN", "PTS"],
                    vec![
                        json!([GAME, CLE, 2544, "LeBron James", "37:30", 19]),
                        json!([GAME, BOS, 1628369, "Jayson Tatum", "12:00", 4]),
                    ],
                ),
                (
                    "TeamStats",
                    vec!["GAME_ID", "TEAM_ID", "TEAM_NAME", "MIN", "PTS"],
                    vec![
                        json!([GAME, CLE, "Cavaliers", "240:00", 117]),
                        json!([GAME, BOS, "Celtics", "240:00", 88]),
                    ],
                ),
            ],
        );
        let hustle = envelope(
            "hustlestatsboxscore",
            vec![
                ("HustleStatsAvailable", vec!["GAME_ID", "HUSTLE_STATUS"], vec![json!([GAME, 0])]),
                ("PlayerStats", vec!["PLAYER_ID"], vec![json!([2544])]),
                ("TeamStats", vec!["TEAM_ID"], vec![json!([CLE])]),
            ],
        );
        let pbp = envelope(
            PLAY_BY_PLAY,
            vec![(
                "PlayByPlay",
                vec![
                    "GAME_ID",
                    "EVENTNUM",
                    "SCOREMARGIN",
                    "PLAYER1_ID",
                    "PLAYER1_NAME",
                    "PLAYER1_TEAM_ID",
                    "PLAYER2_ID",
                    "PLAYER2_NAME",
                    "PLAYER2_TEAM_ID",
                    "PLAYER3_ID",
                    "PLAYER3_NAME",
                    "PLAYER3_TEAM_ID",
                ],
                vec![
                    json!([GAME, 1, "TIE", 2544, "LeBron James", CLE, 0, null, null, 0, null, null]),
                    json!([GAME, 2, "-2", CLE, null, null, 0, null, null, 0, null, null]),
                ],
            )],
        );
        ScriptedSource::new()
            .respond(SCOREBOARD, &[], scoreboard)
            .respond(BOX_SUMMARY, &[], summary)
            .respond("boxscoretraditionalv2", &[], traditional)
            .respond("hustlestatsboxscore", &[], hustle)
            .respond(PLAY_BY_PLAY, &[], pbp)
    }

    #[tokio::test]
    async fn game_day_writes_dependents_and_creates_missing_players() {
        let source = Arc::new(scripted());
        let db = Db::connect_in_memory().await.unwrap();
        let mut ctx = IngestContext::new(db, source.clone());
        seed_team(&ctx, CLE, "CLE").await;
        seed_team(&ctx, BOS, "BOS").await;
        let date = NaiveDate::from_ymd_opt(2016, 10, 25).unwrap();

        let outcome = games_for_date(&mut ctx, date, &season_2016()).await.unwrap();
        assert!(outcome.row_failures.is_empty());

        let game = find_game(&ctx.db, 21600001).await.unwrap().unwrap();
        assert_eq!(game.season, Some(2016));
        assert_eq!(game.season_type.as_deref(), Some("Regular Season"));
        assert_eq!(game.attributes.0.get("attendance"), Some(&json!(20562)));
        assert_eq!(game.attributes.0.get("game_time_minutes"), Some(&json!(141)));

        assert_eq!(count_records(&ctx.db, "LineScore").await.unwrap(), 2);
        assert_eq!(count_records(&ctx.db, "GameOfficialXref").await.unwrap(), 1);
        assert_eq!(count_records(&ctx.db, "PlayerHustleStatsBoxScore").await.unwrap(), 0);
        let other = records_of_kind(&ctx.db, "GameOtherStats").await.unwrap();
        assert!(other
            .iter()
            .any(|r| r.field("pts_second_chance") == Some(&json!(12))));

        let rookie = find_player(&ctx.db, 1628369).await.unwrap().unwrap();
        assert_eq!(rookie.display_name, "Jayson Tatum");
        assert!(!rookie.is_complete);

        let boxes = records_of_kind(&ctx.db, "PlayerTraditionalBoxScore").await.unwrap();
        assert_eq!(boxes.len(), 2);
        let lebron = boxes
            .iter()
            .find(|r| r.field("pts") == Some(&json!(19)))
            .unwrap();
        assert_eq!(lebron.field("min"), Some(&json!(37.5)));
        assert_eq!(lebron.field("matchup"), Some(&json!("vs. BOS")));
        assert_eq!(lebron.field("win_flag"), Some(&json!(true)));
        let tatum = boxes
            .iter()
            .find(|r| r.player_ref == Some(rookie.id))
            .unwrap();
        assert_eq!(tatum.field("matchup"), Some(&json!("@ CLE")));
        assert_eq!(tatum.field("win_flag"), Some(&json!(false)));

        let events = records_of_kind(&ctx.db, "PlayByPlayEvent").await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].field("scoremargin"), Some(&json!(0)));
        assert_eq!(events[1].field("player1"), Some(&Value::Null));

        ctx.reset();
        let summaries_before = source.call_count(BOX_SUMMARY);
        let again = games_for_date(&mut ctx, date, &season_2016()).await.unwrap();
        assert_eq!(again.created, 0);
        assert_eq!(again.skipped_rows, 1);
        assert_eq!(source.call_count(BOX_SUMMARY), summaries_before);
        assert_eq!(count_records(&ctx.db, "LineScore").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn game_with_only_game_logs_is_ingested_again() {
        let db = Db::connect_in_memory().await.unwrap();
        let date = NaiveDate::from_ymd_opt(2016, 10, 25).unwrap();
        let failing = scripted().fail(BOX_SUMMARY, &[], "502 Bad Gateway");
        let mut ctx = IngestContext::new(db.clone(), Arc::new(failing));
        seed_team(&ctx, CLE, "CLE").await;
        seed_team(&ctx, BOS, "BOS").await;
        seed_player(&ctx, 2544, "LeBron James").await;

        let first = games_for_date(&mut ctx, date, &season_2016()).await.unwrap();
        assert_eq!(first.row_failures.len(), 1);
        assert_eq!(first.row_failures[0].category, "fetch_transient");
        assert!(find_game(&db, 21600001).await.unwrap().is_some());
        assert_eq!(count_records(&db, "LineScore").await.unwrap(), 0);

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
                vec![json!(["22016", 2544, "LeBron James", CLE, GAME, "2016-10-25", "CLE vs. BOS", "W", 19])],
            )],
        );
        let mut logs_ctx = IngestContext::new(
            db.clone(),
            Arc::new(ScriptedSource::new().respond(LEAGUE_GAME_LOG, &[], log)),
        );
        let scope = SeasonScope::new(2016, REGULAR_SEASON);
        let logged = game_logs(&mut logs_ctx, &scope).await.unwrap();
        assert_eq!(logged.created, 1);

        let source = Arc::new(scripted());
        let mut rerun_ctx = IngestContext::new(db.clone(), source.clone());
        let rerun = games_for_date(&mut rerun_ctx, date, &season_2016()).await.unwrap();
        assert_eq!(rerun.skipped_rows, 0);
        assert_eq!(source.call_count(BOX_SUMMARY), 1);
        assert_eq!(count_records(&db, "LineScore").await.unwrap(), 2);
        assert_eq!(count_records(&db, "PlayByPlayEvent").await.unwrap(), 2);
        assert_eq!(count_records(&db, "PlayerGameLog").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unknown_home_team_skips_only_that_game() {
        let db = Db::connect_in_memory().await.unwrap();
        let mut ctx = IngestContext::new(db, Arc::new(scripted()));
        seed_team(&ctx, BOS, "BOS").await;
        let date = NaiveDate::from_ymd_opt(2016, 10, 25).unwrap();

        let outcome = games_for_date(&mut ctx, date, &season_2016()).await.unwrap();
        assert_eq!(outcome.row_failures.len(), 1);
        assert!(find_game(&ctx.db, 21600001).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pending_dates_stop_at_the_playoffs_end_or_today() {
        let db = Db::connect_in_memory().await.unwrap();
        let season = season_2016();
        let today = NaiveDate::from_ymd_opt(2016, 10, 28).unwrap();
        let dates = pending_game_dates(&db, &season, today).await.unwrap();
        assert_eq!(dates.len(), 4);
        assert_eq!(dates[0], season.regular_season_start);

        let late = NaiveDate::from_ymd_opt(2018, 1, 1).unwrap();
        let all = pending_game_dates(&db, &season, late).await.unwrap();
        assert_eq!(all.last().copied(), season.playoffs_end);
        assert_eq!(
            season.season_type_for_date(all[all.len() - 1]).unwrap(),
            PLAYOFFS
        );
    }
}
