//! Player seeding (`commonallplayers`) and detail sync (`commonplayerinfo`).

use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

use super::{optional_id, required_id, IngestContext, UnitOutcome};
use crate::database_ops::entities::{seed_player, upsert_player_profile, PlayerProfile};
use crate::error::{EtlError, Result};
use crate::fetch::endpoints::{all_players_params, player_info_params, ALL_PLAYERS, PLAYER_INFO};
use crate::normalization::convert::{height_inches, parse_provider_date};
use crate::normalization::season::season_label;
use crate::normalization::NormalizeOptions;
use crate::orchestrator::RunState;
use crate::payload::{value_as_i64, value_as_string, Row};

/// Keys consumed into columns rather than attributes.
const PROFILE_COLUMNS: &[&str] = &[
    "PERSON_ID",
    "DISPLAY_FIRST_LAST",
    "TEAM_ID",
    "TEAM_NAME",
    "TEAM_CITY",
    "TEAM_ABBREVIATION",
    "TEAM_CODE",
];

fn display_name(raw: &Row) -> Result<String> {
    raw.get("DISPLAY_FIRST_LAST")
        .and_then(value_as_string)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| EtlError::payload("player row has no DISPLAY_FIRST_LAST"))
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

/// Player-info cleanup: height in inches, ISO birthdate, numeric blanks as zero, school and
/// d-league flag defaults.
pub fn sanitize_player_info(raw: &Row) -> Result<Row> {
    let mut row = raw.clone();
    if let Some(height) = raw.get("HEIGHT").and_then(value_as_string) {
        row.insert("HEIGHT".into(), Value::from(height_inches(&height)?));
    }
    if let Some(birthdate) = raw.get("BIRTHDATE").and_then(value_as_string) {
        let date = parse_provider_date(&birthdate)?;
        row.insert("BIRTHDATE".into(), Value::String(date.to_string()));
    }
    if is_blank(raw.get("SCHOOL")) {
        row.insert("SCHOOL".into(), Value::String("N/A".into()));
    }
    for key in ["WEIGHT", "FROM_YEAR", "TO_YEAR"] {
        let value = if is_blank(raw.get(key)) {
            0
        } else {
            raw.get(key)
                .and_then(value_as_i64)
                .ok_or_else(|| EtlError::payload(format!("bad {key} value")))?
        };
        row.insert(key.into(), Value::from(value));
    }
    let dleague = raw
        .get("DLEAGUE_FLAG")
        .and_then(value_as_string)
        .is_some_and(|flag| !flag.eq_ignore_ascii_case("n"));
    row.insert("DLEAGUE_FLAG".into(), Value::Bool(dleague));
    Ok(row)
}

/// Seed the roster list for a season. New players stay incomplete until their detail sync.
#[instrument(skip(ctx))]
pub async fn sync_player_list(
    ctx: &mut IngestContext,
    season: i32,
    only_current: bool,
) -> Result<UnitOutcome> {
    let params = all_players_params(&season_label(season), only_current);
    let Some(payload) = ctx.fetch(ALL_PLAYERS, &params).await? else {
        return Ok(UnitOutcome::unavailable());
    };

    ctx.enter(RunState::Upserting)?;
    let mut outcome = UnitOutcome::default();
    for raw in payload.rows(0)? {
        let player_id = required_id(&raw, "PERSON_ID")?;
        let name = display_name(&raw)?;
        // Unknown or zero team ids leave the player unattached rather than failing the row.
        let team_ref = match optional_id(&raw, "TEAM_ID") {
            Some(team_id) => ctx
                .entities
                .resolve_team_strict(team_id)
                .await
                .ok()
                .map(|team| team.id),
            None => None,
        };
        let (player, created) = seed_player(
            &ctx.db,
            &PlayerProfile {
                player_id,
                display_name: name,
                team_ref,
                attributes: Map::new(),
            },
        )
        .await?;
        ctx.entities.remember_player(player);
        outcome.record(created);
    }
    info!(created = outcome.created, updated = outcome.updated, "player list synced");
    Ok(outcome)
}

/// Fetch biographical details for one player and mark them complete.
#[instrument(skip(ctx))]
pub async fn sync_player_detail(ctx: &mut IngestContext, player_id: i64) -> Result<UnitOutcome> {
    let Some(payload) = ctx.fetch(PLAYER_INFO, &player_info_params(player_id)).await? else {
        return Ok(UnitOutcome::unavailable());
    };
    let raw = payload
        .rows(0)?
        .into_iter()
        .next()
        .ok_or_else(|| EtlError::payload(format!("{PLAYER_INFO} returned no row for {player_id}")))?;

    ctx.enter(RunState::NormalizingRows)?;
    let sanitized = sanitize_player_info(&raw)?;
    let options = NormalizeOptions::new().ignore_keys(PROFILE_COLUMNS.iter().copied());
    let attributes = ctx.normalizer.normalize(&sanitized, &options);

    ctx.enter(RunState::Resolving)?;
    let team_ref = match optional_id(&raw, "TEAM_ID") {
        Some(team_id) => {
            let fallback = raw.get("TEAM_NAME").and_then(value_as_string);
            let team = ctx
                .entities
                .resolve_team_or_create(team_id, fallback.as_deref().filter(|n| !n.is_empty()))
                .await?;
            Some(team.id)
        }
        None => None,
    };

    ctx.enter(RunState::Upserting)?;
    let player = upsert_player_profile(
        &ctx.db,
        &PlayerProfile {
            player_id,
            display_name: display_name(&raw)?,
            team_ref,
            attributes,
        },
    )
    .await?;
    debug!(player_id, name = %player.display_name, "player detail stored");
    ctx.entities.remember_player(player);

    let mut outcome = UnitOutcome::default();
    outcome.record(false);
    Ok(outcome)
}
