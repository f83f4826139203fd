//! League lineups (`leaguedashlineups`): one record per team roster of 2-5 players.

use serde_json::Value;
use tracing::{info, instrument};

use super::{absorb_row_error, params_row, IngestContext, SeasonScope, UnitOutcome};
use crate::classify::{apply_family_quirks, classify, family_for, SPLIT_AUX_IGNORE};
use crate::database_ops::lineups::upsert_lineup;
use crate::error::{EtlError, Result};
use crate::fetch::combination_label;
use crate::fetch::endpoints::{lineup_params, LEAGUE_LINEUPS};
use crate::normalization::NormalizeOptions;
use crate::orchestrator::RunState;
use crate::payload::{value_as_string, Row};
use crate::registry::{unique_key, Suffix};

/// Provider ids from `GROUP_ID` ("-2544-202681-") paired with names from `GROUP_NAME`.
fn roster_members(raw: &Row) -> Result<Vec<(i64, Option<String>)>> {
    let ids = raw
        .get("GROUP_ID")
        .and_then(value_as_string)
        .ok_or_else(|| EtlError::payload("lineup row has no GROUP_ID"))?;
    let names: Vec<String> = raw
        .get("GROUP_NAME")
        .and_then(value_as_string)
        .map(|names| names.split(" - ").map(|n| n.trim().to_string()).collect())
        .unwrap_or_default();

    ids.split('-')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .enumerate()
        .map(|(idx, id)| {
            let id = id
                .parse::<i64>()
                .map_err(|_| EtlError::payload(format!("bad lineup member id {id:?}")))?;
            Ok((id, names.get(idx).cloned()))
        })
        .collect()
}

#[instrument(skip(ctx, scope), fields(season = scope.season))]
pub async fn lineup_unit(
    ctx: &mut IngestContext,
    scope: &SeasonScope,
    measure_type: &str,
    per_mode: &str,
    group_quantity: u8,
) -> Result<UnitOutcome> {
    let endpoint = LEAGUE_LINEUPS;
    let params = lineup_params(
        &scope.label(),
        &scope.season_type,
        measure_type,
        per_mode,
        group_quantity,
    );
    let combination = combination_label(endpoint, &params);
    let Some(payload) = ctx.fetch(endpoint, &params).await? else {
        return Ok(UnitOutcome::unavailable());
    };

    ctx.enter(RunState::Classifying)?;
    let request = params_row(&params);
    let family = family_for(endpoint, Suffix::Lineup, &request)
        .ok_or_else(|| EtlError::classification(endpoint, format!("measure type {measure_type}")))?;

    ctx.enter(RunState::NormalizingRows)?;
    let options = NormalizeOptions::new()
        .override_keys(["W", "L"])
        .ignore_keys(SPLIT_AUX_IGNORE.iter().copied());
    let mut staged = Vec::new();
    for mut raw in payload.rows(0)? {
        raw.insert("SEASON".into(), Value::from(scope.season));
        raw.insert("SEASON_TYPE".into(), Value::String(scope.season_type.clone()));
        raw.insert("MEASURE_TYPE".into(), Value::String(measure_type.to_string()));
        raw.insert("PER_MODE".into(), Value::String(per_mode.to_string()));
        raw.insert("GROUP_QUANTITY".into(), Value::from(group_quantity));
        apply_family_quirks(family, &mut raw);
        let fields = ctx.normalizer.normalize(&raw, &options);
        staged.push((raw, fields));
    }

    ctx.enter(RunState::Resolving)?;
    let mut outcome = UnitOutcome::default();
    let mut resolved = Vec::with_capacity(staged.len());
    for (raw, mut fields) in staged {
        match resolve_lineup(ctx, &raw).await {
            Ok((team, roster)) => {
                fields.insert("team".into(), Value::from(team));
                resolved.push((raw, fields, roster));
            }
            Err(err) => absorb_row_error(&mut outcome, &combination, &raw, err)?,
        }
    }

    ctx.enter(RunState::Upserting)?;
    let registry = ctx.registry.clone();
    for (raw, fields, roster) in &resolved {
        let kind = classify(&registry, endpoint, &request, fields)?;
        let key = unique_key(kind, fields)?;
        match upsert_lineup(&ctx.db, kind, fields, &key, roster).await {
            Ok((_, created)) => outcome.record(created),
            Err(err) => absorb_row_error(&mut outcome, &combination, raw, err)?,
        }
    }
    info!(
        combination = %combination,
        created = outcome.created,
        updated = outcome.updated,
        "lineups stored"
    );
    Ok(outcome)
}

/// Team row id and roster player row ids; unknown members are created from `GROUP_NAME`.
async fn resolve_lineup(ctx: &mut IngestContext, raw: &Row) -> Result<(i64, Vec<i64>)> {
    let team = ctx.team_ref(raw, "TEAM_ID").await?;
    let mut roster = Vec::new();
    for (player_id, name) in roster_members(raw)? {
        let player = ctx
            .entities
            .resolve_player_or_create(player_id, name.as_deref(), Some(team))
            .await?;
        roster.push(player.id);
    }
    Ok((team, roster))
}
