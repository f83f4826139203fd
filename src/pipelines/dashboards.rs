//! League dashboards (`leaguedash{player,team}stats`) and per-entity dashboards
//! (`{player,team}dashboardby{general,shooting}splits`).

use serde_json::Value;
use tracing::{info, instrument};

use super::{
    absorb_row_error, is_null_or_missing, params_row, stamp_scope, IngestContext, SeasonScope,
    UnitOutcome,
};
use crate::classify::{apply_family_quirks, family_for, split_options};
use crate::error::{EtlError, Result};
use crate::fetch::combination_label;
use crate::fetch::endpoints::{
    entity_dashboard_params, league_dash_params, GroupValue, LEAGUE_PLAYER_STATS,
    LEAGUE_TEAM_STATS, PLAYER_GENERAL_SPLITS, PLAYER_SHOOTING_SPLITS, TEAM_GENERAL_SPLITS,
    TEAM_SHOOTING_SPLITS,
};
use crate::orchestrator::RunState;
use crate::payload::Row;
use crate::registry::{EntityAxis, Suffix};

fn league_endpoint(axis: EntityAxis) -> Result<&'static str> {
    match axis {
        EntityAxis::Player => Ok(LEAGUE_PLAYER_STATS),
        EntityAxis::Team => Ok(LEAGUE_TEAM_STATS),
        other => Err(EtlError::Configuration(format!(
            "no league dashboard for {}",
            other.label()
        ))),
    }
}

/// One league dashboard combination: every player (or team) for one group value.
#[instrument(skip(ctx, scope, group), fields(season = scope.season, group = %group.label))]
pub async fn league_split(
    ctx: &mut IngestContext,
    axis: EntityAxis,
    scope: &SeasonScope,
    measure_type: &str,
    per_mode: &str,
    group: &GroupValue,
) -> Result<UnitOutcome> {
    let endpoint = league_endpoint(axis)?;
    let params = league_dash_params(&scope.label(), &scope.season_type, measure_type, per_mode, group);
    let combination = combination_label(endpoint, &params);
    let Some(payload) = ctx.fetch(endpoint, &params).await? else {
        return Ok(UnitOutcome::unavailable());
    };

    ctx.enter(RunState::Classifying)?;
    let request = params_row(&params);
    let family = family_for(endpoint, Suffix::Split, &request)
        .ok_or_else(|| EtlError::classification(endpoint, format!("measure type {measure_type}")))?;

    ctx.enter(RunState::NormalizingRows)?;
    let options = split_options();
    let mut outcome = UnitOutcome::default();
    let mut staged: Vec<(Row, Row)> = Vec::new();
    for mut raw in payload.rows(0)? {
        raw.insert("GROUP_SET".into(), Value::String(group.set.label().to_string()));
        raw.insert("GROUP_VALUE".into(), Value::String(group.label.clone()));
        raw.insert("MEASURE_TYPE".into(), Value::String(measure_type.to_string()));
        stamp_scope(&mut raw, scope, per_mode);
        apply_family_quirks(family, &mut raw);
        let fields = ctx.normalizer.normalize(&raw, &options);
        if is_null_or_missing(&fields, "group_value") {
            outcome.skipped_rows += 1;
            continue;
        }
        staged.push((raw, fields));
    }

    ctx.enter(RunState::Resolving)?;
    let mut resolved = Vec::with_capacity(staged.len());
    for (raw, mut fields) in staged {
        let entity = match axis {
            EntityAxis::Player => ctx.player_ref(&raw, "PLAYER_ID").await,
            _ => ctx.team_ref(&raw, "TEAM_ID").await,
        };
        match entity {
            Ok(id) => {
                let key = if axis == EntityAxis::Player { "player" } else { "team" };
                fields.insert(key.into(), Value::from(id));
                resolved.push(fields);
            }
            Err(err) => absorb_row_error(&mut outcome, &combination, &raw, err)?,
        }
    }

    ctx.enter(RunState::Upserting)?;
    for fields in &resolved {
        let created = ctx.store(endpoint, &request, fields, &combination).await?;
        outcome.record(created);
    }
    info!(
        combination = %combination,
        created = outcome.created,
        updated = outcome.updated,
        "league dashboard stored"
    );
    Ok(outcome)
}

/// Dashboard endpoint for one entity; shooting splits ignore the measure type.
pub fn entity_dashboard_endpoint(axis: EntityAxis, shooting: bool) -> Result<&'static str> {
    match (axis, shooting) {
        (EntityAxis::Player, false) => Ok(PLAYER_GENERAL_SPLITS),
        (EntityAxis::Player, true) => Ok(PLAYER_SHOOTING_SPLITS),
        (EntityAxis::Team, false) => Ok(TEAM_GENERAL_SPLITS),
        (EntityAxis::Team, true) => Ok(TEAM_SHOOTING_SPLITS),
        (other, _) => Err(EtlError::Configuration(format!(
            "no entity dashboard for {}",
            other.label()
        ))),
    }
}

/// Every result set of one player or team dashboard; group set and value come from the rows.
#[instrument(skip(ctx, scope), fields(season = scope.season))]
pub async fn entity_dashboard(
    ctx: &mut IngestContext,
    axis: EntityAxis,
    entity_id: i64,
    scope: &SeasonScope,
    measure_type: &str,
    per_mode: &str,
    shooting: bool,
) -> Result<UnitOutcome> {
    let endpoint = entity_dashboard_endpoint(axis, shooting)?;
    let (id_key, ref_key) = match axis {
        EntityAxis::Player => ("PlayerID", "player"),
        _ => ("TeamID", "team"),
    };
    let measure_type = if shooting { "Base" } else { measure_type };
    let params = entity_dashboard_params(
        id_key,
        entity_id,
        &scope.label(),
        &scope.season_type,
        measure_type,
        per_mode,
    );
    let combination = combination_label(endpoint, &params);
    let Some(payload) = ctx.fetch(endpoint, &params).await? else {
        return Ok(UnitOutcome::unavailable());
    };

    ctx.enter(RunState::Classifying)?;
    let request = params_row(&params);
    let family = family_for(endpoint, Suffix::Split, &request)
        .ok_or_else(|| EtlError::classification(endpoint, format!("measure type {measure_type}")))?;
    let stored_measure = if shooting { "Shooting" } else { measure_type };

    ctx.enter(RunState::NormalizingRows)?;
    let options = split_options();
    let mut outcome = UnitOutcome::default();
    let mut staged = Vec::new();
    for set in &payload.result_sets {
        for mut raw in set.rows() {
            raw.insert("MEASURE_TYPE".into(), Value::String(stored_measure.to_string()));
            stamp_scope(&mut raw, scope, per_mode);
            apply_family_quirks(family, &mut raw);
            let fields = ctx.normalizer.normalize(&raw, &options);
            if is_null_or_missing(&fields, "group_value") {
                outcome.skipped_rows += 1;
                continue;
            }
            staged.push(fields);
        }
    }

    ctx.enter(RunState::Resolving)?;
    let entity_ref = match axis {
        EntityAxis::Player => ctx.entities.resolve_player_strict(entity_id).await?.id,
        _ => ctx.entities.resolve_team_strict(entity_id).await?.id,
    };
    for fields in &mut staged {
        fields.insert(ref_key.into(), Value::from(entity_ref));
    }

    ctx.enter(RunState::Upserting)?;
    for fields in &staged {
        let created = ctx.store(endpoint, &request, fields, &combination).await?;
        outcome.record(created);
    }
    Ok(outcome)
}
