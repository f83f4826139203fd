//! Team player on/off summaries and details (`teamplayeronoff{summary,detail}`).

use serde_json::Value;
use tracing::{debug, instrument};

use super::{absorb_row_error, params_row, IngestContext, SeasonScope, UnitOutcome};
use crate::classify::{apply_family_quirks, family_for, suffix_for_resource, SPLIT_AUX_IGNORE};
use crate::error::{EtlError, Result};
use crate::fetch::{combination_label, Params};
use crate::fetch::endpoints::{on_off_params, ON_OFF_DETAIL, ON_OFF_SUMMARY};
use crate::normalization::NormalizeOptions;
use crate::orchestrator::RunState;
use crate::payload::{Row, StatPayload};

/// "On court" rows live in set 1 and "off court" rows in set 2; both share set 1's headers.
fn court_rows(payload: &StatPayload) -> Result<Vec<Row>> {
    let on = payload.result_set(1)?;
    let mut rows = on.rows();
    if let Some(off) = payload.result_sets.get(2) {
        rows.extend(off.row_set.iter().map(|values| {
            on.headers
                .iter()
                .cloned()
                .zip(values.iter().cloned())
                .collect::<Row>()
        }));
    }
    Ok(rows)
}

/// Summary and detail for one team, season, measure type and per-mode.
#[instrument(skip(ctx, scope), fields(season = scope.season))]
pub async fn on_off(
    ctx: &mut IngestContext,
    team_id: i64,
    scope: &SeasonScope,
    measure_type: &str,
    per_mode: &str,
) -> Result<UnitOutcome> {
    let params = on_off_params(
        team_id,
        &scope.label(),
        &scope.season_type,
        measure_type,
        per_mode,
    );
    let mut outcome = on_off_part(ctx, ON_OFF_SUMMARY, &params, scope, measure_type, per_mode).await?;
    let detail = on_off_part(ctx, ON_OFF_DETAIL, &params, scope, measure_type, per_mode).await?;
    outcome.merge(detail);
    Ok(outcome)
}

async fn on_off_part(
    ctx: &mut IngestContext,
    endpoint: &str,
    params: &Params,
    scope: &SeasonScope,
    measure_type: &str,
    per_mode: &str,
) -> Result<UnitOutcome> {
    let combination = combination_label(endpoint, params);
    let Some(payload) = ctx.fetch(endpoint, params).await? else {
        return Ok(UnitOutcome::unavailable());
    };

    ctx.enter(RunState::Classifying)?;
    let request = params_row(params);
    let suffix = suffix_for_resource(endpoint)
        .ok_or_else(|| EtlError::classification(endpoint, "unknown resource"))?;
    let family = family_for(endpoint, suffix, &request)
        .ok_or_else(|| EtlError::classification(endpoint, format!("measure type {measure_type}")))?;

    ctx.enter(RunState::NormalizingRows)?;
    let options = NormalizeOptions::new().ignore_keys(SPLIT_AUX_IGNORE.iter().copied());
    let mut staged = Vec::new();
    for mut raw in court_rows(&payload)? {
        raw.insert("SEASON".into(), Value::from(scope.season));
        raw.insert("SEASON_TYPE".into(), Value::String(scope.season_type.clone()));
        raw.insert("MEASURE_TYPE".into(), Value::String(measure_type.to_string()));
        raw.insert("PER_MODE".into(), Value::String(per_mode.to_string()));
        apply_family_quirks(family, &mut raw);
        let fields = ctx.normalizer.normalize(&raw, &options);
        staged.push((raw, fields));
    }
    debug!(rows = staged.len(), endpoint, "on/off rows staged");

    ctx.enter(RunState::Resolving)?;
    let mut outcome = UnitOutcome::default();
    let mut resolved = Vec::with_capacity(staged.len());
    for (raw, mut fields) in staged {
        let refs = match ctx.team_ref(&raw, "TEAM_ID").await {
            Ok(team) => ctx
                .player_ref(&raw, "VS_PLAYER_ID")
                .await
                .map(|player| (team, player)),
            Err(err) => Err(err),
        };
        match refs {
            Ok((team, player)) => {
                fields.insert("team".into(), Value::from(team));
                fields.insert("player".into(), Value::from(player));
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
    Ok(outcome)
}
