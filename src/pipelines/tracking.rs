//! League player-tracking dashboards (`leaguedashptstats`).

use serde_json::Value;
use tracing::instrument;

use super::{
    absorb_row_error, is_null_or_missing, params_row, stamp_scope, IngestContext, SeasonScope,
    UnitOutcome,
};
use crate::classify::{family_for, split_options};
use crate::error::{EtlError, Result};
use crate::fetch::combination_label;
use crate::fetch::endpoints::{league_tracking_params, GroupValue, LEAGUE_PLAYER_TRACKING};
use crate::normalization::tracking::{shot_type_fields, touch_fields};
use crate::orchestrator::RunState;
use crate::registry::{Family, Suffix};

#[instrument(skip(ctx, scope, group), fields(season = scope.season, group = %group.label))]
pub async fn league_tracking(
    ctx: &mut IngestContext,
    scope: &SeasonScope,
    pt_measure_type: &str,
    per_mode: &str,
    group: &GroupValue,
) -> Result<UnitOutcome> {
    let endpoint = LEAGUE_PLAYER_TRACKING;
    let params = league_tracking_params(
        &scope.label(),
        &scope.season_type,
        pt_measure_type,
        per_mode,
        group,
    );
    let combination = combination_label(endpoint, &params);
    let Some(payload) = ctx.fetch(endpoint, &params).await? else {
        return Ok(UnitOutcome::unavailable());
    };

    ctx.enter(RunState::Classifying)?;
    let request = params_row(&params);
    let family = family_for(endpoint, Suffix::Tracking, &request).ok_or_else(|| {
        EtlError::classification(endpoint, format!("pt measure type {pt_measure_type}"))
    })?;

    ctx.enter(RunState::NormalizingRows)?;
    let options = split_options();
    let mut outcome = UnitOutcome::default();
    let mut staged = Vec::new();
    for row in payload.rows(0)? {
        let mut raw = match family {
            Family::ShotType => shot_type_fields(&row, pt_measure_type),
            Family::Touch => touch_fields(&row, pt_measure_type),
            _ => row,
        };
        raw.insert(
            "PT_MEASURE_TYPE".into(),
            Value::String(pt_measure_type.to_string()),
        );
        raw.insert("GROUP_SET".into(), Value::String(group.set.label().to_string()));
        raw.insert("GROUP_VALUE".into(), Value::String(group.label.clone()));
        stamp_scope(&mut raw, scope, per_mode);
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
        match ctx.player_ref(&raw, "PLAYER_ID").await {
            Ok(player) => {
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
