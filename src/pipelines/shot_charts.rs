//! Shot-level detail for one player and season (`shotchartdetail`).

use serde_json::Value;
use tracing::{debug, instrument};

use super::{absorb_row_error, params_row, required_id, IngestContext, SeasonScope, UnitOutcome};
use crate::error::{EtlError, Result};
use crate::fetch::combination_label;
use crate::fetch::endpoints::{shot_chart_params, SHOT_CHART};
use crate::normalization::NormalizeOptions;
use crate::orchestrator::RunState;
use crate::payload::Row;

#[instrument(skip(ctx, scope), fields(season = scope.season))]
pub async fn shot_chart(
    ctx: &mut IngestContext,
    player_id: i64,
    scope: &SeasonScope,
) -> Result<UnitOutcome> {
    let params = shot_chart_params(player_id, &scope.label(), &scope.season_type);
    let combination = combination_label(SHOT_CHART, &params);
    let Some(payload) = ctx.fetch(SHOT_CHART, &params).await? else {
        return Ok(UnitOutcome::unavailable());
    };

    ctx.enter(RunState::NormalizingRows)?;
    let options = NormalizeOptions::new().ignore_keys(["GRID_TYPE", "TEAM_NAME"]);
    let staged: Vec<(Row, Row)> = payload
        .rows(0)?
        .into_iter()
        .map(|raw| {
            let fields = ctx.normalizer.normalize(&raw, &options);
            (raw, fields)
        })
        .collect();

    ctx.enter(RunState::Resolving)?;
    let mut outcome = UnitOutcome::default();
    let mut resolved = Vec::with_capacity(staged.len());
    for (raw, mut fields) in staged {
        let game_id = required_id(&raw, "GAME_ID")?;
        let game = match ctx.entities.resolve_game_strict(game_id).await {
            Ok(game) => game,
            Err(EtlError::EntityResolution { .. }) => {
                outcome.skipped_rows += 1;
                continue;
            }
            Err(err) => return Err(err),
        };
        let refs = match ctx.player_ref(&raw, "PLAYER_ID").await {
            Ok(player) => ctx.team_ref(&raw, "TEAM_ID").await.map(|team| (player, team)),
            Err(err) => Err(err),
        };
        match refs {
            Ok((player, team)) => {
                fields.insert("player".into(), Value::from(player));
                fields.insert("team".into(), Value::from(team));
                fields.insert("game".into(), Value::from(game.id));
                fields.insert("season".into(), Value::from(game.season));
                resolved.push(fields);
            }
            Err(err) => absorb_row_error(&mut outcome, &combination, &raw, err)?,
        }
    }
    debug!(
        shots = resolved.len(),
        skipped = outcome.skipped_rows,
        "shot chart resolved"
    );

    ctx.enter(RunState::Upserting)?;
    let request = params_row(&params);
    for fields in &resolved {
        let created = ctx.store(SHOT_CHART, &request, fields, &combination).await?;
        outcome.record(created);
    }
    Ok(outcome)
}
