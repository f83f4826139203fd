//! Team seeding (`commonteamyears`) and detail sync (`teaminfocommon` + `teamdetails`).

use serde_json::{Map, Value};
use tracing::{info, instrument, warn};

use super::{optional_id, required_id, IngestContext, UnitOutcome};
use crate::database_ops::entities::{find_team, upsert_team_profile, TeamProfile};
use crate::error::{EtlError, Result};
use crate::fetch::endpoints::{
    team_details_params, team_info_params, team_years_params, TEAM_DETAILS, TEAM_INFO, TEAM_YEARS,
};
use crate::normalization::season::season_label;
use crate::orchestrator::RunState;
use crate::payload::{value_as_string, Row};

const INFO_ATTRIBUTES: &[(&str, &str)] = &[
    ("TEAM_CONFERENCE", "conference"),
    ("TEAM_DIVISION", "division"),
    ("TEAM_CODE", "code"),
    ("MIN_YEAR", "min_year"),
    ("MAX_YEAR", "max_year"),
];

const DETAIL_ATTRIBUTES: &[(&str, &str)] = &[
    ("ARENA", "arena"),
    ("ARENACAPACITY", "arena_capacity"),
    ("ARENA_CAPACITY", "arena_capacity"),
    ("OWNER", "owner"),
    ("GENERALMANAGER", "general_manager"),
    ("HEADCOACH", "head_coach"),
    ("DLEAGUEAFFILIATION", "d_league_affiliation"),
    ("YEARFOUNDED", "year_founded"),
];

fn copy_attributes(raw: &Row, mapping: &[(&str, &str)], out: &mut Map<String, Value>) {
    for (from, to) in mapping {
        if let Some(value) = raw.get(*from).filter(|v| !v.is_null()) {
            out.insert((*to).to_string(), value.clone());
        }
    }
}

fn text(raw: &Row, key: &str) -> Option<String> {
    raw.get(key)
        .and_then(value_as_string)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Create or refresh every franchise the provider knows about.
#[instrument(skip(ctx))]
pub async fn sync_team_list(ctx: &mut IngestContext) -> Result<UnitOutcome> {
    let Some(payload) = ctx.fetch(TEAM_YEARS, &team_years_params()).await? else {
        return Ok(UnitOutcome::unavailable());
    };

    ctx.enter(RunState::Upserting)?;
    let mut outcome = UnitOutcome::default();
    for raw in payload.rows(0)? {
        let Some(team_id) = optional_id(&raw, "TEAM_ID") else {
            outcome.skipped_rows += 1;
            continue;
        };
        let mut attributes = Map::new();
        copy_attributes(&raw, INFO_ATTRIBUTES, &mut attributes);
        let existed = find_team(&ctx.db, team_id).await?.is_some();
        let team = upsert_team_profile(
            &ctx.db,
            &TeamProfile {
                team_id,
                city: None,
                name: None,
                abbreviation: text(&raw, "ABBREVIATION"),
                attributes,
            },
        )
        .await?;
        ctx.entities.remember_team(team);
        outcome.record(!existed);
    }
    info!(created = outcome.created, updated = outcome.updated, "team list synced");
    Ok(outcome)
}

/// Names, conference and front-office details for one team.
#[instrument(skip(ctx))]
pub async fn sync_team_detail(
    ctx: &mut IngestContext,
    team_id: i64,
    season: i32,
) -> Result<UnitOutcome> {
    let label = season_label(season);
    let Some(info_payload) = ctx
        .fetch(TEAM_INFO, &team_info_params(team_id, &label))
        .await?
    else {
        return Ok(UnitOutcome::unavailable());
    };
    let info_row = info_payload
        .rows(0)?
        .into_iter()
        .next()
        .ok_or_else(|| EtlError::payload(format!("{TEAM_INFO} returned no row for {team_id}")))?;
    if required_id(&info_row, "TEAM_ID")? != team_id {
        return Err(EtlError::payload(format!(
            "{TEAM_INFO} answered for a different team than {team_id}"
        )));
    }

    let mut attributes = Map::new();
    copy_attributes(&info_row, INFO_ATTRIBUTES, &mut attributes);
    match ctx.fetch(TEAM_DETAILS, &team_details_params(team_id)).await? {
        Some(details) => {
            if let Some(background) = details.rows(0)?.into_iter().next() {
                copy_attributes(&background, DETAIL_ATTRIBUTES, &mut attributes);
            }
        }
        None => warn!(team_id, "team details unavailable; keeping summary only"),
    }

    ctx.enter(RunState::Upserting)?;
    let existed = find_team(&ctx.db, team_id).await?.is_some();
    let team = upsert_team_profile(
        &ctx.db,
        &TeamProfile {
            team_id,
            city: text(&info_row, "TEAM_CITY"),
            name: text(&info_row, "TEAM_NAME"),
            abbreviation: text(&info_row, "TEAM_ABBREVIATION"),
            attributes,
        },
    )
    .await?;
    ctx.entities.remember_team(team);

    let mut outcome = UnitOutcome::default();
    outcome.record(!existed);
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::scripted::{envelope, ScriptedSource};
    use crate::pipelines::test_support::context;
    use serde_json::json;

    #[tokio::test]
    async fn list_then_detail_fills_in_the_team() {
        let years = envelope(
            TEAM_YEARS,
            vec![(
                "TeamYears",
                vec!["LEAGUE_ID", "TEAM_ID", "MIN_YEAR", "MAX_YEAR", "ABBREVIATION"],
                vec![
                    json!(["00", 1610612739, "1970", "2016", "CLE"]),
                    json!(["00", 1610610024, "1946", "1949", null]),
                ],
            )],
        );
        let info = envelope(
            TEAM_INFO,
            vec![(
                "TeamInfoCommon",
                vec![
                    "TEAM_ID",
                    "TEAM_CITY",
                    "TEAM_NAME",
                    "TEAM_ABBREVIATION",
                    "TEAM_CONFERENCE",
                    "TEAM_DIVISION",
                ],
                vec![json!([1610612739, "Cleveland", "Cavaliers", "CLE", "East", "Central"])],
            )],
        );
        let details = envelope(
            TEAM_DETAILS,
            vec![(
                "TeamBackground",
                vec!["TEAM_ID", "ARENA", "ARENACAPACITY", "GENERALMANAGER", "HEADCOACH"],
                vec![json!([1610612739, "Quicken Loans Arena", "20562", "David Griffin", "Tyronn Lue"])],
            )],
        );
        let source = ScriptedSource::new()
            .respond(TEAM_YEARS, &[], years)
            .respond(TEAM_INFO, &[("TeamID", "1610612739")], info)
            .respond(TEAM_DETAILS, &[], details);
        let mut ctx = context(source).await;

        let listed = sync_team_list(&mut ctx).await.unwrap();
        assert_eq!(listed.created, 2);

        ctx.reset();
        let detail = sync_team_detail(&mut ctx, 1610612739, 2016).await.unwrap();
        assert_eq!(detail.updated, 1);

        let team = find_team(&ctx.db, 1610612739).await.unwrap().unwrap();
        assert_eq!(team.name.as_deref(), Some("Cavaliers"));
        assert_eq!(team.city.as_deref(), Some("Cleveland"));
        assert_eq!(team.attributes.0.get("conference"), Some(&json!("East")));
        assert_eq!(team.attributes.0.get("general_manager"), Some(&json!("David Griffin")));
        assert_eq!(team.attributes.0.get("min_year"), Some(&json!("1970")));
    }
}
