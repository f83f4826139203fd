//! Shape classification: resource name + echoed parameters + row → registered record kind.

use serde_json::Value;

use crate::error::{EtlError, Result};
use crate::normalization::NormalizeOptions;
use crate::payload::{value_as_string, Row, StatPayload};
use crate::registry::{EntityAxis, Family, RecordKind, Registry, Suffix};

/// Raw keys folded into canonical names by the Misc/Scoring quirks; the raw copies are not kept.
pub const SPLIT_AUX_IGNORE: &[&str] = &["OPP_PTS_2ND_CHANCE", "PCT_PTS_2PT_MR"];
/// Keys the normalizer would drop but dashboard rows need.
pub const SPLIT_OVERRIDES: &[&str] = &["GROUP_SET", "GROUP_VALUE", "W", "L"];

/// Normalizer options for dashboard-style rows (league dashboards, entity dashboards, lineups).
pub fn split_options() -> NormalizeOptions {
    NormalizeOptions::new()
        .override_keys(SPLIT_OVERRIDES.iter().copied())
        .ignore_keys(SPLIT_AUX_IGNORE.iter().copied())
}

pub fn suffix_for_resource(resource: &str) -> Option<Suffix> {
    let resource = resource.to_ascii_lowercase();
    if resource.starts_with("boxscore") || resource.starts_with("hustlestatsboxscore") {
        Some(Suffix::BoxScore)
    } else if resource.ends_with("lineups") {
        Some(Suffix::Lineup)
    } else if resource.contains("onoffsummary") {
        Some(Suffix::OnOffSummary)
    } else if resource.contains("onoffdetail") {
        Some(Suffix::OnOffDetail)
    } else if resource == "leaguedashptstats" {
        Some(Suffix::Tracking)
    } else if resource.contains("dash") || resource.contains("splits") {
        Some(Suffix::Split)
    } else if matches!(
        resource.as_str(),
        "playercareerstats" | "teamyearbyyearstats" | "leaguegamelog" | "shotchartdetail"
    ) {
        Some(Suffix::Record)
    } else {
        None
    }
}

fn box_family(resource: &str) -> Option<Family> {
    let resource = resource.to_ascii_lowercase();
    if resource.starts_with("hustlestats") {
        return Some(Family::Hustle);
    }
    let stem = resource
        .trim_start_matches("boxscore")
        .trim_end_matches("v3")
        .trim_end_matches("v2");
    let family = match stem {
        "traditional" => Family::Traditional,
        "advanced" => Family::Advanced,
        "misc" => Family::Misc,
        "scoring" => Family::Scoring,
        "usage" => Family::Usage,
        "playertrack" => Family::Tracking,
        "fourfactors" => Family::FourFactors,
        _ => return None,
    };
    Some(family)
}

fn param<'a>(params: &'a Row, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| params.get(*k))
}

/// Family for a payload. Entity axis is decided per row.
pub fn family_for(resource: &str, suffix: Suffix, params: &Row) -> Option<Family> {
    let lowered = resource.to_ascii_lowercase();
    match suffix {
        Suffix::BoxScore => box_family(&lowered),
        Suffix::Tracking => param(params, &["PtMeasureType", "pt_measure_type"])
            .and_then(value_as_string)
            .and_then(|raw| Family::from_pt_measure_type(&raw)),
        Suffix::OnOffSummary => Some(Family::Summary),
        Suffix::Record => match lowered.as_str() {
            "playercareerstats" | "teamyearbyyearstats" => Some(Family::Season),
            "leaguegamelog" => Some(Family::GameLog),
            "shotchartdetail" => Some(Family::ShotChart),
            _ => None,
        },
        _ if lowered.contains("shooting") => Some(Family::Shooting),
        _ => param(params, &["MeasureType", "measure_type"])
            .and_then(value_as_string)
            .and_then(|raw| Family::from_measure_type(&raw)),
    }
}

/// Player when the row references a player, otherwise Team when it references a team.
pub fn entity_axis(row: &Row) -> Result<EntityAxis> {
    let present = |key: &str| row.get(key).is_some_and(|v| !v.is_null());
    if present("player") || present("player_id") {
        Ok(EntityAxis::Player)
    } else if present("team") || present("team_id") {
        Ok(EntityAxis::Team)
    } else {
        Err(EtlError::classification(
            "row",
            "neither player nor team reference",
        ))
    }
}

/// Pick the registered kind for a normalized row.
pub fn classify<'r>(
    registry: &'r Registry,
    resource: &str,
    params: &Row,
    row: &Row,
) -> Result<&'r RecordKind> {
    let suffix = suffix_for_resource(resource)
        .ok_or_else(|| EtlError::classification(resource, "unknown resource"))?;
    let family = family_for(resource, suffix, params).ok_or_else(|| {
        EtlError::classification(resource, format!("no family for {suffix:?} parameters"))
    })?;
    let axis = entity_axis(row)?;
    registry.require(resource, axis, family, suffix)
}

/// Family-specific rewrites applied to raw rows before normalization.
pub fn apply_family_quirks(family: Family, row: &mut Row) {
    match family {
        Family::Misc => {
            if let Some(value) = row.get("PTS_2ND_CHANCE").cloned() {
                row.insert("PTS_SECOND_CHANCE".into(), value);
            }
            if let Some(value) = row.get("OPP_PTS_2ND_CHANCE").cloned() {
                row.insert("OPP_PTS_SECOND_CHANCE".into(), value);
            }
        }
        Family::Scoring => {
            if let Some(value) = row.get("PCT_PTS_2PT_MR").cloned() {
                row.insert("PCT_PTS_2PT_MIDRANGE".into(), value);
            }
        }
        Family::Shooting => {
            let assisted = row
                .get("GROUP_SET")
                .and_then(Value::as_str)
                .is_some_and(|set| set == "Assisted By");
            if assisted {
                let name = row.get("PLAYER_NAME").cloned().unwrap_or(Value::Null);
                row.insert("GROUP_VALUE".into(), name);
            }
        }
        _ => {}
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Hustle box scores flag availability in the second column of the first row of set 0.
pub fn hustle_available(payload: &StatPayload) -> bool {
    payload
        .result_sets
        .first()
        .and_then(|set| set.row_set.first())
        .and_then(|row| row.get(1))
        .is_some_and(truthy)
}
