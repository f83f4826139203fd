//! Player-tracking rows use abbreviated headers that differ between box scores and season
//! dashboards; these helpers rewrite them onto the canonical names before normalization.

use serde_json::Value;

use crate::payload::Row;

const BOX_COPIED: &[&str] = &[
    "TEAM_ID",
    "TEAM_ABBREVIATION",
    "TEAM_CITY",
    "MIN",
    "DFGM",
    "DFGA",
    "DFG_PCT",
];

const BOX_PLAYER_COPIED: &[&str] = &["PLAYER_ID", "PLAYER_NAME", "START_POSITION", "COMMENT"];

const BOX_RENAMED: &[(&str, &str)] = &[
    ("DIST", "DISTANCE"),
    ("ORBC", "OREB_CHANCES"),
    ("DRBC", "DREB_CHANCES"),
    ("RBC", "REB_CHANCES"),
    ("TCHS", "TOUCHES"),
    ("SAST", "SECONDARY_AST"),
    ("FTAST", "FT_AST"),
    ("PASS", "PASSES"),
    ("CFGM", "CONTESTED_FGM"),
    ("CFGA", "CONTESTED_FGA"),
    ("CFG_PCT", "CONTESTED_FGPCT"),
    ("UFGM", "UNCONTESTED_FGM"),
    ("UFGA", "UNCONTESTED_FGA"),
    ("UFG_PCT", "UNCONTESTED_FGPCT"),
];

const TOUCH_STRIPPED: &[&str] = &["DRIVE", "ELBOW", "POST", "PAINT", "_TOUCH_"];

fn take(row: &Row, key: &str) -> Value {
    row.get(key).cloned().unwrap_or(Value::Null)
}

/// Rewrite a tracking box-score row. Anything not listed is dropped.
pub fn tracking_box_fields(row: &Row, player_row: bool) -> Row {
    let mut out = Row::new();
    for key in BOX_COPIED {
        out.insert((*key).to_string(), take(row, key));
    }
    if player_row {
        for key in BOX_PLAYER_COPIED {
            out.insert((*key).to_string(), take(row, key));
        }
        out.insert("SPEED".into(), take(row, "SPD"));
    }
    for (from, to) in BOX_RENAMED {
        out.insert((*to).to_string(), take(row, from));
    }
    out
}

/// Catch-and-shoot and pull-up rows share one layout once their prefixes are gone.
pub fn shot_type_fields(row: &Row, pt_measure_type: &str) -> Row {
    let mut out = Row::new();
    out.insert("SHOT_TYPE".into(), Value::String(pt_measure_type.to_string()));
    for (key, value) in row {
        let key = key.replace("CATCH_", "").replace("PULL_UP_", "");
        out.insert(key, value.clone());
    }
    out
}

/// Drives and the elbow/post/paint touch families share one layout.
pub fn touch_fields(row: &Row, pt_measure_type: &str) -> Row {
    let mut out = Row::new();
    out.insert("TOUCH_TYPE".into(), Value::String(pt_measure_type.to_string()));
    for (key, value) in row {
        let key = if key == "DRIVES" {
            "TOUCHES".to_string()
        } else {
            TOUCH_STRIPPED
                .iter()
                .fold(key.clone(), |acc, junk| acc.replace(junk, ""))
                .replace("PF", "FOULS")
        };
        out.insert(key, value.clone());
    }
    out
}
