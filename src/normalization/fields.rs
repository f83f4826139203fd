use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;

use super::season::canonical_season_type;
use crate::payload::Row;

/// Keys the provider repeats or that are resolved into entity references before persistence.
const DEFAULT_IGNORED: &[&str] = &[
    "GROUP_SET",
    "GROUP_VALUE",
    "CFID",
    "CFPARAMS",
    "TEAM_ID",
    "PLAYER_ID",
    "HOME_TEAM_ID",
    "VISITOR_TEAM_ID",
    "PLAYER1_ID",
    "PLAYER2_ID",
    "PLAYER3_ID",
    "PLAYER1_TEAM_ID",
    "PLAYER2_TEAM_ID",
    "PLAYER3_TEAM_ID",
    "DLEAGE_FLAG",
    "GAMES_PLAYED_FLAG",
    "W",
    "L",
    "SEASON_YEAR",
    "DREB_PCT1",
    "Team_ID",
    "PLAYER_NAME",
    "LEAGUE_ID",
];

const DEFAULT_RENAMES: &[(&str, &str)] = &[
    ("AGE", "player_age"),
    ("TO", "tov"),
    ("PERSON_ID", "player_id"),
    ("PCT", "w_pct"),
    ("PTS_2ND_CHANCE", "pts_second_chance"),
];

/// Immutable rule tables consumed by [`FieldNormalizer`].
///
/// Built once (usually via [`RuleTables::standard`]) and shared; tests derive their own
/// variants with the builder methods instead of touching global state.
#[derive(Debug, Clone)]
pub struct RuleTables {
    ignored: HashSet<String>,
    renames: HashMap<String, String>,
    drop_marker: String,
    game_key: String,
}

impl RuleTables {
    pub fn standard() -> Self {
        Self {
            ignored: DEFAULT_IGNORED.iter().map(|k| k.to_string()).collect(),
            renames: DEFAULT_RENAMES
                .iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect(),
            drop_marker: "RANK".to_string(),
            game_key: "GAME_ID".to_string(),
        }
    }

    pub fn with_ignored(mut self, key: impl Into<String>) -> Self {
        self.ignored.insert(key.into());
        self
    }

    pub fn with_rename(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.renames.insert(from.into(), to.into());
        self
    }

    pub fn is_ignored(&self, key: &str) -> bool {
        self.ignored.contains(key)
    }

    pub fn rename_for(&self, key: &str) -> Option<&str> {
        self.renames.get(key).map(String::as_str)
    }
}

impl Default for RuleTables {
    fn default() -> Self {
        Self::standard()
    }
}

/// Per-call knobs layered over the static rule tables.
#[derive(Debug, Clone, Default)]
pub struct NormalizeOptions {
    /// The output record is a game itself, so GAME_ID survives.
    pub is_game: bool,
    overrides: HashSet<String>,
    aux_ignore: HashSet<String>,
}

impl NormalizeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_game() -> Self {
        Self {
            is_game: true,
            ..Self::default()
        }
    }

    /// Force plain lower-casing of `keys` even when a rule would drop or rename them.
    pub fn override_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.overrides.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Drop `keys` for this call only.
    pub fn ignore_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aux_ignore.extend(keys.into_iter().map(Into::into));
        self
    }
}

/// Converts provider rows (upper-case keys) into canonical lower-case field maps.
#[derive(Debug, Clone)]
pub struct FieldNormalizer {
    rules: Arc<RuleTables>,
}

impl FieldNormalizer {
    pub fn new(rules: RuleTables) -> Self {
        Self {
            rules: Arc::new(rules),
        }
    }

    pub fn standard() -> Self {
        Self::new(RuleTables::standard())
    }

    pub fn rules(&self) -> &RuleTables {
        &self.rules
    }

    /// Normalize one raw row.
    ///
    /// Precedence per key:
    ///   * override list: kept, lower-cased verbatim
    ///   * aux-ignore list: dropped
    ///   * rename table: kept under the canonical name
    ///   * contains `RANK`, fixed ignore list, or `GAME_ID` on non-game records: dropped
    ///   * otherwise: lower-cased
    ///
    /// A `season_type` value is canonicalized afterwards, and a career season type also sets
    /// `career_flag`.
    pub fn normalize(&self, raw: &Row, opts: &NormalizeOptions) -> Row {
        let mut out = Row::new();
        for (key, value) in raw {
            if opts.overrides.contains(key) {
                out.insert(key.to_lowercase(), value.clone());
                continue;
            }
            if opts.aux_ignore.contains(key) {
                continue;
            }
            if let Some(target) = self.rules.rename_for(key) {
                out.insert(target.to_string(), value.clone());
                continue;
            }
            if key.contains(self.rules.drop_marker.as_str())
                || self.rules.is_ignored(key)
                || (!opts.is_game && *key == self.rules.game_key)
            {
                continue;
            }
            out.insert(key.to_lowercase(), value.clone());
        }

        if let Some(Value::String(raw_type)) = out.get("season_type").cloned() {
            if raw_type.to_ascii_lowercase().contains("career") {
                out.insert("career_flag".into(), Value::Bool(true));
            }
            out.insert(
                "season_type".into(),
                Value::String(canonical_season_type(&raw_type)),
            );
        }
        out
    }
}

impl Default for FieldNormalizer {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    #[test]
    fn drops_rank_fields() {
        let normalizer = FieldNormalizer::standard();
        let out = normalizer.normalize(
            &row(json!({"CONF_RANK": 3, "PTS": 10})),
            &NormalizeOptions::new(),
        );
        assert_eq!(Value::Object(out), json!({"pts": 10}));
    }

    #[test]
    fn override_keeps_rank_and_ignored_keys() {
        let normalizer = FieldNormalizer::standard();
        let opts = NormalizeOptions::new().override_keys(["GP_RANK", "GROUP_SET", "W"]);
        let out = normalizer.normalize(
            &row(json!({"GP_RANK": 1, "GROUP_SET": "Overall", "W": 40, "L": 42})),
            &opts,
        );
        assert_eq!(
            Value::Object(out),
            json!({"gp_rank": 1, "group_set": "Overall", "w": 40})
        );
    }

    #[test]
    fn applies_rename_table() {
        let normalizer = FieldNormalizer::standard();
        let out = normalizer.normalize(
            &row(json!({
                "AGE": 31, "TO": 2, "PERSON_ID": 2544, "PCT": 0.5, "PTS_2ND_CHANCE": 12
            })),
            &NormalizeOptions::new(),
        );
        assert_eq!(
            Value::Object(out),
            json!({
                "player_age": 31, "tov": 2, "player_id": 2544, "w_pct": 0.5,
                "pts_second_chance": 12
            })
        );
    }

    #[test]
    fn game_id_survives_only_for_games() {
        let normalizer = FieldNormalizer::standard();
        let raw = row(json!({"GAME_ID": "0021600001", "GAME_SEQUENCE": 1}));

        let dependent = normalizer.normalize(&raw, &NormalizeOptions::new());
        assert!(!dependent.contains_key("game_id"));

        let game = normalizer.normalize(&raw, &NormalizeOptions::for_game());
        assert_eq!(game.get("game_id"), Some(&json!("0021600001")));
    }

    #[test]
    fn aux_ignore_is_per_call() {
        let normalizer = FieldNormalizer::standard();
        let raw = row(json!({"PCT_PTS_2PT_MR": 0.2, "FGM": 5}));

        let scoped = normalizer.normalize(
            &raw,
            &NormalizeOptions::new().ignore_keys(["PCT_PTS_2PT_MR"]),
        );
        assert_eq!(Value::Object(scoped), json!({"fgm": 5}));

        let plain = normalizer.normalize(&raw, &NormalizeOptions::new());
        assert_eq!(plain.get("pct_pts_2pt_mr"), Some(&json!(0.2)));
    }

    #[test]
    fn season_type_variants_collapse() {
        let normalizer = FieldNormalizer::standard();
        let career = normalizer.normalize(
            &row(json!({"SEASON_TYPE": "Career Totals Regular Season"})),
            &NormalizeOptions::new(),
        );
        let plain = normalizer.normalize(
            &row(json!({"SEASON_TYPE": "RegularSeason"})),
            &NormalizeOptions::new(),
        );
        assert_eq!(career.get("season_type"), plain.get("season_type"));
        assert_eq!(career.get("career_flag"), Some(&json!(true)));
        assert!(!plain.contains_key("career_flag"));
    }

    #[test]
    fn injected_tables_do_not_leak() {
        let custom = FieldNormalizer::new(RuleTables::standard().with_ignored("FGM"));
        let standard = FieldNormalizer::standard();
        let raw = row(json!({"FGM": 5}));
        assert!(custom.normalize(&raw, &NormalizeOptions::new()).is_empty());
        assert_eq!(
            standard.normalize(&raw, &NormalizeOptions::new()).get("fgm"),
            Some(&json!(5))
        );
    }
}
