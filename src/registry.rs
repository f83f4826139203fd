//! Registry of statistical record kinds and their natural keys.
//!
//! Every concrete kind is registered explicitly under an `(EntityAxis, Family, Suffix)` tuple;
//! a tuple without a registration is a classification failure, never a silent drop.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::error::{EtlError, Result};
use crate::normalization::canonical_season_type;
use crate::payload::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum EntityAxis {
    Player,
    Team,
    Game,
    Coach,
}

impl EntityAxis {
    pub fn label(&self) -> &'static str {
        match self {
            EntityAxis::Player => "Player",
            EntityAxis::Team => "Team",
            EntityAxis::Game => "Game",
            EntityAxis::Coach => "Coach",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Family {
    Traditional,
    Advanced,
    Misc,
    Scoring,
    Usage,
    Shooting,
    FourFactors,
    Opponent,
    Defense,
    Tracking,
    Hustle,
    SpeedDistance,
    Rebounding,
    Possessions,
    ShotType,
    Passing,
    Efficiency,
    Touch,
    Summary,
    Season,
    GameLog,
    ShotChart,
    LineScore,
    OtherStats,
    PlayByPlay,
    Official,
    CoachSeason,
}

impl Family {
    pub fn label(&self) -> &'static str {
        match self {
            Family::Traditional => "Traditional",
            Family::Advanced => "Advanced",
            Family::Misc => "Misc",
            Family::Scoring => "Scoring",
            Family::Usage => "Usage",
            Family::Shooting => "Shooting",
            Family::FourFactors => "FourFactors",
            Family::Opponent => "Opponent",
            Family::Defense => "Defense",
            Family::Tracking => "Tracking",
            Family::Hustle => "HustleStats",
            Family::SpeedDistance => "SpeedDistance",
            Family::Rebounding => "Rebounding",
            Family::Possessions => "Possessions",
            Family::ShotType => "ShotType",
            Family::Passing => "Passing",
            Family::Efficiency => "Efficiency",
            Family::Touch => "Touch",
            Family::Summary => "Summary",
            Family::Season => "Season",
            Family::GameLog => "GameLog",
            Family::ShotChart => "ShotChartDetail",
            Family::LineScore => "LineScore",
            Family::OtherStats => "OtherStats",
            Family::PlayByPlay => "PlayByPlayEvent",
            Family::Official => "OfficialXref",
            Family::CoachSeason => "CoachSeason",
        }
    }

    /// Map a `MeasureType` parameter value; "Base" is the traditional family.
    pub fn from_measure_type(raw: &str) -> Option<Family> {
        let compact = raw.replace(' ', "");
        let family = match compact.as_str() {
            "Base" | "Traditional" => Family::Traditional,
            "Advanced" => Family::Advanced,
            "Misc" => Family::Misc,
            "Scoring" => Family::Scoring,
            "Usage" => Family::Usage,
            "Shooting" => Family::Shooting,
            "FourFactors" => Family::FourFactors,
            "Opponent" => Family::Opponent,
            "Defense" => Family::Defense,
            _ => return None,
        };
        Some(family)
    }

    /// Map a `PtMeasureType` parameter value onto its tracking family.
    pub fn from_pt_measure_type(raw: &str) -> Option<Family> {
        if matches!(raw, "CatchShoot" | "PullUpShot") {
            return Some(Family::ShotType);
        }
        if raw.contains("Touch") || raw.contains("Drive") {
            return Some(Family::Touch);
        }
        let family = match raw {
            "SpeedDistance" => Family::SpeedDistance,
            "Rebounding" => Family::Rebounding,
            "Possessions" => Family::Possessions,
            "Defense" => Family::Defense,
            "Passing" => Family::Passing,
            "Efficiency" => Family::Efficiency,
            _ => return None,
        };
        Some(family)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Suffix {
    Split,
    BoxScore,
    Tracking,
    Lineup,
    OnOffSummary,
    OnOffDetail,
    /// Single-shape records that are not parameterized by a measure family.
    Record,
}

impl Suffix {
    pub fn label(&self) -> &'static str {
        match self {
            Suffix::Split => "Split",
            Suffix::BoxScore => "BoxScore",
            Suffix::Tracking => "Tracking",
            Suffix::Lineup => "Lineup",
            Suffix::OnOffSummary => "OnOffSummary",
            Suffix::OnOffDetail => "OnOffDetail",
            Suffix::Record => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordKind {
    pub name: String,
    pub axis: EntityAxis,
    pub family: Family,
    pub suffix: Suffix,
    pub key_fields: Vec<&'static str>,
}

impl RecordKind {
    pub fn new(
        axis: EntityAxis,
        family: Family,
        suffix: Suffix,
        key_fields: &[&'static str],
    ) -> Self {
        let name = match suffix {
            Suffix::OnOffSummary => format!("{}{}", axis.label(), suffix.label()),
            _ => format!("{}{}{}", axis.label(), family.label(), suffix.label()),
        };
        Self::named(name, axis, family, suffix, key_fields)
    }

    pub fn named(
        name: impl Into<String>,
        axis: EntityAxis,
        family: Family,
        suffix: Suffix,
        key_fields: &[&'static str],
    ) -> Self {
        Self {
            name: name.into(),
            axis,
            family,
            suffix,
            key_fields: key_fields.to_vec(),
        }
    }

    pub fn is_lineup(&self) -> bool {
        self.suffix == Suffix::Lineup
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

const PLAYER_SPLIT_KEY: &[&str] = &[
    "player",
    "season",
    "season_type",
    "per_mode",
    "group_set",
    "group_value",
];
const TEAM_SPLIT_KEY: &[&str] = &[
    "team",
    "season",
    "season_type",
    "per_mode",
    "group_set",
    "group_value",
];
const PLAYER_BOX_KEY: &[&str] = &["game", "player"];
const TEAM_BOX_KEY: &[&str] = &["game", "team"];
const TRACKING_KEY: &[&str] = &[
    "player",
    "season",
    "season_type",
    "pt_measure_type",
    "per_mode",
    "group_set",
    "group_value",
];
const SHOT_TYPE_TRACKING_KEY: &[&str] = &[
    "player",
    "season",
    "season_type",
    "pt_measure_type",
    "per_mode",
    "group_set",
    "group_value",
    "shot_type",
];
const TOUCH_TRACKING_KEY: &[&str] = &[
    "player",
    "season",
    "season_type",
    "pt_measure_type",
    "per_mode",
    "group_set",
    "group_value",
    "touch_type",
];
const LINEUP_KEY: &[&str] = &[
    "season",
    "season_type",
    "measure_type",
    "per_mode",
    "team",
    "group_quantity",
];
const ON_OFF_KEY: &[&str] = &[
    "season",
    "season_type",
    "measure_type",
    "per_mode",
    "team",
    "player",
    "court_status",
];

const PLAYER_SPLIT_FAMILIES: &[Family] = &[
    Family::Traditional,
    Family::Advanced,
    Family::Shooting,
    Family::Misc,
    Family::Usage,
    Family::Scoring,
];
const TEAM_SPLIT_FAMILIES: &[Family] = &[
    Family::Traditional,
    Family::Advanced,
    Family::Shooting,
    Family::Misc,
    Family::Scoring,
    Family::FourFactors,
    Family::Opponent,
    Family::Defense,
];
const BOX_FAMILIES: &[Family] = &[
    Family::Traditional,
    Family::Advanced,
    Family::Misc,
    Family::Scoring,
    Family::Usage,
    Family::Tracking,
    Family::FourFactors,
    Family::Hustle,
];
const TRACKING_FAMILIES: &[Family] = &[
    Family::SpeedDistance,
    Family::Rebounding,
    Family::Possessions,
    Family::ShotType,
    Family::Defense,
    Family::Passing,
    Family::Efficiency,
    Family::Touch,
];
const LINEUP_FAMILIES: &[Family] = &[
    Family::Traditional,
    Family::Advanced,
    Family::Misc,
    Family::FourFactors,
    Family::Scoring,
    Family::Opponent,
    Family::Usage,
];
const ON_OFF_DETAIL_FAMILIES: &[Family] = &[
    Family::Traditional,
    Family::Advanced,
    Family::Misc,
    Family::FourFactors,
    Family::Scoring,
    Family::Opponent,
];

type KindTuple = (EntityAxis, Family, Suffix);

/// Explicit `(axis, family, suffix)` → [`RecordKind`] table.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    kinds: Vec<RecordKind>,
    by_tuple: HashMap<KindTuple, usize>,
    by_name: HashMap<String, usize>,
}

impl Registry {
    /// Every kind the ingestion pipelines produce.
    pub fn standard() -> Self {
        let mut registry = Self::default();
        for family in PLAYER_SPLIT_FAMILIES {
            registry = registry.register(RecordKind::new(
                EntityAxis::Player,
                *family,
                Suffix::Split,
                PLAYER_SPLIT_KEY,
            ));
        }
        for family in TEAM_SPLIT_FAMILIES {
            registry = registry.register(RecordKind::new(
                EntityAxis::Team,
                *family,
                Suffix::Split,
                TEAM_SPLIT_KEY,
            ));
        }
        for family in BOX_FAMILIES {
            registry = registry
                .register(RecordKind::new(
                    EntityAxis::Player,
                    *family,
                    Suffix::BoxScore,
                    PLAYER_BOX_KEY,
                ))
                .register(RecordKind::new(
                    EntityAxis::Team,
                    *family,
                    Suffix::BoxScore,
                    TEAM_BOX_KEY,
                ));
        }
        for family in TRACKING_FAMILIES {
            let key = match family {
                Family::ShotType => SHOT_TYPE_TRACKING_KEY,
                Family::Touch => TOUCH_TRACKING_KEY,
                _ => TRACKING_KEY,
            };
            registry = registry.register(RecordKind::new(
                EntityAxis::Player,
                *family,
                Suffix::Tracking,
                key,
            ));
        }
        for family in LINEUP_FAMILIES {
            registry = registry.register(RecordKind::new(
                EntityAxis::Team,
                *family,
                Suffix::Lineup,
                LINEUP_KEY,
            ));
        }
        registry = registry.register(RecordKind::new(
            EntityAxis::Player,
            Family::Summary,
            Suffix::OnOffSummary,
            ON_OFF_KEY,
        ));
        for family in ON_OFF_DETAIL_FAMILIES {
            registry = registry.register(RecordKind::new(
                EntityAxis::Player,
                *family,
                Suffix::OnOffDetail,
                ON_OFF_KEY,
            ));
        }

        registry
            .register(RecordKind::named(
                "LineScore",
                EntityAxis::Game,
                Family::LineScore,
                Suffix::Record,
                &["game", "team"],
            ))
            .register(RecordKind::named(
                "GameOtherStats",
                EntityAxis::Game,
                Family::OtherStats,
                Suffix::Record,
                &["game", "team"],
            ))
            .register(RecordKind::named(
                "PlayByPlayEvent",
                EntityAxis::Game,
                Family::PlayByPlay,
                Suffix::Record,
                &["game", "eventnum"],
            ))
            .register(RecordKind::named(
                "GameOfficialXref",
                EntityAxis::Game,
                Family::Official,
                Suffix::Record,
                &["game", "official"],
            ))
            .register(RecordKind::new(
                EntityAxis::Player,
                Family::GameLog,
                Suffix::Record,
                &["player", "game"],
            ))
            .register(RecordKind::new(
                EntityAxis::Player,
                Family::ShotChart,
                Suffix::Record,
                &["player", "game", "game_event_id"],
            ))
            .register(RecordKind::new(
                EntityAxis::Player,
                Family::Season,
                Suffix::Record,
                &["player", "season", "season_type", "team", "per_mode"],
            ))
            .register(RecordKind::new(
                EntityAxis::Team,
                Family::Season,
                Suffix::Record,
                &["season", "season_type", "team", "per_mode"],
            ))
            .register(RecordKind::named(
                "CoachSeason",
                EntityAxis::Coach,
                Family::CoachSeason,
                Suffix::Record,
                &["coach", "season", "team_id"],
            ))
    }

    /// Register a kind. Later registrations for the same tuple or name win the index; use
    /// [`Registry::validate`] to reject such clashes.
    pub fn register(mut self, kind: RecordKind) -> Self {
        let idx = self.kinds.len();
        self.by_tuple.insert((kind.axis, kind.family, kind.suffix), idx);
        self.by_name.insert(kind.name.clone(), idx);
        self.kinds.push(kind);
        self
    }

    pub fn lookup(&self, axis: EntityAxis, family: Family, suffix: Suffix) -> Option<&RecordKind> {
        self.by_tuple
            .get(&(axis, family, suffix))
            .map(|idx| &self.kinds[*idx])
    }

    /// Like [`Registry::lookup`] but a missing tuple is a classification error.
    pub fn require(
        &self,
        resource: &str,
        axis: EntityAxis,
        family: Family,
        suffix: Suffix,
    ) -> Result<&RecordKind> {
        self.lookup(axis, family, suffix).ok_or_else(|| {
            EtlError::classification(
                resource,
                format!("{}/{}/{:?}", axis.label(), family.label(), suffix),
            )
        })
    }

    pub fn by_name(&self, name: &str) -> Option<&RecordKind> {
        self.by_name.get(name).map(|idx| &self.kinds[*idx])
    }

    pub fn key_fields(&self, name: &str) -> Option<&[&'static str]> {
        self.by_name(name).map(|kind| kind.key_fields.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = &RecordKind> {
        self.kinds.iter()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Reject duplicate names/tuples and kinds without a natural key.
    pub fn validate(&self) -> Result<()> {
        if self.by_name.len() != self.kinds.len() {
            return Err(EtlError::Configuration(
                "record kind names are not unique".into(),
            ));
        }
        if self.by_tuple.len() != self.kinds.len() {
            return Err(EtlError::Configuration(
                "two record kinds share an (axis, family, suffix) tuple".into(),
            ));
        }
        if let Some(kind) = self.kinds.iter().find(|k| k.key_fields.is_empty()) {
            return Err(EtlError::Configuration(format!(
                "{} declares no natural key",
                kind.name
            )));
        }
        Ok(())
    }
}

/// Projection of a record onto its kind's declared key tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NaturalKey {
    pub kind: String,
    pub fields: BTreeMap<String, Value>,
}

impl NaturalKey {
    /// Stable string form stored in the `natural_key` column.
    pub fn encoded(&self) -> String {
        serde_json::to_string(&self.fields).unwrap_or_default()
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind, self.encoded())
    }
}

/// Build the natural key for `fields` under `kind`.
///
/// A declared key field missing from `fields` is a configuration error: a partial key would
/// silently merge distinct records.
pub fn unique_key(kind: &RecordKind, fields: &Row) -> Result<NaturalKey> {
    let mut projected = BTreeMap::new();
    for key in &kind.key_fields {
        let value = fields.get(*key).ok_or_else(|| {
            EtlError::Configuration(format!("{} record is missing key field {key}", kind.name))
        })?;
        let value = match (*key, value) {
            ("season_type", Value::String(raw)) => Value::String(canonical_season_type(raw)),
            _ => value.clone(),
        };
        projected.insert((*key).to_string(), value);
    }
    Ok(NaturalKey {
        kind: kind.name.clone(),
        fields: projected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn standard_registry_is_consistent() {
        let registry = Registry::standard();
        registry.validate().unwrap();
        assert!(registry.by_name("TeamMiscSplit").is_some());
        assert!(registry.by_name("PlayerHustleStatsBoxScore").is_some());
        assert!(registry.by_name("TeamTraditionalLineup").is_some());
        assert!(registry.by_name("PlayerOnOffSummary").is_some());
        assert!(registry.by_name("PlayerFourFactorsOnOffDetail").is_some());
        assert!(registry.by_name("PlayerShotChartDetail").is_some());
        assert_eq!(
            registry.key_fields("PlayerGameLog"),
            Some(&["player", "game"][..])
        );
    }

    #[test]
    fn unregistered_tuple_is_an_error() {
        let registry = Registry::standard();
        assert!(registry
            .lookup(EntityAxis::Player, Family::FourFactors, Suffix::Split)
            .is_none());
        let err = registry
            .require(
                "leaguedashplayerstats",
                EntityAxis::Player,
                Family::Defense,
                Suffix::Split,
            )
            .unwrap_err();
        assert_eq!(err.category(), "classification");
    }

    #[test]
    fn duplicate_registration_fails_validation() {
        let registry = Registry::default()
            .register(RecordKind::new(
                EntityAxis::Team,
                Family::Misc,
                Suffix::Split,
                TEAM_SPLIT_KEY,
            ))
            .register(RecordKind::new(
                EntityAxis::Team,
                Family::Misc,
                Suffix::Split,
                TEAM_SPLIT_KEY,
            ));
        assert!(registry.validate().unwrap_err().is_fatal());
    }

    #[test]
    fn season_type_is_canonical_in_keys() {
        let registry = Registry::standard();
        let kind = registry.by_name("PlayerSeason").unwrap();
        let base = json!({"player": 1, "season": 2016, "team": 3, "per_mode": "Totals"});

        let mut career = base.as_object().cloned().unwrap();
        career.insert("season_type".into(), json!("Career Totals Regular Season"));
        let mut plain = base.as_object().cloned().unwrap();
        plain.insert("season_type".into(), json!("RegularSeason"));

        assert_eq!(
            unique_key(kind, &career).unwrap(),
            unique_key(kind, &plain).unwrap()
        );
    }

    #[test]
    fn missing_key_field_is_loud() {
        let registry = Registry::standard();
        let kind = registry.by_name("TeamMiscSplit").unwrap();
        let fields = json!({"team": 1, "season": 2016, "season_type": "Regular Season"});
        let err = unique_key(kind, fields.as_object().unwrap()).unwrap_err();
        assert!(err.is_fatal());
    }
}
