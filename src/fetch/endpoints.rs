//! Endpoint names, parameter axes and query builders for the stats API.

use chrono::NaiveDate;
use serde::Serialize;

use super::Params;

pub const LEAGUE_ID: &str = "00";

pub const LEAGUE_PLAYER_STATS: &str = "leaguedashplayerstats";
pub const LEAGUE_TEAM_STATS: &str = "leaguedashteamstats";
pub const LEAGUE_PLAYER_TRACKING: &str = "leaguedashptstats";
pub const LEAGUE_LINEUPS: &str = "leaguedashlineups";
pub const LEAGUE_GAME_LOG: &str = "leaguegamelog";
pub const PLAYER_GENERAL_SPLITS: &str = "playerdashboardbygeneralsplits";
pub const PLAYER_SHOOTING_SPLITS: &str = "playerdashboardbyshootingsplits";
pub const TEAM_GENERAL_SPLITS: &str = "teamdashboardbygeneralsplits";
pub const TEAM_SHOOTING_SPLITS: &str = "teamdashboardbyshootingsplits";
pub const ON_OFF_SUMMARY: &str = "teamplayeronoffsummary";
pub const ON_OFF_DETAIL: &str = "teamplayeronoffdetail";
pub const SCOREBOARD: &str = "scoreboardV2";
pub const BOX_SUMMARY: &str = "boxscoresummaryv2";
pub const PLAY_BY_PLAY: &str = "playbyplayv2";
pub const PLAYER_CAREER: &str = "playercareerstats";
pub const TEAM_SEASONS: &str = "teamyearbyyearstats";
pub const SHOT_CHART: &str = "shotchartdetail";
pub const PLAYER_INFO: &str = "commonplayerinfo";
pub const ALL_PLAYERS: &str = "commonallplayers";
pub const TEAM_YEARS: &str = "commonteamyears";
pub const TEAM_INFO: &str = "teaminfocommon";
pub const TEAM_DETAILS: &str = "teamdetails";

/// Box-score endpoints in ingestion order.
pub const BOX_SCORE_ENDPOINTS: &[&str] = &[
    "boxscoretraditionalv2",
    "boxscoreadvancedv2",
    "boxscoremiscv2",
    "boxscorescoringv2",
    "boxscoreusagev2",
    "boxscoreplayertrackv2",
    "boxscorefourfactorsv2",
    "hustlestatsboxscore",
];

pub const TOTALS: &str = "Totals";
pub const PER_MODES: &[&str] = &[TOTALS, "PerPossession", "PerPlay"];

pub const MEASURE_TYPES: &[&str] = &[
    "Base",
    "Advanced",
    "Misc",
    "Four Factors",
    "Scoring",
    "Opponent",
    "Usage",
    "Defense",
];

pub const PT_MEASURE_TYPES: &[&str] = &[
    "SpeedDistance",
    "Rebounding",
    "Possessions",
    "CatchShoot",
    "PullUpShot",
    "Defense",
    "Drives",
    "Passing",
    "ElbowTouch",
    "PostTouch",
    "PaintTouch",
    "Efficiency",
];

/// Per-pipeline measure-type exclusions.
pub const PLAYER_STAT_EXCLUDED: &[&str] = &["Four Factors", "Opponent", "Defense"];
pub const TEAM_STAT_EXCLUDED: &[&str] = &["Usage"];
pub const LINEUP_EXCLUDED: &[&str] = &["Usage", "Defense"];

pub fn measure_types_excluding(excluded: &[&str]) -> Vec<&'static str> {
    MEASURE_TYPES
        .iter()
        .copied()
        .filter(|m| !excluded.contains(m))
        .collect()
}

const MONTH_NAMES: &[&str] = &[
    "All",
    "October",
    "November",
    "December",
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
];

/// Highest month index (counted from October) that can hold games.
const LAST_SEASON_MONTH: usize = 10;

/// Dashboard grouping axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum GroupSet {
    Overall,
    Location,
    Month,
    SeasonSegment,
    StartingPosition,
    Outcome,
}

/// One concrete value of a [`GroupSet`]: what goes on the wire and what is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupValue {
    pub set: GroupSet,
    pub param: String,
    pub label: String,
}

impl GroupSet {
    pub const ALL: [GroupSet; 6] = [
        GroupSet::Overall,
        GroupSet::Location,
        GroupSet::Month,
        GroupSet::SeasonSegment,
        GroupSet::StartingPosition,
        GroupSet::Outcome,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            GroupSet::Overall => "Overall",
            GroupSet::Location => "Location",
            GroupSet::Month => "Month",
            GroupSet::SeasonSegment => "Pre/Post All-Star",
            GroupSet::StartingPosition => "Starting Position",
            GroupSet::Outcome => "Wins/Losses",
        }
    }

    /// Query parameter that filters on this axis; `None` for the unfiltered set.
    pub fn param_name(&self) -> Option<&'static str> {
        match self {
            GroupSet::Overall => None,
            GroupSet::Location => Some("Location"),
            GroupSet::Month => Some("Month"),
            GroupSet::SeasonSegment => Some("SeasonSegment"),
            GroupSet::StartingPosition => Some("StarterBench"),
            GroupSet::Outcome => Some("Outcome"),
        }
    }

    pub fn values(&self) -> Vec<GroupValue> {
        let pairs: Vec<(String, String)> = match self {
            GroupSet::Overall => vec![("".into(), "Overall".into())],
            GroupSet::Location => vec![
                ("Home".into(), "Home".into()),
                ("Road".into(), "Road".into()),
            ],
            GroupSet::Month => (0..=LAST_SEASON_MONTH)
                .map(|idx| (idx.to_string(), MONTH_NAMES[idx].to_string()))
                .collect(),
            GroupSet::SeasonSegment => vec![
                ("Pre All-Star".into(), "Pre All-Star".into()),
                ("Post All-Star".into(), "Post All-Star".into()),
            ],
            GroupSet::StartingPosition => vec![
                ("Bench".into(), "Bench".into()),
                ("Starters".into(), "Starters".into()),
            ],
            GroupSet::Outcome => vec![("W".into(), "Wins".into()), ("L".into(), "Losses".into())],
        };
        pairs
            .into_iter()
            .map(|(param, label)| GroupValue {
                set: *self,
                param,
                label,
            })
            .collect()
    }

    pub fn parse(raw: &str) -> Option<GroupSet> {
        GroupSet::ALL.into_iter().find(|set| {
            set.label().eq_ignore_ascii_case(raw) || format!("{set:?}").eq_ignore_ascii_case(raw)
        })
    }
}

/// Month label for a provider month index ("1" → "October").
pub fn month_label(index: &str) -> Option<&'static str> {
    index
        .trim()
        .parse::<usize>()
        .ok()
        .and_then(|idx| MONTH_NAMES.get(idx).copied())
}

fn params(pairs: &[(&str, &str)]) -> Params {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Empty filters shared by the league dashboards.
fn dashboard_filters() -> Params {
    params(&[
        ("College", ""),
        ("Conference", ""),
        ("Country", ""),
        ("DateFrom", ""),
        ("DateTo", ""),
        ("Division", ""),
        ("DraftPick", ""),
        ("DraftYear", ""),
        ("GameScope", ""),
        ("GameSegment", ""),
        ("Height", ""),
        ("LastNGames", "0"),
        ("LeagueID", LEAGUE_ID),
        ("Location", ""),
        ("Month", "0"),
        ("OpponentTeamID", "0"),
        ("Outcome", ""),
        ("PORound", "0"),
        ("PaceAdjust", "N"),
        ("Period", "0"),
        ("PlayerExperience", ""),
        ("PlayerPosition", ""),
        ("PlusMinus", "N"),
        ("Rank", "N"),
        ("SeasonSegment", ""),
        ("ShotClockRange", ""),
        ("StarterBench", ""),
        ("TeamID", "0"),
        ("VsConference", ""),
        ("VsDivision", ""),
        ("Weight", ""),
    ])
}

fn apply_group(p: &mut Params, group: &GroupValue) {
    if let Some(name) = group.set.param_name() {
        p.insert(name.to_string(), group.param.clone());
    }
}

pub fn league_dash_params(
    season: &str,
    season_type: &str,
    measure_type: &str,
    per_mode: &str,
    group: &GroupValue,
) -> Params {
    let mut p = dashboard_filters();
    p.insert("Season".into(), season.into());
    p.insert("SeasonType".into(), season_type.into());
    p.insert("MeasureType".into(), measure_type.into());
    p.insert("PerMode".into(), per_mode.into());
    apply_group(&mut p, group);
    p
}

pub fn league_tracking_params(
    season: &str,
    season_type: &str,
    pt_measure_type: &str,
    per_mode: &str,
    group: &GroupValue,
) -> Params {
    let mut p = dashboard_filters();
    p.insert("PlayerOrTeam".into(), "Player".into());
    p.insert("Season".into(), season.into());
    p.insert("SeasonType".into(), season_type.into());
    p.insert("PtMeasureType".into(), pt_measure_type.into());
    p.insert("PerMode".into(), per_mode.into());
    apply_group(&mut p, group);
    p
}

pub fn lineup_params(
    season: &str,
    season_type: &str,
    measure_type: &str,
    per_mode: &str,
    group_quantity: u8,
) -> Params {
    let mut p = dashboard_filters();
    p.insert("GroupQuantity".into(), group_quantity.to_string());
    p.insert("Season".into(), season.into());
    p.insert("SeasonType".into(), season_type.into());
    p.insert("MeasureType".into(), measure_type.into());
    p.insert("PerMode".into(), per_mode.into());
    p
}

/// Per-entity dashboards (`playerdashboardby*`, `teamdashboardby*`).
pub fn entity_dashboard_params(
    id_key: &str,
    entity_id: i64,
    season: &str,
    season_type: &str,
    measure_type: &str,
    per_mode: &str,
) -> Params {
    let mut p = params(&[
        ("DateFrom", ""),
        ("DateTo", ""),
        ("GameSegment", ""),
        ("LastNGames", "0"),
        ("LeagueID", LEAGUE_ID),
        ("Location", ""),
        ("Month", "0"),
        ("OpponentTeamID", "0"),
        ("Outcome", ""),
        ("PORound", "0"),
        ("PaceAdjust", "N"),
        ("Period", "0"),
        ("PlusMinus", "N"),
        ("Rank", "N"),
        ("SeasonSegment", ""),
        ("ShotClockRange", ""),
        ("VsConference", ""),
        ("VsDivision", ""),
    ]);
    p.insert(id_key.into(), entity_id.to_string());
    p.insert("Season".into(), season.into());
    p.insert("SeasonType".into(), season_type.into());
    p.insert("MeasureType".into(), measure_type.into());
    p.insert("PerMode".into(), per_mode.into());
    p
}

pub fn on_off_params(
    team_id: i64,
    season: &str,
    season_type: &str,
    measure_type: &str,
    per_mode: &str,
) -> Params {
    let mut p = params(&[
        ("DateFrom", ""),
        ("DateTo", ""),
        ("GameSegment", ""),
        ("LastNGames", "0"),
        ("LeagueID", LEAGUE_ID),
        ("Location", ""),
        ("Month", "0"),
        ("OpponentTeamID", "0"),
        ("Outcome", ""),
        ("PaceAdjust", "N"),
        ("Period", "0"),
        ("PlusMinus", "N"),
        ("Rank", "N"),
        ("SeasonSegment", ""),
        ("VsConference", ""),
        ("VsDivision", ""),
    ]);
    p.insert("TeamID".into(), team_id.to_string());
    p.insert("Season".into(), season.into());
    p.insert("SeasonType".into(), season_type.into());
    p.insert("MeasureType".into(), measure_type.into());
    p.insert("PerMode".into(), per_mode.into());
    p
}

pub fn scoreboard_params(date: NaiveDate) -> Params {
    let game_date = date.format("%m/%d/%Y").to_string();
    params(&[
        ("DayOffset", "0"),
        ("LeagueID", LEAGUE_ID),
        ("GameDate", game_date.as_str()),
    ])
}

/// Game ids are zero-padded to ten digits on the wire.
pub fn game_id_param(game_id: i64) -> String {
    format!("{game_id:010}")
}

pub fn summary_params(game_id: i64) -> Params {
    let game_id = game_id_param(game_id);
    params(&[("GameID", game_id.as_str())])
}

/// Box scores and play-by-play share the full-game range parameters.
pub fn game_range_params(game_id: i64, season: &str, season_type: &str, range_type: &str) -> Params {
    let game_id = game_id_param(game_id);
    params(&[
        ("EndPeriod", "10"),
        ("EndRange", "1000000000"),
        ("GameID", game_id.as_str()),
        ("RangeType", range_type),
        ("Season", season),
        ("SeasonType", season_type),
        ("StartPeriod", "1"),
        ("StartRange", "0"),
    ])
}

pub fn box_score_params(game_id: i64, season: &str, season_type: &str) -> Params {
    game_range_params(game_id, season, season_type, "0")
}

pub fn play_by_play_params(game_id: i64, season: &str, season_type: &str) -> Params {
    game_range_params(game_id, season, season_type, "2")
}

pub fn game_log_params(season: &str, season_type: &str) -> Params {
    params(&[
        ("Counter", "1000"),
        ("Direction", "DESC"),
        ("LeagueID", LEAGUE_ID),
        ("PlayerOrTeam", "P"),
        ("Season", season),
        ("SeasonType", season_type),
        ("Sorter", "DATE"),
    ])
}

pub fn player_career_params(player_id: i64, per_mode: &str) -> Params {
    let player_id = player_id.to_string();
    params(&[
        ("PerMode", per_mode),
        ("PlayerID", player_id.as_str()),
        ("LeagueID", LEAGUE_ID),
    ])
}

pub fn team_seasons_params(team_id: i64, season_type: &str, per_mode: &str) -> Params {
    let team_id = team_id.to_string();
    params(&[
        ("TeamID", team_id.as_str()),
        ("LeagueID", LEAGUE_ID),
        ("SeasonType", season_type),
        ("PerMode", per_mode),
    ])
}

pub fn shot_chart_params(player_id: i64, season: &str, season_type: &str) -> Params {
    let player_id = player_id.to_string();
    params(&[
        ("PlayerID", player_id.as_str()),
        ("TeamID", "0"),
        ("GameID", ""),
        ("LeagueID", LEAGUE_ID),
        ("Season", season),
        ("SeasonType", season_type),
        ("Outcome", ""),
        ("Location", ""),
        ("Month", "0"),
        ("SeasonSegment", ""),
        ("DateFrom", ""),
        ("DateTo", ""),
        ("OpponentTeamID", "0"),
        ("VsConference", ""),
        ("VsDivision", ""),
        ("PlayerPosition", ""),
        ("GameSegment", ""),
        ("Period", "0"),
        ("LastNGames", "0"),
        ("AheadBehind", ""),
        ("ContextMeasure", "FGM"),
        ("ClutchTime", ""),
        ("RookieYear", ""),
    ])
}

pub fn player_info_params(player_id: i64) -> Params {
    let player_id = player_id.to_string();
    params(&[
        ("LeagueID", LEAGUE_ID),
        ("PlayerID", player_id.as_str()),
        ("SeasonType", "Regular Season"),
    ])
}

pub fn all_players_params(season: &str, only_current: bool) -> Params {
    params(&[
        ("IsOnlyCurrentSeason", if only_current { "1" } else { "0" }),
        ("LeagueID", LEAGUE_ID),
        ("Season", season),
    ])
}

pub fn team_years_params() -> Params {
    params(&[("LeagueID", LEAGUE_ID)])
}

pub fn team_info_params(team_id: i64, season: &str) -> Params {
    let team_id = team_id.to_string();
    params(&[
        ("LeagueID", LEAGUE_ID),
        ("SeasonType", "Regular Season"),
        ("TeamID", team_id.as_str()),
        ("Season", season),
    ])
}

pub fn team_details_params(team_id: i64) -> Params {
    let team_id = team_id.to_string();
    params(&[("TeamID", team_id.as_str())])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_values_cover_the_axes() {
        let month = GroupSet::Month.values();
        assert_eq!(month.len(), 11);
        assert_eq!(month[1].param, "1");
        assert_eq!(month[1].label, "October");
        assert_eq!(month[10].label, "July");

        let outcome = GroupSet::Outcome.values();
        assert_eq!(outcome[0].param, "W");
        assert_eq!(outcome[0].label, "Wins");

        let overall = GroupSet::Overall.values();
        assert_eq!(overall.len(), 1);
        assert_eq!(overall[0].label, "Overall");
        assert_eq!(GroupSet::parse("Pre/Post All-Star"), Some(GroupSet::SeasonSegment));
    }

    #[test]
    fn dashboard_params_carry_the_group_filter() {
        let home = &GroupSet::Location.values()[0];
        let p = league_dash_params("2016-17", "Regular Season", "Misc", "Totals", home);
        assert_eq!(p.get("Location").map(String::as_str), Some("Home"));
        assert_eq!(p.get("MeasureType").map(String::as_str), Some("Misc"));

        let overall = &GroupSet::Overall.values()[0];
        let p = league_dash_params("2016-17", "Regular Season", "Base", "Totals", overall);
        assert_eq!(p.get("Location").map(String::as_str), Some(""));
    }

    #[test]
    fn exclusions() {
        let player = measure_types_excluding(PLAYER_STAT_EXCLUDED);
        assert_eq!(player, vec!["Base", "Advanced", "Misc", "Scoring", "Usage"]);
        assert!(!measure_types_excluding(TEAM_STAT_EXCLUDED).contains(&"Usage"));
    }

    #[test]
    fn ids_and_dates_are_formatted() {
        assert_eq!(game_id_param(21600001), "0021600001");
        let date = NaiveDate::from_ymd_opt(2016, 10, 25).unwrap();
        assert_eq!(
            scoreboard_params(date).get("GameDate").map(String::as_str),
            Some("10/25/2016")
        );
        assert_eq!(month_label("3"), Some("December"));
    }
}
