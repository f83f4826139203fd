//! Bulk ingestion: the run state machine, work-unit plans over the parameter axes, and the
//! sequential executor that turns unit errors into a run summary.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::database_ops::entities::Coach;
use crate::error::Result;
use crate::fetch::endpoints::{
    measure_types_excluding, GroupSet, GroupValue, LINEUP_EXCLUDED, PER_MODES,
    PLAYER_STAT_EXCLUDED, PT_MEASURE_TYPES, TEAM_STAT_EXCLUDED, TOTALS,
};
use crate::normalization::season::LeagueSeason;
use crate::pipelines::{
    coaches, dashboards, game_logs, games, lineups, on_off, players, seasons, shot_charts, teams,
    tracking, IngestContext, RowFailure, SeasonScope, UnitOutcome,
};
use crate::registry::EntityAxis;

/// Where a run is. `Failed` and `Complete` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RunState {
    Idle,
    Fetching,
    Classifying,
    NormalizingRows,
    Resolving,
    Upserting,
    Advancing,
    Failed,
    Complete,
}

impl RunState {
    pub fn can_transition(self, next: RunState) -> bool {
        use RunState::*;
        if next == Failed {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Idle, Fetching | Advancing | Complete)
                | (Fetching, Fetching | Classifying | NormalizingRows | Upserting | Advancing)
                | (Classifying, NormalizingRows | Advancing)
                | (NormalizingRows, Resolving | Advancing)
                | (Resolving, Upserting | Fetching | Advancing)
                | (Upserting, Fetching | Advancing)
                | (Advancing, Idle | Complete)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Failed | RunState::Complete)
    }
}

/// One fetch-and-write step of a plan.
#[derive(Debug, Clone)]
pub enum WorkUnit {
    TeamList,
    TeamDetail {
        team_id: i64,
        season: i32,
    },
    PlayerList {
        season: i32,
        only_current: bool,
    },
    PlayerDetail {
        player_id: i64,
    },
    LeagueSplit {
        axis: EntityAxis,
        scope: SeasonScope,
        measure_type: String,
        per_mode: String,
        group: GroupValue,
    },
    EntityDashboard {
        axis: EntityAxis,
        entity_id: i64,
        scope: SeasonScope,
        measure_type: String,
        per_mode: String,
        shooting: bool,
    },
    Tracking {
        scope: SeasonScope,
        pt_measure_type: String,
        per_mode: String,
        group: GroupValue,
    },
    Lineups {
        scope: SeasonScope,
        measure_type: String,
        per_mode: String,
        group_quantity: u8,
    },
    OnOff {
        team_id: i64,
        scope: SeasonScope,
        measure_type: String,
        per_mode: String,
    },
    GameDay {
        date: NaiveDate,
        season: LeagueSeason,
    },
    GameLogs {
        scope: SeasonScope,
    },
    PlayerCareer {
        player_id: i64,
        per_mode: String,
    },
    TeamSeasons {
        team_id: i64,
        scope: SeasonScope,
        per_mode: String,
    },
    ShotChart {
        player_id: i64,
        scope: SeasonScope,
    },
    CoachList,
    CoachSeasons {
        coach: Coach,
    },
}

impl WorkUnit {
    pub fn label(&self) -> String {
        match self {
            WorkUnit::TeamList => "team list".to_string(),
            WorkUnit::TeamDetail { team_id, season } => format!("team detail {team_id} {season}"),
            WorkUnit::PlayerList { season, .. } => format!("player list {season}"),
            WorkUnit::PlayerDetail { player_id } => format!("player detail {player_id}"),
            WorkUnit::LeagueSplit {
                axis,
                scope,
                measure_type,
                per_mode,
                group,
            } => format!(
                "{} split {} {} {measure_type} {per_mode} {}={}",
                axis.label(),
                scope.label(),
                scope.season_type,
                group.set.label(),
                group.label
            ),
            WorkUnit::EntityDashboard {
                axis,
                entity_id,
                scope,
                measure_type,
                per_mode,
                shooting,
            } => format!(
                "{} dashboard {entity_id} {} {measure_type} {per_mode}{}",
                axis.label(),
                scope.label(),
                if *shooting { " shooting" } else { "" }
            ),
            WorkUnit::Tracking {
                scope,
                pt_measure_type,
                per_mode,
                group,
            } => format!(
                "tracking {} {pt_measure_type} {per_mode} {}={}",
                scope.label(),
                group.set.label(),
                group.label
            ),
            WorkUnit::Lineups {
                scope,
                measure_type,
                per_mode,
                group_quantity,
            } => format!(
                "lineups {} {measure_type} {per_mode} x{group_quantity}",
                scope.label()
            ),
            WorkUnit::OnOff {
                team_id,
                scope,
                measure_type,
                per_mode,
            } => format!("on/off {team_id} {} {measure_type} {per_mode}", scope.label()),
            WorkUnit::GameDay { date, .. } => format!("games {date}"),
            WorkUnit::GameLogs { scope } => {
                format!("game logs {} {}", scope.label(), scope.season_type)
            }
            WorkUnit::PlayerCareer {
                player_id,
                per_mode,
            } => format!("career {player_id} {per_mode}"),
            WorkUnit::TeamSeasons {
                team_id,
                scope,
                per_mode,
            } => format!("team season {team_id} {} {per_mode}", scope.label()),
            WorkUnit::ShotChart { player_id, scope } => {
                format!("shot chart {player_id} {}", scope.label())
            }
            WorkUnit::CoachList => "coach list".to_string(),
            WorkUnit::CoachSeasons { coach } => format!("coach seasons {}", coach.coach_key),
        }
    }

    pub async fn run(&self, ctx: &mut IngestContext) -> Result<UnitOutcome> {
        match self {
            WorkUnit::TeamList => teams::sync_team_list(ctx).await,
            WorkUnit::TeamDetail { team_id, season } => {
                teams::sync_team_detail(ctx, *team_id, *season).await
            }
            WorkUnit::PlayerList {
                season,
                only_current,
            } => players::sync_player_list(ctx, *season, *only_current).await,
            WorkUnit::PlayerDetail { player_id } => {
                players::sync_player_detail(ctx, *player_id).await
            }
            WorkUnit::LeagueSplit {
                axis,
                scope,
                measure_type,
                per_mode,
                group,
            } => dashboards::league_split(ctx, *axis, scope, measure_type, per_mode, group).await,
            WorkUnit::EntityDashboard {
                axis,
                entity_id,
                scope,
                measure_type,
                per_mode,
                shooting,
            } => {
                dashboards::entity_dashboard(
                    ctx,
                    *axis,
                    *entity_id,
                    scope,
                    measure_type,
                    per_mode,
                    *shooting,
                )
                .await
            }
            WorkUnit::Tracking {
                scope,
                pt_measure_type,
                per_mode,
                group,
            } => tracking::league_tracking(ctx, scope, pt_measure_type, per_mode, group).await,
            WorkUnit::Lineups {
                scope,
                measure_type,
                per_mode,
                group_quantity,
            } => lineups::lineup_unit(ctx, scope, measure_type, per_mode, *group_quantity).await,
            WorkUnit::OnOff {
                team_id,
                scope,
                measure_type,
                per_mode,
            } => on_off::on_off(ctx, *team_id, scope, measure_type, per_mode).await,
            WorkUnit::GameDay { date, season } => games::games_for_date(ctx, *date, season).await,
            WorkUnit::GameLogs { scope } => game_logs::game_logs(ctx, scope).await,
            WorkUnit::PlayerCareer {
                player_id,
                per_mode,
            } => seasons::player_career(ctx, *player_id, per_mode).await,
            WorkUnit::TeamSeasons {
                team_id,
                scope,
                per_mode,
            } => seasons::team_seasons(ctx, *team_id, scope, per_mode).await,
            WorkUnit::ShotChart { player_id, scope } => {
                shot_charts::shot_chart(ctx, *player_id, scope).await
            }
            WorkUnit::CoachList => coaches::sync_coach_list(ctx).await,
            WorkUnit::CoachSeasons { coach } => coaches::coach_seasons(ctx, coach).await,
        }
    }
}

fn all_group_values() -> Vec<GroupValue> {
    GroupSet::ALL.iter().flat_map(|set| set.values()).collect()
}

/// League player dashboards over per-mode × group value × measure type, plus player tracking
/// for the Totals per-mode.
pub fn player_stats_plan(scope: &SeasonScope) -> Vec<WorkUnit> {
    let measure_types = measure_types_excluding(PLAYER_STAT_EXCLUDED);
    let mut plan = Vec::new();
    for per_mode in PER_MODES {
        for group in all_group_values() {
            for measure_type in &measure_types {
                plan.push(WorkUnit::LeagueSplit {
                    axis: EntityAxis::Player,
                    scope: scope.clone(),
                    measure_type: measure_type.to_string(),
                    per_mode: per_mode.to_string(),
                    group: group.clone(),
                });
            }
            if *per_mode == TOTALS {
                for pt_measure_type in PT_MEASURE_TYPES {
                    plan.push(WorkUnit::Tracking {
                        scope: scope.clone(),
                        pt_measure_type: pt_measure_type.to_string(),
                        per_mode: per_mode.to_string(),
                        group: group.clone(),
                    });
                }
            }
        }
    }
    plan
}

/// League team dashboards, then each team's season line and on/off splits.
pub fn team_stats_plan(scope: &SeasonScope, team_ids: &[i64]) -> Vec<WorkUnit> {
    let mut plan = Vec::new();
    for per_mode in PER_MODES {
        for group in all_group_values() {
            for measure_type in measure_types_excluding(TEAM_STAT_EXCLUDED) {
                plan.push(WorkUnit::LeagueSplit {
                    axis: EntityAxis::Team,
                    scope: scope.clone(),
                    measure_type: measure_type.to_string(),
                    per_mode: per_mode.to_string(),
                    group: group.clone(),
                });
            }
        }
    }
    for team_id in team_ids {
        plan.push(WorkUnit::TeamSeasons {
            team_id: *team_id,
            scope: scope.clone(),
            per_mode: TOTALS.to_string(),
        });
        for measure_type in on_off_measure_types() {
            for per_mode in PER_MODES {
                plan.push(WorkUnit::OnOff {
                    team_id: *team_id,
                    scope: scope.clone(),
                    measure_type: measure_type.to_string(),
                    per_mode: per_mode.to_string(),
                });
            }
        }
    }
    plan
}

/// On/off splits share the lineup exclusions and have no scoring breakdown.
fn on_off_measure_types() -> Vec<&'static str> {
    measure_types_excluding(LINEUP_EXCLUDED)
        .into_iter()
        .filter(|measure_type| *measure_type != "Scoring")
        .collect()
}

/// Per-entity general splits for every measure type and per-mode, plus one shooting dashboard
/// per per-mode.
pub fn entity_dashboard_plan(
    axis: EntityAxis,
    scope: &SeasonScope,
    entity_ids: &[i64],
) -> Vec<WorkUnit> {
    let excluded = match axis {
        EntityAxis::Team => TEAM_STAT_EXCLUDED,
        _ => PLAYER_STAT_EXCLUDED,
    };
    let mut plan = Vec::new();
    for entity_id in entity_ids {
        for per_mode in PER_MODES {
            for measure_type in measure_types_excluding(excluded) {
                plan.push(WorkUnit::EntityDashboard {
                    axis,
                    entity_id: *entity_id,
                    scope: scope.clone(),
                    measure_type: measure_type.to_string(),
                    per_mode: per_mode.to_string(),
                    shooting: false,
                });
            }
            plan.push(WorkUnit::EntityDashboard {
                axis,
                entity_id: *entity_id,
                scope: scope.clone(),
                measure_type: "Base".to_string(),
                per_mode: per_mode.to_string(),
                shooting: true,
            });
        }
    }
    plan
}

/// Two- to five-man lineups for every measure type and per-mode.
pub fn leaguewide_plan(scope: &SeasonScope) -> Vec<WorkUnit> {
    let mut plan = Vec::new();
    for measure_type in measure_types_excluding(LINEUP_EXCLUDED) {
        for per_mode in PER_MODES {
            for group_quantity in 2..=5 {
                plan.push(WorkUnit::Lineups {
                    scope: scope.clone(),
                    measure_type: measure_type.to_string(),
                    per_mode: per_mode.to_string(),
                    group_quantity,
                });
            }
        }
    }
    plan
}

/// One game-day unit per date, then game logs for every season type those dates touch.
pub fn game_day_plan(season: &LeagueSeason, dates: &[NaiveDate]) -> Vec<WorkUnit> {
    let mut plan: Vec<WorkUnit> = dates
        .iter()
        .map(|date| WorkUnit::GameDay {
            date: *date,
            season: season.clone(),
        })
        .collect();
    let mut season_types: Vec<&'static str> = dates
        .iter()
        .filter_map(|date| season.season_type_for_date(*date).ok())
        .collect();
    season_types.dedup();
    for season_type in season_types {
        plan.push(WorkUnit::GameLogs {
            scope: SeasonScope::new(season.year, season_type),
        });
    }
    plan
}

pub fn player_detail_plan(player_ids: &[i64]) -> Vec<WorkUnit> {
    player_ids
        .iter()
        .map(|player_id| WorkUnit::PlayerDetail {
            player_id: *player_id,
        })
        .collect()
}

pub fn career_plan(player_ids: &[i64]) -> Vec<WorkUnit> {
    player_ids
        .iter()
        .map(|player_id| WorkUnit::PlayerCareer {
            player_id: *player_id,
            per_mode: TOTALS.to_string(),
        })
        .collect()
}

pub fn shot_chart_plan(scope: &SeasonScope, player_ids: &[i64]) -> Vec<WorkUnit> {
    player_ids
        .iter()
        .map(|player_id| WorkUnit::ShotChart {
            player_id: *player_id,
            scope: scope.clone(),
        })
        .collect()
}

/// A unit that failed without aborting the run.
#[derive(Debug, Clone, Serialize)]
pub struct FailureEntry {
    pub unit: String,
    pub category: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub units_total: usize,
    pub units_completed: usize,
    pub units_unavailable: usize,
    pub units_failed: usize,
    pub records_created: usize,
    pub records_updated: usize,
    pub rows_skipped: usize,
    pub stand_in_teams: usize,
    pub stand_in_players: usize,
    pub row_failures: Vec<RowFailure>,
    pub failures: Vec<FailureEntry>,
}

impl RunSummary {
    fn absorb(&mut self, outcome: UnitOutcome) {
        if outcome.unavailable {
            self.units_unavailable += 1;
        } else {
            self.units_completed += 1;
        }
        self.records_created += outcome.created;
        self.records_updated += outcome.updated;
        self.rows_skipped += outcome.skipped_rows;
        self.row_failures.extend(outcome.row_failures);
    }

    pub fn warning_count(&self) -> usize {
        self.failures.len() + self.row_failures.len()
    }
}

/// Runs plans one unit at a time on a single [`IngestContext`].
pub struct Orchestrator {
    pub ctx: IngestContext,
    summary: RunSummary,
}

impl Orchestrator {
    pub fn new(ctx: IngestContext) -> Self {
        Self {
            ctx,
            summary: RunSummary::default(),
        }
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    /// Execute every unit in order. Only a configuration error stops the run; it leaves the
    /// state machine in `Failed` and is returned.
    #[instrument(skip_all, fields(units = plan.len()))]
    pub async fn execute(&mut self, plan: &[WorkUnit]) -> Result<()> {
        let total = plan.len();
        self.summary.units_total += total;
        for (index, unit) in plan.iter().enumerate() {
            let label = unit.label();
            match unit.run(&mut self.ctx).await {
                Ok(outcome) => self.summary.absorb(outcome),
                Err(err) if err.is_fatal() => {
                    error!(unit = %label, error = %err, "configuration error; aborting run");
                    self.ctx.mark_failed();
                    self.summary.failures.push(FailureEntry {
                        unit: label,
                        category: err.category().to_string(),
                        message: err.to_string(),
                    });
                    return Err(err);
                }
                Err(err) => {
                    warn!(
                        unit = %label,
                        category = err.category(),
                        error = %err,
                        "unit failed; continuing"
                    );
                    self.summary.units_failed += 1;
                    self.summary.failures.push(FailureEntry {
                        unit: label.clone(),
                        category: err.category().to_string(),
                        message: err.to_string(),
                    });
                }
            }
            self.ctx.enter(RunState::Advancing)?;
            info!(processed = index + 1, total, unit = %label, "progress");
            self.ctx.enter(RunState::Idle)?;
        }
        Ok(())
    }

    /// Close the run: `Complete`, cache cleared, stand-in counts folded into the summary.
    pub fn finish(&mut self) -> Result<RunSummary> {
        self.ctx.enter(RunState::Complete)?;
        let (teams, players) = self.ctx.entities.created_counts();
        self.summary.stand_in_teams = teams;
        self.summary.stand_in_players = players;
        self.ctx.entities.clear();
        info!(
            completed = self.summary.units_completed,
            unavailable = self.summary.units_unavailable,
            failed = self.summary.units_failed,
            created = self.summary.records_created,
            updated = self.summary.records_updated,
            warnings = self.summary.warning_count(),
            "run complete"
        );
        Ok(self.summary.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    use crate::database_ops::records::count_records;
    use crate::fetch::endpoints::LEAGUE_TEAM_STATS;
    use crate::fetch::scripted::{envelope, ScriptedSource};
    use crate::normalization::season::REGULAR_SEASON;
    use crate::pipelines::test_support::{context, seed_team};

    fn overall() -> GroupValue {
        GroupSet::Overall.values().remove(0)
    }

    fn team_split(measure_type: &str) -> WorkUnit {
        WorkUnit::LeagueSplit {
            axis: EntityAxis::Team,
            scope: SeasonScope::new(2016, REGULAR_SEASON),
            measure_type: measure_type.to_string(),
            per_mode: TOTALS.to_string(),
            group: overall(),
        }
    }

    fn misc_payload() -> Value {
        envelope(
            LEAGUE_TEAM_STATS,
            vec![(
                "LeagueDashTeamStats",
                vec!["TEAM_ID", "TEAM_NAME", "GP", "PTS_2ND_CHANCE"],
                vec![json!([1610612739, "Cleveland Cavaliers", 82, 12])],
            )],
        )
    }

    #[test]
    fn transition_table() {
        use RunState::*;
        assert!(Idle.can_transition(Fetching));
        assert!(Fetching.can_transition(Classifying));
        assert!(Classifying.can_transition(NormalizingRows));
        assert!(NormalizingRows.can_transition(Resolving));
        assert!(Resolving.can_transition(Upserting));
        assert!(Upserting.can_transition(Advancing));
        assert!(Advancing.can_transition(Idle));
        assert!(Advancing.can_transition(Complete));
        assert!(Resolving.can_transition(Failed));

        assert!(!Idle.can_transition(Upserting));
        assert!(!Classifying.can_transition(Upserting));
        assert!(!Complete.can_transition(Idle));
        assert!(!Failed.can_transition(Failed));
    }

    #[test]
    fn plans_honor_measure_type_exclusions() {
        let scope = SeasonScope::new(2016, REGULAR_SEASON);
        let player = player_stats_plan(&scope);
        assert!(player.iter().all(|unit| !matches!(
            unit,
            WorkUnit::LeagueSplit { measure_type, .. } if measure_type == "Defense" || measure_type == "Four Factors"
        )));
        assert!(player.iter().all(|unit| !matches!(
            unit,
            WorkUnit::Tracking { per_mode, .. } if per_mode != TOTALS
        )));

        let lineups = leaguewide_plan(&scope);
        assert_eq!(lineups.len(), 6 * PER_MODES.len() * 4);

        let teams = team_stats_plan(&scope, &[1610612739]);
        assert!(teams.iter().all(|unit| !matches!(
            unit,
            WorkUnit::LeagueSplit { measure_type, .. } if measure_type == "Usage"
        )));
        assert!(teams
            .iter()
            .any(|unit| matches!(unit, WorkUnit::TeamSeasons { team_id: 1610612739, .. })));
        assert!(teams.iter().all(|unit| !matches!(
            unit,
            WorkUnit::OnOff { measure_type, .. } if measure_type == "Scoring" || measure_type == "Defense"
        )));

        let dashboards = entity_dashboard_plan(EntityAxis::Player, &scope, &[2544]);
        let shooting = dashboards
            .iter()
            .filter(|unit| matches!(unit, WorkUnit::EntityDashboard { shooting: true, .. }))
            .count();
        assert_eq!(shooting, PER_MODES.len());
    }

    #[tokio::test]
    async fn unavailable_combination_is_skipped_and_later_units_run() {
        let source =
            ScriptedSource::new().respond(LEAGUE_TEAM_STATS, &[("MeasureType", "Misc")], misc_payload());
        let ctx = context(source).await;
        seed_team(&ctx, 1610612739, "CLE").await;
        let mut orchestrator = Orchestrator::new(ctx);

        orchestrator
            .execute(&[team_split("Base"), team_split("Misc")])
            .await
            .unwrap();
        let summary = orchestrator.finish().unwrap();

        assert_eq!(summary.units_unavailable, 1);
        assert_eq!(summary.units_completed, 1);
        assert_eq!(summary.records_created, 1);
        assert_eq!(summary.warning_count(), 0);
        assert_eq!(
            count_records(&orchestrator.ctx.db, "TeamTraditionalSplit").await.unwrap(),
            0
        );
        assert_eq!(
            count_records(&orchestrator.ctx.db, "TeamMiscSplit").await.unwrap(),
            1
        );
        assert_eq!(orchestrator.ctx.state(), RunState::Complete);
    }

    #[tokio::test]
    async fn fetch_failures_are_recorded_and_the_run_continues() {
        let source = ScriptedSource::new()
            .fail(LEAGUE_TEAM_STATS, &[("MeasureType", "Base")], "timed out")
            .respond(LEAGUE_TEAM_STATS, &[("MeasureType", "Misc")], misc_payload());
        let ctx = context(source).await;
        seed_team(&ctx, 1610612739, "CLE").await;
        let mut orchestrator = Orchestrator::new(ctx);

        orchestrator
            .execute(&[team_split("Base"), team_split("Misc")])
            .await
            .unwrap();
        let summary = orchestrator.finish().unwrap();
        assert_eq!(summary.units_failed, 1);
        assert_eq!(summary.failures[0].category, "fetch_transient");
        assert_eq!(summary.records_created, 1);
    }

    #[tokio::test]
    async fn configuration_errors_abort_the_run() {
        let source =
            ScriptedSource::new().respond(LEAGUE_TEAM_STATS, &[("MeasureType", "Misc")], misc_payload());
        let ctx = context(source).await;
        let mut orchestrator = Orchestrator::new(ctx);
        let broken = WorkUnit::LeagueSplit {
            axis: EntityAxis::Game,
            scope: SeasonScope::new(2016, REGULAR_SEASON),
            measure_type: "Base".into(),
            per_mode: TOTALS.into(),
            group: overall(),
        };

        let err = orchestrator
            .execute(&[broken, team_split("Misc")])
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(orchestrator.ctx.state(), RunState::Failed);
        assert_eq!(orchestrator.summary().units_completed, 0);
        assert!(orchestrator.finish().is_err());
    }
}
