use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use serde_json::json;
use tracing::{info, warn};

use crate::database_ops::entities::{list_coaches, list_players, list_teams, Team};
use crate::database_ops::ingest_runs::{ingest_run_finish, ingest_run_start};
use crate::database_ops::seasons::require_league_season;
use crate::database_ops::Db;
use crate::fetch::{HttpHtmlSource, StatsApiClient};
use crate::orchestrator::{
    career_plan, entity_dashboard_plan, game_day_plan, leaguewide_plan, player_detail_plan,
    player_stats_plan, shot_chart_plan, team_stats_plan, Orchestrator, RunSummary, WorkUnit,
};
use crate::payload::value_as_i64;
use crate::pipelines::games::pending_game_dates;
use crate::pipelines::{IngestContext, SeasonScope};
use crate::registry::EntityAxis;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestTarget {
    Teams,
    Players,
    PlayerStats,
    TeamStats,
    Leaguewide,
    Games,
    ShotCharts,
    Coaches,
    UpdateAll,
}

impl IngestTarget {
    pub fn command(self) -> &'static str {
        match self {
            IngestTarget::Teams => "teams",
            IngestTarget::Players => "players",
            IngestTarget::PlayerStats => "player-stats",
            IngestTarget::TeamStats => "team-stats",
            IngestTarget::Leaguewide => "leaguewide",
            IngestTarget::Games => "games",
            IngestTarget::ShotCharts => "shotcharts",
            IngestTarget::Coaches => "coaches",
            IngestTarget::UpdateAll => "update-all",
        }
    }

    /// The targets one command runs, in order.
    fn steps(self) -> &'static [IngestTarget] {
        use IngestTarget::*;
        match self {
            Teams => &[Teams],
            Players => &[Players],
            PlayerStats => &[PlayerStats],
            TeamStats => &[TeamStats],
            Leaguewide => &[Leaguewide],
            Games => &[Games],
            ShotCharts => &[ShotCharts],
            Coaches => &[Coaches],
            UpdateAll => &[PlayerStats, Games, Leaguewide, TeamStats, ShotCharts],
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Optional override for the database URL.
    pub database_url: Option<String>,
    pub target: IngestTarget,
    pub season: i32,
    pub season_type: String,
    /// Player-scoped units run for these provider ids; empty means every rostered player.
    pub player_ids: Vec<i64>,
    /// Also run per-entity dashboards (stats targets) or player detail sync (players).
    pub details: bool,
    /// Last game date to ingest; defaults to today.
    pub through: Option<NaiveDate>,
}

/// Run one command end to end and record it in `ingest_runs`.
///
/// Unit failures are absorbed into the returned summary. Only configuration errors (including a
/// missing league season) come back as `Err`.
pub async fn run(cfg: IngestConfig) -> Result<RunSummary> {
    let db = super::connect(cfg.database_url.as_deref()).await?;
    let source = StatsApiClient::from_env().context("building the stats API client")?;
    let html = HttpHtmlSource::from_env().context("building the reference-site client")?;
    let ctx = IngestContext::new(db.clone(), Arc::new(source)).with_html(Arc::new(html));
    let mut orchestrator = Orchestrator::new(ctx);

    let command = cfg.target.command();
    let meta = json!({"season": cfg.season, "season_type": cfg.season_type});
    let run_id = ingest_run_start(&db, command, Some(meta)).await?;
    info!(command, run_id, season = cfg.season, "ingest run started");

    let mut result = Ok(());
    for step in cfg.target.steps() {
        info!(step = step.command(), "starting step");
        result = run_step(&mut orchestrator, &cfg, *step).await;
        if result.is_err() {
            break;
        }
    }

    match result {
        Ok(()) => {
            let summary = orchestrator.finish()?;
            ingest_run_finish(&db, run_id, "complete", &serde_json::to_value(&summary)?).await?;
            if summary.warning_count() > 0 {
                warn!(
                    warnings = summary.warning_count(),
                    "run finished with warnings"
                );
            }
            Ok(summary)
        }
        Err(err) => {
            let partial = serde_json::to_value(orchestrator.summary())?;
            ingest_run_finish(&db, run_id, "failed", &partial).await?;
            Err(err).with_context(|| format!("{command} aborted"))
        }
    }
}

async fn run_step(
    orchestrator: &mut Orchestrator,
    cfg: &IngestConfig,
    step: IngestTarget,
) -> crate::error::Result<()> {
    let scope = SeasonScope::new(cfg.season, cfg.season_type.clone());
    match step {
        IngestTarget::Teams => {
            orchestrator.execute(&[WorkUnit::TeamList]).await?;
            let plan: Vec<WorkUnit> = list_teams(&orchestrator.ctx.db)
                .await?
                .iter()
                .map(|team| WorkUnit::TeamDetail {
                    team_id: team.team_id,
                    season: cfg.season,
                })
                .collect();
            orchestrator.execute(&plan).await
        }
        IngestTarget::Players => {
            let list = WorkUnit::PlayerList {
                season: cfg.season,
                only_current: false,
            };
            orchestrator.execute(&[list]).await?;
            if cfg.details {
                let incomplete: Vec<i64> = list_players(&orchestrator.ctx.db, true)
                    .await?
                    .iter()
                    .map(|player| player.player_id)
                    .collect();
                orchestrator.execute(&player_detail_plan(&incomplete)).await?;
            }
            Ok(())
        }
        IngestTarget::PlayerStats => {
            orchestrator.execute(&player_stats_plan(&scope)).await?;
            let players = player_targets(&orchestrator.ctx.db, cfg).await?;
            orchestrator.execute(&career_plan(&players)).await?;
            if cfg.details {
                let plan = entity_dashboard_plan(EntityAxis::Player, &scope, &players);
                orchestrator.execute(&plan).await?;
            }
            Ok(())
        }
        IngestTarget::TeamStats => {
            let teams = active_team_ids(&orchestrator.ctx.db, cfg.season).await?;
            orchestrator.execute(&team_stats_plan(&scope, &teams)).await?;
            if cfg.details {
                let plan = entity_dashboard_plan(EntityAxis::Team, &scope, &teams);
                orchestrator.execute(&plan).await?;
            }
            Ok(())
        }
        IngestTarget::Leaguewide => orchestrator.execute(&leaguewide_plan(&scope)).await,
        IngestTarget::Games => {
            let season = require_league_season(&orchestrator.ctx.db, cfg.season).await?;
            let through = cfg.through.unwrap_or_else(|| Local::now().date_naive());
            let dates = pending_game_dates(&orchestrator.ctx.db, &season, through).await?;
            info!(dates = dates.len(), %through, "game dates pending");
            orchestrator.execute(&game_day_plan(&season, &dates)).await
        }
        IngestTarget::ShotCharts => {
            let players = player_targets(&orchestrator.ctx.db, cfg).await?;
            orchestrator.execute(&shot_chart_plan(&scope, &players)).await
        }
        IngestTarget::Coaches => {
            orchestrator.execute(&[WorkUnit::CoachList]).await?;
            let plan: Vec<WorkUnit> = list_coaches(&orchestrator.ctx.db)
                .await?
                .into_iter()
                .map(|coach| WorkUnit::CoachSeasons { coach })
                .collect();
            orchestrator.execute(&plan).await
        }
        // Expanded by `steps`.
        IngestTarget::UpdateAll => Ok(()),
    }
}

/// Explicit ids, otherwise every player currently attached to a team.
async fn player_targets(db: &Db, cfg: &IngestConfig) -> crate::error::Result<Vec<i64>> {
    if !cfg.player_ids.is_empty() {
        return Ok(cfg.player_ids.clone());
    }
    Ok(list_players(db, false)
        .await?
        .into_iter()
        .filter(|player| player.team_ref.is_some())
        .map(|player| player.player_id)
        .collect())
}

async fn active_team_ids(db: &Db, season: i32) -> crate::error::Result<Vec<i64>> {
    Ok(list_teams(db)
        .await?
        .iter()
        .filter(|team| active_in(team, season))
        .map(|team| team.team_id)
        .collect())
}

/// Franchises without a recorded last year count as active.
fn active_in(team: &Team, season: i32) -> bool {
    team.attributes
        .get("max_year")
        .and_then(value_as_i64)
        .map_or(true, |max_year| max_year >= i64::from(season))
}
