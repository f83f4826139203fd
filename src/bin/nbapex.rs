use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;

use nbapex_etl::cli::counts::{self, kinds_report, CountsConfig};
use nbapex_etl::cli::ingest::{self, IngestConfig, IngestTarget};
use nbapex_etl::cli::seasons::{self, SeasonAddConfig};
use nbapex_etl::normalization::season::{PLAYOFFS, REGULAR_SEASON};
use nbapex_etl::registry::Registry;
use nbapex_etl::util::{env as env_util, tracing::init_tracing};

#[derive(Parser, Debug)]
#[command(name = "nbapex", version, about = "NBA stats ingestion and reconciliation")]
struct Cli {
    /// Database URL (defaults to DATABASE_URL, then sqlite://nbapex.db)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply pending schema migrations
    Migrate,
    /// Add or replace a league season calendar row
    SeasonAdd(SeasonAddArgs),
    /// List record kinds with their natural-key fields
    Kinds,
    /// Record, lineup and run counts
    Counts {
        #[arg(long)]
        runs: Option<i64>,
    },
    /// Seed teams and sync their details
    Teams(ScopeArgs),
    /// Seed players (with --details, sync biographical info for incomplete players)
    Players(ScopeArgs),
    /// League player dashboards, tracking and careers
    PlayerStats(ScopeArgs),
    /// League team dashboards, team seasons and on/off splits
    TeamStats(ScopeArgs),
    /// Lineups for two to five players
    Leaguewide(ScopeArgs),
    /// Games, box scores and play-by-play for dates not yet ingested
    Games(GamesArgs),
    /// Shot chart details for rostered players
    Shotcharts(ScopeArgs),
    /// Coaches and their seasons from the reference site
    Coaches,
    /// Player stats, games, lineups, team stats and shot charts in one run
    UpdateAll(GamesArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SeasonTypeArg {
    #[value(name = "regular", alias = "regular-season")]
    Regular,
    #[value(name = "playoffs", alias = "post")]
    Playoffs,
}

impl SeasonTypeArg {
    fn provider_label(self) -> &'static str {
        match self {
            SeasonTypeArg::Regular => REGULAR_SEASON,
            SeasonTypeArg::Playoffs => PLAYOFFS,
        }
    }
}

#[derive(Debug, Clone, Args)]
struct ScopeArgs {
    /// Starting year of the season (2016 for 2016-17)
    #[arg(long)]
    season: i32,
    #[arg(long, value_enum, default_value = "regular")]
    season_type: SeasonTypeArg,
    /// Restrict player-scoped units to these provider ids (comma-separated)
    #[arg(long, value_delimiter = ',')]
    players: Vec<i64>,
    /// Also run per-entity dashboards or detail syncs
    #[arg(long)]
    details: bool,
}

#[derive(Debug, Clone, Args)]
struct GamesArgs {
    #[command(flatten)]
    scope: ScopeArgs,
    /// Last game date to ingest (YYYY-MM-DD); defaults to today
    #[arg(long)]
    through: Option<NaiveDate>,
}

#[derive(Debug, Clone, Args)]
struct SeasonAddArgs {
    #[arg(long)]
    year: i32,
    #[arg(long)]
    pre_season_start: NaiveDate,
    #[arg(long)]
    regular_season_start: NaiveDate,
    #[arg(long)]
    playoffs_start: NaiveDate,
    #[arg(long)]
    playoffs_end: Option<NaiveDate>,
}

fn ingest_config(
    database_url: Option<String>,
    target: IngestTarget,
    scope: ScopeArgs,
    through: Option<NaiveDate>,
) -> IngestConfig {
    IngestConfig {
        database_url,
        target,
        season: scope.season,
        season_type: scope.season_type.provider_label().to_string(),
        player_ids: scope.players,
        details: scope.details,
        through,
    }
}

async fn run_ingest(cfg: IngestConfig) -> Result<()> {
    let command = cfg.target.command();
    let summary = ingest::run(cfg).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    println!("{command}: finished with {} warning(s)", summary.warning_count());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_util::bootstrap_cli("nbapex");
    init_tracing("info,sqlx=warn")?;

    let cli = Cli::parse();
    let database_url = cli.database_url;
    match cli.command {
        Command::Migrate => {
            nbapex_etl::cli::connect(database_url.as_deref()).await?;
            info!("schema is up to date");
            Ok(())
        }
        Command::SeasonAdd(args) => {
            seasons::run(SeasonAddConfig {
                database_url,
                year: args.year,
                pre_season_start: args.pre_season_start,
                regular_season_start: args.regular_season_start,
                playoffs_start: args.playoffs_start,
                playoffs_end: args.playoffs_end,
            })
            .await
        }
        Command::Kinds => {
            let registry = Registry::standard();
            registry.validate().context("record kind registry is inconsistent")?;
            println!("{}", kinds_report(&registry));
            Ok(())
        }
        Command::Counts { runs } => {
            counts::run(CountsConfig {
                database_url,
                recent_runs_limit: runs,
            })
            .await
        }
        Command::Teams(scope) => {
            run_ingest(ingest_config(database_url, IngestTarget::Teams, scope, None)).await
        }
        Command::Players(scope) => {
            run_ingest(ingest_config(database_url, IngestTarget::Players, scope, None)).await
        }
        Command::PlayerStats(scope) => {
            run_ingest(ingest_config(database_url, IngestTarget::PlayerStats, scope, None)).await
        }
        Command::TeamStats(scope) => {
            run_ingest(ingest_config(database_url, IngestTarget::TeamStats, scope, None)).await
        }
        Command::Leaguewide(scope) => {
            run_ingest(ingest_config(database_url, IngestTarget::Leaguewide, scope, None)).await
        }
        Command::Games(args) => {
            run_ingest(ingest_config(
                database_url,
                IngestTarget::Games,
                args.scope,
                args.through,
            ))
            .await
        }
        Command::Shotcharts(scope) => {
            run_ingest(ingest_config(database_url, IngestTarget::ShotCharts, scope, None)).await
        }
        Command::Coaches => {
            // Coach pages are not season-scoped; the season only labels the run.
            let scope = ScopeArgs {
                season: 0,
                season_type: SeasonTypeArg::Regular,
                players: Vec::new(),
                details: false,
            };
            run_ingest(ingest_config(database_url, IngestTarget::Coaches, scope, None)).await
        }
        Command::UpdateAll(args) => {
            run_ingest(ingest_config(
                database_url,
                IngestTarget::UpdateAll,
                args.scope,
                args.through,
            ))
            .await
        }
    }
}
