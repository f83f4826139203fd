//! Team/Player/Game resolution by provider id, with lazily created stand-ins.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde_json::{Map, Value};
use sqlx::types::Json;
use tracing::{debug, info, instrument};

use super::db::Db;
use crate::error::{EtlError, Result};

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Team {
    pub id: i64,
    pub team_id: i64,
    pub city: Option<String>,
    pub name: Option<String>,
    pub abbreviation: Option<String>,
    pub attributes: Json<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Player {
    pub id: i64,
    pub player_id: i64,
    pub display_name: String,
    pub team_ref: Option<i64>,
    pub is_complete: bool,
    pub attributes: Json<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Game {
    pub id: i64,
    pub game_id: i64,
    pub game_date: Option<NaiveDate>,
    pub game_sequence: Option<i64>,
    pub home_team_ref: Option<i64>,
    pub visitor_team_ref: Option<i64>,
    pub season: Option<i64>,
    pub season_type: Option<String>,
    pub attributes: Json<Map<String, Value>>,
}

/// Enrichment from the team list/detail endpoints.
#[derive(Debug, Clone, Default)]
pub struct TeamProfile {
    pub team_id: i64,
    pub city: Option<String>,
    pub name: Option<String>,
    pub abbreviation: Option<String>,
    pub attributes: Map<String, Value>,
}

/// Enrichment from the player-detail endpoint; marks the player complete.
#[derive(Debug, Clone, Default)]
pub struct PlayerProfile {
    pub player_id: i64,
    pub display_name: String,
    pub team_ref: Option<i64>,
    pub attributes: Map<String, Value>,
}

/// Scoreboard header for one game.
#[derive(Debug, Clone)]
pub struct GameHeader {
    pub game_id: i64,
    pub game_date: NaiveDate,
    pub game_sequence: Option<i64>,
    pub home_team_ref: i64,
    pub visitor_team_ref: i64,
    pub season: i64,
    pub season_type: String,
    pub attributes: Map<String, Value>,
}

const TEAM_COLUMNS: &str = "id, team_id, city, name, abbreviation, attributes";
const PLAYER_COLUMNS: &str = "id, player_id, display_name, team_ref, is_complete, attributes";
const GAME_COLUMNS: &str = "id, game_id, game_date, game_sequence, home_team_ref, \
                            visitor_team_ref, season, season_type, attributes";

fn encode(attrs: &Map<String, Value>) -> Result<String> {
    Ok(serde_json::to_string(attrs)?)
}

pub async fn find_team(db: &Db, team_id: i64) -> Result<Option<Team>> {
    let sql = format!("SELECT {TEAM_COLUMNS} FROM teams WHERE team_id = ?");
    Ok(sqlx::query_as::<_, Team>(&sql)
        .bind(team_id)
        .fetch_optional(&db.pool)
        .await?)
}

pub async fn find_team_by_ref(db: &Db, id: i64) -> Result<Option<Team>> {
    let sql = format!("SELECT {TEAM_COLUMNS} FROM teams WHERE id = ?");
    Ok(sqlx::query_as::<_, Team>(&sql)
        .bind(id)
        .fetch_optional(&db.pool)
        .await?)
}

pub async fn find_player(db: &Db, player_id: i64) -> Result<Option<Player>> {
    let sql = format!("SELECT {PLAYER_COLUMNS} FROM players WHERE player_id = ?");
    Ok(sqlx::query_as::<_, Player>(&sql)
        .bind(player_id)
        .fetch_optional(&db.pool)
        .await?)
}

pub async fn find_game(db: &Db, game_id: i64) -> Result<Option<Game>> {
    let sql = format!("SELECT {GAME_COLUMNS} FROM games WHERE game_id = ?");
    Ok(sqlx::query_as::<_, Game>(&sql)
        .bind(game_id)
        .fetch_optional(&db.pool)
        .await?)
}

pub async fn list_teams(db: &Db) -> Result<Vec<Team>> {
    let sql = format!("SELECT {TEAM_COLUMNS} FROM teams ORDER BY team_id");
    Ok(sqlx::query_as::<_, Team>(&sql).fetch_all(&db.pool).await?)
}

pub async fn list_players(db: &Db, only_incomplete: bool) -> Result<Vec<Player>> {
    let sql = if only_incomplete {
        format!("SELECT {PLAYER_COLUMNS} FROM players WHERE is_complete = 0 ORDER BY player_id")
    } else {
        format!("SELECT {PLAYER_COLUMNS} FROM players ORDER BY player_id")
    };
    Ok(sqlx::query_as::<_, Player>(&sql).fetch_all(&db.pool).await?)
}

pub async fn games_for_season(db: &Db, season: i64) -> Result<Vec<Game>> {
    let sql = format!(
        "SELECT {GAME_COLUMNS} FROM games WHERE season = ? ORDER BY game_date, game_sequence"
    );
    Ok(sqlx::query_as::<_, Game>(&sql)
        .bind(season)
        .fetch_all(&db.pool)
        .await?)
}

/// Most recent ingested game date for a season.
pub async fn latest_game_date(db: &Db, season: i64) -> Result<Option<NaiveDate>> {
    Ok(
        sqlx::query_scalar::<_, Option<NaiveDate>>(
            "SELECT MAX(game_date) FROM games WHERE season = ?",
        )
        .bind(season)
        .fetch_one(&db.pool)
        .await?,
    )
}

#[instrument(skip(db, profile), fields(team_id = profile.team_id))]
pub async fn upsert_team_profile(db: &Db, profile: &TeamProfile) -> Result<Team> {
    let sql = format!(
        "INSERT INTO teams (team_id, city, name, abbreviation, attributes) VALUES (?, ?, ?, ?, ?) \
         ON CONFLICT(team_id) DO UPDATE SET \
           city = COALESCE(excluded.city, teams.city), \
           name = COALESCE(excluded.name, teams.name), \
           abbreviation = COALESCE(excluded.abbreviation, teams.abbreviation), \
           attributes = json_patch(teams.attributes, excluded.attributes), \
           updated_at = CURRENT_TIMESTAMP \
         RETURNING {TEAM_COLUMNS}"
    );
    let team = sqlx::query_as::<_, Team>(&sql)
        .bind(profile.team_id)
        .bind(profile.city.as_deref())
        .bind(profile.name.as_deref())
        .bind(profile.abbreviation.as_deref())
        .bind(encode(&profile.attributes)?)
        .fetch_one(&db.pool)
        .await?;
    Ok(team)
}

#[instrument(skip(db, profile), fields(player_id = profile.player_id))]
pub async fn upsert_player_profile(db: &Db, profile: &PlayerProfile) -> Result<Player> {
    let sql = format!(
        "INSERT INTO players (player_id, display_name, team_ref, is_complete, attributes) \
         VALUES (?, ?, ?, 1, ?) \
         ON CONFLICT(player_id) DO UPDATE SET \
           display_name = excluded.display_name, \
           team_ref = COALESCE(excluded.team_ref, players.team_ref), \
           is_complete = 1, \
           attributes = json_patch(players.attributes, excluded.attributes), \
           updated_at = CURRENT_TIMESTAMP \
         RETURNING {PLAYER_COLUMNS}"
    );
    let player = sqlx::query_as::<_, Player>(&sql)
        .bind(profile.player_id)
        .bind(&profile.display_name)
        .bind(profile.team_ref)
        .bind(encode(&profile.attributes)?)
        .fetch_one(&db.pool)
        .await?;
    Ok(player)
}

/// Roster-list seeding: creates or refreshes a player without touching `is_complete`.
#[instrument(skip(db, profile), fields(player_id = profile.player_id))]
pub async fn seed_player(db: &Db, profile: &PlayerProfile) -> Result<(Player, bool)> {
    let existed = find_player(db, profile.player_id).await?.is_some();
    let sql = format!(
        "INSERT INTO players (player_id, display_name, team_ref, is_complete, attributes) \
         VALUES (?, ?, ?, 0, ?) \
         ON CONFLICT(player_id) DO UPDATE SET \
           team_ref = COALESCE(excluded.team_ref, players.team_ref), \
           attributes = json_patch(players.attributes, excluded.attributes), \
           updated_at = CURRENT_TIMESTAMP \
         RETURNING {PLAYER_COLUMNS}"
    );
    let player = sqlx::query_as::<_, Player>(&sql)
        .bind(profile.player_id)
        .bind(&profile.display_name)
        .bind(profile.team_ref)
        .bind(encode(&profile.attributes)?)
        .fetch_one(&db.pool)
        .await?;
    Ok((player, !existed))
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Coach {
    pub id: i64,
    pub coach_key: String,
    pub display_name: String,
}

pub async fn list_coaches(db: &Db) -> Result<Vec<Coach>> {
    Ok(sqlx::query_as::<_, Coach>(
        "SELECT id, coach_key, display_name FROM coaches ORDER BY coach_key",
    )
    .fetch_all(&db.pool)
    .await?)
}

/// Insert the game if its provider id is new; existing games are returned untouched.
#[instrument(skip(db, header), fields(game_id = header.game_id))]
pub async fn ensure_game(db: &Db, header: &GameHeader) -> Result<(Game, bool)> {
    let inserted: Option<i64> = sqlx::query_scalar(
        "INSERT INTO games (game_id, game_date, game_sequence, home_team_ref, visitor_team_ref, \
                            season, season_type, attributes) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(game_id) DO NOTHING RETURNING id",
    )
    .bind(header.game_id)
    .bind(header.game_date)
    .bind(header.game_sequence)
    .bind(header.home_team_ref)
    .bind(header.visitor_team_ref)
    .bind(header.season)
    .bind(&header.season_type)
    .bind(encode(&header.attributes)?)
    .fetch_optional(&db.pool)
    .await?;

    let game = find_game(db, header.game_id)
        .await?
        .ok_or(EtlError::EntityResolution {
            entity: "game",
            external_id: header.game_id,
        })?;
    Ok((game, inserted.is_some()))
}

/// Merge summary attributes (attendance, game time, status) into a game row.
#[instrument(skip(db, attributes))]
pub async fn merge_game_attributes(
    db: &Db,
    game_ref: i64,
    attributes: &Map<String, Value>,
) -> Result<()> {
    sqlx::query(
        "UPDATE games SET attributes = json_patch(attributes, ?), updated_at = CURRENT_TIMESTAMP \
         WHERE id = ?",
    )
    .bind(encode(attributes)?)
    .bind(game_ref)
    .execute(&db.pool)
    .await?;
    Ok(())
}

/// Kinds written by the game-day bulk insert, besides the `*BoxScore` families.
pub const GAME_DEPENDENT_KINDS: &[&str] = &[
    "LineScore",
    "GameOtherStats",
    "GameOfficialXref",
    "PlayByPlayEvent",
];

/// Whether the game-day pipeline already stored the game's summary, box scores or play-by-play.
/// Game logs and shot charts reference games too but do not count.
pub async fn game_has_dependents(db: &Db, game_ref: i64) -> Result<bool> {
    let placeholders = vec!["?"; GAME_DEPENDENT_KINDS.len()].join(", ");
    let sql = format!(
        "SELECT EXISTS(SELECT 1 FROM stat_records WHERE game_ref = ? \
         AND (kind IN ({placeholders}) OR kind LIKE '%BoxScore'))"
    );
    let mut query = sqlx::query_scalar::<_, bool>(&sql).bind(game_ref);
    for kind in GAME_DEPENDENT_KINDS {
        query = query.bind(*kind);
    }
    Ok(query.fetch_one(&db.pool).await?)
}

#[instrument(skip(db))]
pub async fn ensure_official(
    db: &Db,
    official_id: i64,
    first_name: Option<&str>,
    last_name: Option<&str>,
    jersey_num: Option<&str>,
) -> Result<(i64, bool)> {
    let inserted: Option<i64> = sqlx::query_scalar(
        "INSERT INTO officials (official_id, first_name, last_name, jersey_num) VALUES (?, ?, ?, ?) \
         ON CONFLICT(official_id) DO NOTHING RETURNING id",
    )
    .bind(official_id)
    .bind(first_name)
    .bind(last_name)
    .bind(jersey_num)
    .fetch_optional(&db.pool)
    .await?;
    if let Some(id) = inserted {
        debug!(official_id, "created official");
        return Ok((id, true));
    }
    let id: i64 = sqlx::query_scalar("SELECT id FROM officials WHERE official_id = ?")
        .bind(official_id)
        .fetch_one(&db.pool)
        .await?;
    Ok((id, false))
}

#[instrument(skip(db, attributes))]
pub async fn upsert_coach(
    db: &Db,
    coach_key: &str,
    display_name: &str,
    attributes: &Map<String, Value>,
) -> Result<i64> {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO coaches (coach_key, display_name, attributes) VALUES (?, ?, ?) \
         ON CONFLICT(coach_key) DO UPDATE SET \
           display_name = excluded.display_name, \
           attributes = json_patch(coaches.attributes, excluded.attributes), \
           updated_at = CURRENT_TIMESTAMP \
         RETURNING id",
    )
    .bind(coach_key)
    .bind(display_name)
    .bind(encode(attributes)?)
    .fetch_one(&db.pool)
    .await?;
    Ok(id)
}

/// Per-run resolver cache keyed by provider id.
///
/// `*_strict` lookups fail with [`EtlError::EntityResolution`] when the entity is unknown;
/// `*_or_create` lookups insert a minimal stand-in when a fallback name is available.
#[derive(Clone)]
pub struct EntityCache {
    db: Db,
    teams: HashMap<i64, Team>,
    players: HashMap<i64, Player>,
    games: HashMap<i64, Game>,
    created_teams: usize,
    created_players: usize,
}

impl EntityCache {
    pub fn new(db: Db) -> Self {
        Self {
            db,
            teams: HashMap::new(),
            players: HashMap::new(),
            games: HashMap::new(),
            created_teams: 0,
            created_players: 0,
        }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Drop everything cached; called at run boundaries.
    pub fn clear(&mut self) {
        self.teams.clear();
        self.players.clear();
        self.games.clear();
    }

    pub fn created_counts(&self) -> (usize, usize) {
        (self.created_teams, self.created_players)
    }

    pub async fn resolve_team_strict(&mut self, team_id: i64) -> Result<Team> {
        self.resolve_team_or_create(team_id, None).await
    }

    #[instrument(skip(self))]
    pub async fn resolve_team_or_create(
        &mut self,
        team_id: i64,
        fallback_name: Option<&str>,
    ) -> Result<Team> {
        if let Some(team) = self.teams.get(&team_id) {
            return Ok(team.clone());
        }
        let team = match find_team(&self.db, team_id).await? {
            Some(team) => team,
            None => {
                let Some(name) = fallback_name else {
                    return Err(EtlError::EntityResolution {
                        entity: "team",
                        external_id: team_id,
                    });
                };
                let inserted: Option<i64> = sqlx::query_scalar(
                    "INSERT INTO teams (team_id, name) VALUES (?, ?) \
                     ON CONFLICT(team_id) DO NOTHING RETURNING id",
                )
                .bind(team_id)
                .bind(name)
                .fetch_optional(&self.db.pool)
                .await?;
                if inserted.is_some() {
                    self.created_teams += 1;
                    info!(team_id, name, "created stand-in team");
                }
                find_team(&self.db, team_id)
                    .await?
                    .ok_or(EtlError::EntityResolution {
                        entity: "team",
                        external_id: team_id,
                    })?
            }
        };
        self.teams.insert(team_id, team.clone());
        Ok(team)
    }

    pub async fn resolve_player_strict(&mut self, player_id: i64) -> Result<Player> {
        self.resolve_player_or_create(player_id, None, None).await
    }

    /// Stand-ins are stored as incomplete players until the detail sync runs.
    #[instrument(skip(self))]
    pub async fn resolve_player_or_create(
        &mut self,
        player_id: i64,
        fallback_name: Option<&str>,
        team_ref: Option<i64>,
    ) -> Result<Player> {
        if let Some(player) = self.players.get(&player_id) {
            return Ok(player.clone());
        }
        let player = match find_player(&self.db, player_id).await? {
            Some(player) => player,
            None => {
                let Some(name) = fallback_name else {
                    return Err(EtlError::EntityResolution {
                        entity: "player",
                        external_id: player_id,
                    });
                };
                let inserted: Option<i64> = sqlx::query_scalar(
                    "INSERT INTO players (player_id, display_name, team_ref, is_complete) \
                     VALUES (?, ?, ?, 0) ON CONFLICT(player_id) DO NOTHING RETURNING id",
                )
                .bind(player_id)
                .bind(name)
                .bind(team_ref)
                .fetch_optional(&self.db.pool)
                .await?;
                if inserted.is_some() {
                    self.created_players += 1;
                    info!(player_id, name, "created incomplete player");
                }
                find_player(&self.db, player_id)
                    .await?
                    .ok_or(EtlError::EntityResolution {
                        entity: "player",
                        external_id: player_id,
                    })?
            }
        };
        self.players.insert(player_id, player.clone());
        Ok(player)
    }

    /// Games are never invented.
    #[instrument(skip(self))]
    pub async fn resolve_game_strict(&mut self, game_id: i64) -> Result<Game> {
        if let Some(game) = self.games.get(&game_id) {
            return Ok(game.clone());
        }
        let game = find_game(&self.db, game_id)
            .await?
            .ok_or(EtlError::EntityResolution {
                entity: "game",
                external_id: game_id,
            })?;
        self.games.insert(game_id, game.clone());
        Ok(game)
    }

    /// Replace cached copies after a write elsewhere (profile sync, new game).
    pub fn remember_team(&mut self, team: Team) {
        self.teams.insert(team.team_id, team);
    }

    pub fn remember_player(&mut self, player: Player) {
        self.players.insert(player.player_id, player);
    }

    pub fn remember_game(&mut self, game: Game) {
        self.games.insert(game.game_id, game);
    }
}
