//! One module per provider surface. Each unit function fetches one parameter combination and
//! walks it through classify → normalize → resolve → upsert on an [`IngestContext`].

pub mod coaches;
pub mod dashboards;
pub mod game_logs;
pub mod games;
pub mod lineups;
pub mod on_off;
pub mod players;
pub mod seasons;
pub mod shot_charts;
pub mod teams;
pub mod tracking;

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::classify::classify;
use crate::database_ops::records::upsert;
use crate::database_ops::{Db, EntityCache};
use crate::error::{EtlError, Result};
use crate::fetch::{combination_label, HtmlSource, Params, StatSource};
use crate::normalization::season::season_label;
use crate::normalization::FieldNormalizer;
use crate::orchestrator::RunState;
use crate::payload::{value_as_i64, value_as_string, Payload, Row, StatPayload};
use crate::registry::{unique_key, RecordKind, Registry};

/// Season year plus the provider's season-type spelling ("Regular Season", "Playoffs").
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeasonScope {
    pub season: i32,
    pub season_type: String,
}

impl SeasonScope {
    pub fn new(season: i32, season_type: impl Into<String>) -> Self {
        Self {
            season,
            season_type: season_type.into(),
        }
    }

    pub fn label(&self) -> String {
        season_label(self.season)
    }
}

/// A row dropped from a unit without aborting it.
#[derive(Debug, Clone, Serialize)]
pub struct RowFailure {
    pub combination: String,
    pub category: String,
    pub message: String,
}

/// What one unit of work did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UnitOutcome {
    pub created: usize,
    pub updated: usize,
    pub skipped_rows: usize,
    /// The provider answered with a `Message` instead of data.
    pub unavailable: bool,
    pub row_failures: Vec<RowFailure>,
}

impl UnitOutcome {
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn record(&mut self, created: bool) {
        if created {
            self.created += 1;
        } else {
            self.updated += 1;
        }
    }

    pub fn merge(&mut self, other: UnitOutcome) {
        self.created += other.created;
        self.updated += other.updated;
        self.skipped_rows += other.skipped_rows;
        self.unavailable = self.unavailable && other.unavailable;
        self.row_failures.extend(other.row_failures);
    }

    pub fn written(&self) -> usize {
        self.created + self.updated
    }
}

/// Everything a unit needs: store, resolver cache, rule tables and the fetch collaborators.
pub struct IngestContext {
    pub db: Db,
    pub entities: EntityCache,
    pub registry: Arc<Registry>,
    pub normalizer: FieldNormalizer,
    pub source: Arc<dyn StatSource>,
    pub html: Option<Arc<dyn HtmlSource>>,
    state: RunState,
}

impl IngestContext {
    pub fn new(db: Db, source: Arc<dyn StatSource>) -> Self {
        Self {
            entities: EntityCache::new(db.clone()),
            db,
            registry: Arc::new(Registry::standard()),
            normalizer: FieldNormalizer::standard(),
            source,
            html: None,
            state: RunState::Idle,
        }
    }

    pub fn with_html(mut self, html: Arc<dyn HtmlSource>) -> Self {
        self.html = Some(html);
        self
    }

    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Move the run state machine; an illegal transition is a configuration error.
    pub fn enter(&mut self, next: RunState) -> Result<()> {
        if !self.state.can_transition(next) {
            return Err(EtlError::Configuration(format!(
                "illegal run state transition {:?} -> {:?}",
                self.state, next
            )));
        }
        debug!(from = ?self.state, to = ?next, "run state");
        self.state = next;
        Ok(())
    }

    /// Leave a half-processed step (one game of a game day, say) so the next one can start.
    pub(crate) fn abandon_step(&mut self) -> Result<()> {
        self.enter(RunState::Advancing)?;
        self.enter(RunState::Idle)
    }

    /// `Failed` is reachable from every state, including a state a broken unit left behind.
    pub(crate) fn mark_failed(&mut self) {
        debug!(from = ?self.state, "run state -> Failed");
        self.state = RunState::Failed;
    }

    /// Run boundary: forget cached entities and return to `Idle`.
    pub fn reset(&mut self) {
        self.entities.clear();
        self.state = RunState::Idle;
    }

    /// Fetch one combination. `None` means the provider has no data for it.
    pub async fn fetch(&mut self, endpoint: &str, params: &Params) -> Result<Option<StatPayload>> {
        self.enter(RunState::Fetching)?;
        match self.source.fetch(endpoint, params).await? {
            Payload::Unavailable { message } => {
                info!(
                    combination = %combination_label(endpoint, params),
                    message = %message,
                    "provider has no data for combination; skipping"
                );
                Ok(None)
            }
            Payload::Data(payload) => Ok(Some(payload)),
        }
    }

    pub fn html_source(&self) -> Result<Arc<dyn HtmlSource>> {
        self.html
            .clone()
            .ok_or_else(|| EtlError::Configuration("no reference-site source configured".into()))
    }

    /// Team row id for the provider id under `key`; unknown teams fail the row.
    pub async fn team_ref(&mut self, raw: &Row, key: &str) -> Result<i64> {
        let team_id = required_id(raw, key)?;
        Ok(self.entities.resolve_team_strict(team_id).await?.id)
    }

    /// Player row id for the provider id under `key`; unknown players fail the row.
    pub async fn player_ref(&mut self, raw: &Row, key: &str) -> Result<i64> {
        let player_id = required_id(raw, key)?;
        Ok(self.entities.resolve_player_strict(player_id).await?.id)
    }

    /// Player row id, creating an incomplete player named by `name_key` when unknown.
    pub async fn player_ref_or_create(
        &mut self,
        raw: &Row,
        id_key: &str,
        name_key: &str,
        team_ref: Option<i64>,
    ) -> Result<i64> {
        let player_id = required_id(raw, id_key)?;
        let name = raw.get(name_key).and_then(value_as_string);
        let player = self
            .entities
            .resolve_player_or_create(player_id, name.as_deref(), team_ref)
            .await?;
        Ok(player.id)
    }

    /// Classify a resolved row, derive its natural key and upsert it.
    ///
    /// Failures are logged with the combination and row before they abort the unit.
    pub async fn store(
        &mut self,
        resource: &str,
        request: &Row,
        fields: &Row,
        combination: &str,
    ) -> Result<bool> {
        let registry = Arc::clone(&self.registry);
        let kind = classify(&registry, resource, request, fields)
            .inspect_err(|err| log_row_error(combination, fields, err))?;
        self.store_as(kind, fields, combination).await
    }

    /// Upsert a row whose kind is already known.
    pub async fn store_as(
        &mut self,
        kind: &RecordKind,
        fields: &Row,
        combination: &str,
    ) -> Result<bool> {
        let key = unique_key(kind, fields).inspect_err(|err| log_row_error(combination, fields, err))?;
        let (_, created) = upsert(&self.db, kind, fields, &key)
            .await
            .inspect_err(|err| log_row_error(combination, fields, err))?;
        Ok(created)
    }
}

fn log_row_error(combination: &str, row: &Row, err: &EtlError) {
    let row = Value::Object(row.clone());
    warn!(
        combination = %combination,
        category = err.category(),
        row = %row,
        error = %err,
        "row failed; aborting unit"
    );
}

/// Keep going on row-scoped errors, propagate everything else.
pub(crate) fn absorb_row_error(
    outcome: &mut UnitOutcome,
    combination: &str,
    raw: &Row,
    err: EtlError,
) -> Result<()> {
    if !err.is_row_scoped() {
        log_row_error(combination, raw, &err);
        return Err(err);
    }
    warn!(
        combination = %combination,
        category = err.category(),
        error = %err,
        "row skipped"
    );
    outcome.row_failures.push(RowFailure {
        combination: combination.to_string(),
        category: err.category().to_string(),
        message: err.to_string(),
    });
    Ok(())
}

/// Request parameters as a row, which is what classification reads.
pub fn params_row(params: &Params) -> Row {
    params
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect()
}

pub(crate) fn required_id(raw: &Row, key: &str) -> Result<i64> {
    raw.get(key)
        .and_then(value_as_i64)
        .ok_or_else(|| EtlError::payload(format!("row has no usable {key}")))
}

/// Provider ids of zero stand for "none" (traded-season rows, team events in play-by-play).
pub(crate) fn optional_id(raw: &Row, key: &str) -> Option<i64> {
    raw.get(key).and_then(value_as_i64).filter(|id| *id != 0)
}

/// Season bookkeeping stamped onto dashboard rows before normalization.
pub(crate) fn stamp_scope(raw: &mut Row, scope: &SeasonScope, per_mode: &str) {
    raw.insert("SEASON".into(), Value::from(scope.season));
    raw.insert(
        "SEASON_TYPE".into(),
        Value::String(scope.season_type.clone()),
    );
    raw.insert("PER_MODE".into(), Value::String(per_mode.to_string()));
}

pub(crate) fn is_null_or_missing(row: &Row, key: &str) -> bool {
    row.get(key).map_or(true, Value::is_null)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::database_ops::entities::{upsert_player_profile, upsert_team_profile};
    use crate::database_ops::entities::{PlayerProfile, TeamProfile};
    use crate::fetch::scripted::ScriptedSource;
    use serde_json::Map;

    pub async fn context(source: ScriptedSource) -> IngestContext {
        let db = Db::connect_in_memory().await.unwrap();
        IngestContext::new(db, Arc::new(source))
    }

    pub async fn seed_team(ctx: &IngestContext, team_id: i64, abbreviation: &str) -> i64 {
        upsert_team_profile(
            &ctx.db,
            &TeamProfile {
                team_id,
                city: None,
                name: Some(abbreviation.to_string()),
                abbreviation: Some(abbreviation.to_string()),
                attributes: Map::new(),
            },
        )
        .await
        .unwrap()
        .id
    }

    pub async fn seed_player(ctx: &IngestContext, player_id: i64, name: &str) -> i64 {
        upsert_player_profile(
            &ctx.db,
            &PlayerProfile {
                player_id,
                display_name: name.to_string(),
                team_ref: None,
                attributes: Map::new(),
            },
        )
        .await
        .unwrap()
        .id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::scripted::ScriptedSource;

    #[test]
    fn merge_keeps_unavailable_only_when_both_were() {
        let mut first = UnitOutcome::unavailable();
        first.merge(UnitOutcome {
            created: 2,
            ..UnitOutcome::default()
        });
        assert!(!first.unavailable);
        assert_eq!(first.written(), 2);
    }

    #[tokio::test]
    async fn row_scoped_errors_are_absorbed() {
        let mut outcome = UnitOutcome::default();
        absorb_row_error(
            &mut outcome,
            "leaguedashplayerstats",
            &Row::new(),
            EtlError::EntityResolution {
                entity: "player",
                external_id: 1,
            },
        )
        .unwrap();
        assert_eq!(outcome.row_failures.len(), 1);

        let mut raw = Row::new();
        raw.insert("PLAYER_ID".into(), Value::from(2544));
        raw.insert("PTS".into(), Value::from("n/a"));
        let err = absorb_row_error(
            &mut outcome,
            "leaguedashplayerstats",
            &raw,
            EtlError::payload("bad"),
        )
        .unwrap_err();
        assert_eq!(err.category(), "payload");
        assert_eq!(outcome.row_failures.len(), 1);
    }

    #[tokio::test]
    async fn illegal_transition_is_rejected() {
        let mut ctx = test_support::context(ScriptedSource::new()).await;
        let err = ctx.enter(RunState::Upserting).unwrap_err();
        assert!(err.is_fatal());
        ctx.enter(RunState::Fetching).unwrap();
        ctx.enter(RunState::Classifying).unwrap();
        assert_eq!(ctx.state(), RunState::Classifying);
    }
}
