//! Statistical record persistence: natural-key upsert and per-game bulk insert.

use serde_json::Value;
use sqlx::types::Json;
use sqlx::{QueryBuilder, Sqlite};
use tracing::{debug, instrument};

use super::db::Db;
use crate::error::Result;
use crate::payload::{value_as_i64, Row};
use crate::registry::{NaturalKey, RecordKind};

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct StatRecord {
    pub id: i64,
    pub kind: String,
    pub natural_key: String,
    pub player_ref: Option<i64>,
    pub team_ref: Option<i64>,
    pub game_ref: Option<i64>,
    pub season: Option<i64>,
    pub fields: Json<Row>,
}

impl StatRecord {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.0.get(name)
    }
}

/// A fully resolved record ready for [`bulk_insert`].
#[derive(Debug, Clone)]
pub struct PreparedRecord {
    pub kind: String,
    pub key: NaturalKey,
    pub fields: Row,
}

#[derive(Debug, Clone, Copy, Default)]
struct RecordRefs {
    player: Option<i64>,
    team: Option<i64>,
    game: Option<i64>,
    season: Option<i64>,
}

impl RecordRefs {
    fn from_fields(fields: &Row) -> Self {
        let get = |key: &str| fields.get(key).and_then(value_as_i64);
        Self {
            player: get("player"),
            team: get("team"),
            game: get("game"),
            season: get("season"),
        }
    }
}

const RECORD_COLUMNS: &str =
    "id, kind, natural_key, player_ref, team_ref, game_ref, season, fields";

/// Create-or-update by natural key inside one transaction.
///
/// On conflict the supplied fields overwrite the stored ones field by field; fields that were
/// not supplied keep their stored values. Returns the stored record and whether it was created.
#[instrument(skip(db, kind, fields, key), fields(kind = %kind.name))]
pub async fn upsert(
    db: &Db,
    kind: &RecordKind,
    fields: &Row,
    key: &NaturalKey,
) -> Result<(StatRecord, bool)> {
    let encoded_key = key.encoded();
    let refs = RecordRefs::from_fields(fields);
    let mut tx = db.pool.begin().await?;

    let inserted: Option<i64> = sqlx::query_scalar(
        "INSERT INTO stat_records (kind, natural_key, player_ref, team_ref, game_ref, season, fields) \
         VALUES (?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(kind, natural_key) DO NOTHING RETURNING id",
    )
    .bind(&kind.name)
    .bind(&encoded_key)
    .bind(refs.player)
    .bind(refs.team)
    .bind(refs.game)
    .bind(refs.season)
    .bind(serde_json::to_string(fields)?)
    .fetch_optional(&mut *tx)
    .await?;

    let created = inserted.is_some();
    if !created {
        let select = format!(
            "SELECT {RECORD_COLUMNS} FROM stat_records WHERE kind = ? AND natural_key = ?"
        );
        let existing = sqlx::query_as::<_, StatRecord>(&select)
            .bind(&kind.name)
            .bind(&encoded_key)
            .fetch_one(&mut *tx)
            .await?;
        let mut merged = existing.fields.0;
        for (name, value) in fields {
            merged.insert(name.clone(), value.clone());
        }
        sqlx::query(
            "UPDATE stat_records SET fields = ?, \
               player_ref = COALESCE(?, player_ref), team_ref = COALESCE(?, team_ref), \
               game_ref = COALESCE(?, game_ref), season = COALESCE(?, season), \
               updated_at = CURRENT_TIMESTAMP \
             WHERE id = ?",
        )
        .bind(serde_json::to_string(&merged)?)
        .bind(refs.player)
        .bind(refs.team)
        .bind(refs.game)
        .bind(refs.season)
        .bind(existing.id)
        .execute(&mut *tx)
        .await?;
    }

    let select = format!("SELECT {RECORD_COLUMNS} FROM stat_records WHERE kind = ? AND natural_key = ?");
    let record = sqlx::query_as::<_, StatRecord>(&select)
        .bind(&kind.name)
        .bind(&encoded_key)
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;

    debug!(natural_key = %encoded_key, created, "upserted record");
    Ok((record, created))
}

// Seven binds per row keeps each statement well under SQLite's variable limit.
const BULK_CHUNK: usize = 500;

/// Insert game dependents without existence checks, all in one transaction.
///
/// The caller guarantees the records are new. A repeated natural key fails the whole batch with
/// a database error instead of duplicating rows.
#[instrument(skip(db, records), fields(count = records.len()))]
pub async fn bulk_insert(db: &Db, records: &[PreparedRecord]) -> Result<usize> {
    if records.is_empty() {
        return Ok(0);
    }
    let mut encoded = Vec::with_capacity(records.len());
    for record in records {
        encoded.push((
            record,
            record.key.encoded(),
            RecordRefs::from_fields(&record.fields),
            serde_json::to_string(&record.fields)?,
        ));
    }

    let mut tx = db.pool.begin().await?;
    for chunk in encoded.chunks(BULK_CHUNK) {
        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
            "INSERT INTO stat_records (kind, natural_key, player_ref, team_ref, game_ref, season, fields) ",
        );
        qb.push_values(chunk, |mut b, (record, key, refs, fields)| {
            b.push_bind(record.kind.as_str())
                .push_bind(key.as_str())
                .push_bind(refs.player)
                .push_bind(refs.team)
                .push_bind(refs.game)
                .push_bind(refs.season)
                .push_bind(fields.as_str());
        });
        qb.build().execute(&mut *tx).await?;
    }
    tx.commit().await?;
    Ok(records.len())
}

pub async fn find_record(db: &Db, kind: &str, key: &NaturalKey) -> Result<Option<StatRecord>> {
    let select = format!("SELECT {RECORD_COLUMNS} FROM stat_records WHERE kind = ? AND natural_key = ?");
    Ok(sqlx::query_as::<_, StatRecord>(&select)
        .bind(kind)
        .bind(key.encoded())
        .fetch_optional(&db.pool)
        .await?)
}

pub async fn records_of_kind(db: &Db, kind: &str) -> Result<Vec<StatRecord>> {
    let select = format!("SELECT {RECORD_COLUMNS} FROM stat_records WHERE kind = ? ORDER BY id");
    Ok(sqlx::query_as::<_, StatRecord>(&select)
        .bind(kind)
        .fetch_all(&db.pool)
        .await?)
}

pub async fn count_records(db: &Db, kind: &str) -> Result<i64> {
    Ok(
        sqlx::query_scalar("SELECT COUNT(*) FROM stat_records WHERE kind = ?")
            .bind(kind)
            .fetch_one(&db.pool)
            .await?,
    )
}

/// Record counts per kind, for run reports.
pub async fn count_by_kind(db: &Db) -> Result<Vec<(String, i64)>> {
    Ok(sqlx::query_as::<_, (String, i64)>(
        "SELECT kind, COUNT(*) FROM stat_records GROUP BY kind ORDER BY kind",
    )
    .fetch_all(&db.pool)
    .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{unique_key, Registry};
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn second_upsert_updates_in_place() {
        let db = Db::connect_in_memory().await.unwrap();
        let registry = Registry::standard();
        let kind = registry.by_name("TeamMiscSplit").unwrap();
        sqlx::query("INSERT INTO teams (team_id, name) VALUES (1610612744, 'Warriors')")
            .execute(&db.pool)
            .await
            .unwrap();

        let first = row(json!({
            "team": 1, "season": 2016, "season_type": "Regular Season", "per_mode": "Totals",
            "group_set": "Overall", "group_value": "Overall", "pts_second_chance": 12,
            "pts_paint": 40
        }));
        let key = unique_key(kind, &first).unwrap();
        let (record, created) = upsert(&db, kind, &first, &key).await.unwrap();
        assert!(created);
        assert_eq!(record.team_ref, Some(1));

        let second = row(json!({
            "team": 1, "season": 2016, "season_type": "RegularSeason", "per_mode": "Totals",
            "group_set": "Overall", "group_value": "Overall", "pts_second_chance": 14
        }));
        let key2 = unique_key(kind, &second).unwrap();
        let (updated, created) = upsert(&db, kind, &second, &key2).await.unwrap();
        assert!(!created);
        assert_eq!(updated.id, record.id);
        assert_eq!(updated.field("pts_second_chance"), Some(&json!(14)));
        assert_eq!(updated.field("pts_paint"), Some(&json!(40)));
        assert_eq!(count_records(&db, "TeamMiscSplit").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn repeated_bulk_insert_is_rejected() {
        let db = Db::connect_in_memory().await.unwrap();
        let registry = Registry::standard();
        let kind = registry.by_name("PlayByPlayEvent").unwrap();
        let fields = row(json!({"eventnum": 2, "homedescription": "Jump Ball"}));
        let mut keyed = fields.clone();
        keyed.insert("game".into(), json!(7));
        let prepared = vec![PreparedRecord {
            kind: kind.name.clone(),
            key: unique_key(kind, &keyed).unwrap(),
            fields,
        }];

        assert_eq!(bulk_insert(&db, &prepared).await.unwrap(), 1);
        assert!(bulk_insert(&db, &prepared).await.is_err());
        assert_eq!(count_records(&db, "PlayByPlayEvent").await.unwrap(), 1);
    }
}
