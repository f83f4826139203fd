//! Lineup persistence. A lineup is identified by its scalar key plus the exact player set.

use itertools::Itertools;
use sqlx::types::Json;
use sqlx::{QueryBuilder, Sqlite};
use tracing::{debug, instrument};

use super::db::Db;
use crate::error::{EtlError, Result};
use crate::payload::{value_as_i64, Row};
use crate::registry::{NaturalKey, RecordKind};

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct LineupRecord {
    pub id: i64,
    pub kind: String,
    pub natural_key: String,
    pub roster_key: String,
    pub team_ref: Option<i64>,
    pub fields: Json<Row>,
}

const LINEUP_COLUMNS: &str = "id, kind, natural_key, roster_key, team_ref, fields";

/// Sorted, de-duplicated roster joined with "-".
pub fn roster_key(roster: &[i64]) -> String {
    roster.iter().sorted().dedup().join("-")
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

/// Ids of lineups of `kind` with the same scalar key whose roster equals `roster` exactly.
async fn matching_lineups(
    tx: &mut sqlx::SqliteConnection,
    kind: &str,
    key: &str,
    roster: &[i64],
) -> Result<Vec<i64>> {
    let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
        "SELECT l.id FROM lineups l JOIN lineup_players lp ON lp.lineup_id = l.id WHERE l.kind = ",
    );
    qb.push_bind(kind)
        .push(" AND l.natural_key = ")
        .push_bind(key)
        .push(" GROUP BY l.id HAVING COUNT(*) = ")
        .push_bind(roster.len() as i64)
        .push(" AND SUM(CASE WHEN lp.player_ref IN (");
    let mut members = qb.separated(", ");
    for player_ref in roster {
        members.push_bind(*player_ref);
    }
    members.push_unseparated(") THEN 1 ELSE 0 END) = ");
    qb.push_bind(roster.len() as i64);

    Ok(qb.build_query_scalar::<i64>().fetch_all(&mut *tx).await?)
}

/// Match on scalar key + exact roster; update the match or insert row and roster together.
///
/// More than one stored match, or a concurrent insert of the same roster, is reported as
/// [`EtlError::DuplicateLineup`].
#[instrument(skip(db, kind, fields, key), fields(kind = %kind.name, roster = ?roster))]
pub async fn upsert_lineup(
    db: &Db,
    kind: &RecordKind,
    fields: &Row,
    key: &NaturalKey,
    roster: &[i64],
) -> Result<(LineupRecord, bool)> {
    let roster: Vec<i64> = roster.iter().copied().sorted().dedup().collect();
    if !(2..=5).contains(&roster.len()) {
        return Err(EtlError::payload(format!(
            "lineup roster must hold 2-5 players, got {}",
            roster.len()
        )));
    }
    let encoded_key = key.encoded();
    let roster_key = roster_key(&roster);
    let team_ref = fields.get("team").and_then(value_as_i64);
    let duplicate = || EtlError::DuplicateLineup {
        kind: kind.name.clone(),
        detail: format!("{encoded_key} roster {roster_key}"),
    };

    let mut tx = db.pool.begin().await?;
    let matches = matching_lineups(&mut tx, &kind.name, &encoded_key, &roster).await?;
    if matches.len() > 1 {
        return Err(duplicate());
    }

    let (lineup_id, created) = match matches.first() {
        Some(id) => {
            let stored: Json<Row> = sqlx::query_scalar("SELECT fields FROM lineups WHERE id = ?")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
            let mut merged = stored.0;
            for (name, value) in fields {
                merged.insert(name.clone(), value.clone());
            }
            sqlx::query(
                "UPDATE lineups SET fields = ?, team_ref = COALESCE(?, team_ref), \
                 updated_at = CURRENT_TIMESTAMP WHERE id = ?",
            )
            .bind(serde_json::to_string(&merged)?)
            .bind(team_ref)
            .bind(id)
            .execute(&mut *tx)
            .await?;
            (*id, false)
        }
        None => {
            let inserted = sqlx::query_scalar::<_, i64>(
                "INSERT INTO lineups (kind, natural_key, roster_key, team_ref, fields) \
                 VALUES (?, ?, ?, ?, ?) RETURNING id",
            )
            .bind(&kind.name)
            .bind(&encoded_key)
            .bind(&roster_key)
            .bind(team_ref)
            .bind(serde_json::to_string(fields)?)
            .fetch_one(&mut *tx)
            .await;
            let id = match inserted {
                Ok(id) => id,
                Err(err) if is_unique_violation(&err) => return Err(duplicate()),
                Err(err) => return Err(err.into()),
            };
            let mut qb: QueryBuilder<'_, Sqlite> =
                QueryBuilder::new("INSERT INTO lineup_players (lineup_id, player_ref) ");
            qb.push_values(&roster, |mut b, player_ref| {
                b.push_bind(id).push_bind(*player_ref);
            });
            qb.build().execute(&mut *tx).await?;
            (id, true)
        }
    };

    let select = format!("SELECT {LINEUP_COLUMNS} FROM lineups WHERE id = ?");
    let record = sqlx::query_as::<_, LineupRecord>(&select)
        .bind(lineup_id)
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;
    debug!(lineup_id, created, "upserted lineup");
    Ok((record, created))
}

/// Player refs of a lineup, ascending.
pub async fn lineup_roster(db: &Db, lineup_id: i64) -> Result<Vec<i64>> {
    Ok(sqlx::query_scalar(
        "SELECT player_ref FROM lineup_players WHERE lineup_id = ? ORDER BY player_ref",
    )
    .bind(lineup_id)
    .fetch_all(&db.pool)
    .await?)
}

pub async fn lineups_of_kind(db: &Db, kind: &str) -> Result<Vec<LineupRecord>> {
    let select = format!("SELECT {LINEUP_COLUMNS} FROM lineups WHERE kind = ? ORDER BY id");
    Ok(sqlx::query_as::<_, LineupRecord>(&select)
        .bind(kind)
        .fetch_all(&db.pool)
        .await?)
}

pub async fn count_lineups(db: &Db, kind: &str) -> Result<i64> {
    Ok(
        sqlx::query_scalar("SELECT COUNT(*) FROM lineups WHERE kind = ?")
            .bind(kind)
            .fetch_one(&db.pool)
            .await?,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{unique_key, Registry};
    use serde_json::{json, Value};

    async fn seeded() -> (Db, Vec<i64>) {
        let db = Db::connect_in_memory().await.unwrap();
        sqlx::query("INSERT INTO teams (team_id, name) VALUES (1610612744, 'Warriors')")
            .execute(&db.pool)
            .await
            .unwrap();
        let mut refs = Vec::new();
        for pid in 1..=6 {
            let id: i64 = sqlx::query_scalar(
                "INSERT INTO players (player_id, display_name) VALUES (?, ?) RETURNING id",
            )
            .bind(pid)
            .bind(format!("Player {pid}"))
            .fetch_one(&db.pool)
            .await
            .unwrap();
            refs.push(id);
        }
        (db, refs)
    }

    fn fields(min: f64) -> Row {
        json!({
            "season": 2016, "season_type": "Regular Season", "measure_type": "Base",
            "per_mode": "Totals", "team": 1, "group_quantity": 5, "min": min
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[tokio::test]
    async fn roster_order_does_not_matter() {
        let (db, p) = seeded().await;
        let registry = Registry::standard();
        let kind = registry.by_name("TeamTraditionalLineup").unwrap();
        let key = unique_key(kind, &fields(100.0)).unwrap();

        let (first, created) = upsert_lineup(
            &db,
            kind,
            &fields(100.0),
            &key,
            &[p[0], p[1], p[2], p[3], p[4]],
        )
        .await
        .unwrap();
        assert!(created);

        let (second, created) = upsert_lineup(
            &db,
            kind,
            &fields(120.0),
            &key,
            &[p[4], p[2], p[0], p[3], p[1]],
        )
        .await
        .unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
        assert_eq!(second.fields.0.get("min"), Some(&Value::from(120.0)));
        assert_eq!(count_lineups(&db, &kind.name).await.unwrap(), 1);
        assert_eq!(lineup_roster(&db, first.id).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn one_different_player_is_a_new_lineup() {
        let (db, p) = seeded().await;
        let registry = Registry::standard();
        let kind = registry.by_name("TeamTraditionalLineup").unwrap();
        let key = unique_key(kind, &fields(100.0)).unwrap();

        upsert_lineup(&db, kind, &fields(100.0), &key, &[p[0], p[1], p[2], p[3], p[4]])
            .await
            .unwrap();
        let (other, created) =
            upsert_lineup(&db, kind, &fields(30.0), &key, &[p[0], p[1], p[2], p[3], p[5]])
                .await
                .unwrap();
        assert!(created);
        assert_eq!(count_lineups(&db, &kind.name).await.unwrap(), 2);
        assert_eq!(
            lineup_roster(&db, other.id).await.unwrap(),
            vec![p[0], p[1], p[2], p[3], p[5]]
        );
    }

    #[tokio::test]
    async fn subset_rosters_do_not_match() {
        let (db, p) = seeded().await;
        let registry = Registry::standard();
        let kind = registry.by_name("TeamTraditionalLineup").unwrap();
        let key = unique_key(kind, &fields(10.0)).unwrap();

        upsert_lineup(&db, kind, &fields(10.0), &key, &[p[0], p[1], p[2]])
            .await
            .unwrap();
        let (_, created) = upsert_lineup(&db, kind, &fields(10.0), &key, &[p[0], p[1]])
            .await
            .unwrap();
        assert!(created);
    }

    #[tokio::test]
    async fn roster_size_is_checked() {
        let (db, p) = seeded().await;
        let registry = Registry::standard();
        let kind = registry.by_name("TeamTraditionalLineup").unwrap();
        let key = unique_key(kind, &fields(10.0)).unwrap();
        assert!(upsert_lineup(&db, kind, &fields(10.0), &key, &[p[0]])
            .await
            .is_err());
    }

    #[test]
    fn roster_keys_are_order_free() {
        assert_eq!(roster_key(&[5, 1, 3, 3]), "1-3-5");
    }
}
