use tracing::instrument;

use super::db::Db;
use crate::error::{EtlError, Result};
use crate::normalization::season::LeagueSeason;

const SEASON_COLUMNS: &str =
    "year, pre_season_start, regular_season_start, playoffs_start, playoffs_end";

#[instrument(skip(db, season), fields(year = season.year))]
pub async fn upsert_league_season(db: &Db, season: &LeagueSeason) -> Result<()> {
    sqlx::query(
        "INSERT INTO league_seasons (year, pre_season_start, regular_season_start, playoffs_start, playoffs_end) \
         VALUES (?, ?, ?, ?, ?) \
         ON CONFLICT(year) DO UPDATE SET \
           pre_season_start = excluded.pre_season_start, \
           regular_season_start = excluded.regular_season_start, \
           playoffs_start = excluded.playoffs_start, \
           playoffs_end = excluded.playoffs_end",
    )
    .bind(season.year)
    .bind(season.pre_season_start)
    .bind(season.regular_season_start)
    .bind(season.playoffs_start)
    .bind(season.playoffs_end)
    .execute(&db.pool)
    .await?;
    Ok(())
}

pub async fn get_league_season(db: &Db, year: i32) -> Result<Option<LeagueSeason>> {
    let sql = format!("SELECT {SEASON_COLUMNS} FROM league_seasons WHERE year = ?");
    Ok(sqlx::query_as::<_, LeagueSeason>(&sql)
        .bind(year)
        .fetch_optional(&db.pool)
        .await?)
}

/// Game ingestion cannot classify dates without the calendar row, so its absence is fatal.
pub async fn require_league_season(db: &Db, year: i32) -> Result<LeagueSeason> {
    get_league_season(db, year).await?.ok_or_else(|| {
        EtlError::Configuration(format!(
            "no league season row for {year}; add one with `nbapex season-add`"
        ))
    })
}

pub async fn list_league_seasons(db: &Db) -> Result<Vec<LeagueSeason>> {
    let sql = format!("SELECT {SEASON_COLUMNS} FROM league_seasons ORDER BY year");
    Ok(sqlx::query_as::<_, LeagueSeason>(&sql)
        .fetch_all(&db.pool)
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn season_rows_round_trip_and_update() {
        let db = Db::connect_in_memory().await.unwrap();
        let mut season = LeagueSeason {
            year: 2016,
            pre_season_start: ymd(2016, 10, 1),
            regular_season_start: ymd(2016, 10, 25),
            playoffs_start: ymd(2017, 4, 15),
            playoffs_end: None,
        };
        upsert_league_season(&db, &season).await.unwrap();
        assert_eq!(get_league_season(&db, 2016).await.unwrap(), Some(season.clone()));

        season.playoffs_end = Some(ymd(2017, 6, 12));
        upsert_league_season(&db, &season).await.unwrap();
        let stored = require_league_season(&db, 2016).await.unwrap();
        assert_eq!(stored.playoffs_end, Some(ymd(2017, 6, 12)));
        assert_eq!(list_league_seasons(&db).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_season_is_fatal() {
        let db = Db::connect_in_memory().await.unwrap();
        let err = require_league_season(&db, 1990).await.unwrap_err();
        assert!(err.is_fatal());
    }
}
