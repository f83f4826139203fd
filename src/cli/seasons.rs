use anyhow::{ensure, Result};
use chrono::NaiveDate;
use tracing::info;

use crate::database_ops::seasons::{list_league_seasons, upsert_league_season};
use crate::normalization::season::LeagueSeason;

#[derive(Debug, Clone)]
pub struct SeasonAddConfig {
    /// Optional override for the database URL.
    pub database_url: Option<String>,
    pub year: i32,
    pub pre_season_start: NaiveDate,
    pub regular_season_start: NaiveDate,
    pub playoffs_start: NaiveDate,
    pub playoffs_end: Option<NaiveDate>,
}

impl SeasonAddConfig {
    fn to_season(&self) -> Result<LeagueSeason> {
        ensure!(
            self.pre_season_start <= self.regular_season_start
                && self.regular_season_start < self.playoffs_start,
            "season dates must run pre-season <= regular season < playoffs"
        );
        if let Some(end) = self.playoffs_end {
            ensure!(end >= self.playoffs_start, "playoffs cannot end before they start");
        }
        Ok(LeagueSeason {
            year: self.year,
            pre_season_start: self.pre_season_start,
            regular_season_start: self.regular_season_start,
            playoffs_start: self.playoffs_start,
            playoffs_end: self.playoffs_end,
        })
    }
}

/// Create or replace the calendar row game ingestion classifies dates against.
pub async fn run(cfg: SeasonAddConfig) -> Result<()> {
    let season = cfg.to_season()?;
    let db = super::connect(cfg.database_url.as_deref()).await?;
    upsert_league_season(&db, &season).await?;
    info!(year = season.year, label = %season.label(), "league season stored");
    for stored in list_league_seasons(&db).await? {
        println!(
            "{} regular {} playoffs {}..{}",
            stored.label(),
            stored.regular_season_start,
            stored.playoffs_start,
            stored
                .playoffs_end
                .map_or_else(|| "open".to_string(), |end| end.to_string())
        );
    }
    Ok(())
}
