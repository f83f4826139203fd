//! Season vocabulary: canonical season types, season labels and the league calendar.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{EtlError, Result};

pub const REGULAR_SEASON: &str = "Regular Season";
pub const PLAYOFFS: &str = "Playoffs";

/// Collapse provider season-type spellings onto one token.
///
/// "Career Totals Regular Season", "RegularSeason" and "Regular Season" all become "Regular".
pub fn canonical_season_type(raw: &str) -> String {
    ["Career", "Totals", "Season"]
        .iter()
        .fold(raw.replace(' ', ""), |acc, junk| acc.replace(junk, ""))
}

/// Provider season label for the season starting in `year`.
pub fn season_label(year: i32) -> String {
    if year == 1999 {
        return "1999-00".to_string();
    }
    let next = (year + 1).rem_euclid(100);
    format!("{year}-{next:02}")
}

/// Starting year of a label such as "2016-17"; bare years pass through.
pub fn season_year(label: &str) -> Result<i32> {
    let head = label.split('-').next().unwrap_or_default().trim();
    head.parse::<i32>()
        .map_err(|_| EtlError::payload(format!("unparseable season label {label:?}")))
}

/// Seasons straddle the new year; anything before July belongs to the previous year's season.
pub fn season_for_date(date: NaiveDate) -> i32 {
    if date.month() < 7 {
        date.year() - 1
    } else {
        date.year()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LeagueSeason {
    pub year: i32,
    pub pre_season_start: NaiveDate,
    pub regular_season_start: NaiveDate,
    pub playoffs_start: NaiveDate,
    pub playoffs_end: Option<NaiveDate>,
}

impl LeagueSeason {
    pub fn label(&self) -> String {
        season_label(self.year)
    }

    /// Classify `date` into "Regular Season" or "Playoffs".
    ///
    /// Pre-season dates count as regular season. An open playoffs end accepts any later date.
    pub fn season_type_for_date(&self, date: NaiveDate) -> Result<&'static str> {
        let after_end = self.playoffs_end.is_some_and(|end| date > end);
        if date < self.pre_season_start || after_end {
            return Err(EtlError::payload(format!(
                "{date} falls outside season {}",
                self.label()
            )));
        }
        if date >= self.playoffs_start {
            Ok(PLAYOFFS)
        } else {
            Ok(REGULAR_SEASON)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn season_2016() -> LeagueSeason {
        LeagueSeason {
            year: 2016,
            pre_season_start: ymd(2016, 10, 1),
            regular_season_start: ymd(2016, 10, 25),
            playoffs_start: ymd(2017, 4, 15),
            playoffs_end: Some(ymd(2017, 6, 18)),
        }
    }

    #[test]
    fn canonical_forms_agree() {
        assert_eq!(canonical_season_type("Career Totals Regular Season"), "Regular");
        assert_eq!(canonical_season_type("RegularSeason"), "Regular");
        assert_eq!(canonical_season_type("Regular Season"), "Regular");
        assert_eq!(canonical_season_type("SeasonTotalsPostSeason"), "Post");
        assert_eq!(canonical_season_type("Playoffs"), "Playoffs");
    }

    #[test]
    fn labels() {
        assert_eq!(season_label(1999), "1999-00");
        assert_eq!(season_label(2005), "2005-06");
        assert_eq!(season_label(2009), "2009-10");
        assert_eq!(season_label(2016), "2016-17");
        assert_eq!(season_label(1996), "1996-97");
        assert_eq!(season_year("2016-17").unwrap(), 2016);
        assert_eq!(season_year("2016").unwrap(), 2016);
        assert!(season_year("abc").is_err());
    }

    #[test]
    fn date_to_season() {
        assert_eq!(season_for_date(ymd(2017, 3, 1)), 2016);
        assert_eq!(season_for_date(ymd(2016, 11, 1)), 2016);
        assert_eq!(season_for_date(ymd(2016, 7, 1)), 2016);
    }

    #[test]
    fn classifies_dates() {
        let season = season_2016();
        assert_eq!(season.season_type_for_date(ymd(2016, 10, 3)).unwrap(), REGULAR_SEASON);
        assert_eq!(season.season_type_for_date(ymd(2017, 1, 3)).unwrap(), REGULAR_SEASON);
        assert_eq!(season.season_type_for_date(ymd(2017, 4, 15)).unwrap(), PLAYOFFS);
        assert!(season.season_type_for_date(ymd(2016, 9, 30)).is_err());
        assert!(season.season_type_for_date(ymd(2017, 6, 19)).is_err());
    }

    #[test]
    fn open_ended_playoffs() {
        let season = LeagueSeason {
            playoffs_end: None,
            ..season_2016()
        };
        assert_eq!(season.season_type_for_date(ymd(2017, 7, 1)).unwrap(), PLAYOFFS);
    }
}
