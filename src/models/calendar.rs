use crate::utils::constants::{PERIOD_PRE_WAR, PERIOD_WARTIME};
use chrono::{DateTime, Datelike, NaiveDate, Timelike};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Meteorological season
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Autumn,
}

impl Season {
    pub fn from_month(month: u32) -> Self {
        match month {
            12 | 1 | 2 => Season::Winter,
            3..=5 => Season::Spring,
            6..=8 => Season::Summer,
            _ => Season::Autumn,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Season::Winter => "winter",
            Season::Spring => "spring",
            Season::Summer => "summer",
            Season::Autumn => "autumn",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "winter" => Some(Season::Winter),
            "spring" => Some(Season::Spring),
            "summer" => Some(Season::Summer),
            "autumn" => Some(Season::Autumn),
            _ => None,
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    PreWar,
    Wartime,
}

impl Period {
    /// Wartime from the start date inclusive, with no ambiguity window
    pub fn for_date(date: NaiveDate, war_start: NaiveDate) -> Self {
        if date >= war_start {
            Period::Wartime
        } else {
            Period::PreWar
        }
    }

    /// A calendar year counts as wartime from the year containing the start date
    pub fn for_year(year: i32, war_start: NaiveDate) -> Self {
        if year >= war_start.year() {
            Period::Wartime
        } else {
            Period::PreWar
        }
    }

    pub fn is_wartime(&self) -> bool {
        matches!(self, Period::Wartime)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::PreWar => PERIOD_PRE_WAR,
            Period::Wartime => PERIOD_WARTIME,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            PERIOD_PRE_WAR => Some(Period::PreWar),
            PERIOD_WARTIME => Some(Period::Wartime),
            _ => None,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Calendar features of a local date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateFeatures {
    pub year: i32,
    pub month: u32,
    /// Monday = 0
    pub weekday: u32,
    pub iso_week: u32,
    pub season: Season,
    pub period: Period,
}

impl DateFeatures {
    pub fn derive(date: NaiveDate, war_start: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
            weekday: date.weekday().num_days_from_monday(),
            iso_week: date.iso_week().week(),
            season: Season::from_month(date.month()),
            period: Period::for_date(date, war_start),
        }
    }

    pub fn is_wartime(&self) -> bool {
        self.period.is_wartime()
    }
}

/// Features of a local timestamp: the date features plus the local hour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourFeatures {
    pub date: NaiveDate,
    pub hour: u32,
    pub features: DateFeatures,
}

impl HourFeatures {
    pub fn from_local(local: &DateTime<Tz>, war_start: NaiveDate) -> Self {
        let date = local.date_naive();
        Self {
            date,
            hour: local.hour(),
            features: DateFeatures::derive(date, war_start),
        }
    }
}

pub fn days_in_year(year: i32) -> u32 {
    if NaiveDate::from_ymd_opt(year, 2, 29).is_some() {
        366
    } else {
        365
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_season_mapping() {
        let seasons: Vec<Season> = (1..=12).map(Season::from_month).collect();
        assert_eq!(seasons[0], Season::Winter);
        assert_eq!(seasons[1], Season::Winter);
        assert_eq!(seasons[2], Season::Spring);
        assert_eq!(seasons[4], Season::Spring);
        assert_eq!(seasons[5], Season::Summer);
        assert_eq!(seasons[7], Season::Summer);
        assert_eq!(seasons[8], Season::Autumn);
        assert_eq!(seasons[10], Season::Autumn);
        assert_eq!(seasons[11], Season::Winter);
    }

    #[test]
    fn test_wartime_boundary_is_inclusive() {
        let start = date(2022, 2, 24);
        assert_eq!(Period::for_date(date(2022, 2, 23), start), Period::PreWar);
        assert_eq!(Period::for_date(start, start), Period::Wartime);
        assert_eq!(Period::for_year(2021, start), Period::PreWar);
        assert_eq!(Period::for_year(2022, start), Period::Wartime);
    }

    #[test]
    fn test_iso_week_at_year_boundary() {
        // 2021-01-03 is a Sunday still in ISO week 53 of 2020
        let f = DateFeatures::derive(date(2021, 1, 3), date(2022, 2, 24));
        assert_eq!(f.iso_week, 53);
        assert_eq!(f.weekday, 6);
        assert_eq!(f.year, 2021);
    }

    #[test]
    fn test_days_in_year() {
        assert_eq!(days_in_year(2020), 366);
        assert_eq!(days_in_year(2021), 365);
        assert_eq!(days_in_year(2000), 366);
        assert_eq!(days_in_year(2100), 365);
    }

    #[test]
    fn test_period_labels() {
        assert_eq!(Period::parse("pre_war"), Some(Period::PreWar));
        assert_eq!(Period::Wartime.to_string(), "wartime");
        assert_eq!(Period::parse("war"), None);
    }
}
