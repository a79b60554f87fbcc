use crate::models::{HourFeatures, HourlyReading};
use chrono::NaiveDate;
use rayon::prelude::*;

/// An hourly reading with the calendar features of its local timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedHour {
    pub reading: HourlyReading,
    pub hour: HourFeatures,
}

impl EnrichedHour {
    pub fn new(reading: HourlyReading, war_start: NaiveDate) -> Self {
        let hour = HourFeatures::from_local(&reading.logged_at_local, war_start);
        Self { reading, hour }
    }
}

/// Attach calendar features to every reading, preserving order
pub fn enrich_readings(readings: Vec<HourlyReading>, war_start: NaiveDate) -> Vec<EnrichedHour> {
    readings
        .into_par_iter()
        .map(|r| EnrichedHour::new(r, war_start))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Period, Season};
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_features_follow_local_time() {
        let war_start = NaiveDate::from_ymd_opt(2022, 2, 24).unwrap();
        // 22:30 UTC on the eve of the start date is already the 24th in Kyiv
        let utc = Utc.with_ymd_and_hms(2022, 2, 23, 22, 30, 0).unwrap();
        let kyiv = chrono_tz::Europe::Kyiv;
        let reading = HourlyReading::new(1, utc, kyiv, Some(3.0), None, "a".into());

        let enriched = enrich_readings(vec![reading], war_start);
        let hour = &enriched[0].hour;
        assert_eq!(hour.date, war_start);
        assert_eq!(hour.hour, 0);
        assert_eq!(hour.features.period, Period::Wartime);
        assert_eq!(hour.features.season, Season::Winter);
        assert_eq!(hour.features.weekday, 3);
    }
}
