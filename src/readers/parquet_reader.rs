use crate::error::{ProcessingError, Result};
use crate::models::{DailySummary, DateFeatures, HourlyReading, Period, Season};
use crate::writers::parquet_writer::epoch_days_to_date;
use arrow::array::*;
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use parquet::file::reader::{FileReader, SerializedFileReader};
use std::fs::File;
use std::path::Path;

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .ok_or_else(|| ProcessingError::MissingData(format!("column '{}'", name)))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| ProcessingError::InvalidFormat(format!("Invalid {} column type", name)))
}

fn opt_f64(array: &Float64Array, i: usize) -> Option<f64> {
    array.is_valid(i).then(|| array.value(i))
}

fn opt_str(array: &StringArray, i: usize) -> Option<String> {
    array.is_valid(i).then(|| array.value(i).to_string())
}

/// Reads back the Parquet tables the pipeline writes
pub struct ParquetReader {
    batch_size: usize,
}

impl ParquetReader {
    pub fn new() -> Self {
        Self { batch_size: 8192 }
    }

    fn batches(&self, path: &Path) -> Result<impl Iterator<Item = Result<RecordBatch>>> {
        let file = File::open(path)?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?
            .with_batch_size(self.batch_size)
            .build()?;
        Ok(reader.map(|batch| batch.map_err(ProcessingError::from)))
    }

    /// Read one raw hourly partition.
    ///
    /// Local time is recomputed in `tz`, so a partition written under one
    /// zone can be aggregated under another.
    pub fn read_hourly(&self, path: &Path, tz: Tz) -> Result<Vec<HourlyReading>> {
        let mut readings = Vec::new();
        for batch in self.batches(path)? {
            let batch = batch?;
            let city_ids = column::<Int64Array>(&batch, "city_id")?;
            let logged_at = column::<TimestampMicrosecondArray>(&batch, "logged_at")?;
            let pm25 = column::<Float64Array>(&batch, "pm25")?;
            let aqi = column::<Float64Array>(&batch, "aqi")?;
            let sources = column::<StringArray>(&batch, "source_file")?;

            for i in 0..batch.num_rows() {
                let utc = DateTime::<Utc>::from_timestamp_micros(logged_at.value(i)).ok_or_else(
                    || {
                        ProcessingError::InvalidFormat(format!(
                            "{}: timestamp out of range at row {}",
                            path.display(),
                            i
                        ))
                    },
                )?;
                readings.push(HourlyReading::new(
                    city_ids.value(i),
                    utc,
                    tz,
                    opt_f64(pm25, i),
                    opt_f64(aqi, i),
                    sources.value(i).to_string(),
                ));
            }
        }
        Ok(readings)
    }

    pub fn read_daily(&self, path: &Path) -> Result<Vec<DailySummary>> {
        let mut days = Vec::new();
        for batch in self.batches(path)? {
            let batch = batch?;
            let city_ids = column::<Int64Array>(&batch, "city_id")?;
            let city_names = column::<StringArray>(&batch, "city_name")?;
            let region_names = column::<StringArray>(&batch, "region_name")?;
            let dates = column::<Date32Array>(&batch, "date_local")?;
            let mean = column::<Float64Array>(&batch, "pm25_mean")?;
            let median = column::<Float64Array>(&batch, "pm25_median")?;
            let p10 = column::<Float64Array>(&batch, "pm25_p10")?;
            let p90 = column::<Float64Array>(&batch, "pm25_p90")?;
            let max = column::<Float64Array>(&batch, "pm25_max")?;
            let received = column::<UInt32Array>(&batch, "received_hours")?;
            let available = column::<UInt32Array>(&batch, "available_hours")?;
            let exceedance = column::<UInt32Array>(&batch, "exceedance_hours")?;
            let share = column::<Float64Array>(&batch, "exceedance_share")?;
            let aqi_mean = column::<Float64Array>(&batch, "aqi_mean")?;
            let aqi_hours = column::<UInt32Array>(&batch, "aqi_available_hours")?;
            let years = column::<Int32Array>(&batch, "year")?;
            let months = column::<UInt32Array>(&batch, "month")?;
            let weekdays = column::<UInt32Array>(&batch, "weekday")?;
            let weeks = column::<UInt32Array>(&batch, "iso_week")?;
            let seasons = column::<StringArray>(&batch, "season")?;
            let periods = column::<StringArray>(&batch, "period")?;
            let matched = column::<BooleanArray>(&batch, "metadata_matched")?;
            let mapped = column::<BooleanArray>(&batch, "region_mapped")?;

            for i in 0..batch.num_rows() {
                let invalid = |what: &str| {
                    ProcessingError::InvalidFormat(format!(
                        "{}: invalid {} at row {}",
                        path.display(),
                        what,
                        i
                    ))
                };
                let date_local = epoch_days_to_date(dates.value(i)).ok_or_else(|| invalid("date"))?;
                let season = Season::parse(seasons.value(i)).ok_or_else(|| invalid("season"))?;
                let period = Period::parse(periods.value(i)).ok_or_else(|| invalid("period"))?;

                days.push(DailySummary {
                    city_id: city_ids.value(i),
                    city_name: opt_str(city_names, i),
                    region_name: opt_str(region_names, i),
                    date_local,
                    pm25_mean: opt_f64(mean, i),
                    pm25_median: opt_f64(median, i),
                    pm25_p10: opt_f64(p10, i),
                    pm25_p90: opt_f64(p90, i),
                    pm25_max: opt_f64(max, i),
                    received_hours: received.value(i),
                    available_hours: available.value(i),
                    exceedance_hours: exceedance.value(i),
                    exceedance_share: share.value(i),
                    aqi_mean: opt_f64(aqi_mean, i),
                    aqi_available_hours: aqi_hours.value(i),
                    features: DateFeatures {
                        year: years.value(i),
                        month: months.value(i),
                        weekday: weekdays.value(i),
                        iso_week: weeks.value(i),
                        season,
                        period,
                    },
                    metadata_matched: matched.value(i),
                    region_mapped: mapped.value(i),
                });
            }
        }
        Ok(days)
    }

    /// Row count, row groups and column names of a Parquet file
    pub fn file_info(&self, path: &Path) -> Result<ParquetFileInfo> {
        let reader = SerializedFileReader::new(File::open(path)?)?;
        let metadata = reader.metadata();
        let file_metadata = metadata.file_metadata();

        let row_group_sizes: Vec<i64> = metadata
            .row_groups()
            .iter()
            .map(|rg| rg.num_rows())
            .collect();
        let compression = metadata
            .row_groups()
            .first()
            .filter(|rg| rg.num_columns() > 0)
            .map(|rg| rg.column(0).compression())
            .unwrap_or(Compression::UNCOMPRESSED);
        let columns = file_metadata
            .schema_descr()
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        Ok(ParquetFileInfo {
            total_rows: file_metadata.num_rows(),
            row_groups: metadata.num_row_groups(),
            row_group_sizes,
            file_size: std::fs::metadata(path)?.len(),
            compression,
            columns,
        })
    }
}

impl Default for ParquetReader {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct ParquetFileInfo {
    pub total_rows: i64,
    pub row_groups: usize,
    pub row_group_sizes: Vec<i64>,
    pub file_size: u64,
    pub compression: Compression,
    pub columns: Vec<String>,
}

impl ParquetFileInfo {
    pub fn summary(&self) -> String {
        let avg = if self.row_groups == 0 {
            0.0
        } else {
            self.total_rows as f64 / self.row_groups as f64
        };
        format!(
            "Parquet File Summary:\n\
            - Total rows: {}\n\
            - Row groups: {}\n\
            - File size: {:.2} MB\n\
            - Compression: {:?}\n\
            - Avg rows per group: {:.0}\n\
            - Columns: {}",
            self.total_rows,
            self.row_groups,
            self.file_size as f64 / 1_048_576.0,
            self.compression,
            avg,
            self.columns.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writers::ParquetWriter;
    use chrono::{NaiveDate, TimeZone, Timelike};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_hourly_round_trip_recomputes_local_time() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("city_hourly_2021.parquet");
        let utc = Utc.with_ymd_and_hms(2021, 7, 1, 21, 0, 0).unwrap();
        let kyiv = chrono_tz::Europe::Kyiv;
        let readings = vec![
            HourlyReading::new(5, utc, kyiv, Some(12.5), None, "a_2021.csv".into()),
            HourlyReading::new(
                5,
                utc + chrono::Duration::hours(1),
                kyiv,
                None,
                Some(51.0),
                "a_2021.csv".into(),
            ),
        ];
        ParquetWriter::new().write_hourly_partition(&readings, kyiv, &path)?;

        let back = ParquetReader::new().read_hourly(&path, chrono_tz::Europe::Kyiv)?;
        assert_eq!(back, readings);

        let utc_view = ParquetReader::new().read_hourly(&path, chrono_tz::UTC)?;
        assert_eq!(utc_view[0].logged_at, utc);
        assert_eq!(utc_view[0].logged_at_local.hour(), 21);
        assert_eq!(back[0].logged_at_local.hour(), 0);
        Ok(())
    }

    #[test]
    fn test_daily_round_trip() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("daily.parquet");
        let date = NaiveDate::from_ymd_opt(2022, 2, 24).unwrap();
        let day = DailySummary {
            city_id: 3,
            city_name: Some("Київ".into()),
            region_name: None,
            date_local: date,
            pm25_mean: Some(20.0),
            pm25_median: Some(19.0),
            pm25_p10: Some(10.0),
            pm25_p90: Some(30.0),
            pm25_max: Some(35.0),
            received_hours: 24,
            available_hours: 23,
            exceedance_hours: 12,
            exceedance_share: 12.0 / 23.0,
            aqi_mean: None,
            aqi_available_hours: 0,
            features: DateFeatures::derive(date, date),
            metadata_matched: true,
            region_mapped: false,
        };
        ParquetWriter::new().write_daily(std::slice::from_ref(&day), &path)?;

        let back = ParquetReader::new().read_daily(&path)?;
        assert_eq!(back, vec![day]);

        let info = ParquetReader::new().file_info(&path)?;
        assert_eq!(info.total_rows, 1);
        assert!(info.columns.iter().any(|c| c == "exceedance_share"));
        Ok(())
    }
}
