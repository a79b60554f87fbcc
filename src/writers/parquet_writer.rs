use crate::error::{ProcessingError, Result};
use crate::models::{
    CityDistribution, CityMetadata, CityYearCoverage, DailySummary, HourlyReading,
    RegionPeriodSummary,
};
use crate::processors::enrichment::EnrichedHour;
use crate::utils::constants::{DEFAULT_BATCH_SIZE, DEFAULT_ROW_GROUP_SIZE};
use arrow::array::*;
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{Datelike, NaiveDate, Offset};
use chrono_tz::Tz;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel, ZstdLevel};
use parquet::file::properties::WriterProperties;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Days between 0001-01-01 (CE day 1) and 1970-01-01
pub(crate) const EPOCH_DAYS_FROM_CE: i32 = 719_163;

pub(crate) fn date_to_epoch_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - EPOCH_DAYS_FROM_CE
}

pub(crate) fn epoch_days_to_date(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days + EPOCH_DAYS_FROM_CE)
}

/// Collects named columns into a record batch
struct TableBuilder {
    fields: Vec<Field>,
    columns: Vec<ArrayRef>,
}

impl TableBuilder {
    fn new() -> Self {
        Self {
            fields: Vec::new(),
            columns: Vec::new(),
        }
    }

    fn column(mut self, name: &str, array: ArrayRef, nullable: bool) -> Self {
        self.fields
            .push(Field::new(name, array.data_type().clone(), nullable));
        self.columns.push(array);
        self
    }

    fn finish(self) -> Result<RecordBatch> {
        Ok(RecordBatch::try_new(
            Arc::new(Schema::new(self.fields)),
            self.columns,
        )?)
    }
}

fn strings<T, F: Fn(&T) -> Option<&str>>(rows: &[T], f: F) -> ArrayRef {
    Arc::new(StringArray::from(rows.iter().map(f).collect::<Vec<_>>()))
}

/// Writes pipeline tables as Parquet.
///
/// Every file is written to a temporary sibling and renamed into place, so a
/// reader never observes a half-written table.
pub struct ParquetWriter {
    compression: Compression,
    row_group_size: usize,
    batch_size: usize,
}

impl ParquetWriter {
    pub fn new() -> Self {
        Self {
            compression: Compression::SNAPPY,
            row_group_size: DEFAULT_ROW_GROUP_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_compression(mut self, compression: &str) -> Result<Self> {
        self.compression = match compression.to_lowercase().as_str() {
            "snappy" => Compression::SNAPPY,
            "gzip" => Compression::GZIP(GzipLevel::default()),
            "lz4" => Compression::LZ4,
            "zstd" => Compression::ZSTD(ZstdLevel::default()),
            "none" => Compression::UNCOMPRESSED,
            _ => {
                return Err(ProcessingError::Config(format!(
                    "Unsupported compression: {}",
                    compression
                )))
            }
        };
        Ok(self)
    }

    pub fn with_row_group_size(mut self, size: usize) -> Self {
        self.row_group_size = size;
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    fn write_rows<T, F>(&self, rows: &[T], path: &Path, to_batch: F) -> Result<()>
    where
        F: Fn(&[T]) -> Result<RecordBatch>,
    {
        let schema = to_batch(&[])?.schema();
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let props = WriterProperties::builder()
            .set_compression(self.compression)
            .set_max_row_group_size(self.row_group_size)
            .build();

        let tmp = NamedTempFile::new_in(dir)?;
        let mut writer = ArrowWriter::try_new(tmp.as_file().try_clone()?, schema, Some(props))?;
        for chunk in rows.chunks(self.batch_size) {
            writer.write(&to_batch(chunk)?)?;
        }
        writer.close()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Raw yearly partition of deduplicated readings.
    ///
    /// `tz` labels the local timestamp column, so the schema is the same
    /// whatever the rows hold.
    pub fn write_hourly_partition(
        &self,
        readings: &[HourlyReading],
        tz: Tz,
        path: &Path,
    ) -> Result<()> {
        self.write_rows(readings, path, |rows| {
            hourly_columns(rows, tz, TableBuilder::new()).finish()
        })
    }

    /// Hourly readings with calendar features and city attributes
    pub fn write_enriched_hourly(
        &self,
        hours: &[EnrichedHour],
        cities: &BTreeMap<i64, CityMetadata>,
        tz: Tz,
        path: &Path,
    ) -> Result<()> {
        self.write_rows(hours, path, |rows| {
            let readings: Vec<HourlyReading> = rows.iter().map(|h| h.reading.clone()).collect();
            let matched: Vec<Option<&CityMetadata>> =
                rows.iter().map(|h| cities.get(&h.reading.city_id)).collect();
            let city_names: Vec<Option<&str>> = matched
                .iter()
                .map(|c| c.map(|c| c.city_name.as_str()))
                .collect();
            let region_names: Vec<Option<&str>> = matched
                .iter()
                .map(|c| c.and_then(|c| c.region_name.as_deref()))
                .collect();

            hourly_columns(&readings, tz, TableBuilder::new())
                .column(
                    "date_local",
                    Arc::new(Date32Array::from(
                        rows.iter().map(|h| date_to_epoch_days(h.hour.date)).collect::<Vec<_>>(),
                    )),
                    false,
                )
                .column(
                    "hour_local",
                    Arc::new(UInt32Array::from(
                        rows.iter().map(|h| h.hour.hour).collect::<Vec<_>>(),
                    )),
                    false,
                )
                .column(
                    "month",
                    Arc::new(UInt32Array::from(
                        rows.iter().map(|h| h.hour.features.month).collect::<Vec<_>>(),
                    )),
                    false,
                )
                .column(
                    "weekday",
                    Arc::new(UInt32Array::from(
                        rows.iter().map(|h| h.hour.features.weekday).collect::<Vec<_>>(),
                    )),
                    false,
                )
                .column(
                    "iso_week",
                    Arc::new(UInt32Array::from(
                        rows.iter().map(|h| h.hour.features.iso_week).collect::<Vec<_>>(),
                    )),
                    false,
                )
                .column(
                    "season",
                    strings(rows, |h| Some(h.hour.features.season.as_str())),
                    false,
                )
                .column(
                    "is_wartime",
                    Arc::new(BooleanArray::from(
                        rows.iter().map(|h| h.hour.features.is_wartime()).collect::<Vec<_>>(),
                    )),
                    false,
                )
                .column(
                    "period",
                    strings(rows, |h| Some(h.hour.features.period.as_str())),
                    false,
                )
                .column("city_name", Arc::new(StringArray::from(city_names)), true)
                .column("region_name", Arc::new(StringArray::from(region_names)), true)
                .finish()
        })
    }

    pub fn write_daily(&self, days: &[DailySummary], path: &Path) -> Result<()> {
        self.write_rows(days, path, |rows| {
            let f64s = |f: fn(&DailySummary) -> Option<f64>| -> ArrayRef {
                Arc::new(Float64Array::from(rows.iter().map(f).collect::<Vec<_>>()))
            };
            let u32s = |f: fn(&DailySummary) -> u32| -> ArrayRef {
                Arc::new(UInt32Array::from(rows.iter().map(f).collect::<Vec<_>>()))
            };
            let bools = |f: fn(&DailySummary) -> bool| -> ArrayRef {
                Arc::new(BooleanArray::from(rows.iter().map(f).collect::<Vec<_>>()))
            };

            TableBuilder::new()
                .column(
                    "city_id",
                    Arc::new(Int64Array::from(rows.iter().map(|d| d.city_id).collect::<Vec<_>>())),
                    false,
                )
                .column("city_name", strings(rows, |d| d.city_name.as_deref()), true)
                .column("region_name", strings(rows, |d| d.region_name.as_deref()), true)
                .column(
                    "date_local",
                    Arc::new(Date32Array::from(
                        rows.iter().map(|d| date_to_epoch_days(d.date_local)).collect::<Vec<_>>(),
                    )),
                    false,
                )
                .column("pm25_mean", f64s(|d| d.pm25_mean), true)
                .column("pm25_median", f64s(|d| d.pm25_median), true)
                .column("pm25_p10", f64s(|d| d.pm25_p10), true)
                .column("pm25_p90", f64s(|d| d.pm25_p90), true)
                .column("pm25_max", f64s(|d| d.pm25_max), true)
                .column("received_hours", u32s(|d| d.received_hours), false)
                .column("available_hours", u32s(|d| d.available_hours), false)
                .column("exceedance_hours", u32s(|d| d.exceedance_hours), false)
                .column("exceedance_share", f64s(|d| Some(d.exceedance_share)), false)
                .column("aqi_mean", f64s(|d| d.aqi_mean), true)
                .column("aqi_available_hours", u32s(|d| d.aqi_available_hours), false)
                .column(
                    "year",
                    Arc::new(Int32Array::from(
                        rows.iter().map(|d| d.features.year).collect::<Vec<_>>(),
                    )),
                    false,
                )
                .column("month", u32s(|d| d.features.month), false)
                .column("weekday", u32s(|d| d.features.weekday), false)
                .column("iso_week", u32s(|d| d.features.iso_week), false)
                .column("season", strings(rows, |d| Some(d.features.season.as_str())), false)
                .column("is_wartime", bools(|d| d.features.is_wartime()), false)
                .column("period", strings(rows, |d| Some(d.features.period.as_str())), false)
                .column("metadata_matched", bools(|d| d.metadata_matched), false)
                .column("region_mapped", bools(|d| d.region_mapped), false)
                .finish()
        })
    }

    pub fn write_distributions(&self, rows: &[CityDistribution], path: &Path) -> Result<()> {
        self.write_rows(rows, path, |rows| {
            let f64s = |f: fn(&CityDistribution) -> Option<f64>| -> ArrayRef {
                Arc::new(Float64Array::from(rows.iter().map(f).collect::<Vec<_>>()))
            };
            TableBuilder::new()
                .column(
                    "city_id",
                    Arc::new(Int64Array::from(rows.iter().map(|d| d.city_id).collect::<Vec<_>>())),
                    false,
                )
                .column("city_name", strings(rows, |d| d.city_name.as_deref()), true)
                .column("region_name", strings(rows, |d| d.region_name.as_deref()), true)
                .column(
                    "aggregation_level",
                    strings(rows, |d| Some(d.aggregation_level.as_str())),
                    false,
                )
                .column("period", strings(rows, |d| d.period.map(|p| p.as_str())), true)
                .column(
                    "year",
                    Arc::new(Int32Array::from(rows.iter().map(|d| d.year).collect::<Vec<_>>())),
                    true,
                )
                .column(
                    "days",
                    Arc::new(UInt32Array::from(rows.iter().map(|d| d.days).collect::<Vec<_>>())),
                    false,
                )
                .column("pm25_mean", f64s(|d| d.pm25_mean), true)
                .column("pm25_median", f64s(|d| d.pm25_median), true)
                .column("pm25_p10", f64s(|d| d.pm25_p10), true)
                .column("pm25_p90", f64s(|d| d.pm25_p90), true)
                .column("exceedance_share", f64s(|d| d.exceedance_share), true)
                .column("available_hours_mean", f64s(|d| d.available_hours_mean), true)
                .column(
                    "days_with_coverage_ge18",
                    Arc::new(UInt32Array::from(
                        rows.iter().map(|d| d.days_with_coverage_ge18).collect::<Vec<_>>(),
                    )),
                    false,
                )
                .finish()
        })
    }

    pub fn write_coverage(
        &self,
        rows: &[CityYearCoverage],
        eligible: &BTreeSet<i64>,
        path: &Path,
    ) -> Result<()> {
        self.write_rows(rows, path, |rows| {
            let u32s = |f: fn(&CityYearCoverage) -> u32| -> ArrayRef {
                Arc::new(UInt32Array::from(rows.iter().map(f).collect::<Vec<_>>()))
            };
            let bools = |values: Vec<bool>| -> ArrayRef { Arc::new(BooleanArray::from(values)) };
            TableBuilder::new()
                .column(
                    "city_id",
                    Arc::new(Int64Array::from(rows.iter().map(|c| c.city_id).collect::<Vec<_>>())),
                    false,
                )
                .column(
                    "year",
                    Arc::new(Int32Array::from(rows.iter().map(|c| c.year).collect::<Vec<_>>())),
                    false,
                )
                .column("days_in_year", u32s(|c| c.days_in_year), false)
                .column("days_observed", u32s(|c| c.days_observed), false)
                .column("covered_days", u32s(|c| c.covered_days), false)
                .column(
                    "coverage_fraction",
                    Arc::new(Float64Array::from(
                        rows.iter().map(|c| c.coverage_fraction).collect::<Vec<_>>(),
                    )),
                    false,
                )
                .column("period", strings(rows, |c| Some(c.period.as_str())), false)
                .column("is_prewar", bools(rows.iter().map(|c| c.is_prewar()).collect()), false)
                .column("is_wartime", bools(rows.iter().map(|c| c.is_wartime()).collect()), false)
                .column("qualifies", bools(rows.iter().map(|c| c.qualifies).collect()), false)
                .column(
                    "city_eligible",
                    bools(rows.iter().map(|c| eligible.contains(&c.city_id)).collect()),
                    false,
                )
                .finish()
        })
    }

    pub fn write_regions(&self, rows: &[RegionPeriodSummary], path: &Path) -> Result<()> {
        self.write_rows(rows, path, |rows| {
            let f64s = |f: fn(&RegionPeriodSummary) -> Option<f64>| -> ArrayRef {
                Arc::new(Float64Array::from(rows.iter().map(f).collect::<Vec<_>>()))
            };
            TableBuilder::new()
                .column("region_name", strings(rows, |r| r.region_name.as_deref()), true)
                .column("region_code", strings(rows, |r| r.region_code.as_deref()), true)
                .column("period", strings(rows, |r| Some(r.period.as_str())), false)
                .column(
                    "cities",
                    Arc::new(UInt32Array::from(rows.iter().map(|r| r.cities).collect::<Vec<_>>())),
                    false,
                )
                .column(
                    "days",
                    Arc::new(UInt32Array::from(rows.iter().map(|r| r.days).collect::<Vec<_>>())),
                    false,
                )
                .column("pm25_mean", f64s(|r| r.pm25_mean), true)
                .column("pm25_median", f64s(|r| r.pm25_median), true)
                .column("pm25_p90", f64s(|r| r.pm25_p90), true)
                .column("exceedance_share", f64s(|r| r.exceedance_share), true)
                .column(
                    "mapped",
                    Arc::new(BooleanArray::from(rows.iter().map(|r| r.mapped).collect::<Vec<_>>())),
                    false,
                )
                .column("geometry", strings(rows, |r| r.geometry.as_deref()), true)
                .finish()
        })
    }
}

impl Default for ParquetWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Columns shared by raw and enriched hourly tables
fn hourly_columns(rows: &[HourlyReading], tz: Tz, builder: TableBuilder) -> TableBuilder {
    let utc_micros: Vec<i64> = rows.iter().map(|r| r.logged_at.timestamp_micros()).collect();
    let offsets: Vec<i32> = rows
        .iter()
        .map(|r| r.logged_at.with_timezone(&tz).offset().fix().local_minus_utc())
        .collect();

    builder
        .column(
            "city_id",
            Arc::new(Int64Array::from(rows.iter().map(|r| r.city_id).collect::<Vec<_>>())),
            false,
        )
        .column(
            "logged_at",
            Arc::new(TimestampMicrosecondArray::from(utc_micros.clone()).with_timezone("UTC")),
            false,
        )
        .column(
            "logged_at_local",
            Arc::new(TimestampMicrosecondArray::from(utc_micros).with_timezone(tz.name())),
            false,
        )
        .column("utc_offset_seconds", Arc::new(Int32Array::from(offsets)), false)
        .column(
            "pm25",
            Arc::new(Float64Array::from(rows.iter().map(|r| r.pm25).collect::<Vec<_>>())),
            true,
        )
        .column(
            "aqi",
            Arc::new(Float64Array::from(rows.iter().map(|r| r.aqi).collect::<Vec<_>>())),
            true,
        )
        .column(
            "pm25_valid",
            Arc::new(BooleanArray::from(
                rows.iter().map(|r| r.pm25_valid()).collect::<Vec<_>>(),
            )),
            false,
        )
        .column(
            "aqi_valid",
            Arc::new(BooleanArray::from(
                rows.iter().map(|r| r.aqi_valid()).collect::<Vec<_>>(),
            )),
            false,
        )
        .column("source_file", strings(rows, |r| Some(r.source_file.as_str())), false)
        .column(
            "year",
            Arc::new(Int32Array::from(rows.iter().map(|r| r.year()).collect::<Vec<_>>())),
            false,
        )
}
