use crate::utils::constants::{HOURLY_PARTITION_PREFIX, PARQUET_EXTENSION};
use std::path::{Path, PathBuf};

/// Extract the first `20YY` year embedded in a file stem
///
/// # Examples
/// ```
/// use aq_processor::utils::year_from_file_stem;
/// use std::path::Path;
///
/// let path = Path::new("saveecobot_cities_pm25_and_aqi_pm25_2021.csv");
/// assert_eq!(year_from_file_stem(path), Some(2021));
/// ```
pub fn year_from_file_stem(path: &Path) -> Option<i32> {
    let stem = path.file_stem()?.to_str()?;
    let bytes = stem.as_bytes();

    bytes.windows(4).enumerate().find_map(|(i, w)| {
        if w[0] == b'2' && w[1] == b'0' && w[2].is_ascii_digit() && w[3].is_ascii_digit() {
            stem[i..i + 4].parse().ok()
        } else {
            None
        }
    })
}

/// Partition file name for a calendar year: city_hourly_{YYYY}.parquet
pub fn partition_file_name(year: i32) -> String {
    format!("{}{}.{}", HOURLY_PARTITION_PREFIX, year, PARQUET_EXTENSION)
}

pub fn partition_path(raw_dir: &Path, year: i32) -> PathBuf {
    raw_dir.join(partition_file_name(year))
}

/// Year encoded in a partition file name, if the name is one of ours
pub fn partition_year(path: &Path) -> Option<i32> {
    if path.extension().and_then(|e| e.to_str()) != Some(PARQUET_EXTENSION) {
        return None;
    }
    path.file_stem()?
        .to_str()?
        .strip_prefix(HOURLY_PARTITION_PREFIX)?
        .parse()
        .ok()
}

/// List existing hourly partitions in a directory, sorted by year
pub fn list_partitions(raw_dir: &Path) -> std::io::Result<Vec<(i32, PathBuf)>> {
    let mut partitions = Vec::new();
    for entry in std::fs::read_dir(raw_dir)? {
        let path = entry?.path();
        if let Some(year) = partition_year(&path) {
            partitions.push((year, path));
        }
    }
    partitions.sort_by_key(|(year, _)| *year);
    Ok(partitions)
}
