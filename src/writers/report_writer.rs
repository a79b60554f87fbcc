use crate::error::Result;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

fn temp_sibling(path: &Path) -> Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    Ok(NamedTempFile::new_in(dir)?)
}

/// Write serializable rows as CSV, header included, replacing `path` atomically.
///
/// An empty slice produces an empty file.
pub fn write_csv<T: Serialize>(rows: &[T], path: &Path) -> Result<()> {
    let mut tmp = temp_sibling(path)?;
    {
        let mut writer = csv::Writer::from_writer(tmp.as_file_mut());
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
    }
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Pretty-printed JSON, replacing `path` atomically
pub fn write_json<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<()> {
    let mut tmp = temp_sibling(path)?;
    serde_json::to_writer_pretty(tmp.as_file_mut(), value)?;
    writeln!(tmp.as_file_mut())?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde::Serialize;
    use tempfile::TempDir;

    #[derive(Serialize)]
    struct Row {
        city_id: i64,
        value: Option<f64>,
    }

    #[test]
    fn test_csv_with_missing_values() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("qa").join("rows.csv");
        write_csv(
            &[
                Row { city_id: 1, value: Some(2.5) },
                Row { city_id: 2, value: None },
            ],
            &path,
        )?;
        assert_eq!(std::fs::read_to_string(&path)?, "city_id,value\n1,2.5\n2,\n");
        Ok(())
    }

    #[test]
    fn test_json_replaces_existing_file() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("summary.json");
        std::fs::write(&path, "stale")?;
        write_json(&serde_json::json!({"rows": 3}), &path)?;
        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        assert_eq!(value["rows"], 3);
        Ok(())
    }
}
