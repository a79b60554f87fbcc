use crate::error::{ProcessingError, Result};
use csv::StringRecord;
use std::collections::HashMap;

/// Case-insensitive column lookup over a CSV header row
pub struct HeaderIndex {
    columns: HashMap<String, usize>,
}

impl HeaderIndex {
    pub fn new(headers: &StringRecord) -> Self {
        let mut columns = HashMap::new();
        for (i, name) in headers.iter().enumerate() {
            // a UTF-8 BOM can survive on the first header cell
            let name = name.trim().trim_start_matches('\u{feff}').to_lowercase();
            columns.entry(name).or_insert(i);
        }
        Self { columns }
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.columns.get(name).copied()
    }

    pub fn find_any(&self, names: &[&str]) -> Option<usize> {
        names.iter().find_map(|n| self.find(n))
    }

    pub fn require_any(&self, names: &[&str], file: &str) -> Result<usize> {
        self.find_any(names)
            .ok_or_else(|| ProcessingError::MissingColumns {
                file: file.to_string(),
                columns: names[0].to_string(),
            })
    }

    /// Check that every named column exists, reporting all missing ones at once
    pub fn require_all(&self, names: &[&str], file: &str) -> Result<Vec<usize>> {
        let missing: Vec<&str> = names
            .iter()
            .copied()
            .filter(|n| self.find(n).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(ProcessingError::MissingColumns {
                file: file.to_string(),
                columns: missing.join(", "),
            });
        }
        Ok(names.iter().filter_map(|n| self.find(n)).collect())
    }
}
